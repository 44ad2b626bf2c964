//! sdpd - service discovery server entry point

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use sdpd_cli::{
    peer_from_socket, AppConfig, Cli, Commands, LengthPrefixedTransport, RecordDatabase,
};
use sdpd_core::{Dispatcher, RecordStore};
use sdpd_runtime::SdpServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    // Initialize logging
    setup_logging(cli.verbose);

    // Load configuration
    let config = AppConfig::load(&cli).context("loading configuration")?;
    let database = load_records(&config)?;

    match cli.command {
        Commands::Serve { .. } => serve(config, database).await,
        Commands::Check => {
            let records = database.to_records()?;
            println!("{}", config.to_toml()?);
            println!("# {} records OK", records.len());
            Ok(())
        }
        Commands::Records => {
            for record in database.to_records()? {
                let class = record
                    .service_class()
                    .map(|uuid| uuid.to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{}  {:>2} attributes  class {}",
                    record.handle(),
                    record.attributes().len(),
                    class
                );
            }
            Ok(())
        }
    }
}

/// Setup logging based on verbosity level, `RUST_LOG` taking precedence
fn setup_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

fn load_records(config: &AppConfig) -> anyhow::Result<RecordDatabase> {
    match &config.records {
        Some(path) => {
            info!("Loading records from: {}", path.display());
            RecordDatabase::load_from_file(path)
                .with_context(|| format!("reading record database {}", path.display()))
        }
        None => {
            warn!("No record database configured, serving an empty store");
            Ok(RecordDatabase::default())
        }
    }
}

async fn serve(config: AppConfig, database: RecordDatabase) -> anyhow::Result<()> {
    let store: Arc<dyn RecordStore> = Arc::new(database.into_store()?);
    let dispatcher = Dispatcher::new(store, config.server.clone())?;
    let server = SdpServer::new(dispatcher);

    let listener = TcpListener::bind(&config.listen)
        .await
        .with_context(|| format!("binding {}", config.listen))?;
    info!("Serving service discovery on {}", config.listen);

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    let peer = peer_from_socket(&addr);
                    let transport = LengthPrefixedTransport::new(stream, peer, config.mtu);
                    if let Err(e) = server.spawn_connection(transport) {
                        error!("Failed to start connection from {}: {}", addr, e);
                    }
                }
                Err(e) => warn!("Accept failed: {}", e),
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                break;
            }
        }
    }

    server.shutdown().await?;
    info!("sdpd exited successfully");
    Ok(())
}
