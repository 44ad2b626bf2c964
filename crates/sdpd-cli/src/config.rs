//! sdpd CLI Configuration
//!
//! Configuration comes from an optional `sdpd.toml` file; command-line flags
//! override individual values. Priority: flags > file > defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use sdpd_core::ServerConfig;

use crate::cli::{Cli, Commands};
use crate::error::Result;

/// Default listen address
pub const DEFAULT_LISTEN: &str = "127.0.0.1:5001";

// ----------------------------------------------------------------------------
// Application Configuration
// ----------------------------------------------------------------------------

/// Complete configuration for the sdpd binary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Address the TCP listener binds to
    pub listen: String,
    /// Record database file
    pub records: Option<PathBuf>,
    /// MTU reported for every connection; the server default when unset
    pub mtu: Option<u16>,
    /// Protocol limits and interop lists
    pub server: ServerConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen: DEFAULT_LISTEN.to_string(),
            records: None,
            mtu: None,
            server: ServerConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Load the configuration file named on the command line, or defaults
    pub fn load(cli: &Cli) -> Result<Self> {
        let mut config = match &cli.config {
            Some(path) => {
                info!("Loading configuration from: {}", path.display());
                Self::load_from_file(path)?
            }
            None => {
                info!("Using default configuration");
                Self::default()
            }
        };
        config.apply_overrides(cli);
        config.server.validate()?;
        Ok(config)
    }

    /// Apply command-line flags on top of the file values
    pub fn apply_overrides(&mut self, cli: &Cli) {
        if let Some(records) = &cli.records {
            self.records = Some(records.clone());
        }
        if let Commands::Serve {
            listen,
            mtu,
            timeout,
            error_text,
        } = &cli.command
        {
            if let Some(listen) = listen {
                self.listen = listen.clone();
            }
            if let Some(mtu) = mtu {
                self.mtu = Some(*mtu);
            }
            if let Some(secs) = timeout {
                self.server = self
                    .server
                    .clone()
                    .with_inactivity_timeout(Duration::from_secs(*secs));
            }
            if *error_text {
                self.server.error_text = true;
            }
        }
    }

    /// Effective configuration rendered back as TOML
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}
