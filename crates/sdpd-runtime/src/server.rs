//! Server runtime handle
//!
//! Spawns a task per connection, tracks the live connections and coordinates
//! graceful shutdown.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use futures::future::join_all;
use sdpd_core::{Dispatcher, PeerAddress};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::connection::{CloseReason, ConnectionId, ConnectionTask};
use crate::error::{Result, TransportError};
use crate::transport::FrameTransport;

/// Registry entry for a live connection
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub peer: PeerAddress,
    pub mtu: u16,
    pub opened_at: Instant,
}

type TaskHandle = JoinHandle<Result<CloseReason>>;

// ----------------------------------------------------------------------------
// SDP Server
// ----------------------------------------------------------------------------

/// Runtime handle owning every connection task
pub struct SdpServer {
    dispatcher: Dispatcher,
    connections: Arc<DashMap<ConnectionId, ConnectionInfo>>,
    tasks: Mutex<Vec<TaskHandle>>,
    shutdown_tx: watch::Sender<bool>,
    next_id: AtomicU64,
}

impl SdpServer {
    pub fn new(dispatcher: Dispatcher) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            dispatcher,
            connections: Arc::new(DashMap::new()),
            tasks: Mutex::new(Vec::new()),
            shutdown_tx,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn is_running(&self) -> bool {
        !*self.shutdown_tx.borrow()
    }

    /// Number of connections currently being served
    pub fn active_connections(&self) -> usize {
        self.connections.len()
    }

    pub fn connection_info(&self, id: ConnectionId) -> Option<ConnectionInfo> {
        self.connections.get(&id).map(|entry| entry.value().clone())
    }

    /// Start serving a new connection
    pub fn spawn_connection<T>(&self, transport: T) -> Result<ConnectionId>
    where
        T: FrameTransport + 'static,
    {
        if !self.is_running() {
            return Err(TransportError::Shutdown);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let task = ConnectionTask::new(
            id,
            self.dispatcher.clone(),
            transport,
            self.shutdown_tx.subscribe(),
        );
        self.connections.insert(
            id,
            ConnectionInfo {
                peer: task.context().peer().address,
                mtu: task.context().mtu(),
                opened_at: Instant::now(),
            },
        );

        let connections = Arc::clone(&self.connections);
        let handle = tokio::spawn(async move {
            let result = task.run().await;
            connections.remove(&id);
            result
        });

        let mut tasks = self.tasks.lock().map_err(|_| TransportError::Shutdown)?;
        tasks.retain(|task| !task.is_finished());
        tasks.push(handle);
        Ok(id)
    }

    /// Stop every connection and wait for their tasks to finish
    pub async fn shutdown(&self) -> Result<()> {
        info!(
            "Shutting down with {} active connections",
            self.active_connections()
        );
        self.shutdown_tx.send_replace(true);

        let handles: Vec<TaskHandle> = match self.tasks.lock() {
            Ok(mut tasks) => tasks.drain(..).collect(),
            Err(poisoned) => poisoned.into_inner().drain(..).collect(),
        };
        for result in join_all(handles).await {
            if let Err(err) = result {
                warn!("Connection task panicked: {}", err);
            }
        }
        Ok(())
    }
}
