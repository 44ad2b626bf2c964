//! Per-connection server loop
//!
//! A connection task owns the connection's continuation state. It answers
//! requests one at a time, so frames of one connection are never reordered,
//! and it ends on peer close, inactivity or server shutdown. Ending the task
//! drops any partially delivered response.

use core::fmt;
use std::time::Duration;

use sdpd_core::{ConnectionContext, Dispatcher};
use tokio::sync::watch;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::transport::FrameTransport;

/// Identifier the server assigns to each connection
pub type ConnectionId = u64;

/// Why a connection task ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The peer closed the channel
    PeerClosed,
    /// No request was accepted within the inactivity timeout
    InactivityTimeout,
    /// The server is shutting down
    Shutdown,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::PeerClosed => write!(f, "peer closed"),
            CloseReason::InactivityTimeout => write!(f, "inactivity timeout"),
            CloseReason::Shutdown => write!(f, "server shutdown"),
        }
    }
}

// ----------------------------------------------------------------------------
// Connection Task
// ----------------------------------------------------------------------------

/// Serves one connection until it closes
pub struct ConnectionTask<T: FrameTransport> {
    id: ConnectionId,
    dispatcher: Dispatcher,
    transport: T,
    context: ConnectionContext,
    inactivity_timeout: Duration,
    shutdown: watch::Receiver<bool>,
}

impl<T: FrameTransport> ConnectionTask<T> {
    pub fn new(
        id: ConnectionId,
        dispatcher: Dispatcher,
        transport: T,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let context = dispatcher.connection(transport.peer(), transport.mtu());
        let inactivity_timeout = dispatcher.config().inactivity_timeout();
        Self {
            id,
            dispatcher,
            transport,
            context,
            inactivity_timeout,
            shutdown,
        }
    }

    /// Override the inactivity timeout from the server configuration
    pub fn with_inactivity_timeout(mut self, timeout: Duration) -> Self {
        self.inactivity_timeout = timeout;
        self
    }

    pub fn context(&self) -> &ConnectionContext {
        &self.context
    }

    /// Run the request loop to completion
    pub async fn run(mut self) -> Result<CloseReason> {
        info!(
            "Connection {} opened by {} (mtu {})",
            self.id,
            self.context.peer().address,
            self.context.mtu()
        );

        let reason = self.serve().await;
        match &reason {
            Ok(reason) => info!(
                "Connection {} closed: {} after {} requests",
                self.id,
                reason,
                self.context.requests()
            ),
            Err(err) => warn!("Connection {} failed: {}", self.id, err),
        }
        reason
    }

    async fn serve(&mut self) -> Result<CloseReason> {
        if *self.shutdown.borrow() {
            return Ok(CloseReason::Shutdown);
        }
        let mut deadline = Instant::now() + self.inactivity_timeout;

        loop {
            let frame = tokio::select! {
                _ = self.shutdown.changed() => return Ok(CloseReason::Shutdown),
                received = timeout_at(deadline, self.transport.recv()) => match received {
                    Err(_) => return Ok(CloseReason::InactivityTimeout),
                    Ok(frame) => frame?,
                },
            };
            let Some(request) = frame else {
                return Ok(CloseReason::PeerClosed);
            };

            let accepted = self.context.requests();
            let response = self.dispatcher.handle_request(&mut self.context, &request);
            // Malformed envelopes do not count as activity
            if self.context.requests() != accepted {
                deadline = Instant::now() + self.inactivity_timeout;
            }
            debug!(
                "Connection {}: {} byte request, {} byte response",
                self.id,
                request.len(),
                response.len()
            );
            self.transport.send(response).await?;
        }
    }
}
