//! Runtime error types

use sdpd_core::{ConfigError, PeerAddress};

/// Failures that end a connection
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Network I/O error: {0}")]
    NetworkIo(#[from] std::io::Error),
    #[error("Frame of {len} bytes exceeds MTU {mtu}")]
    FrameTooLarge { len: usize, mtu: u16 },
    #[error("Send to peer {peer} failed: channel closed")]
    ChannelClosed { peer: PeerAddress },
    #[error("Receive failed: {reason}")]
    ReceiveFailed { reason: String },
    #[error("Server is shutting down")]
    Shutdown,
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

pub type Result<T> = std::result::Result<T, TransportError>;
