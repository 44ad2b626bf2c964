//! sdpd Runtime
//!
//! Async side of the sdpd server:
//! - `FrameTransport`: whole-frame transport seam, with an in-memory
//!   `ChannelTransport` for tests and embedding
//! - `ConnectionTask`: per-connection request loop with the inactivity timer
//! - `SdpServer`: spawns and tracks connection tasks, graceful shutdown
//!
//! All protocol logic lives in `sdpd-core`; this crate only moves frames.

pub mod connection;
pub mod error;
pub mod server;
pub mod transport;

pub use connection::{CloseReason, ConnectionId, ConnectionTask};
pub use error::{Result, TransportError};
pub use server::{ConnectionInfo, SdpServer};
pub use transport::{ChannelClient, ChannelTransport, FrameTransport};

// Re-export core types for convenience
pub use sdpd_core::{Dispatcher, PeerAddress, ServerConfig};
