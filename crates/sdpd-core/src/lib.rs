//! sdpd Core Protocol Implementation
//!
//! Server side of the Bluetooth Service Discovery Protocol: request parsing,
//! the three query handlers, data element encoding and the per-connection
//! continuation state that lets large answers span several MTU-bounded frames.
//! The crate is synchronous; transports and timers live in `sdpd-runtime`.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod codec;
pub mod config;
pub mod continuation;
pub mod errors;
pub mod frame;
pub mod handlers;
pub mod interop;
pub mod mutation;
pub mod protocol;
pub mod record;
pub mod server;
pub mod store;
pub mod types;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use config::{ServerConfig, DEFAULT_MTU, MIN_MTU};
pub use continuation::{AttributeResume, ContinuationState, StreamKind, StreamState};
pub use errors::{ConfigError, ErrorCode, Result, SdpError};
pub use interop::{InteropConfig, InteropPolicy, PeerVersion};
pub use mutation::{NoMutation, PeerContext, ResponseMutator};
pub use protocol::{AttributeRange, DescriptorType, PduId, UuidMatchSet};
pub use record::{Attribute, ServiceRecord};
pub use server::{ConnectionContext, Dispatcher};
pub use store::{InMemoryRecordStore, RecordStore};
pub use types::{uuid16, PeerAddress, RecordHandle, TransactionId};
