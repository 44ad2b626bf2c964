//! sdpd CLI library
//!
//! Argument parsing, configuration and record database loading, and the TCP
//! frame transport used by the `sdpd` binary.

pub mod cli;
pub mod config;
pub mod error;
pub mod records;
pub mod transport;

pub use cli::{Cli, Commands};
pub use config::AppConfig;
pub use error::{CliError, Result};
pub use records::RecordDatabase;
pub use transport::{peer_from_socket, LengthPrefixedTransport};
