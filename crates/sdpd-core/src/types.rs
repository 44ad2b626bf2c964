//! Core types for the sdpd protocol
//!
//! Newtypes for the identifiers that travel on the wire, plus the UUID
//! helpers used to compare short and full-length service class UUIDs.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ConfigError;

// ----------------------------------------------------------------------------
// Record Handle
// ----------------------------------------------------------------------------

/// 32-bit service record handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordHandle(u32);

impl RecordHandle {
    /// Create a handle from its raw value
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Get the raw value
    pub const fn value(&self) -> u32 {
        self.0
    }

    /// Big-endian wire bytes
    pub fn to_be_bytes(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for RecordHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

// ----------------------------------------------------------------------------
// Transaction Id
// ----------------------------------------------------------------------------

/// Transaction id echoed from a request into its response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(pub u16);

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ----------------------------------------------------------------------------
// Peer Address
// ----------------------------------------------------------------------------

/// 48-bit device address of the remote peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PeerAddress([u8; 6]);

impl PeerAddress {
    /// Create an address from 6 bytes, most significant first
    pub const fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }

    /// Whether this address starts with the given prefix bytes
    pub fn has_prefix(&self, prefix: &[u8]) -> bool {
        prefix.len() <= self.0.len() && self.0[..prefix.len()] == *prefix
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|b| hex::encode([*b])).collect();
        write!(f, "{}", parts.join(":"))
    }
}

impl FromStr for PeerAddress {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = parse_address_bytes(s)?;
        let bytes: [u8; 6] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| ConfigError::InvalidPeerAddress {
                value: s.to_string(),
            })?;
        Ok(Self(bytes))
    }
}

/// Parse a colon separated hex address or address prefix ("00:1a:7d")
pub fn parse_address_bytes(s: &str) -> Result<Vec<u8>, ConfigError> {
    let clean: String = s.trim().split(':').collect();
    let bytes = hex::decode(&clean).map_err(|_| ConfigError::InvalidPeerAddress {
        value: s.to_string(),
    })?;
    if bytes.is_empty() || bytes.len() > 6 {
        return Err(ConfigError::InvalidPeerAddress {
            value: s.to_string(),
        });
    }
    Ok(bytes)
}

// ----------------------------------------------------------------------------
// UUID Helpers
// ----------------------------------------------------------------------------

/// Bluetooth base UUID that 16- and 32-bit UUIDs are shortened against
pub const BASE_UUID: Uuid = Uuid::from_u128(0x00000000_0000_1000_8000_00805F9B34FB);

/// Expand a 16-bit UUID to its full 128-bit form
pub fn uuid16(short: u16) -> Uuid {
    uuid32(short as u32)
}

/// Expand a 32-bit UUID to its full 128-bit form
pub fn uuid32(short: u32) -> Uuid {
    Uuid::from_u128(BASE_UUID.as_u128() | ((short as u128) << 96))
}

/// Decode a 2-, 4- or 16-byte big-endian UUID value
pub fn uuid_from_slice(bytes: &[u8]) -> Option<Uuid> {
    match bytes.len() {
        2 => Some(uuid16(u16::from_be_bytes([bytes[0], bytes[1]]))),
        4 => Some(uuid32(u32::from_be_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3],
        ]))),
        16 => Uuid::from_slice(bytes).ok(),
        _ => None,
    }
}

/// 16-bit short form of a UUID, if it lies on the base UUID
pub fn as_uuid16(uuid: &Uuid) -> Option<u16> {
    let value = uuid.as_u128();
    let short = (value >> 96) as u32;
    if value & !(0xFFFF_FFFFu128 << 96) == BASE_UUID.as_u128() && short <= u16::MAX as u32 {
        Some(short as u16)
    } else {
        None
    }
}
