//! Error types for the sdpd protocol core
//!
//! Every failure a query handler can hit is recoverable at the protocol level:
//! the dispatcher turns an [`SdpError`] into an error response frame carrying
//! the matching [`ErrorCode`] and the connection stays open.

use core::fmt;

use serde::{Deserialize, Serialize};

// ----------------------------------------------------------------------------
// Wire Error Codes
// ----------------------------------------------------------------------------

/// Error codes carried in an error response PDU
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    UnsupportedVersion = 0x0001,
    InvalidRecordHandle = 0x0002,
    InvalidRequestSyntax = 0x0003,
    InvalidPduSize = 0x0004,
    InvalidContinuationState = 0x0005,
    InsufficientResources = 0x0006,
}

impl ErrorCode {
    /// Raw 16-bit value as sent on the wire
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// Decode a wire error code
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0001 => Some(ErrorCode::UnsupportedVersion),
            0x0002 => Some(ErrorCode::InvalidRecordHandle),
            0x0003 => Some(ErrorCode::InvalidRequestSyntax),
            0x0004 => Some(ErrorCode::InvalidPduSize),
            0x0005 => Some(ErrorCode::InvalidContinuationState),
            0x0006 => Some(ErrorCode::InsufficientResources),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} (0x{:04x})", self, self.as_u16())
    }
}

// ----------------------------------------------------------------------------
// Protocol Errors
// ----------------------------------------------------------------------------

/// Protocol errors raised while handling a single request
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SdpError {
    #[error("Malformed request envelope: {reason}")]
    MalformedEnvelope { reason: String },

    #[error("Unsupported request kind: 0x{pdu_id:02x}")]
    UnsupportedRequestKind { pdu_id: u8 },

    #[error("Invalid request syntax: {reason}")]
    InvalidRequestSyntax { reason: String },

    #[error("Invalid service record handle: 0x{handle:08x}")]
    InvalidRecordHandle { handle: u32 },

    #[error("Invalid continuation state: {reason}")]
    InvalidContinuationState { reason: String },

    #[error("Insufficient resources: {reason}")]
    ResourceExceeded { reason: String },
}

impl SdpError {
    /// Wire error code reported to the peer for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            SdpError::MalformedEnvelope { .. } => ErrorCode::InvalidPduSize,
            SdpError::UnsupportedRequestKind { .. } => ErrorCode::InvalidRequestSyntax,
            SdpError::InvalidRequestSyntax { .. } => ErrorCode::InvalidRequestSyntax,
            SdpError::InvalidRecordHandle { .. } => ErrorCode::InvalidRecordHandle,
            SdpError::InvalidContinuationState { .. } => ErrorCode::InvalidContinuationState,
            SdpError::ResourceExceeded { .. } => ErrorCode::InsufficientResources,
        }
    }
}

// ----------------------------------------------------------------------------
// Configuration Errors
// ----------------------------------------------------------------------------

/// Errors raised while validating server configuration
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("MTU {mtu} is below the minimum of {min}")]
    MtuTooSmall { mtu: u16, min: u16 },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("Invalid peer address '{value}'")]
    InvalidPeerAddress { value: String },
}

// ----------------------------------------------------------------------------
// Convenience Error Constructors
// ----------------------------------------------------------------------------

impl SdpError {
    /// Create a malformed envelope error with a reason
    pub fn malformed<T: Into<String>>(reason: T) -> Self {
        SdpError::MalformedEnvelope {
            reason: reason.into(),
        }
    }

    /// Create an invalid request syntax error with a reason
    pub fn syntax<T: Into<String>>(reason: T) -> Self {
        SdpError::InvalidRequestSyntax {
            reason: reason.into(),
        }
    }

    /// Create an invalid continuation state error with a reason
    pub fn continuation<T: Into<String>>(reason: T) -> Self {
        SdpError::InvalidContinuationState {
            reason: reason.into(),
        }
    }

    /// Create a resource exhaustion error with a reason
    pub fn resources<T: Into<String>>(reason: T) -> Self {
        SdpError::ResourceExceeded {
            reason: reason.into(),
        }
    }
}

// ----------------------------------------------------------------------------
// Type Aliases
// ----------------------------------------------------------------------------

pub type Result<T> = core::result::Result<T, SdpError>;
