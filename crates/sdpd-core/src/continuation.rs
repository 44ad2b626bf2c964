//! Per-connection continuation state machine
//!
//! A connection is either idle or streaming exactly one response that did not
//! fit a single frame. Handlers work on a copy of the streaming state and the
//! dispatcher commits it only when the frame was built successfully, so a
//! rejected request never disturbs a stream that is still valid.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SdpError};
use crate::types::RecordHandle;

// ----------------------------------------------------------------------------
// Stream Kinds
// ----------------------------------------------------------------------------

/// Request kind a stream belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamKind {
    Search,
    Attribute,
    SearchAttribute,
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StreamKind::Search => "search",
            StreamKind::Attribute => "attribute",
            StreamKind::SearchAttribute => "search-attribute",
        };
        f.write_str(name)
    }
}

// ----------------------------------------------------------------------------
// Resume Points
// ----------------------------------------------------------------------------

/// Where an attribute walk stopped inside a range list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeResume {
    /// Index of the range entry to resume in
    pub index: usize,
    /// Id the resumed range entry starts from
    pub start_id: u16,
    /// Bytes of the attribute at `start_id` already sent; zero when none were
    pub partial_offset: usize,
}

/// Resume point of a response spanning several frames
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamState {
    pub kind: StreamKind,
    /// Logical bytes (handles, for a search) already delivered
    pub byte_offset: u16,
    /// Logical length of the whole response, fixed at the first frame
    pub total_length: usize,
    /// Attribute walk resume point, `None` to start at the first range
    pub attribute: Option<AttributeResume>,
    /// Whether the current record's sequence header was already emitted
    pub sequence_header_sent: bool,
    /// Last record whose attributes were fully delivered
    pub cursor: Option<RecordHandle>,
    /// Record whose attributes are partially delivered
    pub in_progress: Option<RecordHandle>,
}

impl StreamState {
    pub fn new(kind: StreamKind, total_length: usize) -> Self {
        Self {
            kind,
            byte_offset: 0,
            total_length,
            attribute: None,
            sequence_header_sent: false,
            cursor: None,
            in_progress: None,
        }
    }

    /// Whether the delivered offset has reached the logical length
    pub fn is_complete(&self) -> bool {
        usize::from(self.byte_offset) >= self.total_length
    }
}

// ----------------------------------------------------------------------------
// Continuation State
// ----------------------------------------------------------------------------

/// Continuation state owned by one connection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContinuationState {
    /// No response in flight
    #[default]
    Idle,
    /// A response is partially delivered
    Streaming(StreamState),
}

impl ContinuationState {
    pub fn is_idle(&self) -> bool {
        matches!(self, ContinuationState::Idle)
    }

    /// Get current state name for logging
    pub fn state_name(&self) -> &'static str {
        match self {
            ContinuationState::Idle => "Idle",
            ContinuationState::Streaming(_) => "Streaming",
        }
    }

    pub fn stream(&self) -> Option<&StreamState> {
        match self {
            ContinuationState::Idle => None,
            ContinuationState::Streaming(stream) => Some(stream),
        }
    }

    /// Validate a continuation request and return a working copy of the stream
    ///
    /// The request kind must match the stream in flight and the offset must
    /// equal the stored offset exactly.
    pub fn resume(&self, kind: StreamKind, offset: u16) -> Result<StreamState> {
        let stream = self
            .stream()
            .ok_or_else(|| SdpError::continuation("no response in progress"))?;
        if stream.kind != kind {
            return Err(SdpError::continuation(format!(
                "{} continuation while a {} response is in progress",
                kind, stream.kind
            )));
        }
        if stream.byte_offset != offset {
            return Err(SdpError::continuation(format!(
                "offset {} does not match stored offset {}",
                offset, stream.byte_offset
            )));
        }
        Ok(stream.clone())
    }

    /// Settle the state after a frame: keep streaming or go idle
    pub fn from_stream(stream: StreamState) -> Self {
        if stream.is_complete() {
            ContinuationState::Idle
        } else {
            ContinuationState::Streaming(stream)
        }
    }

    /// Discard any response in flight
    pub fn reset(&mut self) {
        *self = ContinuationState::Idle;
    }
}
