//! Query handlers
//!
//! One module per request kind. Each handler parses its parameters, builds a
//! single MTU-bounded response frame and updates the connection's
//! continuation state only when that frame was built successfully.

use crate::codec::RECORD_SEQUENCE_HEADER_LEN;
use crate::config::ServerConfig;
use crate::errors::{Result, SdpError};
use crate::frame::FrameBuffer;
use crate::mutation::{PeerContext, ResponseMutator};
use crate::protocol::data_element::{sequence_header_byte, sequence_header_word};
use crate::store::RecordStore;
use crate::types::TransactionId;

pub mod attribute;
pub mod search;
pub mod search_attribute;
mod walk;

pub use walk::{walk_attributes, WalkOutcome};

// ----------------------------------------------------------------------------
// Constants
// ----------------------------------------------------------------------------

/// Bytes of the MTU reserved for the search response header and tail
pub const SEARCH_RESPONSE_OVERHEAD: u16 = 12;

/// Bytes of the MTU reserved for the attribute response header and tail
pub const ATTRIBUTE_RESPONSE_OVERHEAD: u16 = 10;

/// Bytes of the MTU reserved for the search-attribute response header and tail
pub const SEARCH_ATTRIBUTE_RESPONSE_OVERHEAD: u16 = 10;

/// Wire width of one record handle
pub const HANDLE_LEN: usize = 4;

// ----------------------------------------------------------------------------
// Request Context
// ----------------------------------------------------------------------------

/// Everything a handler reads while answering one request
pub struct RequestContext<'a> {
    pub store: &'a dyn RecordStore,
    pub mutator: &'a dyn ResponseMutator,
    pub config: &'a ServerConfig,
    pub peer: &'a PeerContext,
    pub mtu: u16,
    pub transaction_id: TransactionId,
}

impl RequestContext<'_> {
    /// Byte budget of one response body: the client's limit capped by the MTU
    pub(crate) fn body_budget(&self, client_max: u16, overhead: u16) -> usize {
        usize::from(client_max.min(self.mtu.saturating_sub(overhead)))
    }
}

// ----------------------------------------------------------------------------
// Shared Helpers
// ----------------------------------------------------------------------------

/// Write the top-level list header into the 3 bytes reserved at the start of
/// the first frame, returning the frame body and the logical response length
///
/// `list_len` includes the 3 reserved bytes. When the list fits a one-byte
/// length the header shrinks to 2 bytes and the first reserved byte is skipped.
pub(crate) fn finish_first_frame(frame: &mut FrameBuffer, list_len: usize) -> Result<(usize, usize)> {
    if list_len > u16::MAX as usize {
        return Err(SdpError::resources(format!(
            "response of {} bytes exceeds 65535",
            list_len
        )));
    }
    let body_len = list_len - RECORD_SEQUENCE_HEADER_LEN;
    if list_len > u8::MAX as usize {
        frame.backpatch(0, &sequence_header_word(body_len as u16));
        Ok((0, list_len))
    } else {
        frame.backpatch(1, &sequence_header_byte(body_len as u8));
        Ok((1, list_len - 1))
    }
}

/// Advance the delivered offset by one frame's body
pub(crate) fn advance_offset(offset: u16, sent: usize) -> Result<u16> {
    u16::try_from(usize::from(offset) + sent)
        .map_err(|_| SdpError::resources("response offset exceeds 65535"))
}
