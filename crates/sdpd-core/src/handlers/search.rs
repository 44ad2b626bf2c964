//! Service Search handler
//!
//! Answers with the handles of matching records. The match list is recomputed
//! on every frame; the continuation offset counts handles already delivered.

use tracing::debug;

use super::{RequestContext, HANDLE_LEN, SEARCH_RESPONSE_OVERHEAD};
use crate::continuation::{ContinuationState, StreamKind, StreamState};
use crate::errors::{Result, SdpError};
use crate::protocol::pdu::{PduId, ResponseWriter};
use crate::protocol::request::{Continuation, SearchRequest};
use crate::store::matching_records;
use crate::types::RecordHandle;

/// Build one Service Search response frame
pub fn handle(
    ctx: &RequestContext<'_>,
    params: &[u8],
    state: &mut ContinuationState,
) -> Result<Vec<u8>> {
    let request = SearchRequest::parse(params)?;
    let continuation = Continuation::parse(request.tail)?;

    let max_handles = request.max_handles.min(ctx.config.max_handles_per_search);
    let handles: Vec<RecordHandle> = matching_records(ctx.store, &request.uuids)
        .take(usize::from(max_handles))
        .map(|record| record.handle())
        .collect();

    let mut stream = match continuation {
        Continuation::Fresh => {
            state.reset();
            StreamState::new(StreamKind::Search, handles.len())
        }
        Continuation::Resume { offset } => {
            let stream = state.resume(StreamKind::Search, offset)?;
            if usize::from(offset) > handles.len() {
                return Err(SdpError::continuation(format!(
                    "offset {} beyond {} matching records",
                    offset,
                    handles.len()
                )));
            }
            stream
        }
    };

    let start = usize::from(stream.byte_offset);
    let per_frame = usize::from(ctx.mtu.saturating_sub(SEARCH_RESPONSE_OVERHEAD)) / HANDLE_LEN;
    let window = &handles[start..handles.len().min(start + per_frame)];

    stream.total_length = handles.len();
    stream.byte_offset = super::advance_offset(stream.byte_offset, window.len())?;
    let next = (!stream.is_complete()).then_some(stream.byte_offset);

    let mut writer = ResponseWriter::new(
        PduId::ServiceSearchResponse,
        ctx.transaction_id,
        4 + window.len() * HANDLE_LEN + 3,
    );
    writer
        .put_u16(handles.len() as u16)
        .put_u16(window.len() as u16);
    for handle in window {
        writer.put_u32(handle.value());
    }
    writer.put_continuation(next);

    debug!(
        "Search {}: {} of {} handles from offset {}, continuation {:?}",
        ctx.transaction_id,
        window.len(),
        handles.len(),
        start,
        next
    );

    *state = ContinuationState::from_stream(stream);
    Ok(writer.finish())
}
