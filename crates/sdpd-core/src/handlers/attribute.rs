//! Service Attribute handler
//!
//! Streams the selected attributes of one record as a single data element
//! sequence. The continuation offset counts bytes of that sequence already
//! delivered.

use tracing::debug;

use super::walk::{walk_attributes, WalkOutcome};
use super::{RequestContext, ATTRIBUTE_RESPONSE_OVERHEAD};
use crate::codec::{sequence_len, RECORD_SEQUENCE_HEADER_LEN};
use crate::continuation::{ContinuationState, StreamKind, StreamState};
use crate::errors::{Result, SdpError};
use crate::frame::FrameBuffer;
use crate::mutation::record_view;
use crate::protocol::pdu::{PduId, ResponseWriter};
use crate::protocol::request::{AttributeRequest, Continuation};

/// Build one Service Attribute response frame
pub fn handle(
    ctx: &RequestContext<'_>,
    params: &[u8],
    state: &mut ContinuationState,
) -> Result<Vec<u8>> {
    let request = AttributeRequest::parse(params)?;
    let stored = ctx
        .store
        .find(request.handle)
        .ok_or(SdpError::InvalidRecordHandle {
            handle: request.handle.value(),
        })?;
    let continuation = Continuation::parse(request.tail)?;

    let record = record_view(ctx.mutator, &stored, ctx.peer);
    let ranges = request.ranges.as_slice();
    let mut frame = FrameBuffer::new(ctx.body_budget(request.max_bytes, ATTRIBUTE_RESPONSE_OVERHEAD));

    let mut stream = match continuation {
        Continuation::Fresh => {
            state.reset();
            frame.reserve(RECORD_SEQUENCE_HEADER_LEN);
            StreamState::new(StreamKind::Attribute, 0)
        }
        Continuation::Resume { offset } => state.resume(StreamKind::Attribute, offset)?,
    };

    let outcome = walk_attributes(
        &record,
        ranges,
        stream.attribute,
        &mut frame,
        ctx.config.max_attribute_len,
        ctx.mutator,
        ctx.peer,
    )?;
    stream.attribute = match outcome {
        WalkOutcome::Complete => None,
        WalkOutcome::Paused(resume) => Some(resume),
    };

    let skip = if continuation.is_resume() {
        if frame.is_empty() {
            return Err(SdpError::continuation(format!(
                "no progress resuming record {} at offset {}",
                request.handle, stream.byte_offset
            )));
        }
        0
    } else {
        let list_len = sequence_len(&record, ranges) + RECORD_SEQUENCE_HEADER_LEN;
        let (skip, total) = super::finish_first_frame(&mut frame, list_len)?;
        stream.total_length = total;
        skip
    };

    let body = &frame.as_slice()[skip..];
    stream.byte_offset = super::advance_offset(stream.byte_offset, body.len())?;
    let next = (!stream.is_complete()).then_some(stream.byte_offset);

    let mut writer = ResponseWriter::new(
        PduId::ServiceAttributeResponse,
        ctx.transaction_id,
        2 + body.len() + 3,
    );
    writer
        .put_u16(body.len() as u16)
        .put_slice(body)
        .put_continuation(next);

    debug!(
        "Attribute {} for record {}: sent {} of {} bytes, continuation {:?}",
        ctx.transaction_id,
        request.handle,
        stream.byte_offset,
        stream.total_length,
        next
    );

    *state = ContinuationState::from_stream(stream);
    Ok(writer.finish())
}
