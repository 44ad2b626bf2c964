//! Service Search Attribute handler
//!
//! Streams, for every matching record, a sequence of its selected attributes,
//! all wrapped in one outer sequence. Records are visited in store order from
//! a handle cursor so records removed between frames never dangle.

use tracing::{debug, warn};

use super::walk::{walk_attributes, WalkOutcome};
use super::{RequestContext, SEARCH_ATTRIBUTE_RESPONSE_OVERHEAD};
use crate::codec::{list_len, sequence_len, RECORD_SEQUENCE_HEADER_LEN};
use crate::continuation::{ContinuationState, StreamKind, StreamState};
use crate::errors::{Result, SdpError};
use crate::frame::FrameBuffer;
use crate::mutation::record_view;
use crate::protocol::data_element::sequence_header_word;
use crate::protocol::pdu::{PduId, ResponseWriter};
use crate::protocol::request::{Continuation, SearchAttributeRequest};

/// Build one Service Search Attribute response frame
pub fn handle(
    ctx: &RequestContext<'_>,
    params: &[u8],
    state: &mut ContinuationState,
) -> Result<Vec<u8>> {
    let request = SearchAttributeRequest::parse(params)?;
    let continuation = Continuation::parse(request.tail)?;

    let ranges = request.ranges.as_slice();
    let mut frame = FrameBuffer::new(
        ctx.body_budget(request.max_bytes, SEARCH_ATTRIBUTE_RESPONSE_OVERHEAD),
    );

    let mut stream = match continuation {
        Continuation::Fresh => {
            state.reset();
            frame.reserve(RECORD_SEQUENCE_HEADER_LEN);
            StreamState::new(StreamKind::SearchAttribute, 0)
        }
        Continuation::Resume { offset } => state.resume(StreamKind::SearchAttribute, offset)?,
    };

    while let Some(stored) = ctx.store.next_matching(stream.cursor, &request.uuids) {
        if let Some(expected) = stream.in_progress {
            if stored.handle() != expected {
                warn!(
                    "Record {} removed while its attributes were being streamed",
                    expected
                );
                return Err(SdpError::continuation(format!(
                    "record {} no longer available",
                    expected
                )));
            }
        }

        let record = record_view(ctx.mutator, &stored, ctx.peer);
        let seq_start = frame.len();
        if !stream.sequence_header_sent {
            if frame.remaining() < RECORD_SEQUENCE_HEADER_LEN {
                stream.attribute = None;
                break;
            }
            frame.reserve(RECORD_SEQUENCE_HEADER_LEN);
        }

        let outcome = walk_attributes(
            &record,
            ranges,
            stream.attribute,
            &mut frame,
            ctx.config.max_attribute_len,
            ctx.mutator,
            ctx.peer,
        )?;
        let paused = matches!(outcome, WalkOutcome::Paused(_));

        if !stream.sequence_header_sent {
            match sequence_len(&record, ranges) {
                0 => frame.truncate(seq_start),
                len => {
                    let len = u16::try_from(len).map_err(|_| {
                        SdpError::resources(format!("record {} attributes exceed 65535", stored.handle()))
                    })?;
                    frame.backpatch(seq_start, &sequence_header_word(len));
                    stream.sequence_header_sent = paused;
                }
            }
        }

        match outcome {
            WalkOutcome::Paused(resume) => {
                stream.attribute = Some(resume);
                stream.in_progress = Some(stored.handle());
                break;
            }
            WalkOutcome::Complete => {
                stream.attribute = None;
                stream.in_progress = None;
                stream.sequence_header_sent = false;
                stream.cursor = Some(stored.handle());
            }
        }
    }

    let skip = if continuation.is_resume() {
        if frame.is_empty() {
            return Err(SdpError::continuation(format!(
                "no progress at offset {} of {}",
                stream.byte_offset, stream.total_length
            )));
        }
        0
    } else {
        let list_len = list_len(ctx.store, &request.uuids, ranges, |record| {
            ctx.mutator.rewrite_record(record, ctx.peer)
        }) + RECORD_SEQUENCE_HEADER_LEN;
        let (skip, total) = super::finish_first_frame(&mut frame, list_len)?;
        stream.total_length = total;
        skip
    };

    let body = &frame.as_slice()[skip..];
    stream.byte_offset = super::advance_offset(stream.byte_offset, body.len())?;
    let next = (!stream.is_complete()).then_some(stream.byte_offset);

    let mut writer = ResponseWriter::new(
        PduId::ServiceSearchAttributeResponse,
        ctx.transaction_id,
        2 + body.len() + 3,
    );
    writer
        .put_u16(body.len() as u16)
        .put_slice(body)
        .put_continuation(next);

    debug!(
        "Search attribute {}: sent {} of {} bytes, cursor {:?}, continuation {:?}",
        ctx.transaction_id,
        stream.byte_offset,
        stream.total_length,
        stream.cursor,
        next
    );

    *state = ContinuationState::from_stream(stream);
    Ok(writer.finish())
}
