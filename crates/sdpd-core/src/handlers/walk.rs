//! Budgeted attribute walk shared by the attribute handlers

use smallvec::SmallVec;
use tracing::warn;

use crate::codec::encoded_len;
use crate::continuation::AttributeResume;
use crate::errors::{Result, SdpError};
use crate::frame::FrameBuffer;
use crate::mutation::{attribute_view, PeerContext, ResponseMutator};
use crate::protocol::request::AttributeRange;
use crate::record::ServiceRecord;

/// How a walk over one record ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkOutcome {
    /// Every selected attribute was emitted
    Complete,
    /// The frame filled up; resume here next frame
    Paused(AttributeResume),
}

/// Emit the attributes of `record` selected by `ranges` into `frame`
///
/// Starts from `resume`, or the first range. An attribute that does not fit
/// is split across frames unless its entry is at least `max_attribute_len`
/// bytes long, in which case the whole request fails.
pub fn walk_attributes(
    record: &ServiceRecord,
    ranges: &[AttributeRange],
    resume: Option<AttributeResume>,
    frame: &mut FrameBuffer,
    max_attribute_len: usize,
    mutator: &dyn ResponseMutator,
    peer: &PeerContext,
) -> Result<WalkOutcome> {
    let mut ranges: SmallVec<[AttributeRange; 8]> = SmallVec::from_slice(ranges);
    let mut index = 0;
    let mut partial = 0;
    if let Some(resume) = resume {
        index = resume.index;
        partial = resume.partial_offset;
        if let Some(range) = ranges.get_mut(index) {
            range.start = resume.start_id;
        }
    }

    while let Some(range) = ranges.get(index).copied() {
        let Some(stored) = record.attribute_in_range(range.start, range.end) else {
            index += 1;
            continue;
        };
        let attribute = attribute_view(mutator, record, stored, peer);
        let paused = |partial_offset| {
            WalkOutcome::Paused(AttributeResume {
                index,
                start_id: attribute.id,
                partial_offset,
            })
        };

        if frame.remaining() == 0 {
            return Ok(paused(partial));
        }

        let len = encoded_len(&attribute);
        if partial > 0 {
            frame.push_partial_attribute(&attribute, &mut partial);
            if partial < len {
                return Ok(paused(partial));
            }
            partial = 0;
        } else if len > frame.remaining() {
            if len >= max_attribute_len {
                warn!(
                    "Attribute 0x{:04x} of record {} is {} bytes, limit {}",
                    attribute.id,
                    record.handle(),
                    len,
                    max_attribute_len
                );
                return Err(SdpError::resources(format!(
                    "attribute 0x{:04x} too large to split ({} bytes)",
                    attribute.id, len
                )));
            }
            frame.push_partial_attribute(&attribute, &mut partial);
            return Ok(paused(partial));
        } else {
            frame.push_attribute(&attribute);
        }

        // A multi-id range stays current until it yields nothing more
        match attribute.id.checked_add(1) {
            Some(next) if !range.is_single() => ranges[index].start = next,
            _ => index += 1,
        }
    }

    Ok(WalkOutcome::Complete)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{encode_to_vec, sequence_len};
    use crate::mutation::NoMutation;
    use crate::record::Attribute;
    use crate::types::{PeerAddress, RecordHandle};

    fn peer() -> PeerContext {
        PeerContext::new(PeerAddress::new([0; 6]))
    }

    fn record() -> ServiceRecord {
        ServiceRecord::new(RecordHandle::new(0x10000))
            .with_service_classes(&[0x1101])
            .with_rfcomm_channel(1)
            .with_service_name("A service name long enough to split")
    }

    #[test]
    fn test_walk_in_small_frames_matches_unbounded_walk() {
        let record = record();
        let ranges = [AttributeRange::ALL];
        let expected: Vec<u8> = record.attributes().iter().flat_map(encode_to_vec).collect();
        assert_eq!(expected.len(), sequence_len(&record, &ranges));

        let mut collected = Vec::new();
        let mut resume = None;
        loop {
            let mut frame = FrameBuffer::new(7);
            let outcome =
                walk_attributes(&record, &ranges, resume, &mut frame, 400, &NoMutation, &peer())
                    .unwrap();
            collected.extend_from_slice(frame.as_slice());
            match outcome {
                WalkOutcome::Complete => break,
                WalkOutcome::Paused(next) => resume = Some(next),
            }
        }
        assert_eq!(collected, expected);
    }

    #[test]
    fn test_oversized_attribute_fails_without_emitting() {
        let record = ServiceRecord::new(RecordHandle::new(1))
            .with_attribute(Attribute::text(0x0100, &"x".repeat(500)));
        let mut frame = FrameBuffer::new(64);
        let err = walk_attributes(
            &record,
            &[AttributeRange::single(0x0100)],
            None,
            &mut frame,
            400,
            &NoMutation,
            &peer(),
        )
        .unwrap_err();
        assert!(matches!(err, SdpError::ResourceExceeded { .. }));
        assert!(frame.is_empty());
    }
}
