//! Attribute codec
//!
//! Computes and produces the wire encoding of attribute entries. An entry is
//! the attribute id as a 16-bit unsigned integer element (`0x09 id_hi id_lo`)
//! followed by the value data element.

use crate::protocol::data_element::{value_header, value_header_len, DescriptorType};
use crate::protocol::request::{AttributeRange, UuidMatchSet};
use crate::record::{Attribute, ServiceRecord};
use crate::store::{matching_records, RecordStore};

// ----------------------------------------------------------------------------
// Constants
// ----------------------------------------------------------------------------

/// Bytes taken by the attribute id element of every entry
pub const ATTRIBUTE_ID_ELEMENT_LEN: usize = 3;

/// Bytes reserved for each record's sequence header in a search-attribute list
pub const RECORD_SEQUENCE_HEADER_LEN: usize = 3;

// ----------------------------------------------------------------------------
// Single Attribute Encoding
// ----------------------------------------------------------------------------

/// Encoded length of one attribute entry
pub fn encoded_len(attribute: &Attribute) -> usize {
    ATTRIBUTE_ID_ELEMENT_LEN
        + value_header_len(attribute.kind, attribute.value.len())
        + attribute.value.len()
}

/// Append the full entry encoding of `attribute` to `out`
pub fn encode(attribute: &Attribute, out: &mut Vec<u8>) {
    out.push(DescriptorType::UnsignedInt.descriptor(1));
    out.extend_from_slice(&attribute.id.to_be_bytes());
    out.extend_from_slice(&value_header(attribute.kind, attribute.value.len()));
    out.extend_from_slice(&attribute.value);
}

/// Full entry encoding as a fresh buffer
pub fn encode_to_vec(attribute: &Attribute) -> Vec<u8> {
    let mut out = Vec::with_capacity(encoded_len(attribute));
    encode(attribute, &mut out);
    out
}

/// Append up to `budget` bytes of the entry encoding starting at `*offset`
///
/// Advances `*offset` by the bytes written and returns that count. Once
/// `*offset` equals [`encoded_len`] the entry has been fully emitted.
pub fn encode_partial(
    attribute: &Attribute,
    budget: usize,
    offset: &mut usize,
    out: &mut Vec<u8>,
) -> usize {
    let full = encode_to_vec(attribute);
    let start = (*offset).min(full.len());
    let take = (full.len() - start).min(budget);
    out.extend_from_slice(&full[start..start + take]);
    *offset = start + take;
    take
}

// ----------------------------------------------------------------------------
// Range Walking
// ----------------------------------------------------------------------------

/// Attributes selected by a range list, in the order handlers emit them
///
/// Each range yields every attribute whose id falls inside it, lowest first.
/// Overlapping ranges yield an attribute once per range.
pub struct RangeWalk<'a> {
    record: &'a ServiceRecord,
    ranges: &'a [AttributeRange],
    index: usize,
    next_start: Option<u16>,
}

impl<'a> RangeWalk<'a> {
    pub fn new(record: &'a ServiceRecord, ranges: &'a [AttributeRange]) -> Self {
        Self {
            record,
            ranges,
            index: 0,
            next_start: ranges.first().map(|r| r.start),
        }
    }
}

impl<'a> Iterator for RangeWalk<'a> {
    type Item = &'a Attribute;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(range) = self.ranges.get(self.index) {
            let found = self
                .next_start
                .and_then(|start| self.record.attribute_in_range(start, range.end));
            match found {
                Some(attribute) => {
                    self.next_start = if range.is_single() {
                        None
                    } else {
                        attribute.id.checked_add(1)
                    };
                    return Some(attribute);
                }
                None => {
                    self.index += 1;
                    self.next_start = self.ranges.get(self.index).map(|r| r.start);
                }
            }
        }
        None
    }
}

/// Encoded length of all entries a record contributes for `ranges`
pub fn sequence_len(record: &ServiceRecord, ranges: &[AttributeRange]) -> usize {
    RangeWalk::new(record, ranges).map(encoded_len).sum()
}

/// Total length of a search-attribute list body
///
/// Every matching record contributes its 3-byte sequence header plus its
/// entries; a record with no selected attributes contributes nothing.
/// `rewrite` returns the private copy actually serialized for this peer, if
/// it differs from the stored record.
pub fn list_len<F>(
    store: &dyn RecordStore,
    uuids: &UuidMatchSet,
    ranges: &[AttributeRange],
    mut rewrite: F,
) -> usize
where
    F: FnMut(&ServiceRecord) -> Option<ServiceRecord>,
{
    matching_records(store, uuids)
        .map(|record| {
            let len = match rewrite(&record) {
                Some(view) => sequence_len(&view, ranges),
                None => sequence_len(&record, ranges),
            };
            match len {
                0 => 0,
                len => RECORD_SEQUENCE_HEADER_LEN + len,
            }
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::attribute_ids;
    use crate::types::RecordHandle;

    fn record() -> ServiceRecord {
        ServiceRecord::new(RecordHandle::new(0x0001_0000))
            .with_service_classes(&[0x1101])
            .with_attribute(Attribute::uint16(0x0200, 0x1005))
            .with_service_name("Serial")
    }

    #[test]
    fn test_entry_encoding_layout() {
        let attribute = Attribute::uint16(0x0200, 0x1005);
        assert_eq!(encode_to_vec(&attribute), vec![0x09, 0x02, 0x00, 0x09, 0x10, 0x05]);
        assert_eq!(encoded_len(&attribute), 6);

        let name = Attribute::text(attribute_ids::SERVICE_NAME, "abc");
        assert_eq!(
            encode_to_vec(&name),
            vec![0x09, 0x01, 0x00, 0x25, 0x03, b'a', b'b', b'c']
        );

        let odd = Attribute::new(0x0300, DescriptorType::UnsignedInt, vec![1, 2, 3]);
        assert_eq!(encode_to_vec(&odd), vec![0x09, 0x03, 0x00, 0x0D, 0x03, 1, 2, 3]);
        assert_eq!(encoded_len(&odd), 8);
    }

    #[test]
    fn test_partial_encoding_resumes_where_it_stopped() {
        let name = Attribute::text(attribute_ids::SERVICE_NAME, "hello world");
        let full = encode_to_vec(&name);

        let mut offset = 0;
        let mut out = Vec::new();
        assert_eq!(encode_partial(&name, 4, &mut offset, &mut out), 4);
        assert_eq!(offset, 4);
        assert_eq!(encode_partial(&name, 5, &mut offset, &mut out), 5);
        assert_eq!(encode_partial(&name, 100, &mut offset, &mut out), full.len() - 9);
        assert_eq!(offset, encoded_len(&name));
        assert_eq!(out, full);
        assert_eq!(encode_partial(&name, 100, &mut offset, &mut out), 0);
    }

    #[test]
    fn test_range_walk_covers_ranges_in_order() {
        let record = record();
        let ranges = [
            AttributeRange::single(0x0100),
            AttributeRange::new(0x0000, 0x0001),
            AttributeRange::single(0x0050),
            AttributeRange::new(0x0200, 0xFFFF),
        ];
        let ids: Vec<u16> = RangeWalk::new(&record, &ranges).map(|a| a.id).collect();
        assert_eq!(ids, vec![0x0100, 0x0000, 0x0001, 0x0200]);

        let all = [AttributeRange::ALL];
        let expected: usize = record.attributes().iter().map(encoded_len).sum();
        assert_eq!(sequence_len(&record, &all), expected);
    }

    #[test]
    fn test_range_walk_handles_top_id() {
        let record = ServiceRecord::new(RecordHandle::new(1))
            .with_attribute(Attribute::uint8(0xFFFF, 1));
        let ranges = [AttributeRange::new(0xFFF0, 0xFFFF)];
        let ids: Vec<u16> = RangeWalk::new(&record, &ranges).map(|a| a.id).collect();
        assert_eq!(ids, vec![0xFFFF]);
    }
}
