//! Request parameter parsing
//!
//! Parses the parameter block of the three request kinds. The continuation
//! tail is kept raw and decoded on demand so handlers can validate it at the
//! point in their flow where it matters.

use core::fmt;

use smallvec::SmallVec;
use uuid::Uuid;

use crate::errors::{Result, SdpError};
use crate::protocol::data_element::{DescriptorType, ElementHeader, ElementIter};
use crate::protocol::pdu::CONTINUATION_LEN;
use crate::types::{uuid_from_slice, RecordHandle};

// ----------------------------------------------------------------------------
// Constants
// ----------------------------------------------------------------------------

/// Maximum UUIDs accepted in one match set
pub const MAX_UUIDS_PER_REQUEST: usize = 12;

/// Maximum attribute-id ranges accepted in one list
pub const MAX_ATTRIBUTE_RANGES: usize = 32;

// ----------------------------------------------------------------------------
// UUID Match Set
// ----------------------------------------------------------------------------

/// Non-empty ordered set of UUIDs a record is matched against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UuidMatchSet(SmallVec<[Uuid; 4]>);

impl UuidMatchSet {
    /// Build a match set, rejecting an empty one
    pub fn new(uuids: impl IntoIterator<Item = Uuid>) -> Result<Self> {
        let uuids: SmallVec<[Uuid; 4]> = uuids.into_iter().collect();
        if uuids.is_empty() {
            return Err(SdpError::syntax("empty UUID set"));
        }
        Ok(Self(uuids))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Uuid> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parse a data element sequence of UUIDs, returning the bytes consumed
    pub fn parse(bytes: &[u8]) -> Result<(Self, usize)> {
        let header = ElementHeader::parse(bytes)
            .map_err(|_| SdpError::syntax("UUID list truncated"))?;
        if header.kind != DescriptorType::Sequence {
            return Err(SdpError::syntax("UUID list is not a sequence"));
        }

        let payload = &bytes[header.header_len..header.total_len()];
        let mut uuids: SmallVec<[Uuid; 4]> = SmallVec::new();
        for element in ElementIter::new(payload) {
            let (element, value) = element?;
            if element.kind != DescriptorType::Uuid {
                return Err(SdpError::syntax("UUID list holds a non-UUID element"));
            }
            let uuid = uuid_from_slice(value)
                .ok_or_else(|| SdpError::syntax("UUID has an invalid size"))?;
            if uuids.len() == MAX_UUIDS_PER_REQUEST {
                return Err(SdpError::syntax("too many UUIDs in request"));
            }
            uuids.push(uuid);
        }

        Ok((Self::new(uuids)?, header.total_len()))
    }
}

// ----------------------------------------------------------------------------
// Attribute-Id Ranges
// ----------------------------------------------------------------------------

/// Inclusive range of attribute ids; a single id has `start == end`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttributeRange {
    pub start: u16,
    pub end: u16,
}

impl AttributeRange {
    pub const ALL: Self = Self {
        start: 0x0000,
        end: 0xFFFF,
    };

    pub fn new(start: u16, end: u16) -> Self {
        Self { start, end }
    }

    pub fn single(id: u16) -> Self {
        Self { start: id, end: id }
    }

    pub fn is_single(&self) -> bool {
        self.start == self.end
    }
}

impl fmt::Display for AttributeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_single() {
            write!(f, "0x{:04x}", self.start)
        } else {
            write!(f, "0x{:04x}-0x{:04x}", self.start, self.end)
        }
    }
}

/// Non-empty ordered list of attribute-id ranges
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeRangeList(SmallVec<[AttributeRange; 8]>);

impl AttributeRangeList {
    /// Build a range list, rejecting an empty one
    pub fn new(ranges: impl IntoIterator<Item = AttributeRange>) -> Result<Self> {
        let ranges: SmallVec<[AttributeRange; 8]> = ranges.into_iter().collect();
        if ranges.is_empty() {
            return Err(SdpError::syntax("empty attribute id list"));
        }
        Ok(Self(ranges))
    }

    pub fn as_slice(&self) -> &[AttributeRange] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parse a data element sequence of ids and ranges, returning the bytes consumed
    pub fn parse(bytes: &[u8]) -> Result<(Self, usize)> {
        let header = ElementHeader::parse(bytes)
            .map_err(|_| SdpError::syntax("attribute id list truncated"))?;
        if header.kind != DescriptorType::Sequence {
            return Err(SdpError::syntax("attribute id list is not a sequence"));
        }

        let payload = &bytes[header.header_len..header.total_len()];
        let mut ranges: SmallVec<[AttributeRange; 8]> = SmallVec::new();
        for element in ElementIter::new(payload) {
            let (element, value) = element?;
            if element.kind != DescriptorType::UnsignedInt {
                return Err(SdpError::syntax("attribute id is not an unsigned integer"));
            }
            let range = match value.len() {
                2 => AttributeRange::single(u16::from_be_bytes([value[0], value[1]])),
                4 => AttributeRange::new(
                    u16::from_be_bytes([value[0], value[1]]),
                    u16::from_be_bytes([value[2], value[3]]),
                ),
                _ => return Err(SdpError::syntax("attribute id has an invalid size")),
            };
            if ranges.len() == MAX_ATTRIBUTE_RANGES {
                return Err(SdpError::syntax("too many attribute id ranges"));
            }
            ranges.push(range);
        }

        Ok((Self::new(ranges)?, header.total_len()))
    }
}

// ----------------------------------------------------------------------------
// Continuation Tail
// ----------------------------------------------------------------------------

/// Decoded continuation tail of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continuation {
    /// Zero-length marker: a new request
    Fresh,
    /// Resume a previous response at this offset
    Resume { offset: u16 },
}

impl Continuation {
    /// Decode the raw tail that follows the fixed request parameters
    ///
    /// The tail must be consumed exactly; missing or extra bytes are a PDU
    /// size error, an unexpected marker length is a continuation error.
    pub fn parse(tail: &[u8]) -> Result<Self> {
        let (&marker, rest) = tail
            .split_first()
            .ok_or_else(|| SdpError::malformed("missing continuation state"))?;

        if marker == 0 {
            if !rest.is_empty() {
                return Err(SdpError::malformed("bytes after continuation state"));
            }
            return Ok(Continuation::Fresh);
        }

        if marker != CONTINUATION_LEN {
            return Err(SdpError::continuation(format!(
                "continuation length {} (expected {})",
                marker, CONTINUATION_LEN
            )));
        }
        let Some(offset) = rest.get(..2) else {
            return Err(SdpError::continuation("continuation offset truncated"));
        };
        if rest.len() != 2 {
            return Err(SdpError::malformed("bytes after continuation state"));
        }
        Ok(Continuation::Resume {
            offset: u16::from_be_bytes([offset[0], offset[1]]),
        })
    }

    pub fn is_resume(&self) -> bool {
        matches!(self, Continuation::Resume { .. })
    }
}

// ----------------------------------------------------------------------------
// Request Kinds
// ----------------------------------------------------------------------------

fn read_u16(bytes: &[u8], at: usize, what: &str) -> Result<u16> {
    bytes
        .get(at..at + 2)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
        .ok_or_else(|| SdpError::syntax(format!("{} truncated", what)))
}

/// Service Search request parameters
#[derive(Debug, Clone)]
pub struct SearchRequest<'a> {
    pub uuids: UuidMatchSet,
    pub max_handles: u16,
    pub tail: &'a [u8],
}

impl<'a> SearchRequest<'a> {
    pub fn parse(params: &'a [u8]) -> Result<Self> {
        let (uuids, used) = UuidMatchSet::parse(params)?;
        let max_handles = read_u16(params, used, "maximum record count")?;
        Ok(Self {
            uuids,
            max_handles,
            tail: &params[used + 2..],
        })
    }
}

/// Service Attribute request parameters
#[derive(Debug, Clone)]
pub struct AttributeRequest<'a> {
    pub handle: RecordHandle,
    pub max_bytes: u16,
    pub ranges: AttributeRangeList,
    pub tail: &'a [u8],
}

impl<'a> AttributeRequest<'a> {
    pub fn parse(params: &'a [u8]) -> Result<Self> {
        let handle = params
            .get(..4)
            .map(|b| RecordHandle::new(u32::from_be_bytes([b[0], b[1], b[2], b[3]])))
            .ok_or_else(|| SdpError::syntax("record handle truncated"))?;
        let max_bytes = read_u16(params, 4, "maximum attribute byte count")?;
        let (ranges, used) = AttributeRangeList::parse(&params[6..])?;
        Ok(Self {
            handle,
            max_bytes,
            ranges,
            tail: &params[6 + used..],
        })
    }
}

/// Service Search Attribute request parameters
#[derive(Debug, Clone)]
pub struct SearchAttributeRequest<'a> {
    pub uuids: UuidMatchSet,
    pub max_bytes: u16,
    pub ranges: AttributeRangeList,
    pub tail: &'a [u8],
}

impl<'a> SearchAttributeRequest<'a> {
    pub fn parse(params: &'a [u8]) -> Result<Self> {
        let (uuids, used) = UuidMatchSet::parse(params)?;
        let max_bytes = read_u16(params, used, "maximum attribute byte count")?;
        let (ranges, ranges_used) = AttributeRangeList::parse(&params[used + 2..])?;
        Ok(Self {
            uuids,
            max_bytes,
            ranges,
            tail: &params[used + 2 + ranges_used..],
        })
    }
}

// ----------------------------------------------------------------------------
// Request Encoding
// ----------------------------------------------------------------------------

/// Encoders for request parameter blocks, used by clients and tests
pub mod encode {
    use super::*;
    use crate::protocol::data_element::value_header;

    /// Encode a UUID sequence using the shortest form for each UUID
    pub fn uuid_list(uuids: &[Uuid]) -> Vec<u8> {
        let mut body = Vec::new();
        for uuid in uuids {
            match crate::types::as_uuid16(uuid) {
                Some(short) => {
                    body.push(0x19);
                    body.extend_from_slice(&short.to_be_bytes());
                }
                None => {
                    body.push(0x1C);
                    body.extend_from_slice(uuid.as_bytes());
                }
            }
        }
        let mut out = value_header(DescriptorType::Sequence, body.len()).to_vec();
        out.extend_from_slice(&body);
        out
    }

    /// Encode an attribute-id sequence
    pub fn attribute_list(ranges: &[AttributeRange]) -> Vec<u8> {
        let mut body = Vec::new();
        for range in ranges {
            if range.is_single() {
                body.push(0x09);
                body.extend_from_slice(&range.start.to_be_bytes());
            } else {
                body.push(0x0A);
                body.extend_from_slice(&range.start.to_be_bytes());
                body.extend_from_slice(&range.end.to_be_bytes());
            }
        }
        let mut out = value_header(DescriptorType::Sequence, body.len()).to_vec();
        out.extend_from_slice(&body);
        out
    }

    /// Encode a continuation tail
    pub fn continuation(offset: Option<u16>) -> Vec<u8> {
        match offset {
            Some(offset) => {
                let [hi, lo] = offset.to_be_bytes();
                vec![CONTINUATION_LEN, hi, lo]
            }
            None => vec![0],
        }
    }
}
