//! Data element descriptors
//!
//! Every value on the wire is a data element: a descriptor byte holding the
//! type in the upper five bits and a size index in the lower three, an optional
//! explicit length, then the payload.

use smallvec::SmallVec;
use uuid::Uuid;

use crate::errors::{Result, SdpError};
use crate::types::uuid_from_slice;

// ----------------------------------------------------------------------------
// Constants
// ----------------------------------------------------------------------------

/// Size index values stored in the low three bits of a descriptor
pub const SIZE_ONE_BYTE: u8 = 0;
pub const SIZE_TWO_BYTES: u8 = 1;
pub const SIZE_FOUR_BYTES: u8 = 2;
pub const SIZE_EIGHT_BYTES: u8 = 3;
pub const SIZE_SIXTEEN_BYTES: u8 = 4;
pub const SIZE_IN_NEXT_BYTE: u8 = 5;
pub const SIZE_IN_NEXT_WORD: u8 = 6;
pub const SIZE_IN_NEXT_LONG: u8 = 7;

/// Nesting limit when searching sequences for a UUID
pub const MAX_NESTING_DEPTH: usize = 8;

// ----------------------------------------------------------------------------
// Descriptor Type
// ----------------------------------------------------------------------------

/// Data element type, the upper five bits of a descriptor byte
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DescriptorType {
    Nil = 0,
    UnsignedInt = 1,
    SignedInt = 2,
    Uuid = 3,
    Text = 4,
    Bool = 5,
    Sequence = 6,
    Alternative = 7,
    Url = 8,
}

impl DescriptorType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(DescriptorType::Nil),
            1 => Some(DescriptorType::UnsignedInt),
            2 => Some(DescriptorType::SignedInt),
            3 => Some(DescriptorType::Uuid),
            4 => Some(DescriptorType::Text),
            5 => Some(DescriptorType::Bool),
            6 => Some(DescriptorType::Sequence),
            7 => Some(DescriptorType::Alternative),
            8 => Some(DescriptorType::Url),
            _ => None,
        }
    }

    /// Whether values of this type always carry an explicit length field
    pub fn is_variable_length(self) -> bool {
        matches!(
            self,
            DescriptorType::Text
                | DescriptorType::Sequence
                | DescriptorType::Alternative
                | DescriptorType::Url
        )
    }

    /// Build a descriptor byte with the given size index
    pub fn descriptor(self, size_index: u8) -> u8 {
        ((self as u8) << 3) | (size_index & 0x07)
    }
}

// ----------------------------------------------------------------------------
// Element Header
// ----------------------------------------------------------------------------

/// Parsed data element header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementHeader {
    pub kind: DescriptorType,
    /// Payload length in bytes
    pub len: usize,
    /// Bytes taken by the descriptor and any explicit length
    pub header_len: usize,
}

impl ElementHeader {
    /// Total bytes taken by this element
    pub fn total_len(&self) -> usize {
        self.header_len + self.len
    }

    /// Parse the header at the start of `bytes`, checking the payload fits
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let descriptor = *bytes
            .first()
            .ok_or_else(|| SdpError::syntax("data element truncated"))?;
        let kind = DescriptorType::from_u8(descriptor >> 3).ok_or_else(|| {
            SdpError::syntax(format!("unknown data element type {}", descriptor >> 3))
        })?;
        let size_index = descriptor & 0x07;

        let (len, header_len) = match size_index {
            SIZE_ONE_BYTE if kind == DescriptorType::Nil => (0, 1),
            SIZE_ONE_BYTE => (1, 1),
            SIZE_TWO_BYTES => (2, 1),
            SIZE_FOUR_BYTES => (4, 1),
            SIZE_EIGHT_BYTES => (8, 1),
            SIZE_SIXTEEN_BYTES => (16, 1),
            SIZE_IN_NEXT_BYTE => {
                let len = *bytes
                    .get(1)
                    .ok_or_else(|| SdpError::syntax("data element length truncated"))?;
                (len as usize, 2)
            }
            SIZE_IN_NEXT_WORD => {
                let raw = bytes
                    .get(1..3)
                    .ok_or_else(|| SdpError::syntax("data element length truncated"))?;
                (u16::from_be_bytes([raw[0], raw[1]]) as usize, 3)
            }
            _ => {
                let raw = bytes
                    .get(1..5)
                    .ok_or_else(|| SdpError::syntax("data element length truncated"))?;
                (
                    u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]) as usize,
                    5,
                )
            }
        };

        let header = Self {
            kind,
            len,
            header_len,
        };
        if bytes.len() < header.total_len() {
            return Err(SdpError::syntax("data element payload truncated"));
        }
        Ok(header)
    }
}

// ----------------------------------------------------------------------------
// Header Encoding
// ----------------------------------------------------------------------------

/// Encode the header for a value of `kind` with `len` payload bytes
///
/// Fixed-size types use the implicit size index when `len` is 1, 2, 4, 8 or
/// 16. Everything else takes the smallest explicit length form.
pub fn value_header(kind: DescriptorType, len: usize) -> SmallVec<[u8; 5]> {
    let mut out = SmallVec::new();
    if kind == DescriptorType::Nil && len == 0 {
        out.push(kind.descriptor(SIZE_ONE_BYTE));
        return out;
    }
    if !kind.is_variable_length() && kind != DescriptorType::Nil {
        let size_index = match len {
            1 => Some(SIZE_ONE_BYTE),
            2 => Some(SIZE_TWO_BYTES),
            4 => Some(SIZE_FOUR_BYTES),
            8 => Some(SIZE_EIGHT_BYTES),
            16 => Some(SIZE_SIXTEEN_BYTES),
            _ => None,
        };
        if let Some(size_index) = size_index {
            out.push(kind.descriptor(size_index));
            return out;
        }
    }

    if len > u16::MAX as usize {
        out.push(kind.descriptor(SIZE_IN_NEXT_LONG));
        out.extend_from_slice(&(len as u32).to_be_bytes());
    } else if len > u8::MAX as usize {
        out.push(kind.descriptor(SIZE_IN_NEXT_WORD));
        out.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        out.push(kind.descriptor(SIZE_IN_NEXT_BYTE));
        out.push(len as u8);
    }
    out
}

/// Length of the header [`value_header`] would produce
pub fn value_header_len(kind: DescriptorType, len: usize) -> usize {
    if (kind == DescriptorType::Nil && len == 0)
        || (!kind.is_variable_length()
            && kind != DescriptorType::Nil
            && matches!(len, 1 | 2 | 4 | 8 | 16))
    {
        1
    } else if len > u16::MAX as usize {
        5
    } else if len > u8::MAX as usize {
        3
    } else {
        2
    }
}

/// Three-byte sequence header with a 16-bit length
pub fn sequence_header_word(len: u16) -> [u8; 3] {
    let [hi, lo] = len.to_be_bytes();
    [DescriptorType::Sequence.descriptor(SIZE_IN_NEXT_WORD), hi, lo]
}

/// Two-byte sequence header with an 8-bit length
pub fn sequence_header_byte(len: u8) -> [u8; 2] {
    [DescriptorType::Sequence.descriptor(SIZE_IN_NEXT_BYTE), len]
}

// ----------------------------------------------------------------------------
// Sequence Inspection
// ----------------------------------------------------------------------------

/// Iterate over the elements of a sequence payload
pub struct ElementIter<'a> {
    bytes: &'a [u8],
}

impl<'a> ElementIter<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }
}

impl<'a> Iterator for ElementIter<'a> {
    type Item = Result<(ElementHeader, &'a [u8])>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.bytes.is_empty() {
            return None;
        }
        match ElementHeader::parse(self.bytes) {
            Ok(header) => {
                let payload = &self.bytes[header.header_len..header.total_len()];
                self.bytes = &self.bytes[header.total_len()..];
                Some(Ok((header, payload)))
            }
            Err(e) => {
                self.bytes = &[];
                Some(Err(e))
            }
        }
    }
}

/// Whether `uuid` appears anywhere inside a sequence payload
///
/// Malformed elements end the search without a match.
pub fn sequence_contains_uuid(payload: &[u8], uuid: &Uuid, depth: usize) -> bool {
    if depth > MAX_NESTING_DEPTH {
        return false;
    }
    for element in ElementIter::new(payload) {
        let Ok((header, value)) = element else {
            return false;
        };
        match header.kind {
            DescriptorType::Uuid => {
                if uuid_from_slice(value).as_ref() == Some(uuid) {
                    return true;
                }
            }
            DescriptorType::Sequence | DescriptorType::Alternative => {
                if sequence_contains_uuid(value, uuid, depth + 1) {
                    return true;
                }
            }
            _ => {}
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::uuid16;

    #[test]
    fn test_parse_fixed_and_variable_headers() {
        let header = ElementHeader::parse(&[0x09, 0x01, 0x00]).unwrap();
        assert_eq!(header.kind, DescriptorType::UnsignedInt);
        assert_eq!((header.len, header.header_len), (2, 1));

        let header = ElementHeader::parse(&[0x35, 0x03, 0x19, 0x11, 0x01]).unwrap();
        assert_eq!(header.kind, DescriptorType::Sequence);
        assert_eq!((header.len, header.header_len), (3, 2));

        let header = ElementHeader::parse(&[0x00]).unwrap();
        assert_eq!(header.kind, DescriptorType::Nil);
        assert_eq!(header.total_len(), 1);
    }

    #[test]
    fn test_parse_rejects_truncation() {
        assert!(ElementHeader::parse(&[]).is_err());
        assert!(ElementHeader::parse(&[0x35]).is_err());
        assert!(ElementHeader::parse(&[0x35, 0x04, 0x19]).is_err());
        assert!(ElementHeader::parse(&[0x0A, 0x00]).is_err());
        assert!(ElementHeader::parse(&[0xF8]).is_err());
    }

    #[test]
    fn test_value_header_forms() {
        assert_eq!(value_header(DescriptorType::UnsignedInt, 2).as_slice(), &[0x09]);
        assert_eq!(value_header(DescriptorType::Uuid, 16).as_slice(), &[0x1C]);
        assert_eq!(
            value_header(DescriptorType::UnsignedInt, 3).as_slice(),
            &[0x0D, 0x03]
        );
        assert_eq!(
            value_header(DescriptorType::Text, 5).as_slice(),
            &[0x25, 0x05]
        );
        assert_eq!(
            value_header(DescriptorType::Sequence, 300).as_slice(),
            &[0x36, 0x01, 0x2C]
        );
        for (kind, len) in [
            (DescriptorType::Text, 5),
            (DescriptorType::Sequence, 300),
            (DescriptorType::Url, 70_000),
            (DescriptorType::Bool, 1),
            (DescriptorType::SignedInt, 3),
            (DescriptorType::UnsignedInt, 300),
            (DescriptorType::Uuid, 70_000),
            (DescriptorType::Nil, 0),
        ] {
            assert_eq!(value_header(kind, len).len(), value_header_len(kind, len));
        }
    }

    #[test]
    fn test_odd_sized_fixed_values_keep_their_length() {
        let header = value_header(DescriptorType::UnsignedInt, 300);
        assert_eq!(header.as_slice(), &[0x0E, 0x01, 0x2C]);

        let mut element = header.to_vec();
        element.extend(std::iter::repeat(0xAB).take(300));
        let parsed = ElementHeader::parse(&element).unwrap();
        assert_eq!(parsed.kind, DescriptorType::UnsignedInt);
        assert_eq!(parsed.len, 300);
        assert_eq!(parsed.total_len(), element.len());
    }

    #[test]
    fn test_nested_uuid_search() {
        // ( ( L2CAP ), ( RFCOMM, 3 ) )
        let payload = [
            0x35, 0x03, 0x19, 0x01, 0x00, 0x35, 0x05, 0x19, 0x00, 0x03, 0x08, 0x03,
        ];
        assert!(sequence_contains_uuid(&payload, &uuid16(0x0100), 0));
        assert!(sequence_contains_uuid(&payload, &uuid16(0x0003), 0));
        assert!(!sequence_contains_uuid(&payload, &uuid16(0x0008), 0));
        assert!(!sequence_contains_uuid(&[0x35, 0x09], &uuid16(0x0100), 0));
    }
}
