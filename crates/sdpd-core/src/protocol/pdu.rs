//! PDU envelope parsing and response framing
//!
//! ## Envelope Format
//!
//! All integers are big-endian:
//! - PduId: 1 byte
//! - TransactionId: 2 bytes
//! - ParameterLength: 2 bytes
//! - Parameters: ParameterLength bytes

use crate::errors::{ErrorCode, Result, SdpError};
use crate::types::TransactionId;

// ----------------------------------------------------------------------------
// Constants
// ----------------------------------------------------------------------------

/// Size of the PDU header (id, transaction id, parameter length)
pub const PDU_HEADER_LEN: usize = 5;

/// Length byte value announcing a continuation offset
pub const CONTINUATION_LEN: u8 = 2;

// ----------------------------------------------------------------------------
// PDU Identifiers
// ----------------------------------------------------------------------------

/// PDU kinds understood by the server
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum PduId {
    ErrorResponse = 0x01,
    ServiceSearchRequest = 0x02,
    ServiceSearchResponse = 0x03,
    ServiceAttributeRequest = 0x04,
    ServiceAttributeResponse = 0x05,
    ServiceSearchAttributeRequest = 0x06,
    ServiceSearchAttributeResponse = 0x07,
}

impl PduId {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(PduId::ErrorResponse),
            0x02 => Some(PduId::ServiceSearchRequest),
            0x03 => Some(PduId::ServiceSearchResponse),
            0x04 => Some(PduId::ServiceAttributeRequest),
            0x05 => Some(PduId::ServiceAttributeResponse),
            0x06 => Some(PduId::ServiceSearchAttributeRequest),
            0x07 => Some(PduId::ServiceSearchAttributeResponse),
            _ => None,
        }
    }
}

// ----------------------------------------------------------------------------
// Request Envelope
// ----------------------------------------------------------------------------

/// A request whose envelope has been validated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestEnvelope<'a> {
    /// Raw PDU id; unknown ids are rejected by the dispatcher, not here
    pub pdu_id: u8,
    pub transaction_id: TransactionId,
    pub params: &'a [u8],
}

impl<'a> RequestEnvelope<'a> {
    /// Parse the envelope, requiring the parameter length to match exactly
    ///
    /// A buffer too short to carry a transaction id yields `None` for it, so
    /// the caller can still answer with transaction id zero.
    pub fn parse(bytes: &'a [u8]) -> core::result::Result<Self, (Option<TransactionId>, SdpError)> {
        if bytes.len() < 3 {
            return Err((None, SdpError::malformed("request shorter than PDU header")));
        }
        let pdu_id = bytes[0];
        let transaction_id = TransactionId(u16::from_be_bytes([bytes[1], bytes[2]]));

        if bytes.len() < PDU_HEADER_LEN {
            return Err((
                Some(transaction_id),
                SdpError::malformed("request shorter than PDU header"),
            ));
        }
        let param_len = u16::from_be_bytes([bytes[3], bytes[4]]) as usize;
        let params = &bytes[PDU_HEADER_LEN..];
        if params.len() != param_len {
            return Err((
                Some(transaction_id),
                SdpError::malformed(format!(
                    "parameter length {} but {} bytes follow",
                    param_len,
                    params.len()
                )),
            ));
        }

        Ok(Self {
            pdu_id,
            transaction_id,
            params,
        })
    }
}

// ----------------------------------------------------------------------------
// Response Writer
// ----------------------------------------------------------------------------

/// Builds one response PDU, backpatching the parameter length on finish
pub struct ResponseWriter {
    bytes: Vec<u8>,
}

impl ResponseWriter {
    /// Start a response of the given kind
    pub fn new(pdu_id: PduId, transaction_id: TransactionId, capacity: usize) -> Self {
        let mut bytes = Vec::with_capacity(PDU_HEADER_LEN + capacity);
        bytes.push(pdu_id as u8);
        bytes.extend_from_slice(&transaction_id.0.to_be_bytes());
        bytes.extend_from_slice(&[0, 0]);
        Self { bytes }
    }

    pub fn put_u8(&mut self, value: u8) -> &mut Self {
        self.bytes.push(value);
        self
    }

    pub fn put_u16(&mut self, value: u16) -> &mut Self {
        self.bytes.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn put_u32(&mut self, value: u32) -> &mut Self {
        self.bytes.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn put_slice(&mut self, value: &[u8]) -> &mut Self {
        self.bytes.extend_from_slice(value);
        self
    }

    /// Append the continuation tail: an offset, or the zero terminator
    pub fn put_continuation(&mut self, offset: Option<u16>) -> &mut Self {
        match offset {
            Some(offset) => {
                self.put_u8(CONTINUATION_LEN);
                self.put_u16(offset)
            }
            None => self.put_u8(0),
        }
    }

    /// Patch in the parameter length and return the frame
    pub fn finish(mut self) -> Vec<u8> {
        let param_len = (self.bytes.len() - PDU_HEADER_LEN) as u16;
        self.bytes[3..5].copy_from_slice(&param_len.to_be_bytes());
        self.bytes
    }
}

/// Build an error response frame with an optional text payload
pub fn error_response(
    transaction_id: TransactionId,
    code: ErrorCode,
    text: Option<&str>,
) -> Vec<u8> {
    let text = text.map(str::as_bytes).unwrap_or_default();
    let mut writer = ResponseWriter::new(PduId::ErrorResponse, transaction_id, 2 + text.len());
    writer.put_u16(code.as_u16()).put_slice(text);
    writer.finish()
}

/// Parse the parameters of a response header, for clients and tests
pub fn parse_response_header(bytes: &[u8]) -> Result<(PduId, TransactionId, &[u8])> {
    let envelope = RequestEnvelope::parse(bytes).map_err(|(_, e)| e)?;
    let pdu_id = PduId::from_u8(envelope.pdu_id).ok_or(SdpError::UnsupportedRequestKind {
        pdu_id: envelope.pdu_id,
    })?;
    Ok((pdu_id, envelope.transaction_id, envelope.params))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_requires_exact_length() {
        let ok = [0x02, 0x00, 0x07, 0x00, 0x02, 0xAA, 0xBB];
        let envelope = RequestEnvelope::parse(&ok).unwrap();
        assert_eq!(envelope.pdu_id, 0x02);
        assert_eq!(envelope.transaction_id, TransactionId(7));
        assert_eq!(envelope.params, &[0xAA, 0xBB]);

        let long = [0x02, 0x00, 0x07, 0x00, 0x01, 0xAA, 0xBB];
        let (tid, err) = RequestEnvelope::parse(&long).unwrap_err();
        assert_eq!(tid, Some(TransactionId(7)));
        assert_eq!(err.code(), ErrorCode::InvalidPduSize);

        let short = [0x02, 0x00, 0x07, 0x00, 0x03, 0xAA, 0xBB];
        assert!(RequestEnvelope::parse(&short).is_err());

        let (tid, _) = RequestEnvelope::parse(&[0x02]).unwrap_err();
        assert_eq!(tid, None);
    }

    #[test]
    fn test_error_response_layout() {
        let frame = error_response(TransactionId(0x1234), ErrorCode::InvalidPduSize, None);
        assert_eq!(frame, vec![0x01, 0x12, 0x34, 0x00, 0x02, 0x00, 0x04]);

        let frame = error_response(TransactionId(1), ErrorCode::InvalidRecordHandle, Some("no"));
        assert_eq!(frame, vec![0x01, 0x00, 0x01, 0x00, 0x04, 0x00, 0x02, b'n', b'o']);
    }

    #[test]
    fn test_writer_backpatches_length() {
        let mut writer = ResponseWriter::new(PduId::ServiceSearchResponse, TransactionId(3), 8);
        writer.put_u16(1).put_u16(1).put_u32(0x0001_0000).put_continuation(Some(9));
        let frame = writer.finish();
        assert_eq!(&frame[..5], &[0x03, 0x00, 0x03, 0x00, 0x0B]);
        assert_eq!(&frame[frame.len() - 3..], &[0x02, 0x00, 0x09]);
    }
}
