//! Request dispatcher
//!
//! Validates the request envelope, routes it to the matching query handler and
//! turns every protocol error into an error response frame. Nothing a peer
//! sends can make the dispatcher fail or close the connection.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use crate::config::{ServerConfig, MIN_MTU};
use crate::continuation::ContinuationState;
use crate::errors::{ConfigError, SdpError};
use crate::handlers::{attribute, search, search_attribute, RequestContext};
use crate::interop::InteropPolicy;
use crate::mutation::{NoMutation, PeerContext, ResponseMutator};
use crate::protocol::pdu::{error_response, PduId, RequestEnvelope, PDU_HEADER_LEN};
use crate::store::RecordStore;
use crate::types::{PeerAddress, TransactionId};

/// Bytes of an error response taken by the error code
const ERROR_CODE_LEN: usize = 2;

// ----------------------------------------------------------------------------
// Connection Context
// ----------------------------------------------------------------------------

/// State one connection carries between requests
#[derive(Debug, Clone)]
pub struct ConnectionContext {
    peer: PeerContext,
    mtu: u16,
    continuation: ContinuationState,
    last_activity: Instant,
    requests: u64,
}

impl ConnectionContext {
    /// Create the context for a new connection
    ///
    /// The negotiated MTU is kept as is: frames must never outgrow what the
    /// transport accepted, even below the protocol minimum.
    pub fn new(peer: PeerAddress, mtu: u16) -> Self {
        if mtu < MIN_MTU {
            warn!(
                "Peer {} negotiated MTU {} below the minimum of {}",
                peer, mtu, MIN_MTU
            );
        }
        Self {
            peer: PeerContext::new(peer),
            mtu,
            continuation: ContinuationState::Idle,
            last_activity: Instant::now(),
            requests: 0,
        }
    }

    pub fn peer(&self) -> &PeerContext {
        &self.peer
    }

    pub fn mtu(&self) -> u16 {
        self.mtu
    }

    pub fn continuation(&self) -> &ContinuationState {
        &self.continuation
    }

    /// When the last accepted request arrived
    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    /// Number of accepted requests
    pub fn requests(&self) -> u64 {
        self.requests
    }

    /// Restart the inactivity timer
    fn touch(&mut self) {
        self.last_activity = Instant::now();
        self.requests += 1;
    }
}

// ----------------------------------------------------------------------------
// Dispatcher
// ----------------------------------------------------------------------------

/// Shared request dispatcher, cheap to clone across connections
#[derive(Clone)]
pub struct Dispatcher {
    store: Arc<dyn RecordStore>,
    mutator: Arc<dyn ResponseMutator>,
    config: ServerConfig,
}

impl Dispatcher {
    /// Create a dispatcher; a non-empty interop config installs the interop policy
    pub fn new(store: Arc<dyn RecordStore>, config: ServerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let mutator: Arc<dyn ResponseMutator> = if config.interop.is_empty() {
            Arc::new(NoMutation)
        } else {
            Arc::new(InteropPolicy::from_config(&config.interop)?)
        };
        Ok(Self {
            store,
            mutator,
            config,
        })
    }

    /// Replace the response mutator
    pub fn with_mutator(mut self, mutator: Arc<dyn ResponseMutator>) -> Self {
        self.mutator = mutator;
        self
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Context for a new connection, using the default MTU when none was negotiated
    pub fn connection(&self, peer: PeerAddress, mtu: Option<u16>) -> ConnectionContext {
        ConnectionContext::new(peer, mtu.unwrap_or(self.config.default_mtu))
    }

    /// Answer one request frame with exactly one response frame
    pub fn handle_request(&self, conn: &mut ConnectionContext, request: &[u8]) -> Vec<u8> {
        let envelope = match RequestEnvelope::parse(request) {
            Ok(envelope) => envelope,
            Err((transaction_id, err)) => {
                let transaction_id = transaction_id.unwrap_or(TransactionId(0));
                return self.error_frame(transaction_id, &err, conn.mtu);
            }
        };
        conn.touch();

        let ctx = RequestContext {
            store: self.store.as_ref(),
            mutator: self.mutator.as_ref(),
            config: &self.config,
            peer: &conn.peer,
            mtu: conn.mtu,
            transaction_id: envelope.transaction_id,
        };
        let state = &mut conn.continuation;
        let result = match PduId::from_u8(envelope.pdu_id) {
            Some(PduId::ServiceSearchRequest) => search::handle(&ctx, envelope.params, state),
            Some(PduId::ServiceAttributeRequest) => attribute::handle(&ctx, envelope.params, state),
            Some(PduId::ServiceSearchAttributeRequest) => {
                search_attribute::handle(&ctx, envelope.params, state)
            }
            _ => Err(SdpError::UnsupportedRequestKind {
                pdu_id: envelope.pdu_id,
            }),
        };

        match result {
            Ok(frame) => {
                debug!(
                    "Answered pdu 0x{:02x} from {} with {} bytes ({})",
                    envelope.pdu_id,
                    conn.peer.address,
                    frame.len(),
                    conn.continuation.state_name()
                );
                frame
            }
            Err(err) => self.error_frame(envelope.transaction_id, &err, conn.mtu),
        }
    }

    /// Error response for `err`, any text cut so the frame fits the MTU
    fn error_frame(&self, transaction_id: TransactionId, err: &SdpError, mtu: u16) -> Vec<u8> {
        warn!("Rejecting request {}: {}", transaction_id, err);
        let text = self.config.error_text.then(|| err.to_string());
        let room = usize::from(mtu).saturating_sub(PDU_HEADER_LEN + ERROR_CODE_LEN);
        let text = text.as_deref().map(|text| truncate_at_char(text, room));
        error_response(transaction_id, err.code(), text)
    }
}

/// Longest prefix of `text` no longer than `max` bytes
fn truncate_at_char(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorCode;
    use crate::protocol::pdu::parse_response_header;
    use crate::store::InMemoryRecordStore;

    fn dispatcher(config: ServerConfig) -> Dispatcher {
        Dispatcher::new(Arc::new(InMemoryRecordStore::new()), config).unwrap()
    }

    fn error_code(frame: &[u8]) -> ErrorCode {
        let (pdu, _, params) = parse_response_header(frame).unwrap();
        assert_eq!(pdu, PduId::ErrorResponse);
        ErrorCode::from_u16(u16::from_be_bytes([params[0], params[1]])).unwrap()
    }

    #[test]
    fn test_unknown_pdu_is_syntax_error() {
        let dispatcher = dispatcher(ServerConfig::default());
        let mut conn = dispatcher.connection(PeerAddress::new([1; 6]), None);
        let frame = dispatcher.handle_request(&mut conn, &[0x42, 0x00, 0x09, 0x00, 0x00]);
        assert_eq!(&frame[1..3], &[0x00, 0x09]);
        assert_eq!(error_code(&frame), ErrorCode::InvalidRequestSyntax);
        assert_eq!(conn.requests(), 1);
    }

    #[test]
    fn test_bad_envelope_does_not_count_as_activity() {
        let dispatcher = dispatcher(ServerConfig::default());
        let mut conn = dispatcher.connection(PeerAddress::new([1; 6]), Some(20));
        assert_eq!(conn.mtu(), 20);
        let frame = dispatcher.handle_request(&mut conn, &[0x02, 0x00, 0x01, 0x00, 0x05, 0x00]);
        assert_eq!(error_code(&frame), ErrorCode::InvalidPduSize);
        assert_eq!(conn.requests(), 0);
    }

    #[test]
    fn test_error_text_is_optional() {
        let dispatcher = dispatcher(ServerConfig::default().with_error_text(true));
        let mut conn = dispatcher.connection(PeerAddress::new([1; 6]), None);
        let frame = dispatcher.handle_request(&mut conn, &[0x42, 0x00, 0x01, 0x00, 0x00]);
        let (_, _, params) = parse_response_header(&frame).unwrap();
        assert!(params.len() > 2);
    }

    #[test]
    fn test_error_text_is_cut_to_the_mtu() {
        let dispatcher = dispatcher(ServerConfig::default().with_error_text(true));
        let mut conn = dispatcher.connection(PeerAddress::new([1; 6]), Some(MIN_MTU));

        // Attribute request for a handle that does not exist
        let mut request = vec![0x04, 0x00, 0x02, 0x00, 0x0C];
        request.extend_from_slice(&[0xFF, 0xFF, 0xFF, 0xFF, 0x00, 0x40]);
        request.extend_from_slice(&[0x35, 0x03, 0x09, 0x00, 0x00, 0x00]);
        let long = SdpError::syntax("x".repeat(200));
        let frame = dispatcher.error_frame(TransactionId(2), &long, conn.mtu());
        assert_eq!(frame.len(), usize::from(MIN_MTU));
        assert_eq!(error_code(&frame), ErrorCode::InvalidRequestSyntax);

        let frame = dispatcher.handle_request(&mut conn, &request);
        assert!(frame.len() <= usize::from(MIN_MTU));
        assert_eq!(error_code(&frame), ErrorCode::InvalidRecordHandle);
    }

    #[test]
    fn test_truncation_keeps_whole_chars() {
        assert_eq!(truncate_at_char("abc", 8), "abc");
        assert_eq!(truncate_at_char("abcdef", 4), "abcd");
        // 'é' is two bytes; cutting inside it backs off to the boundary
        assert_eq!(truncate_at_char("aé", 2), "a");
        assert_eq!(truncate_at_char("é", 0), "");
    }
}
