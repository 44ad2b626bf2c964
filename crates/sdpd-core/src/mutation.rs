//! Response mutation hook
//!
//! Peer-specific rewrites of what a response carries. Both operations are pure:
//! they return a private copy for the response being built and never touch the
//! record store's canonical data.

use std::borrow::Cow;

use tracing::warn;

use crate::record::{Attribute, ServiceRecord};
use crate::types::PeerAddress;

// ----------------------------------------------------------------------------
// Peer Context
// ----------------------------------------------------------------------------

/// Identity of the peer a response is built for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerContext {
    pub address: PeerAddress,
}

impl PeerContext {
    pub fn new(address: PeerAddress) -> Self {
        Self { address }
    }
}

// ----------------------------------------------------------------------------
// Mutator Trait
// ----------------------------------------------------------------------------

/// Policy deciding how records and attributes are presented to a peer
///
/// Implementations must be idempotent: the same inputs always give the same
/// output, since a response spanning several frames invokes them once per
/// frame.
pub trait ResponseMutator: Send + Sync {
    /// Replacement record to serialize for `peer`, or `None` to use `record`
    fn rewrite_record(&self, record: &ServiceRecord, peer: &PeerContext) -> Option<ServiceRecord> {
        let _ = (record, peer);
        None
    }

    /// Replacement value bytes for one attribute, or `None` to keep them
    ///
    /// The replacement must have the same length as the original value.
    fn transform_attribute(
        &self,
        record: &ServiceRecord,
        attribute: &Attribute,
        peer: &PeerContext,
    ) -> Option<Vec<u8>> {
        let _ = (record, attribute, peer);
        None
    }
}

/// Mutator that presents every record unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMutation;

impl ResponseMutator for NoMutation {}

// ----------------------------------------------------------------------------
// Views
// ----------------------------------------------------------------------------

/// Record as it is serialized for `peer`
pub fn record_view<'a>(
    mutator: &dyn ResponseMutator,
    record: &'a ServiceRecord,
    peer: &PeerContext,
) -> Cow<'a, ServiceRecord> {
    match mutator.rewrite_record(record, peer) {
        Some(rewritten) => Cow::Owned(rewritten),
        None => Cow::Borrowed(record),
    }
}

/// Attribute as it is serialized for `peer`
///
/// A transformed value whose length differs from the canonical one would
/// invalidate the lengths advertised at the first frame, so it is dropped.
pub fn attribute_view<'a>(
    mutator: &dyn ResponseMutator,
    record: &ServiceRecord,
    attribute: &'a Attribute,
    peer: &PeerContext,
) -> Cow<'a, Attribute> {
    match mutator.transform_attribute(record, attribute, peer) {
        Some(value) if value.len() == attribute.value.len() => Cow::Owned(Attribute {
            value,
            ..attribute.clone()
        }),
        Some(value) => {
            warn!(
                "Ignoring transform of attribute 0x{:04x} in record {}: length {} != {}",
                attribute.id,
                record.handle(),
                value.len(),
                attribute.value.len()
            );
            Cow::Borrowed(attribute)
        }
        None => Cow::Borrowed(attribute),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RecordHandle;

    struct Uppercase;

    impl ResponseMutator for Uppercase {
        fn transform_attribute(
            &self,
            _record: &ServiceRecord,
            attribute: &Attribute,
            _peer: &PeerContext,
        ) -> Option<Vec<u8>> {
            match attribute.id {
                0x0100 => Some(attribute.value.to_ascii_uppercase()),
                0x0101 => Some(vec![0]),
                _ => None,
            }
        }
    }

    #[test]
    fn test_views_leave_canonical_record_alone() {
        let record = ServiceRecord::new(RecordHandle::new(7))
            .with_service_name("serial")
            .with_attribute(Attribute::text(0x0101, "desc"));
        let peer = PeerContext::new(PeerAddress::new([0; 6]));

        let name = record.attribute(0x0100).unwrap();
        let view = attribute_view(&Uppercase, &record, name, &peer);
        assert_eq!(view.value, b"SERIAL".to_vec());
        assert_eq!(name.value, b"serial".to_vec());

        let desc = record.attribute(0x0101).unwrap();
        assert!(matches!(attribute_view(&Uppercase, &record, desc, &peer), Cow::Borrowed(_)));

        assert!(matches!(record_view(&NoMutation, &record, &peer), Cow::Borrowed(_)));
    }
}
