//! Service records and attributes
//!
//! A record is a handle plus its attributes kept sorted by id. Attribute values
//! hold the payload of the value data element; the descriptor and any explicit
//! length are produced by the codec at serialization time.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::protocol::data_element::{
    sequence_contains_uuid, value_header, DescriptorType, ElementHeader,
};
use crate::protocol::request::UuidMatchSet;
use crate::types::{as_uuid16, uuid_from_slice, RecordHandle};

// ----------------------------------------------------------------------------
// Well-Known Identifiers
// ----------------------------------------------------------------------------

/// Attribute ids used by the server and the interop policy
pub mod attribute_ids {
    pub const SERVICE_RECORD_HANDLE: u16 = 0x0000;
    pub const SERVICE_CLASS_ID_LIST: u16 = 0x0001;
    pub const PROTOCOL_DESCRIPTOR_LIST: u16 = 0x0004;
    pub const BROWSE_GROUP_LIST: u16 = 0x0005;
    pub const PROFILE_DESCRIPTOR_LIST: u16 = 0x0009;
    pub const SERVICE_NAME: u16 = 0x0100;
    pub const GOEP_L2CAP_PSM: u16 = 0x0200;
    pub const SUPPORTED_FEATURES: u16 = 0x0311;
    pub const SUPPORTED_REPOSITORIES: u16 = 0x0314;
    pub const PBAP_SUPPORTED_FEATURES: u16 = 0x0317;
}

/// 16-bit service class and protocol UUIDs
pub mod service_classes {
    pub const L2CAP: u16 = 0x0100;
    pub const RFCOMM: u16 = 0x0003;
    pub const OBEX: u16 = 0x0008;
    pub const PUBLIC_BROWSE_GROUP: u16 = 0x1002;
    pub const SERIAL_PORT: u16 = 0x1101;
    pub const AUDIO_SINK: u16 = 0x110B;
    pub const AV_REMOTE_CONTROL_TARGET: u16 = 0x110C;
    pub const AV_REMOTE_CONTROL: u16 = 0x110E;
    pub const HANDSFREE: u16 = 0x111E;
    pub const HANDSFREE_AUDIO_GATEWAY: u16 = 0x111F;
    pub const PBAP_PSE: u16 = 0x112F;
    pub const PHONE_ACCESS: u16 = 0x1130;
}

// ----------------------------------------------------------------------------
// Attribute
// ----------------------------------------------------------------------------

/// A typed, identified value inside a record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub id: u16,
    pub kind: DescriptorType,
    /// Payload of the value data element
    pub value: Vec<u8>,
}

impl Attribute {
    pub fn new(id: u16, kind: DescriptorType, value: Vec<u8>) -> Self {
        Self { id, kind, value }
    }

    pub fn uint8(id: u16, value: u8) -> Self {
        Self::new(id, DescriptorType::UnsignedInt, vec![value])
    }

    pub fn uint16(id: u16, value: u16) -> Self {
        Self::new(id, DescriptorType::UnsignedInt, value.to_be_bytes().to_vec())
    }

    pub fn uint32(id: u16, value: u32) -> Self {
        Self::new(id, DescriptorType::UnsignedInt, value.to_be_bytes().to_vec())
    }

    pub fn text(id: u16, value: &str) -> Self {
        Self::new(id, DescriptorType::Text, value.as_bytes().to_vec())
    }

    pub fn uuid(id: u16, value: &Uuid) -> Self {
        Self::new(id, DescriptorType::Uuid, uuid_bytes(value))
    }

    /// A sequence attribute whose payload is already-encoded elements
    pub fn sequence(id: u16, payload: Vec<u8>) -> Self {
        Self::new(id, DescriptorType::Sequence, payload)
    }

    /// Whether this attribute carries `uuid`, directly or nested in a sequence
    pub fn contains_uuid(&self, uuid: &Uuid) -> bool {
        match self.kind {
            DescriptorType::Uuid => uuid_from_slice(&self.value).as_ref() == Some(uuid),
            DescriptorType::Sequence | DescriptorType::Alternative => {
                sequence_contains_uuid(&self.value, uuid, 0)
            }
            _ => false,
        }
    }

    /// First UUID inside a sequence value, as the service class list carries it
    pub fn first_uuid(&self) -> Option<Uuid> {
        if self.kind != DescriptorType::Sequence {
            return None;
        }
        let header = ElementHeader::parse(&self.value).ok()?;
        if header.kind != DescriptorType::Uuid {
            return None;
        }
        uuid_from_slice(&self.value[header.header_len..header.total_len()])
    }
}

/// Shortest wire form of a UUID value
fn uuid_bytes(uuid: &Uuid) -> Vec<u8> {
    match as_uuid16(uuid) {
        Some(short) => short.to_be_bytes().to_vec(),
        None => uuid.as_bytes().to_vec(),
    }
}

// ----------------------------------------------------------------------------
// Element Builders
// ----------------------------------------------------------------------------

/// Helpers producing encoded data elements for sequence payloads
pub mod elements {
    use super::*;

    pub fn uuid16(value: u16) -> Vec<u8> {
        let mut out = vec![DescriptorType::Uuid.descriptor(1)];
        out.extend_from_slice(&value.to_be_bytes());
        out
    }

    pub fn uint8(value: u8) -> Vec<u8> {
        vec![DescriptorType::UnsignedInt.descriptor(0), value]
    }

    pub fn uint16(value: u16) -> Vec<u8> {
        let mut out = vec![DescriptorType::UnsignedInt.descriptor(1)];
        out.extend_from_slice(&value.to_be_bytes());
        out
    }

    /// Wrap already-encoded elements in a sequence
    pub fn sequence(parts: &[Vec<u8>]) -> Vec<u8> {
        let body: Vec<u8> = parts.concat();
        let mut out = value_header(DescriptorType::Sequence, body.len()).to_vec();
        out.extend_from_slice(&body);
        out
    }
}

// ----------------------------------------------------------------------------
// Service Record
// ----------------------------------------------------------------------------

/// A discoverable service description
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRecord {
    handle: RecordHandle,
    attributes: Vec<Attribute>,
}

impl ServiceRecord {
    /// Create a record carrying only its handle attribute
    pub fn new(handle: RecordHandle) -> Self {
        Self {
            handle,
            attributes: vec![Attribute::uint32(
                attribute_ids::SERVICE_RECORD_HANDLE,
                handle.value(),
            )],
        }
    }

    pub fn handle(&self) -> RecordHandle {
        self.handle
    }

    /// Attributes in ascending id order
    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn attribute(&self, id: u16) -> Option<&Attribute> {
        self.attributes
            .binary_search_by_key(&id, |a| a.id)
            .ok()
            .map(|index| &self.attributes[index])
    }

    /// Lowest-id attribute with `start <= id <= end`
    pub fn attribute_in_range(&self, start: u16, end: u16) -> Option<&Attribute> {
        if start > end {
            return None;
        }
        let index = self.attributes.partition_point(|a| a.id < start);
        self.attributes.get(index).filter(|a| a.id <= end)
    }

    /// Insert an attribute, replacing any existing one with the same id
    pub fn set_attribute(&mut self, attribute: Attribute) {
        match self
            .attributes
            .binary_search_by_key(&attribute.id, |a| a.id)
        {
            Ok(index) => self.attributes[index] = attribute,
            Err(index) => self.attributes.insert(index, attribute),
        }
    }

    pub fn with_attribute(mut self, attribute: Attribute) -> Self {
        self.set_attribute(attribute);
        self
    }

    pub fn remove_attribute(&mut self, id: u16) -> Option<Attribute> {
        self.attributes
            .binary_search_by_key(&id, |a| a.id)
            .ok()
            .map(|index| self.attributes.remove(index))
    }

    /// Whether the record advertises `uuid` in any attribute
    pub fn contains_uuid(&self, uuid: &Uuid) -> bool {
        self.attributes.iter().any(|a| a.contains_uuid(uuid))
    }

    /// Whether the record advertises at least one UUID of the set
    pub fn matches(&self, uuids: &UuidMatchSet) -> bool {
        uuids.iter().any(|uuid| self.contains_uuid(uuid))
    }

    /// Primary service class, the first UUID of the service class id list
    pub fn service_class(&self) -> Option<Uuid> {
        self.attribute(attribute_ids::SERVICE_CLASS_ID_LIST)?
            .first_uuid()
    }

    // Common attribute builders

    pub fn with_service_classes(self, classes: &[u16]) -> Self {
        let parts: Vec<Vec<u8>> = classes.iter().map(|c| elements::uuid16(*c)).collect();
        self.with_attribute(Attribute::sequence(
            attribute_ids::SERVICE_CLASS_ID_LIST,
            parts.concat(),
        ))
    }

    /// L2CAP + RFCOMM protocol descriptor list on the given channel
    pub fn with_rfcomm_channel(self, channel: u8) -> Self {
        let l2cap = elements::sequence(&[elements::uuid16(service_classes::L2CAP)]);
        let rfcomm = elements::sequence(&[
            elements::uuid16(service_classes::RFCOMM),
            elements::uint8(channel),
        ]);
        self.with_attribute(Attribute::sequence(
            attribute_ids::PROTOCOL_DESCRIPTOR_LIST,
            [l2cap, rfcomm].concat(),
        ))
    }

    pub fn with_public_browse_group(self) -> Self {
        self.with_attribute(Attribute::sequence(
            attribute_ids::BROWSE_GROUP_LIST,
            elements::uuid16(service_classes::PUBLIC_BROWSE_GROUP),
        ))
    }

    pub fn with_profile_descriptor(self, profile: u16, version: u16) -> Self {
        let descriptor =
            elements::sequence(&[elements::uuid16(profile), elements::uint16(version)]);
        self.with_attribute(Attribute::sequence(
            attribute_ids::PROFILE_DESCRIPTOR_LIST,
            descriptor,
        ))
    }

    pub fn with_service_name(self, name: &str) -> Self {
        self.with_attribute(Attribute::text(attribute_ids::SERVICE_NAME, name))
    }

    pub fn with_supported_features(self, features: u16) -> Self {
        self.with_attribute(Attribute::uint16(
            attribute_ids::SUPPORTED_FEATURES,
            features,
        ))
    }
}
