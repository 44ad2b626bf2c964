//! Record database loading
//!
//! The record database is a TOML file with one `[[record]]` table per
//! service. Common attributes have dedicated keys; anything else goes in
//! `[[record.attribute]]` entries.
//!
//! ```toml
//! [[record]]
//! handle = 0x10001
//! service_classes = [0x1101]
//! rfcomm_channel = 3
//! profile = { uuid = 0x1101, version = 0x0102 }
//! name = "Serial Port"
//!
//! [[record.attribute]]
//! id = 0x0300
//! type = "uint32"
//! value = 1
//! ```

use std::collections::BTreeSet;
use std::path::Path;

use serde::Deserialize;

use sdpd_core::{uuid16, Attribute, InMemoryRecordStore, RecordHandle, ServiceRecord};

use crate::error::{CliError, Result};

/// Handles below this value are reserved for the server's own record
pub const FIRST_SERVICE_HANDLE: u32 = 0x0001_0000;

/// Parsed record database file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecordDatabase {
    #[serde(default, rename = "record")]
    pub records: Vec<RecordEntry>,
}

/// One `[[record]]` table
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecordEntry {
    pub handle: u32,
    #[serde(default)]
    pub service_classes: Vec<u16>,
    pub rfcomm_channel: Option<u8>,
    pub profile: Option<ProfileEntry>,
    pub name: Option<String>,
    pub supported_features: Option<u16>,
    #[serde(default = "default_true")]
    pub public_browse: bool,
    #[serde(default, rename = "attribute")]
    pub attributes: Vec<AttributeEntry>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileEntry {
    pub uuid: u16,
    pub version: u16,
}

/// Free-form attribute
#[derive(Debug, Clone, Deserialize)]
pub struct AttributeEntry {
    pub id: u16,
    #[serde(flatten)]
    pub value: AttributeValue,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AttributeValue {
    Uint8 { value: u8 },
    Uint16 { value: u16 },
    Uint32 { value: u32 },
    Text { value: String },
    Uuid { value: u16 },
    /// Encoded sequence payload as hex, spaces allowed
    Sequence { hex: String },
}

fn default_true() -> bool {
    true
}

// ----------------------------------------------------------------------------
// Conversion
// ----------------------------------------------------------------------------

impl AttributeEntry {
    fn to_attribute(&self) -> Result<Attribute> {
        let id = self.id;
        Ok(match &self.value {
            AttributeValue::Uint8 { value } => Attribute::uint8(id, *value),
            AttributeValue::Uint16 { value } => Attribute::uint16(id, *value),
            AttributeValue::Uint32 { value } => Attribute::uint32(id, *value),
            AttributeValue::Text { value } => Attribute::text(id, value),
            AttributeValue::Uuid { value } => Attribute::uuid(id, &uuid16(*value)),
            AttributeValue::Sequence { hex } => {
                let compact: String = hex.chars().filter(|c| !c.is_whitespace()).collect();
                Attribute::sequence(id, hex::decode(compact)?)
            }
        })
    }
}

impl RecordEntry {
    /// Build the service record this entry describes
    pub fn to_record(&self) -> Result<ServiceRecord> {
        if self.handle < FIRST_SERVICE_HANDLE {
            return Err(CliError::Records(format!(
                "handle 0x{:08x} is reserved",
                self.handle
            )));
        }

        let mut record = ServiceRecord::new(RecordHandle::new(self.handle));
        if !self.service_classes.is_empty() {
            record = record.with_service_classes(&self.service_classes);
        }
        if let Some(channel) = self.rfcomm_channel {
            record = record.with_rfcomm_channel(channel);
        }
        if self.public_browse {
            record = record.with_public_browse_group();
        }
        if let Some(profile) = self.profile {
            record = record.with_profile_descriptor(profile.uuid, profile.version);
        }
        if let Some(name) = &self.name {
            record = record.with_service_name(name);
        }
        if let Some(features) = self.supported_features {
            record = record.with_supported_features(features);
        }
        for entry in &self.attributes {
            if entry.id == 0x0000 {
                return Err(CliError::Records(format!(
                    "record 0x{:08x} sets the handle attribute explicitly",
                    self.handle
                )));
            }
            record.set_attribute(entry.to_attribute()?);
        }
        Ok(record)
    }
}

impl RecordDatabase {
    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Convert every entry, rejecting duplicate handles
    pub fn to_records(&self) -> Result<Vec<ServiceRecord>> {
        let mut seen = BTreeSet::new();
        self.records
            .iter()
            .map(|entry| {
                if !seen.insert(entry.handle) {
                    return Err(CliError::Records(format!(
                        "duplicate handle 0x{:08x}",
                        entry.handle
                    )));
                }
                entry.to_record()
            })
            .collect()
    }

    pub fn into_store(self) -> Result<InMemoryRecordStore> {
        Ok(InMemoryRecordStore::with_records(self.to_records()?))
    }
}
