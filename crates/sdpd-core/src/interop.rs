//! Peer interoperability policy
//!
//! Some peers misbehave when they see the profile versions or feature bits the
//! local services actually advertise. The policy presents those peers with a
//! downgraded view, keyed by device address prefix.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::ConfigError;
use crate::mutation::{PeerContext, ResponseMutator};
use crate::record::{attribute_ids, elements, service_classes, Attribute, ServiceRecord};
use crate::types::{parse_address_bytes, uuid16};

// ----------------------------------------------------------------------------
// Constants
// ----------------------------------------------------------------------------

/// Minimum encoded length of a profile descriptor list value
const PROFILE_DESCRIPTOR_LEN: usize = 8;

/// Byte of the profile descriptor list value holding the 16-bit profile UUID
const PROFILE_UUID_POSITION: usize = 3;

/// Byte of the profile descriptor list value holding the minor version
const PROFILE_VERSION_POSITION: usize = 7;

/// Byte of the AVRCP supported features value holding the browse bit
const AVRCP_FEATURES_POSITION: usize = 1;

const AVRCP_BROWSE_SUPPORT_BITMASK: u8 = 0x40;
const AVRCP_COVER_ART_SUPPORT_BITMASK: u8 = 0x01;

const AVRCP_VERSION_1_3: u16 = 0x0103;
const AVRCP_VERSION_1_4: u16 = 0x0104;
const AVRCP_VERSION_1_6: u16 = 0x0106;
const HFP_VERSION_1_7: u8 = 0x07;

const PBAP_LEGACY_VERSION: u16 = 0x0101;
const PBAP_LEGACY_REPOSITORIES: u8 = 0x03;

// ----------------------------------------------------------------------------
// Configuration
// ----------------------------------------------------------------------------

/// AVRCP target version remembered for a peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerVersion {
    /// Address prefix, e.g. "00:1a:7d"
    pub prefix: String,
    /// Version as 0xMMmm
    pub version: u16,
}

/// Per-peer interoperability lists
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InteropConfig {
    /// Peers that must see AVRCP 1.3 and no browsing support
    pub avrcp_1_3_peers: Vec<String>,
    /// Remembered AVRCP target versions of known peers
    pub avrcp_peer_versions: Vec<PeerVersion>,
    /// Present peers with no remembered version as AVRCP 1.3
    pub avrcp_fallback_unknown_peers: bool,
    /// Peers that must see Hands-Free 1.7
    pub hfp_1_7_peers: Vec<String>,
    /// Peers that must see the PBAP 1.1 record
    pub pbap_1_1_peers: Vec<String>,
}

impl InteropConfig {
    pub fn is_empty(&self) -> bool {
        self.avrcp_1_3_peers.is_empty()
            && self.avrcp_peer_versions.is_empty()
            && !self.avrcp_fallback_unknown_peers
            && self.hfp_1_7_peers.is_empty()
            && self.pbap_1_1_peers.is_empty()
    }
}

// ----------------------------------------------------------------------------
// Policy
// ----------------------------------------------------------------------------

/// Response mutator applying the interoperability lists
#[derive(Debug, Clone, Default)]
pub struct InteropPolicy {
    avrcp_1_3: Vec<Vec<u8>>,
    avrcp_versions: Vec<(Vec<u8>, u16)>,
    avrcp_fallback_unknown: bool,
    hfp_1_7: Vec<Vec<u8>>,
    pbap_1_1: Vec<Vec<u8>>,
}

fn parse_prefixes(values: &[String]) -> Result<Vec<Vec<u8>>, ConfigError> {
    values.iter().map(|v| parse_address_bytes(v)).collect()
}

fn listed(prefixes: &[Vec<u8>], peer: &PeerContext) -> bool {
    prefixes.iter().any(|prefix| peer.address.has_prefix(prefix))
}

impl InteropPolicy {
    pub fn from_config(config: &InteropConfig) -> Result<Self, ConfigError> {
        let avrcp_versions = config
            .avrcp_peer_versions
            .iter()
            .map(|entry| Ok((parse_address_bytes(&entry.prefix)?, entry.version)))
            .collect::<Result<Vec<_>, ConfigError>>()?;
        Ok(Self {
            avrcp_1_3: parse_prefixes(&config.avrcp_1_3_peers)?,
            avrcp_versions,
            avrcp_fallback_unknown: config.avrcp_fallback_unknown_peers,
            hfp_1_7: parse_prefixes(&config.hfp_1_7_peers)?,
            pbap_1_1: parse_prefixes(&config.pbap_1_1_peers)?,
        })
    }

    fn stored_avrcp_version(&self, peer: &PeerContext) -> Option<u16> {
        self.avrcp_versions
            .iter()
            .find(|(prefix, _)| peer.address.has_prefix(prefix))
            .map(|(_, version)| *version)
    }

    /// AVRCP version the peer should see, if it differs from the advertised one
    fn avrcp_version_for(&self, peer: &PeerContext) -> Option<u16> {
        if listed(&self.avrcp_1_3, peer) {
            return Some(AVRCP_VERSION_1_3);
        }
        match self.stored_avrcp_version(peer) {
            Some(version) => Some(version),
            None if self.avrcp_fallback_unknown => Some(AVRCP_VERSION_1_3),
            None => None,
        }
    }

    fn rewrite_profile_descriptor(&self, value: &[u8], peer: &PeerContext) -> Option<Vec<u8>> {
        if value.len() < PROFILE_DESCRIPTOR_LEN {
            return None;
        }
        let profile = u16::from_be_bytes([
            value[PROFILE_UUID_POSITION],
            value[PROFILE_UUID_POSITION + 1],
        ]);
        let minor = match profile {
            service_classes::AV_REMOTE_CONTROL => self.avrcp_version_for(peer)?.to_be_bytes()[1],
            service_classes::HANDSFREE if listed(&self.hfp_1_7, peer) => HFP_VERSION_1_7,
            _ => return None,
        };
        if value[PROFILE_VERSION_POSITION] == minor {
            return None;
        }
        debug!(
            "Presenting profile 0x{:04x} version minor {} to {}",
            profile, minor, peer.address
        );
        let mut value = value.to_vec();
        value[PROFILE_VERSION_POSITION] = minor;
        Some(value)
    }

    fn rewrite_avrcp_features(&self, value: &[u8], peer: &PeerContext) -> Option<Vec<u8>> {
        if value.len() <= AVRCP_FEATURES_POSITION {
            return None;
        }
        let stored = self.stored_avrcp_version(peer);
        let mut rewritten = value.to_vec();
        let below = |floor: u16| stored.map_or(true, |version| version < floor);

        if listed(&self.avrcp_1_3, peer) || below(AVRCP_VERSION_1_4) {
            rewritten[AVRCP_FEATURES_POSITION] &= !AVRCP_BROWSE_SUPPORT_BITMASK;
        }
        if below(AVRCP_VERSION_1_6) {
            rewritten[AVRCP_FEATURES_POSITION - 1] &= !AVRCP_COVER_ART_SUPPORT_BITMASK;
        }
        (rewritten != value).then_some(rewritten)
    }
}

impl ResponseMutator for InteropPolicy {
    fn rewrite_record(&self, record: &ServiceRecord, peer: &PeerContext) -> Option<ServiceRecord> {
        if record.service_class() != Some(uuid16(service_classes::PBAP_PSE))
            || !listed(&self.pbap_1_1, peer)
        {
            return None;
        }
        debug!("Presenting PBAP 1.1 record {} to {}", record.handle(), peer.address);
        let mut legacy = record.clone();
        legacy.remove_attribute(attribute_ids::PBAP_SUPPORTED_FEATURES);
        legacy.remove_attribute(attribute_ids::GOEP_L2CAP_PSM);
        legacy.set_attribute(Attribute::uint8(
            attribute_ids::SUPPORTED_REPOSITORIES,
            PBAP_LEGACY_REPOSITORIES,
        ));
        legacy.set_attribute(Attribute::sequence(
            attribute_ids::PROFILE_DESCRIPTOR_LIST,
            elements::sequence(&[
                elements::uuid16(service_classes::PHONE_ACCESS),
                elements::uint16(PBAP_LEGACY_VERSION),
            ]),
        ));
        Some(legacy)
    }

    fn transform_attribute(
        &self,
        record: &ServiceRecord,
        attribute: &Attribute,
        peer: &PeerContext,
    ) -> Option<Vec<u8>> {
        match attribute.id {
            attribute_ids::PROFILE_DESCRIPTOR_LIST => {
                self.rewrite_profile_descriptor(&attribute.value, peer)
            }
            attribute_ids::SUPPORTED_FEATURES
                if record.service_class()
                    == Some(uuid16(service_classes::AV_REMOTE_CONTROL_TARGET)) =>
            {
                self.rewrite_avrcp_features(&attribute.value, peer)
            }
            _ => None,
        }
    }
}
