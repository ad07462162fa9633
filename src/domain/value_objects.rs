//! Value objects for the access-device domain

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use thiserror::Error;

/// Distinguished technology-profile id meaning "not set".
pub const NONE_TP_ID: i32 = -1;

/// Device identifier, opaque to this application
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceId(String);

impl DeviceId {
    /// Create a device id from its southbound representation
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Port number on an access device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PortNumber(u32);

impl PortNumber {
    /// Create a new port number
    pub fn new(port: u32) -> Self {
        Self(port)
    }

    /// Get the inner value
    pub fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for PortNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A (device, port) pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectPoint {
    pub device: DeviceId,
    pub port: PortNumber,
}

impl ConnectPoint {
    /// Create a new connect point
    pub fn new(device: DeviceId, port: PortNumber) -> Self {
        Self { device, port }
    }
}

impl fmt::Display for ConnectPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.device, self.port)
    }
}

/// A UNI or NNI port together with its name annotation
///
/// The name is the subscriber key used for lookups against the
/// subscriber-information service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccessDevicePort {
    device: DeviceId,
    number: PortNumber,
    name: String,
}

impl AccessDevicePort {
    /// Create a new access-device port
    pub fn new(device: DeviceId, number: PortNumber, name: impl Into<String>) -> Self {
        Self {
            device,
            number,
            name: name.into(),
        }
    }

    /// The owning device
    pub fn device(&self) -> &DeviceId {
        &self.device
    }

    /// The port number
    pub fn number(&self) -> PortNumber {
        self.number
    }

    /// The `portName` annotation
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The (device, port) pair without the name annotation
    pub fn connect_point(&self) -> ConnectPoint {
        ConnectPoint::new(self.device.clone(), self.number)
    }
}

impl fmt::Display for AccessDevicePort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}[{}]", self.device, self.number, self.name)
    }
}

/// VLAN identifier with the distinguished ANY / NONE / NO_VID values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VlanId(u16);

impl VlanId {
    /// Absent VLAN criterion (matches untagged traffic)
    pub const NO_VID: VlanId = VlanId(0);
    /// Wildcard VLAN
    pub const ANY: VlanId = VlanId(4096);
    /// No VLAN configured
    pub const NONE: VlanId = VlanId(u16::MAX);
    /// Reserved VLAN tagging the default EAPOL trap
    pub const EAPOL_DEFAULT: VlanId = VlanId(4091);
    /// Largest assignable VLAN id
    pub const MAX: u16 = 4095;

    /// Create a VLAN id; sentinel values are created via the constants
    pub fn new(id: u16) -> Self {
        Self(id)
    }

    /// Get the inner value
    pub fn value(&self) -> u16 {
        self.0
    }

    /// True for the wildcard value
    pub fn is_any(&self) -> bool {
        *self == Self::ANY
    }

    /// True when no VLAN is configured
    pub fn is_none(&self) -> bool {
        *self == Self::NONE
    }

    /// True for a concrete, matchable VLAN id
    pub fn is_concrete(&self) -> bool {
        self.0 <= Self::MAX && *self != Self::NO_VID
    }
}

impl fmt::Display for VlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::ANY => write!(f, "ANY"),
            Self::NONE => write!(f, "NONE"),
            _ => write!(f, "{}", self.0),
        }
    }
}

/// Meter identifier assigned by the southbound driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MeterId(u32);

impl MeterId {
    /// Wrap a driver-assigned meter id
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the inner value
    pub fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for MeterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Cluster node identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(String);

impl NodeId {
    /// Create a node id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// MAC address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacAddress([u8; 6]);

#[derive(Error, Debug)]
pub enum MacAddressError {
    #[error("Invalid MAC address format")]
    InvalidFormat,
    #[error("Invalid MAC address length")]
    InvalidLength,
}

impl MacAddress {
    /// Build from raw bytes
    pub fn from_bytes(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    /// True for a MAC usable as a downstream destination match:
    /// not all-zero and not a group address
    pub fn is_unicast(&self) -> bool {
        self.0 != [0u8; 6] && self.0[0] & 0x01 == 0
    }
}

impl FromStr for MacAddress {
    type Err = MacAddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let cleaned = s.replace(&[':', '-'][..], "");

        if cleaned.len() != 12 {
            return Err(MacAddressError::InvalidLength);
        }

        let mut bytes = [0u8; 6];
        for (i, chunk) in cleaned.as_bytes().chunks(2).enumerate() {
            let hex_str =
                std::str::from_utf8(chunk).map_err(|_| MacAddressError::InvalidFormat)?;
            bytes[i] = u8::from_str_radix(hex_str, 16).map_err(|_| MacAddressError::InvalidFormat)?;
        }

        Ok(Self(bytes))
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

impl Serialize for MacAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for MacAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Per-service forwarding profile for one subscriber
///
/// A subscriber may carry several of these, one per service. Identity for
/// status tracking is the (ponCTag, ponSTag, technologyProfileId) triple;
/// the remaining fields parameterise flow construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UniTagInformation {
    pub pon_c_tag: VlanId,
    pub pon_s_tag: VlanId,
    pub uni_tag_match: VlanId,
    pub us_pon_c_tag_priority: Option<u8>,
    pub us_pon_s_tag_priority: Option<u8>,
    pub ds_pon_c_tag_priority: Option<u8>,
    pub ds_pon_s_tag_priority: Option<u8>,
    pub technology_profile_id: i32,
    pub upstream_bandwidth_profile: Option<String>,
    pub downstream_bandwidth_profile: Option<String>,
    pub upstream_olt_bandwidth_profile: Option<String>,
    pub downstream_olt_bandwidth_profile: Option<String>,
    pub is_dhcp_required: bool,
    pub is_igmp_required: bool,
    pub enable_mac_learning: bool,
    pub configured_mac_address: Option<MacAddress>,
    pub service_name: String,
}

impl Default for UniTagInformation {
    fn default() -> Self {
        Self {
            pon_c_tag: VlanId::NONE,
            pon_s_tag: VlanId::NONE,
            uni_tag_match: VlanId::NONE,
            us_pon_c_tag_priority: None,
            us_pon_s_tag_priority: None,
            ds_pon_c_tag_priority: None,
            ds_pon_s_tag_priority: None,
            technology_profile_id: NONE_TP_ID,
            upstream_bandwidth_profile: None,
            downstream_bandwidth_profile: None,
            upstream_olt_bandwidth_profile: None,
            downstream_olt_bandwidth_profile: None,
            is_dhcp_required: false,
            is_igmp_required: false,
            enable_mac_learning: false,
            configured_mac_address: None,
            service_name: String::new(),
        }
    }
}

impl UniTagInformation {
    /// Canonical tag standing in for the default EAPOL trap in the status store
    pub fn default_eapol() -> Self {
        Self {
            service_name: "DEFAULT_EAPOL".to_string(),
            ..Self::default()
        }
    }

    /// Canonical tag standing in for NNI trap flows in the status store
    pub fn nni() -> Self {
        Self {
            service_name: "NNI".to_string(),
            ..Self::default()
        }
    }

    /// Identity comparison: same (ponCTag, ponSTag, technologyProfileId) triple
    pub fn same_service(&self, other: &Self) -> bool {
        self.pon_c_tag == other.pon_c_tag
            && self.pon_s_tag == other.pon_s_tag
            && self.technology_profile_id == other.technology_profile_id
    }

    /// First-match rule used when attributing a flow rule back to a service:
    /// any of the three VLAN fields equal to the carried VLAN qualifies
    pub fn matches_vlan(&self, vlan: VlanId) -> bool {
        self.pon_c_tag == vlan || self.pon_s_tag == vlan || self.uni_tag_match == vlan
    }
}

/// Rate/burst parameters that become a three-band meter
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BandwidthProfileInformation {
    pub id: String,
    pub committed_information_rate: u64,
    pub committed_burst_size: u64,
    pub exceeded_information_rate: u64,
    pub exceeded_burst_size: u64,
    pub assured_information_rate: u64,
}

/// Subscriber record from the subscriber-information service
///
/// Looked up by port name for UNIs, or by device serial for OLT-level
/// information (which carries the uplink port number).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubscriberAndDeviceInformation {
    pub id: String,
    pub uplink_port: Option<u32>,
    pub uni_tag_list: Vec<UniTagInformation>,
}

/// Primary key for all per-service flow status
///
/// Equality and hashing cover the port and the service identity triple,
/// which is sufficient to disambiguate multi-service UNIs. The stable
/// cross-version identity is [`ServiceKey::identity`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceKey {
    port: AccessDevicePort,
    service: UniTagInformation,
}

impl ServiceKey {
    /// Create a key for one (port, service) combination
    pub fn new(port: AccessDevicePort, service: UniTagInformation) -> Self {
        Self { port, service }
    }

    /// The subscriber port
    pub fn port(&self) -> &AccessDevicePort {
        &self.port
    }

    /// The service definition
    pub fn service(&self) -> &UniTagInformation {
        &self.service
    }

    /// Stable identity tuple:
    /// (device, portNumber, portName, ponCTag, ponSTag, technologyProfileId)
    pub fn identity(&self) -> (DeviceId, PortNumber, String, VlanId, VlanId, i32) {
        (
            self.port.device().clone(),
            self.port.number(),
            self.port.name().to_string(),
            self.service.pon_c_tag,
            self.service.pon_s_tag,
            self.service.technology_profile_id,
        )
    }
}

impl PartialEq for ServiceKey {
    fn eq(&self, other: &Self) -> bool {
        self.port == other.port && self.service.same_service(&other.service)
    }
}

impl Eq for ServiceKey {}

impl Hash for ServiceKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.port.hash(state);
        self.service.pon_c_tag.hash(state);
        self.service.pon_s_tag.hash(state);
        self.service.technology_profile_id.hash(state);
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}/{}/{}",
            self.port,
            self.service.pon_c_tag,
            self.service.pon_s_tag,
            self.service.technology_profile_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mac_address_parsing() {
        assert!(MacAddress::from_str("00:11:22:33:44:55").is_ok());
        assert!(MacAddress::from_str("00-11-22-33-44-55").is_ok());
        assert!(MacAddress::from_str("001122334455").is_ok());

        assert!(MacAddress::from_str("00:11:22:33:44").is_err());
        assert!(MacAddress::from_str("00:11:22:33:44:GG").is_err());
        assert!(MacAddress::from_str("").is_err());
    }

    #[test]
    fn mac_address_unicast() {
        let zero = MacAddress::from_bytes([0; 6]);
        assert!(!zero.is_unicast());

        let group: MacAddress = "01:00:5e:00:00:01".parse().unwrap();
        assert!(!group.is_unicast());

        let host: MacAddress = "a4:23:05:00:00:01".parse().unwrap();
        assert!(host.is_unicast());
    }

    #[test]
    fn vlan_sentinels() {
        assert!(VlanId::ANY.is_any());
        assert!(VlanId::NONE.is_none());
        assert!(!VlanId::NO_VID.is_concrete());
        assert!(VlanId::new(101).is_concrete());
        assert_eq!(VlanId::EAPOL_DEFAULT.value(), 4091);
    }

    #[test]
    fn service_key_equality_ignores_flags() {
        let port =
            AccessDevicePort::new(DeviceId::from("of:0001"), PortNumber::new(16), "BBSM0001-1");
        let mut a = UniTagInformation {
            pon_c_tag: VlanId::new(101),
            pon_s_tag: VlanId::new(7),
            technology_profile_id: 64,
            ..UniTagInformation::default()
        };
        let b = a.clone();
        a.is_dhcp_required = true;

        assert_eq!(ServiceKey::new(port.clone(), a), ServiceKey::new(port, b));
    }

    #[test]
    fn service_key_distinguishes_services_on_one_port() {
        let port =
            AccessDevicePort::new(DeviceId::from("of:0001"), PortNumber::new(16), "BBSM0001-1");
        let hsia = UniTagInformation {
            pon_c_tag: VlanId::new(101),
            pon_s_tag: VlanId::new(7),
            technology_profile_id: 64,
            ..UniTagInformation::default()
        };
        let voip = UniTagInformation {
            pon_c_tag: VlanId::new(102),
            pon_s_tag: VlanId::new(7),
            technology_profile_id: 65,
            ..UniTagInformation::default()
        };

        assert_ne!(
            ServiceKey::new(port.clone(), hsia),
            ServiceKey::new(port, voip)
        );
    }
}
