//! Local subscriber-information registry
//!
//! The local-configuration mode of the subscriber service: records are
//! loaded from JSON (or inserted programmatically) and served from memory.
//! One id space covers both UNI port names and OLT serial numbers.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::Deserialize;

use crate::domain::ports::SubscriberService;
use crate::domain::value_objects::{
    BandwidthProfileInformation, SubscriberAndDeviceInformation,
};

/// JSON document shape accepted by [`LocalSubscriberRegistry::from_json`]
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct LocalConfig {
    subscribers: Vec<SubscriberAndDeviceInformation>,
    bandwidth_profiles: Vec<BandwidthProfileInformation>,
}

/// In-memory [`SubscriberService`]
#[derive(Debug, Default)]
pub struct LocalSubscriberRegistry {
    subscribers: RwLock<HashMap<String, SubscriberAndDeviceInformation>>,
    profiles: RwLock<HashMap<String, BandwidthProfileInformation>>,
}

impl LocalSubscriberRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a registry from its JSON representation
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let config: LocalConfig = serde_json::from_str(json)?;
        let registry = Self::new();
        for subscriber in config.subscribers {
            registry.add_subscriber(subscriber);
        }
        for profile in config.bandwidth_profiles {
            registry.add_bandwidth_profile(profile);
        }
        Ok(registry)
    }

    /// Insert or replace a subscriber/OLT record
    pub fn add_subscriber(&self, info: SubscriberAndDeviceInformation) {
        self.subscribers.write().insert(info.id.clone(), info);
    }

    /// Insert or replace a bandwidth profile
    pub fn add_bandwidth_profile(&self, profile: BandwidthProfileInformation) {
        self.profiles.write().insert(profile.id.clone(), profile);
    }

    /// Remove a subscriber/OLT record
    pub fn remove_subscriber(&self, id: &str) {
        self.subscribers.write().remove(id);
    }
}

impl SubscriberService for LocalSubscriberRegistry {
    fn subscriber_by_port_name(&self, port_name: &str) -> Option<SubscriberAndDeviceInformation> {
        self.subscribers.read().get(port_name).cloned()
    }

    fn olt_info_by_serial(&self, serial: &str) -> Option<SubscriberAndDeviceInformation> {
        self.subscribers.read().get(serial).cloned()
    }

    fn bandwidth_profile(&self, id: &str) -> Option<BandwidthProfileInformation> {
        self.profiles.read().get(id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_registry_from_json() {
        let registry = LocalSubscriberRegistry::from_json(
            r#"{
                "subscribers": [
                    {
                        "id": "BBSM0001-1",
                        "uniTagList": [
                            {
                                "ponCTag": 101,
                                "ponSTag": 7,
                                "technologyProfileId": 64,
                                "isDhcpRequired": true,
                                "upstreamBandwidthProfile": "HSIA-US",
                                "downstreamBandwidthProfile": "HSIA-DS",
                                "serviceName": "HSIA"
                            }
                        ]
                    },
                    { "id": "OLT-001", "uplinkPort": 2 }
                ],
                "bandwidthProfiles": [
                    { "id": "HSIA-US", "committedInformationRate": 100000 }
                ]
            }"#,
        )
        .unwrap();

        let subscriber = registry.subscriber_by_port_name("BBSM0001-1").unwrap();
        assert_eq!(subscriber.uni_tag_list.len(), 1);
        assert!(subscriber.uni_tag_list[0].is_dhcp_required);

        let olt = registry.olt_info_by_serial("OLT-001").unwrap();
        assert_eq!(olt.uplink_port, Some(2));

        assert!(registry.bandwidth_profile("HSIA-US").is_some());
        assert!(registry.bandwidth_profile("missing").is_none());
    }
}
