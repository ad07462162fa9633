//! Component configuration
//!
//! Knob names follow the operator-facing camelCase convention; every knob
//! has a default so the component runs unconfigured. Values can be layered
//! from a file and from `OLT_`-prefixed environment variables.

use serde::Deserialize;
use std::path::Path;

/// Tunable behaviour of the reconciliation core
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OltConfig {
    /// Install DHCP trap flows on NNI ports
    #[serde(default = "default_true")]
    pub enable_dhcp_on_nni: bool,

    /// Trap DHCPv4 packets
    #[serde(default = "default_true")]
    pub enable_dhcp_v4: bool,

    /// Trap DHCPv6 packets
    #[serde(default)]
    pub enable_dhcp_v6: bool,

    /// Install IGMP trap flows on NNI ports
    #[serde(default)]
    pub enable_igmp_on_nni: bool,

    /// Install the default EAPOL trap on enabled UNIs
    #[serde(default = "default_true")]
    pub enable_eapol: bool,

    /// Install PPPoE-discovery trap flows
    #[serde(default)]
    pub enable_pppoe: bool,

    /// Technology profile substituted when a service carries none
    #[serde(default = "default_tech_profile_id")]
    pub default_tech_profile_id: i32,

    /// Hold subscriber adds until the default EAPOL removal is confirmed
    #[serde(default = "default_true")]
    pub wait_for_removal: bool,

    /// Bandwidth profile backing the default EAPOL meter
    #[serde(default = "default_bp_id")]
    pub default_bp_id: String,

    /// Service name marking the multicast service
    #[serde(default = "default_multicast_service_name")]
    pub multicast_service_name: String,

    /// Attempts before a task waiting on MAC learning is dropped
    #[serde(default = "default_mac_learning_retries")]
    pub mac_learning_retries: u32,

    /// Size of the reconciliation worker pool
    #[serde(default = "default_reconcile_workers")]
    pub reconcile_workers: usize,

    /// Delay before a parked task is retried
    #[serde(default = "default_retry_delay_millis")]
    pub retry_delay_millis: u64,
}

// Default value functions
fn default_true() -> bool {
    true
}
fn default_tech_profile_id() -> i32 {
    64
}
fn default_bp_id() -> String {
    "Default".to_string()
}
fn default_multicast_service_name() -> String {
    "multicastServiceName".to_string()
}
fn default_mac_learning_retries() -> u32 {
    10
}
fn default_reconcile_workers() -> usize {
    4
}
fn default_retry_delay_millis() -> u64 {
    500
}

impl Default for OltConfig {
    fn default() -> Self {
        Self {
            enable_dhcp_on_nni: true,
            enable_dhcp_v4: true,
            enable_dhcp_v6: false,
            enable_igmp_on_nni: false,
            enable_eapol: true,
            enable_pppoe: false,
            default_tech_profile_id: 64,
            wait_for_removal: true,
            default_bp_id: default_bp_id(),
            multicast_service_name: default_multicast_service_name(),
            mac_learning_retries: 10,
            reconcile_workers: 4,
            retry_delay_millis: 500,
        }
    }
}

impl OltConfig {
    /// Load from an optional file plus `OLT_*` environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        builder
            .add_source(config::Environment::with_prefix("OLT").try_parsing(true))
            .build()?
            .try_deserialize()
    }
}
