//! Source of truth for per-service flow status and operator intent

use tracing::warn;

use super::ReplicatedMap;
use crate::domain::status::{OltFlowsStatus, OltPortStatus};
use crate::domain::value_objects::{
    AccessDevicePort, ConnectPoint, DeviceId, ServiceKey, UniTagInformation,
};

/// Partial status update; `None` means "leave the field as is"
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusUpdate {
    pub default_eapol: Option<OltFlowsStatus>,
    pub subscriber_flows: Option<OltFlowsStatus>,
    pub dhcp: Option<OltFlowsStatus>,
}

impl StatusUpdate {
    /// Update only the default-EAPOL track
    pub fn default_eapol(status: OltFlowsStatus) -> Self {
        Self {
            default_eapol: Some(status),
            ..Self::default()
        }
    }

    /// Update only the subscriber-flows track
    pub fn subscriber_flows(status: OltFlowsStatus) -> Self {
        Self {
            subscriber_flows: Some(status),
            ..Self::default()
        }
    }

    /// Update only the DHCP track
    pub fn dhcp(status: OltFlowsStatus) -> Self {
        Self {
            dhcp: Some(status),
            ..Self::default()
        }
    }
}

/// Cluster-replicated status of every (port, service) tuple, together with
/// the operator-intent map
///
/// The two maps are always updated through this type so that a subscriber
/// registration lands in both atomically with respect to this process.
#[derive(Debug, Clone)]
pub struct StatusStore {
    cp_status: ReplicatedMap<ServiceKey, OltPortStatus>,
    provisioned: ReplicatedMap<ServiceKey, bool>,
}

impl StatusStore {
    /// Create the store over its two named replicated maps
    pub fn new() -> Self {
        Self {
            cp_status: ReplicatedMap::new("volt-cp-status"),
            provisioned: ReplicatedMap::new("volt-provisioned-subscriber"),
        }
    }

    /// Merge a partial update into the entry for `key`
    ///
    /// Runs as a single compare-and-update so that concurrent reconciliation
    /// and flow-listener writes interleave per field, never per struct.
    /// Illegal lifecycle transitions are dropped with a warning. An entry
    /// whose three tracks all settle to `None`/`Removed` is deleted, so a
    /// key is present iff something is installed or in flight.
    pub fn update(&self, key: &ServiceKey, update: StatusUpdate) {
        self.cp_status.compute(key.clone(), |current| {
            let mut status = current.unwrap_or_default();
            Self::merge_field(key, "defaultEapol", &mut status.default_eapol_status, update.default_eapol);
            Self::merge_field(
                key,
                "subscriberFlows",
                &mut status.subscriber_flows_status,
                update.subscriber_flows,
            );
            Self::merge_field(key, "dhcp", &mut status.dhcp_status, update.dhcp);

            if status.is_fully_absent() {
                None
            } else {
                Some(status)
            }
        });
    }

    fn merge_field(
        key: &ServiceKey,
        field: &str,
        current: &mut OltFlowsStatus,
        next: Option<OltFlowsStatus>,
    ) {
        let Some(next) = next else { return };
        if next == *current {
            return;
        }
        if !current.can_transition_to(next) {
            warn!(%key, field, from = %current, to = %next, "dropping illegal status transition");
            return;
        }
        *current = next;
    }

    /// Current status of one (port, service) tuple
    pub fn status(&self, key: &ServiceKey) -> Option<OltPortStatus> {
        self.cp_status.get(key)
    }

    /// Whether the port carries (or is acquiring) the default EAPOL trap.
    /// `Error` counts as present because the southbound keeps retrying.
    pub fn has_default_eapol(&self, port: &AccessDevicePort) -> bool {
        self.status(&Self::default_eapol_key(port))
            .map(|s| s.default_eapol_status.is_present())
            .unwrap_or(false)
    }

    /// Whether the default EAPOL trap is on its way out
    pub fn is_default_eapol_pending_removal(&self, port: &AccessDevicePort) -> bool {
        self.status(&Self::default_eapol_key(port))
            .map(|s| s.default_eapol_status == OltFlowsStatus::PendingRemove)
            .unwrap_or(false)
    }

    /// Whether DHCP trap flows are installed or being installed for a service
    pub fn has_dhcp_flows(&self, port: &AccessDevicePort, service: &UniTagInformation) -> bool {
        self.status(&ServiceKey::new(port.clone(), service.clone()))
            .map(|s| s.dhcp_status.is_installed_or_pending())
            .unwrap_or(false)
    }

    /// Whether data-plane flows are installed or being installed for a service
    pub fn has_subscriber_flows(
        &self,
        port: &AccessDevicePort,
        service: &UniTagInformation,
    ) -> bool {
        self.status(&ServiceKey::new(port.clone(), service.clone()))
            .map(|s| s.subscriber_flows_status.is_installed_or_pending())
            .unwrap_or(false)
    }

    /// Canonical key tracking the default EAPOL trap of a port
    pub fn default_eapol_key(port: &AccessDevicePort) -> ServiceKey {
        ServiceKey::new(port.clone(), UniTagInformation::default_eapol())
    }

    /// Canonical key tracking NNI trap flows of a port
    pub fn nni_key(port: &AccessDevicePort) -> ServiceKey {
        ServiceKey::new(port.clone(), UniTagInformation::nni())
    }

    /// All tracked keys for one port
    pub fn keys_for_port(&self, port: &AccessDevicePort) -> Vec<ServiceKey> {
        self.cp_status
            .keys()
            .into_iter()
            .filter(|k| k.port() == port)
            .collect()
    }

    /// All tracked keys for one (device, port number) pair, regardless of
    /// the port-name annotation
    pub fn keys_for_connect_point(&self, cp: &ConnectPoint) -> Vec<ServiceKey> {
        self.cp_status
            .keys()
            .into_iter()
            .filter(|k| k.port().device() == &cp.device && k.port().number() == cp.port)
            .collect()
    }

    /// All tracked keys for one device
    pub fn keys_for_device(&self, device: &DeviceId) -> Vec<ServiceKey> {
        self.cp_status
            .keys()
            .into_iter()
            .filter(|k| k.port().device() == device)
            .collect()
    }

    /// Snapshot of every tracked (key, status) pair
    pub fn entries(&self) -> Vec<(ServiceKey, OltPortStatus)> {
        self.cp_status.entries()
    }

    // ------------------------------------------------------------------
    // Operator intent
    // ------------------------------------------------------------------

    /// Record that the operator requested this service
    pub fn set_provisioned(&self, key: ServiceKey, provisioned: bool) {
        self.provisioned.put(key, provisioned);
    }

    /// Forget the operator intent entirely
    pub fn clear_provisioned(&self, key: &ServiceKey) {
        self.provisioned.remove(key);
    }

    /// Whether the operator has requested this service
    pub fn is_provisioned(&self, key: &ServiceKey) -> bool {
        self.provisioned.get(key).unwrap_or(false)
    }

    /// Every key the operator has marked provisioned
    pub fn provisioned_keys(&self) -> Vec<ServiceKey> {
        self.provisioned
            .entries()
            .into_iter()
            .filter_map(|(k, v)| v.then_some(k))
            .collect()
    }

    /// Provisioned keys belonging to one port
    pub fn provisioned_for_port(&self, port: &AccessDevicePort) -> Vec<ServiceKey> {
        self.provisioned_keys()
            .into_iter()
            .filter(|k| k.port() == port)
            .collect()
    }

    /// Provisioned keys belonging to one (device, port number) pair
    pub fn provisioned_for_connect_point(&self, cp: &ConnectPoint) -> Vec<ServiceKey> {
        self.provisioned_keys()
            .into_iter()
            .filter(|k| k.port().device() == &cp.device && k.port().number() == cp.port)
            .collect()
    }

    /// Drop all state for a departing device, intent included
    pub fn purge_device(&self, device: &DeviceId) {
        self.cp_status.retain(|k, _| k.port().device() != device);
        self.provisioned.retain(|k, _| k.port().device() != device);
    }
}

impl Default for StatusStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::{PortNumber, VlanId};

    fn uni_port() -> AccessDevicePort {
        AccessDevicePort::new(DeviceId::from("of:0001"), PortNumber::new(16), "BBSM0001-1")
    }

    fn hsia() -> UniTagInformation {
        UniTagInformation {
            pon_c_tag: VlanId::new(101),
            pon_s_tag: VlanId::new(7),
            technology_profile_id: 64,
            ..UniTagInformation::default()
        }
    }

    #[test]
    fn merge_leaves_untouched_fields() {
        let store = StatusStore::new();
        let key = ServiceKey::new(uni_port(), hsia());

        store.update(&key, StatusUpdate::dhcp(OltFlowsStatus::PendingAdd));
        store.update(&key, StatusUpdate::subscriber_flows(OltFlowsStatus::PendingAdd));

        let status = store.status(&key).unwrap();
        assert_eq!(status.dhcp_status, OltFlowsStatus::PendingAdd);
        assert_eq!(status.subscriber_flows_status, OltFlowsStatus::PendingAdd);
        assert_eq!(status.default_eapol_status, OltFlowsStatus::None);
    }

    #[test]
    fn entry_removed_when_everything_settles() {
        let store = StatusStore::new();
        let key = ServiceKey::new(uni_port(), hsia());

        store.update(&key, StatusUpdate::dhcp(OltFlowsStatus::PendingAdd));
        assert!(store.status(&key).is_some());

        store.update(&key, StatusUpdate::dhcp(OltFlowsStatus::PendingRemove));
        store.update(&key, StatusUpdate::dhcp(OltFlowsStatus::Removed));
        assert!(store.status(&key).is_none());
    }

    #[test]
    fn illegal_transition_is_dropped() {
        let store = StatusStore::new();
        let key = ServiceKey::new(uni_port(), hsia());

        store.update(&key, StatusUpdate::dhcp(OltFlowsStatus::PendingRemove));
        // None cannot go straight to PendingRemove; entry never materialises
        assert!(store.status(&key).is_none());
    }

    #[test]
    fn default_eapol_presence_includes_error() {
        let store = StatusStore::new();
        let port = uni_port();
        let key = StatusStore::default_eapol_key(&port);

        store.update(&key, StatusUpdate::default_eapol(OltFlowsStatus::PendingAdd));
        assert!(store.has_default_eapol(&port));

        store.update(&key, StatusUpdate::default_eapol(OltFlowsStatus::Error));
        assert!(store.has_default_eapol(&port));

        store.update(
            &key,
            StatusUpdate::default_eapol(OltFlowsStatus::PendingRemove),
        );
        assert!(!store.has_default_eapol(&port));
        assert!(store.is_default_eapol_pending_removal(&port));
    }

    #[test]
    fn purge_drops_all_device_state() {
        let store = StatusStore::new();
        let key = ServiceKey::new(uni_port(), hsia());

        store.update(&key, StatusUpdate::subscriber_flows(OltFlowsStatus::PendingAdd));
        store.set_provisioned(key.clone(), true);

        store.purge_device(&DeviceId::from("of:0001"));
        assert!(store.status(&key).is_none());
        assert!(!store.is_provisioned(&key));
        assert!(store.keys_for_device(&DeviceId::from("of:0001")).is_empty());
    }
}
