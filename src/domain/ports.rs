//! # Domain Ports (Hexagonal Architecture)
//!
//! Ports define the boundaries between the reconciliation core and its
//! external collaborators. Each port is a trait that adapters implement.
//!
//! Driven ports (outbound):
//! - [`FlowProgrammer`]: southbound driver pushing filters, forwards and meters
//! - [`SubscriberService`]: subscriber and bandwidth-profile lookups
//! - [`HostService`]: learned-host queries for MAC verification
//! - [`ClusterService`]: membership and local-node identity
//! - [`DeviceInventory`]: device and port snapshots
//!
//! The driving side is [`crate::service::AccessDeviceService`] plus the
//! event pumps in [`crate::listener`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::errors::ObjectiveError;
use super::value_objects::{
    BandwidthProfileInformation, ConnectPoint, DeviceId, MacAddress, MeterId, NodeId, PortNumber,
    SubscriberAndDeviceInformation, VlanId,
};
use crate::flows::{FilteringObjective, ForwardingObjective};
use crate::meters::MeterRequest;

// ============================================================================
// Port Data Types
// ============================================================================

/// Snapshot of an access device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub id: DeviceId,
    /// Serial number used to look up OLT-level configuration
    pub serial: String,
}

/// Snapshot of one port on an access device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortDescriptor {
    pub number: PortNumber,
    /// The `portName` annotation; the subscriber key for UNIs
    pub name: String,
    pub enabled: bool,
}

/// A host learned on a connect point
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostDescriptor {
    pub mac: MacAddress,
    pub vlan: VlanId,
}

// ============================================================================
// Driven Ports (Outbound)
// ============================================================================

/// Southbound driver pushing forwarding state to hardware
///
/// Completion is modelled by the returned future: `Ok` corresponds to the
/// driver's `onSuccess` callback, `Err(ObjectiveError)` to `onError`.
#[async_trait]
pub trait FlowProgrammer: Send + Sync {
    /// Install or remove a trap-style filter
    async fn filter(
        &self,
        device: &DeviceId,
        objective: FilteringObjective,
    ) -> Result<(), ObjectiveError>;

    /// Install or remove a match→treatment rule
    async fn forward(
        &self,
        device: &DeviceId,
        objective: ForwardingObjective,
    ) -> Result<(), ObjectiveError>;

    /// Create a meter; resolves to the driver-assigned id once installation
    /// is confirmed
    async fn submit_meter(
        &self,
        device: &DeviceId,
        request: MeterRequest,
    ) -> Result<MeterId, ObjectiveError>;

    /// Withdraw a meter
    async fn withdraw_meter(&self, device: &DeviceId, meter: MeterId)
        -> Result<(), ObjectiveError>;

    /// Remove every flow rule this application installed on a device
    async fn purge_flows(&self, device: &DeviceId) -> Result<(), ObjectiveError>;
}

/// Subscriber-information service
///
/// Lookups are synchronous and side-effect-free; absent entries return `None`.
pub trait SubscriberService: Send + Sync {
    /// Subscriber record for a UNI, keyed by its `portName` annotation
    fn subscriber_by_port_name(&self, port_name: &str)
        -> Option<SubscriberAndDeviceInformation>;

    /// OLT-level record keyed by device serial; carries the uplink port
    fn olt_info_by_serial(&self, serial: &str) -> Option<SubscriberAndDeviceInformation>;

    /// Rate/burst parameters for a named bandwidth profile
    fn bandwidth_profile(&self, id: &str) -> Option<BandwidthProfileInformation>;
}

/// Host/ARP learning service
pub trait HostService: Send + Sync {
    /// Hosts currently learned on a connect point
    fn connected_hosts(&self, cp: &ConnectPoint) -> Vec<HostDescriptor>;
}

/// Cluster membership service
pub trait ClusterService: Send + Sync {
    /// This instance's node id
    fn local_node(&self) -> NodeId;

    /// Current cluster membership
    fn nodes(&self) -> Vec<NodeId>;
}

/// Device and port snapshots from the southbound inventory
pub trait DeviceInventory: Send + Sync {
    /// All known access devices
    fn devices(&self) -> Vec<DeviceDescriptor>;

    /// One device, if known
    fn device(&self, id: &DeviceId) -> Option<DeviceDescriptor>;

    /// All ports of a device
    fn ports(&self, id: &DeviceId) -> Vec<PortDescriptor>;

    /// One port, if known
    fn port(&self, cp: &ConnectPoint) -> Option<PortDescriptor>;

    /// Whether the device is currently reachable
    fn is_available(&self, id: &DeviceId) -> bool;
}
