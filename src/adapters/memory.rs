//! In-memory inventory, cluster and host adapters

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;

use crate::domain::ports::{
    ClusterService, DeviceDescriptor, DeviceInventory, HostDescriptor, HostService,
    PortDescriptor,
};
use crate::domain::value_objects::{ConnectPoint, DeviceId, NodeId, PortNumber};

/// Mutable in-memory [`DeviceInventory`]
#[derive(Debug, Default)]
pub struct StaticInventory {
    devices: RwLock<HashMap<DeviceId, DeviceDescriptor>>,
    ports: RwLock<HashMap<DeviceId, Vec<PortDescriptor>>>,
    unavailable: RwLock<HashSet<DeviceId>>,
}

impl StaticInventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a device by id and serial
    pub fn add_device(&self, id: DeviceId, serial: impl Into<String>) {
        self.devices.write().insert(
            id.clone(),
            DeviceDescriptor {
                id,
                serial: serial.into(),
            },
        );
    }

    /// Register (or replace) a port of a device
    pub fn add_port(&self, device: &DeviceId, number: PortNumber, name: impl Into<String>, enabled: bool) {
        let mut ports = self.ports.write();
        let list = ports.entry(device.clone()).or_default();
        list.retain(|p| p.number != number);
        list.push(PortDescriptor {
            number,
            name: name.into(),
            enabled,
        });
    }

    /// Flip a port's enable bit
    pub fn set_port_enabled(&self, cp: &ConnectPoint, enabled: bool) {
        if let Some(list) = self.ports.write().get_mut(&cp.device) {
            for port in list.iter_mut() {
                if port.number == cp.port {
                    port.enabled = enabled;
                }
            }
        }
    }

    /// Delete a port
    pub fn remove_port(&self, cp: &ConnectPoint) {
        if let Some(list) = self.ports.write().get_mut(&cp.device) {
            list.retain(|p| p.number != cp.port);
        }
    }

    /// Mark a device reachable or not
    pub fn set_available(&self, device: &DeviceId, available: bool) {
        let mut unavailable = self.unavailable.write();
        if available {
            unavailable.remove(device);
        } else {
            unavailable.insert(device.clone());
        }
    }
}

impl DeviceInventory for StaticInventory {
    fn devices(&self) -> Vec<DeviceDescriptor> {
        self.devices.read().values().cloned().collect()
    }

    fn device(&self, id: &DeviceId) -> Option<DeviceDescriptor> {
        self.devices.read().get(id).cloned()
    }

    fn ports(&self, id: &DeviceId) -> Vec<PortDescriptor> {
        self.ports.read().get(id).cloned().unwrap_or_default()
    }

    fn port(&self, cp: &ConnectPoint) -> Option<PortDescriptor> {
        self.ports
            .read()
            .get(&cp.device)?
            .iter()
            .find(|p| p.number == cp.port)
            .cloned()
    }

    fn is_available(&self, id: &DeviceId) -> bool {
        self.devices.read().contains_key(id) && !self.unavailable.read().contains(id)
    }
}

/// Single-instance [`ClusterService`]; the local node owns every device
#[derive(Debug, Clone)]
pub struct SingleNodeCluster {
    node: NodeId,
}

impl SingleNodeCluster {
    pub fn new(node: impl Into<String>) -> Self {
        Self {
            node: NodeId::new(node),
        }
    }
}

impl ClusterService for SingleNodeCluster {
    fn local_node(&self) -> NodeId {
        self.node.clone()
    }

    fn nodes(&self) -> Vec<NodeId> {
        vec![self.node.clone()]
    }
}

/// [`HostService`] that has never learned anything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHosts;

impl HostService for NoHosts {
    fn connected_hosts(&self, _cp: &ConnectPoint) -> Vec<HostDescriptor> {
        Vec::new()
    }
}
