//! # Device ownership
//!
//! A weighted consistent-hash ring over the cluster membership decides
//! which instance drives each device. Every node contributes
//! [`HASH_WEIGHT`] virtual tokens; a device belongs to the node owning the
//! first token at or after the device hash. An instance emits southbound
//! directives for a device iff the ring maps the device to its own node id.

use std::collections::BTreeMap;
use std::hash::Hasher;
use std::sync::Arc;

use fnv::FnvHasher;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::ports::ClusterService;
use crate::domain::value_objects::{DeviceId, NodeId};

/// Virtual tokens contributed by each cluster node
pub const HASH_WEIGHT: usize = 10;

/// Membership changes observed from the cluster service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClusterEvent {
    InstanceReady(NodeId),
    InstanceDeactivated(NodeId),
}

/// Consistent-hash ring answering "is this device mine?"
pub struct DeviceOwnership {
    cluster: Arc<dyn ClusterService>,
    ring: RwLock<BTreeMap<u64, NodeId>>,
}

fn hash(value: &str) -> u64 {
    let mut hasher = FnvHasher::default();
    hasher.write(value.as_bytes());
    hasher.finish()
}

fn token(node: &NodeId, index: usize) -> u64 {
    hash(&format!("{}#{index}", node.as_str()))
}

impl DeviceOwnership {
    /// Build the ring from the current membership
    pub fn new(cluster: Arc<dyn ClusterService>) -> Self {
        let ownership = Self {
            cluster,
            ring: RwLock::new(BTreeMap::new()),
        };
        ownership.rebuild();
        ownership
    }

    /// Rebuild the ring from the cluster service's membership snapshot
    pub fn rebuild(&self) {
        let mut ring = BTreeMap::new();
        for node in self.cluster.nodes() {
            for i in 0..HASH_WEIGHT {
                ring.insert(token(&node, i), node.clone());
            }
        }
        *self.ring.write() = ring;
    }

    /// Apply one membership change; devices may re-hash as a result
    pub fn on_cluster_event(&self, event: &ClusterEvent) {
        match event {
            ClusterEvent::InstanceReady(node) => {
                info!(%node, "cluster instance ready");
                let mut ring = self.ring.write();
                for i in 0..HASH_WEIGHT {
                    ring.insert(token(node, i), node.clone());
                }
            }
            ClusterEvent::InstanceDeactivated(node) => {
                info!(%node, "cluster instance deactivated");
                self.ring.write().retain(|_, owner| owner != node);
            }
        }
    }

    /// The node currently owning a device, if any node is alive
    pub fn owner_of(&self, device: &DeviceId) -> Option<NodeId> {
        let ring = self.ring.read();
        if ring.is_empty() {
            return None;
        }
        let h = hash(device.as_str());
        ring.range(h..)
            .next()
            .or_else(|| ring.iter().next())
            .map(|(_, node)| node.clone())
    }

    /// Whether this instance drives the device
    pub fn is_device_mine(&self, device: &DeviceId) -> bool {
        self.owner_of(device)
            .map(|owner| owner == self.cluster.local_node())
            .unwrap_or(false)
    }
}
