//! Ownership-ring properties

use std::sync::Arc;

use proptest::prelude::*;

use olt_control::cluster::{ClusterEvent, DeviceOwnership};
use olt_control::domain::ports::ClusterService;
use olt_control::domain::value_objects::{DeviceId, NodeId};

#[derive(Clone)]
struct FixedCluster {
    local: NodeId,
    members: Vec<NodeId>,
}

impl ClusterService for FixedCluster {
    fn local_node(&self) -> NodeId {
        self.local.clone()
    }

    fn nodes(&self) -> Vec<NodeId> {
        self.members.clone()
    }
}

fn cluster_instances(members: &[&str]) -> Vec<DeviceOwnership> {
    let nodes: Vec<NodeId> = members.iter().map(|m| NodeId::new(*m)).collect();
    nodes
        .iter()
        .map(|local| {
            DeviceOwnership::new(Arc::new(FixedCluster {
                local: local.clone(),
                members: nodes.clone(),
            }))
        })
        .collect()
}

proptest! {
    /// For any device and membership snapshot, exactly one instance
    /// computes is_device_mine = true
    #[test]
    fn exactly_one_owner(device in "[a-z0-9:]{1,32}") {
        let instances = cluster_instances(&["n1", "n2", "n3"]);
        let device = DeviceId::new(device);

        let owners = instances
            .iter()
            .filter(|o| o.is_device_mine(&device))
            .count();
        prop_assert_eq!(owners, 1);
    }

    /// All instances agree on the owner
    #[test]
    fn owner_is_consistent(device in "[a-z0-9:]{1,32}") {
        let instances = cluster_instances(&["n1", "n2", "n3"]);
        let device = DeviceId::new(device);

        let owners: Vec<_> = instances
            .iter()
            .map(|o| o.owner_of(&device))
            .collect();
        prop_assert!(owners.windows(2).all(|w| w[0] == w[1]));
    }

    /// Removing a node only moves devices that it owned
    #[test]
    fn deactivation_is_minimal(device in "[a-z0-9:]{1,32}") {
        let instances = cluster_instances(&["n1", "n2", "n3"]);
        let device = DeviceId::new(device);

        let before = instances[0].owner_of(&device).unwrap();
        instances[0].on_cluster_event(&ClusterEvent::InstanceDeactivated(NodeId::new("n3")));
        let after = instances[0].owner_of(&device).unwrap();

        if before.as_str() != "n3" {
            prop_assert_eq!(before, after);
        } else {
            prop_assert_ne!(after.as_str(), "n3");
        }
    }
}

/// Failover scenario: the deactivated node's devices land on a survivor,
/// and exactly one survivor claims each
#[test]
fn failover_hands_devices_to_exactly_one_survivor() {
    let instances = cluster_instances(&["n1", "n2"]);

    for i in 0..50 {
        let device = DeviceId::new(format!("of:{i:016x}"));
        for o in &instances {
            o.on_cluster_event(&ClusterEvent::InstanceDeactivated(NodeId::new("n1")));
        }
        let owners = instances
            .iter()
            .filter(|o| o.is_device_mine(&device))
            .count();
        assert_eq!(owners, 1);
        assert!(instances[1].is_device_mine(&device));

        for o in &instances {
            o.on_cluster_event(&ClusterEvent::InstanceReady(NodeId::new("n1")));
        }
    }
}
