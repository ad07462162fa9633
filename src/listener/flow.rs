//! Flow listener: reverse reconciliation
//!
//! Consumes flow-rule events from the southbound, attributes each rule to
//! a (port, service) tuple and folds the observed state back into the
//! status store.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::cluster::DeviceOwnership;
use crate::domain::ports::{DeviceInventory, SubscriberService};
use crate::domain::status::OltFlowsStatus;
use crate::domain::value_objects::{
    AccessDevicePort, ConnectPoint, DeviceId, PortNumber, ServiceKey, UniTagInformation, VlanId,
};
use crate::flows::{Criterion, EthType, FlowRule, IpProtocol};
use crate::store::{StatusStore, StatusUpdate};

/// Lifecycle stage reported for a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowRuleEventKind {
    AddRequested,
    Added,
    RemoveRequested,
    Removed,
}

impl FlowRuleEventKind {
    /// Map the southbound stage onto the status state machine
    pub fn status(&self) -> OltFlowsStatus {
        match self {
            FlowRuleEventKind::AddRequested => OltFlowsStatus::PendingAdd,
            FlowRuleEventKind::Added => OltFlowsStatus::Added,
            FlowRuleEventKind::RemoveRequested => OltFlowsStatus::PendingRemove,
            FlowRuleEventKind::Removed => OltFlowsStatus::Removed,
        }
    }
}

/// One flow-rule event from the southbound
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowRuleEvent {
    pub kind: FlowRuleEventKind,
    pub rule: FlowRule,
}

/// What a rule turned out to be
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RuleClass {
    DefaultEapol,
    Dhcp,
    Data,
}

/// Folds observed flow state back into the status store
pub struct FlowEventListener {
    app_id: String,
    ownership: Arc<DeviceOwnership>,
    inventory: Arc<dyn DeviceInventory>,
    subscribers: Arc<dyn SubscriberService>,
    store: StatusStore,
}

impl FlowEventListener {
    pub fn new(
        app_id: impl Into<String>,
        ownership: Arc<DeviceOwnership>,
        inventory: Arc<dyn DeviceInventory>,
        subscribers: Arc<dyn SubscriberService>,
        store: StatusStore,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            ownership,
            inventory,
            subscribers,
            store,
        }
    }

    /// Process one event; a total function from event to a store update
    /// or to nothing
    pub fn handle(&self, event: &FlowRuleEvent) {
        let rule = &event.rule;
        if rule.app_id != self.app_id {
            trace!(app_id = %rule.app_id, "foreign application rule; ignored");
            return;
        }
        if !self.ownership.is_device_mine(&rule.device) {
            trace!(device = %rule.device, "device not owned; flow event ignored");
            return;
        }
        let Some(in_port) = rule.selector.in_port() else {
            return;
        };
        let cp = ConnectPoint::new(rule.device.clone(), in_port);
        let is_nni = self.is_nni(&rule.device, in_port);

        let Some(class) = Self::classify(rule, is_nni) else {
            trace!(device = %rule.device, %in_port, "unclassified rule; ignored");
            return;
        };
        let Some(key) = self.service_key(&cp, is_nni, class, rule) else {
            return;
        };

        let status = event.kind.status();
        debug!(%key, ?class, %status, "folding flow event into status store");
        let update = match class {
            RuleClass::DefaultEapol => StatusUpdate::default_eapol(status),
            RuleClass::Dhcp => StatusUpdate::dhcp(status),
            RuleClass::Data => StatusUpdate::subscriber_flows(status),
        };
        self.store.update(&key, update);
    }

    /// Drain the event queue until the sender side closes
    pub fn spawn(self, mut rx: mpsc::UnboundedReceiver<FlowRuleEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                self.handle(&event);
            }
        })
    }

    fn classify(rule: &FlowRule, is_nni: bool) -> Option<RuleClass> {
        if rule.selector.eth_type() == Some(EthType::Eapol)
            && rule.treatment.sets_vlan(VlanId::EAPOL_DEFAULT)
        {
            return Some(RuleClass::DefaultEapol);
        }
        if rule.selector.ip_proto() == Some(IpProtocol::Udp)
            && matches!(rule.selector.udp_src(), Some(67) | Some(68))
        {
            return Some(RuleClass::Dhcp);
        }
        let has_vlan = rule
            .selector
            .criteria
            .iter()
            .any(|c| matches!(c, Criterion::VlanVid(_)));
        if has_vlan && !is_nni {
            // NNI data flows exist per subscriber; tracking them would
            // explode the store
            return Some(RuleClass::Data);
        }
        None
    }

    fn service_key(
        &self,
        cp: &ConnectPoint,
        is_nni: bool,
        class: RuleClass,
        rule: &FlowRule,
    ) -> Option<ServiceKey> {
        let descriptor = self.inventory.port(cp)?;
        let port = AccessDevicePort::new(cp.device.clone(), descriptor.number, descriptor.name);

        if class == RuleClass::DefaultEapol {
            return Some(StatusStore::default_eapol_key(&port));
        }
        if is_nni {
            return Some(StatusStore::nni_key(&port));
        }

        // The flow carries a VLAN: pushed by the treatment for DHCP traps,
        // matched by the selector for data flows
        let vlan = match class {
            RuleClass::Dhcp => rule.treatment.pushed_vlan(),
            _ => rule.selector.vlan_vid(),
        }?;

        let subscriber = self.subscribers.subscriber_by_port_name(port.name())?;
        let matches: Vec<&UniTagInformation> = subscriber
            .uni_tag_list
            .iter()
            .filter(|t| t.matches_vlan(vlan))
            .collect();
        if matches.len() > 1 {
            warn!(
                %port, %vlan,
                "flow VLAN matches several services; attributing to the first"
            );
        }
        matches
            .first()
            .map(|tag| ServiceKey::new(port.clone(), (*tag).clone()))
    }

    /// A port is an NNI iff its number equals the configured uplink, or as
    /// a fallback its name begins with `nni-`
    fn is_nni(&self, device: &DeviceId, number: PortNumber) -> bool {
        let uplink = self.inventory.device(device).and_then(|d| {
            self.subscribers
                .olt_info_by_serial(&d.serial)?
                .uplink_port
                .map(PortNumber::new)
        });
        if uplink == Some(number) {
            return true;
        }
        self.inventory
            .port(&ConnectPoint::new(device.clone(), number))
            .map(|p| p.name.starts_with("nni-"))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_kinds_map_onto_status() {
        assert_eq!(
            FlowRuleEventKind::AddRequested.status(),
            OltFlowsStatus::PendingAdd
        );
        assert_eq!(FlowRuleEventKind::Added.status(), OltFlowsStatus::Added);
        assert_eq!(
            FlowRuleEventKind::RemoveRequested.status(),
            OltFlowsStatus::PendingRemove
        );
        assert_eq!(FlowRuleEventKind::Removed.status(), OltFlowsStatus::Removed);
    }
}
