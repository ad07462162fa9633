//! Reverse reconciliation: flow-rule events folding into the status store

mod common;

use common::*;

use olt_control::domain::value_objects::{PortNumber, VlanId};
use olt_control::flows::{
    Criterion, EthType, FlowRule, Instruction, IpProtocol, OutputPort, TrafficSelector,
    TrafficTreatment, MAX_PRIORITY, MIN_PRIORITY,
};
use olt_control::listener::{FlowRuleEvent, FlowRuleEventKind};
use olt_control::{OltFlowsStatus, APP_NAME};

fn dhcp_rule(h: &Harness, app_id: &str) -> FlowRule {
    FlowRule {
        device: h.device.clone(),
        app_id: app_id.to_string(),
        priority: MAX_PRIORITY,
        selector: TrafficSelector::new(vec![
            Criterion::InPort(PortNumber::new(UNI_PORT)),
            Criterion::EthType(EthType::Ipv4),
            Criterion::IpProto(IpProtocol::Udp),
            Criterion::UdpSrc(68),
            Criterion::UdpDst(67),
        ]),
        treatment: TrafficTreatment::new(vec![
            Instruction::PushVlan,
            Instruction::SetVlan(VlanId::new(101)),
            Instruction::Output(OutputPort::Controller),
        ]),
    }
}

fn data_rule(h: &Harness, port: u32, vlan: u16) -> FlowRule {
    FlowRule {
        device: h.device.clone(),
        app_id: APP_NAME.to_string(),
        priority: MIN_PRIORITY,
        selector: TrafficSelector::new(vec![
            Criterion::InPort(PortNumber::new(port)),
            Criterion::VlanVid(VlanId::new(vlan)),
        ]),
        treatment: TrafficTreatment::new(vec![Instruction::Output(OutputPort::Port(
            PortNumber::new(NNI_PORT),
        ))]),
    }
}

fn status_of(h: &Harness) -> Option<olt_control::OltPortStatus> {
    h.service
        .connect_point_status()
        .into_iter()
        .find(|(k, _)| k.port().number() == PortNumber::new(UNI_PORT))
        .map(|(_, s)| s)
}

#[tokio::test]
async fn dhcp_rule_lifecycle_tracks_into_the_store() {
    let h = harness();
    let tx = h.service.flow_event_sender();

    tx.send(FlowRuleEvent {
        kind: FlowRuleEventKind::AddRequested,
        rule: dhcp_rule(&h, APP_NAME),
    })
    .unwrap();
    settle().await;
    assert_eq!(status_of(&h).unwrap().dhcp_status, OltFlowsStatus::PendingAdd);

    tx.send(FlowRuleEvent {
        kind: FlowRuleEventKind::Added,
        rule: dhcp_rule(&h, APP_NAME),
    })
    .unwrap();
    settle().await;
    assert_eq!(status_of(&h).unwrap().dhcp_status, OltFlowsStatus::Added);
}

#[tokio::test]
async fn foreign_application_rules_are_ignored() {
    let h = harness();
    h.service
        .flow_event_sender()
        .send(FlowRuleEvent {
            kind: FlowRuleEventKind::Added,
            rule: dhcp_rule(&h, "org.onosproject.dhcp"),
        })
        .unwrap();
    settle().await;

    assert!(status_of(&h).is_none());
}

#[tokio::test]
async fn uni_data_rule_updates_subscriber_flows() {
    let h = harness();
    h.service
        .flow_event_sender()
        .send(FlowRuleEvent {
            kind: FlowRuleEventKind::AddRequested,
            rule: data_rule(&h, UNI_PORT, 101),
        })
        .unwrap();
    settle().await;

    let status = status_of(&h).unwrap();
    assert_eq!(status.subscriber_flows_status, OltFlowsStatus::PendingAdd);
    assert_eq!(status.dhcp_status, OltFlowsStatus::None);
}

#[tokio::test]
async fn nni_data_rules_are_not_tracked() {
    let h = harness();
    h.service
        .flow_event_sender()
        .send(FlowRuleEvent {
            kind: FlowRuleEventKind::Added,
            rule: data_rule(&h, NNI_PORT, 7),
        })
        .unwrap();
    settle().await;

    assert!(h.service.connect_point_status().is_empty());
}

#[tokio::test]
async fn default_eapol_rule_is_recognised_by_its_reserved_vlan() {
    let h = harness();
    let rule = FlowRule {
        device: h.device.clone(),
        app_id: APP_NAME.to_string(),
        priority: MAX_PRIORITY,
        selector: TrafficSelector::new(vec![
            Criterion::InPort(PortNumber::new(UNI_PORT)),
            Criterion::EthType(EthType::Eapol),
        ]),
        treatment: TrafficTreatment::new(vec![
            Instruction::PushVlan,
            Instruction::SetVlan(VlanId::EAPOL_DEFAULT),
            Instruction::Output(OutputPort::Controller),
        ]),
    };
    h.service
        .flow_event_sender()
        .send(FlowRuleEvent {
            kind: FlowRuleEventKind::AddRequested,
            rule,
        })
        .unwrap();
    settle().await;

    let status = status_of(&h).unwrap();
    assert_eq!(status.default_eapol_status, OltFlowsStatus::PendingAdd);
    assert_eq!(status.subscriber_flows_status, OltFlowsStatus::None);
}

#[tokio::test]
async fn vlan_without_matching_service_is_dropped() {
    let h = harness();
    h.service
        .flow_event_sender()
        .send(FlowRuleEvent {
            kind: FlowRuleEventKind::Added,
            rule: data_rule(&h, UNI_PORT, 999),
        })
        .unwrap();
    settle().await;

    assert!(h.service.connect_point_status().is_empty());
}
