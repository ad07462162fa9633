//! # Flow directives
//!
//! Vocabulary shared by the flow builder, the southbound driver port and
//! the flow listener: match criteria, treatment instructions, and the two
//! objective families (trap-style filters and match→treatment forwards).

pub mod builder;

pub use builder::FlowBuilder;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::value_objects::{MacAddress, MeterId, PortNumber, VlanId};

/// Priority of trap filters
pub const MAX_PRIORITY: u32 = 10_000;
/// Priority of data-plane forwards
pub const MIN_PRIORITY: u32 = 1_000;

/// Ethernet frame types matched by trap flows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EthType {
    Eapol,
    Ipv4,
    Ipv6,
    Lldp,
    PppoeD,
}

impl EthType {
    /// The wire value
    pub fn value(&self) -> u16 {
        match self {
            EthType::Eapol => 0x888e,
            EthType::Ipv4 => 0x0800,
            EthType::Ipv6 => 0x86dd,
            EthType::Lldp => 0x88cc,
            EthType::PppoeD => 0x8863,
        }
    }
}

impl fmt::Display for EthType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04x}", self.value())
    }
}

/// IP protocols matched by trap flows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IpProtocol {
    Igmp,
    Udp,
}

impl IpProtocol {
    /// The wire value
    pub fn value(&self) -> u8 {
        match self {
            IpProtocol::Igmp => 2,
            IpProtocol::Udp => 17,
        }
    }
}

/// Direction of a flow relative to the subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlowDirection {
    Upstream,
    Downstream,
}

impl fmt::Display for FlowDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowDirection::Upstream => write!(f, "upstream"),
            FlowDirection::Downstream => write!(f, "downstream"),
        }
    }
}

/// One match criterion in a selector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Criterion {
    InPort(PortNumber),
    EthType(EthType),
    EthDst(MacAddress),
    VlanVid(VlanId),
    InnerVlanVid(VlanId),
    VlanPcp(u8),
    IpProto(IpProtocol),
    UdpSrc(u16),
    UdpDst(u16),
    Metadata(u64),
}

/// Egress of an output instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputPort {
    Controller,
    Port(PortNumber),
}

impl fmt::Display for OutputPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputPort::Controller => write!(f, "CONTROLLER"),
            OutputPort::Port(p) => write!(f, "{p}"),
        }
    }
}

/// One action in a treatment, applied in order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instruction {
    PushVlan,
    PopVlan,
    SetVlan(VlanId),
    SetVlanPcp(u8),
    Meter(MeterId),
    WriteMetadata { value: u64, mask: u64 },
    Output(OutputPort),
}

/// Ordered set of match criteria
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficSelector {
    pub criteria: Vec<Criterion>,
}

impl TrafficSelector {
    /// Build from a criterion list
    pub fn new(criteria: Vec<Criterion>) -> Self {
        Self { criteria }
    }

    fn find<T, F: Fn(&Criterion) -> Option<T>>(&self, f: F) -> Option<T> {
        self.criteria.iter().find_map(f)
    }

    /// The ingress-port criterion, if present
    pub fn in_port(&self) -> Option<PortNumber> {
        self.find(|c| match c {
            Criterion::InPort(p) => Some(*p),
            _ => None,
        })
    }

    /// The ethernet-type criterion, if present
    pub fn eth_type(&self) -> Option<EthType> {
        self.find(|c| match c {
            Criterion::EthType(t) => Some(*t),
            _ => None,
        })
    }

    /// The outer-VLAN criterion, if present
    pub fn vlan_vid(&self) -> Option<VlanId> {
        self.find(|c| match c {
            Criterion::VlanVid(v) => Some(*v),
            _ => None,
        })
    }

    /// The IP-protocol criterion, if present
    pub fn ip_proto(&self) -> Option<IpProtocol> {
        self.find(|c| match c {
            Criterion::IpProto(p) => Some(*p),
            _ => None,
        })
    }

    /// The UDP source-port criterion, if present
    pub fn udp_src(&self) -> Option<u16> {
        self.find(|c| match c {
            Criterion::UdpSrc(p) => Some(*p),
            _ => None,
        })
    }
}

/// Ordered list of treatment instructions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficTreatment {
    pub instructions: Vec<Instruction>,
}

impl TrafficTreatment {
    /// Build from an instruction list
    pub fn new(instructions: Vec<Instruction>) -> Self {
        Self { instructions }
    }

    /// Whether the treatment rewrites to the given VLAN
    pub fn sets_vlan(&self, vlan: VlanId) -> bool {
        self.instructions
            .iter()
            .any(|i| matches!(i, Instruction::SetVlan(v) if *v == vlan))
    }

    /// The first VLAN the treatment pushes/sets, if any
    pub fn pushed_vlan(&self) -> Option<VlanId> {
        self.instructions.iter().find_map(|i| match i {
            Instruction::SetVlan(v) => Some(*v),
            _ => None,
        })
    }

    /// Meter references carried by the treatment
    pub fn meters(&self) -> Vec<MeterId> {
        self.instructions
            .iter()
            .filter_map(|i| match i {
                Instruction::Meter(m) => Some(*m),
                _ => None,
            })
            .collect()
    }
}

/// Whether a directive installs or withdraws state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectiveOp {
    Add,
    Remove,
}

impl fmt::Display for ObjectiveOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectiveOp::Add => write!(f, "add"),
            ObjectiveOp::Remove => write!(f, "remove"),
        }
    }
}

/// Trap-style directive sending matching packets to the controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilteringObjective {
    pub op: ObjectiveOp,
    pub selector: TrafficSelector,
    pub treatment: TrafficTreatment,
    pub priority: u32,
}

/// Data-plane match→treatment directive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardingObjective {
    pub op: ObjectiveOp,
    pub selector: TrafficSelector,
    pub treatment: TrafficTreatment,
    pub priority: u32,
}

/// A rule as reported back by the southbound in flow events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowRule {
    pub device: crate::domain::value_objects::DeviceId,
    pub app_id: String,
    pub priority: u32,
    pub selector: TrafficSelector,
    pub treatment: TrafficTreatment,
}
