//! Pure translation of service definitions into flow directives
//!
//! The builder has no I/O and no state beyond its inputs; given the same
//! service definition and meter references it always produces the same
//! directive.

use super::{
    Criterion, EthType, FilteringObjective, FlowDirection, ForwardingObjective, Instruction,
    IpProtocol, ObjectiveOp, OutputPort, TrafficSelector, TrafficTreatment, MAX_PRIORITY,
    MIN_PRIORITY,
};
use crate::domain::value_objects::{
    MacAddress, MeterId, PortNumber, UniTagInformation, VlanId, NONE_TP_ID,
};

/// Stateless directive factory
#[derive(Debug, Clone, Copy)]
pub struct FlowBuilder {
    default_tech_profile_id: i32,
}

impl FlowBuilder {
    /// Create a builder substituting `default_tech_profile_id` for services
    /// that carry no technology profile
    pub fn new(default_tech_profile_id: i32) -> Self {
        Self {
            default_tech_profile_id,
        }
    }

    /// Write-metadata encoding (64-bit, MSB-first): bytes [0..1] inner VLAN,
    /// bytes [2..3] technology-profile id, bytes [4..7] egress port or
    /// upstream OLT meter id.
    fn write_metadata(&self, inner_vlan: Option<VlanId>, tech_profile_id: i32, low: u64) -> u64 {
        let vlan = inner_vlan.map_or(0u64, |v| u64::from(v.value()));
        let tp = if tech_profile_id == NONE_TP_ID {
            self.default_tech_profile_id
        } else {
            tech_profile_id
        };
        (vlan << 48) | (u64::from(tp as u32) << 32) | (low & 0xffff_ffff)
    }

    fn metadata_instruction(
        &self,
        inner_vlan: Option<VlanId>,
        tech_profile_id: i32,
        low: u64,
    ) -> Instruction {
        Instruction::WriteMetadata {
            value: self.write_metadata(inner_vlan, tech_profile_id, low),
            mask: u64::MAX,
        }
    }

    /// Default EAPOL trap, tagged with the reserved VLAN 4091 and metered by
    /// the default bandwidth profile
    pub fn default_eapol(
        &self,
        uni: PortNumber,
        meter: MeterId,
        op: ObjectiveOp,
    ) -> FilteringObjective {
        FilteringObjective {
            op,
            selector: TrafficSelector::new(vec![
                Criterion::InPort(uni),
                Criterion::EthType(EthType::Eapol),
            ]),
            treatment: TrafficTreatment::new(vec![
                Instruction::Meter(meter),
                self.metadata_instruction(None, NONE_TP_ID, 0),
                Instruction::PushVlan,
                Instruction::SetVlan(VlanId::EAPOL_DEFAULT),
                Instruction::Output(OutputPort::Controller),
            ]),
            priority: MAX_PRIORITY,
        }
    }

    /// Per-service EAPOL trap, tagged with the service ponCTag
    pub fn tagged_eapol(
        &self,
        uni: PortNumber,
        service: &UniTagInformation,
        meter: MeterId,
        olt_meter: Option<MeterId>,
        op: ObjectiveOp,
    ) -> FilteringObjective {
        let inner = service.pon_c_tag.is_concrete().then_some(service.pon_c_tag);
        FilteringObjective {
            op,
            selector: TrafficSelector::new(vec![
                Criterion::InPort(uni),
                Criterion::EthType(EthType::Eapol),
            ]),
            treatment: TrafficTreatment::new(vec![
                Instruction::Meter(meter),
                self.metadata_instruction(
                    inner,
                    service.technology_profile_id,
                    olt_meter.map_or(0, |m| u64::from(m.value())),
                ),
                Instruction::PushVlan,
                Instruction::SetVlan(service.pon_c_tag),
                Instruction::Output(OutputPort::Controller),
            ]),
            priority: MAX_PRIORITY,
        }
    }

    /// DHCP trap for one direction and IP version
    ///
    /// `service` is `None` on the NNI, where no VLAN rewrite and no
    /// subscriber meter apply.
    pub fn dhcp_trap(
        &self,
        port: PortNumber,
        direction: FlowDirection,
        ipv6: bool,
        service: Option<&UniTagInformation>,
        meter: Option<MeterId>,
        op: ObjectiveOp,
    ) -> FilteringObjective {
        let (udp_src, udp_dst) = match (direction, ipv6) {
            (FlowDirection::Upstream, false) => (68, 67),
            (FlowDirection::Downstream, false) => (67, 68),
            (FlowDirection::Upstream, true) => (546, 547),
            (FlowDirection::Downstream, true) => (547, 546),
        };
        let eth_type = if ipv6 { EthType::Ipv6 } else { EthType::Ipv4 };

        let mut criteria = vec![
            Criterion::InPort(port),
            Criterion::EthType(eth_type),
            Criterion::IpProto(IpProtocol::Udp),
            Criterion::UdpSrc(udp_src),
            Criterion::UdpDst(udp_dst),
        ];

        let mut instructions = Vec::new();
        if let Some(m) = meter {
            instructions.push(Instruction::Meter(m));
        }
        if direction == FlowDirection::Upstream {
            if let Some(tag) = service {
                if tag.uni_tag_match.is_concrete() {
                    criteria.push(Criterion::VlanVid(tag.uni_tag_match));
                }
                instructions.push(Instruction::PushVlan);
                instructions.push(Instruction::SetVlan(tag.pon_c_tag));
                if let Some(pcp) = tag.us_pon_c_tag_priority {
                    instructions.push(Instruction::SetVlanPcp(pcp));
                }
            }
        }
        instructions.push(Instruction::Output(OutputPort::Controller));

        FilteringObjective {
            op,
            selector: TrafficSelector::new(criteria),
            treatment: TrafficTreatment::new(instructions),
            priority: MAX_PRIORITY,
        }
    }

    /// IGMP trap; upstream rewrites to the service ponCTag, downstream
    /// (NNI) only traps
    pub fn igmp_trap(
        &self,
        port: PortNumber,
        direction: FlowDirection,
        service: Option<&UniTagInformation>,
        meter: Option<MeterId>,
        op: ObjectiveOp,
    ) -> FilteringObjective {
        let mut criteria = vec![
            Criterion::InPort(port),
            Criterion::EthType(EthType::Ipv4),
            Criterion::IpProto(IpProtocol::Igmp),
        ];

        let mut instructions = Vec::new();
        if let Some(m) = meter {
            instructions.push(Instruction::Meter(m));
        }
        if direction == FlowDirection::Upstream {
            if let Some(tag) = service {
                if tag.uni_tag_match.is_concrete() {
                    criteria.push(Criterion::VlanVid(tag.uni_tag_match));
                }
                if tag.pon_c_tag.is_concrete() {
                    instructions.push(Instruction::PushVlan);
                    instructions.push(Instruction::SetVlan(tag.pon_c_tag));
                }
                if let Some(pcp) = tag.us_pon_c_tag_priority {
                    instructions.push(Instruction::SetVlanPcp(pcp));
                }
            }
        }
        instructions.push(Instruction::Output(OutputPort::Controller));

        FilteringObjective {
            op,
            selector: TrafficSelector::new(criteria),
            treatment: TrafficTreatment::new(instructions),
            priority: MAX_PRIORITY,
        }
    }

    /// PPPoE-discovery trap
    pub fn pppoed_trap(
        &self,
        port: PortNumber,
        direction: FlowDirection,
        service: Option<&UniTagInformation>,
        meter: Option<MeterId>,
        op: ObjectiveOp,
    ) -> FilteringObjective {
        let mut criteria = vec![
            Criterion::InPort(port),
            Criterion::EthType(EthType::PppoeD),
        ];

        let mut instructions = Vec::new();
        if let Some(m) = meter {
            instructions.push(Instruction::Meter(m));
        }
        if direction == FlowDirection::Upstream {
            if let Some(tag) = service {
                if tag.uni_tag_match.is_concrete() {
                    criteria.push(Criterion::VlanVid(tag.uni_tag_match));
                }
                if tag.pon_c_tag.is_concrete() {
                    instructions.push(Instruction::PushVlan);
                    instructions.push(Instruction::SetVlan(tag.pon_c_tag));
                }
                if let Some(pcp) = tag.us_pon_c_tag_priority {
                    instructions.push(Instruction::SetVlanPcp(pcp));
                }
            }
        }
        instructions.push(Instruction::Output(OutputPort::Controller));

        FilteringObjective {
            op,
            selector: TrafficSelector::new(criteria),
            treatment: TrafficTreatment::new(instructions),
            priority: MAX_PRIORITY,
        }
    }

    /// LLDP trap, NNI only
    pub fn lldp_trap(&self, port: PortNumber, op: ObjectiveOp) -> FilteringObjective {
        FilteringObjective {
            op,
            selector: TrafficSelector::new(vec![
                Criterion::InPort(port),
                Criterion::EthType(EthType::Lldp),
            ]),
            treatment: TrafficTreatment::new(vec![Instruction::Output(OutputPort::Controller)]),
            priority: MAX_PRIORITY,
        }
    }

    /// Upstream data-plane forward, UNI → NNI
    pub fn upstream_data(
        &self,
        uni: PortNumber,
        uplink: PortNumber,
        service: &UniTagInformation,
        meter: Option<MeterId>,
        olt_meter: Option<MeterId>,
        op: ObjectiveOp,
    ) -> ForwardingObjective {
        let mut criteria = vec![Criterion::InPort(uni)];
        if !service.uni_tag_match.is_none() {
            criteria.push(Criterion::VlanVid(service.uni_tag_match));
        }

        let mut instructions = Vec::new();
        if !service.pon_c_tag.is_any() {
            instructions.push(Instruction::PushVlan);
            instructions.push(Instruction::SetVlan(service.pon_c_tag));
        }
        if service.pon_s_tag.is_any() {
            // Transparent outer tag: strip whatever C tag arrived
            instructions.push(Instruction::PopVlan);
        }
        if let Some(pcp) = service.us_pon_c_tag_priority {
            instructions.push(Instruction::SetVlanPcp(pcp));
        }
        if !service.pon_s_tag.is_any() {
            instructions.push(Instruction::PushVlan);
            instructions.push(Instruction::SetVlan(service.pon_s_tag));
        }
        if let Some(pcp) = service.us_pon_s_tag_priority {
            instructions.push(Instruction::SetVlanPcp(pcp));
        }
        let inner = (!service.pon_c_tag.is_any()).then_some(service.pon_c_tag);
        instructions.push(self.metadata_instruction(
            inner,
            service.technology_profile_id,
            u64::from(uplink.value()),
        ));
        if let Some(m) = meter {
            instructions.push(Instruction::Meter(m));
        }
        if let Some(m) = olt_meter {
            instructions.push(Instruction::Meter(m));
        }
        instructions.push(Instruction::Output(OutputPort::Port(uplink)));

        ForwardingObjective {
            op,
            selector: TrafficSelector::new(criteria),
            treatment: TrafficTreatment::new(instructions),
            priority: MIN_PRIORITY,
        }
    }

    /// Downstream data-plane forward, NNI → UNI
    pub fn downstream_data(
        &self,
        uni: PortNumber,
        uplink: PortNumber,
        service: &UniTagInformation,
        meter: Option<MeterId>,
        olt_meter: Option<MeterId>,
        dst_mac: Option<MacAddress>,
        op: ObjectiveOp,
    ) -> ForwardingObjective {
        let mut criteria = vec![
            Criterion::InPort(uplink),
            Criterion::VlanVid(service.pon_s_tag),
            Criterion::InnerVlanVid(service.pon_c_tag),
        ];
        if !service.pon_c_tag.is_any() {
            criteria.push(Criterion::Metadata(u64::from(service.pon_c_tag.value())));
        }
        if let Some(pcp) = service.ds_pon_s_tag_priority {
            criteria.push(Criterion::VlanPcp(pcp));
        }
        if let Some(mac) = dst_mac {
            criteria.push(Criterion::EthDst(mac));
        }

        let mut instructions = vec![Instruction::PopVlan];
        if let Some(pcp) = service.us_pon_c_tag_priority {
            instructions.push(Instruction::SetVlanPcp(pcp));
        }
        if !service.uni_tag_match.is_none() && !service.pon_c_tag.is_any() {
            instructions.push(Instruction::SetVlan(service.uni_tag_match));
        }
        let inner = (!service.pon_c_tag.is_any()).then_some(service.pon_c_tag);
        instructions.push(self.metadata_instruction(
            inner,
            service.technology_profile_id,
            u64::from(uni.value()),
        ));
        if let Some(m) = meter {
            instructions.push(Instruction::Meter(m));
        }
        if let Some(m) = olt_meter {
            instructions.push(Instruction::Meter(m));
        }
        instructions.push(Instruction::Output(OutputPort::Port(uni)));

        ForwardingObjective {
            op,
            selector: TrafficSelector::new(criteria),
            treatment: TrafficTreatment::new(instructions),
            priority: MIN_PRIORITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hsia() -> UniTagInformation {
        UniTagInformation {
            pon_c_tag: VlanId::new(101),
            pon_s_tag: VlanId::new(7),
            uni_tag_match: VlanId::ANY,
            technology_profile_id: 64,
            is_dhcp_required: true,
            upstream_bandwidth_profile: Some("HSIA-US".to_string()),
            downstream_bandwidth_profile: Some("HSIA-DS".to_string()),
            service_name: "HSIA".to_string(),
            ..UniTagInformation::default()
        }
    }

    #[test]
    fn default_eapol_shape() {
        let builder = FlowBuilder::new(64);
        let obj = builder.default_eapol(PortNumber::new(16), MeterId::new(1), ObjectiveOp::Add);

        assert_eq!(obj.priority, MAX_PRIORITY);
        assert_eq!(obj.selector.in_port(), Some(PortNumber::new(16)));
        assert_eq!(obj.selector.eth_type(), Some(EthType::Eapol));
        assert!(obj.treatment.sets_vlan(VlanId::EAPOL_DEFAULT));
        assert_eq!(obj.treatment.meters(), vec![MeterId::new(1)]);
        // Inner VLAN bytes zero, technology profile 64, no egress/meter bits
        assert!(obj
            .treatment
            .instructions
            .contains(&Instruction::WriteMetadata {
                value: 64u64 << 32,
                mask: u64::MAX,
            }));
        assert!(obj
            .treatment
            .instructions
            .contains(&Instruction::Output(OutputPort::Controller)));
    }

    #[test]
    fn tagged_eapol_uses_service_vlan_and_tech_profile() {
        let builder = FlowBuilder::new(64);
        let obj = builder.tagged_eapol(
            PortNumber::new(16),
            &hsia(),
            MeterId::new(3),
            Some(MeterId::new(9)),
            ObjectiveOp::Add,
        );

        assert!(obj.treatment.sets_vlan(VlanId::new(101)));
        assert!(obj
            .treatment
            .instructions
            .contains(&Instruction::WriteMetadata {
                value: (101u64 << 48) | (64u64 << 32) | 9,
                mask: u64::MAX,
            }));
    }

    #[test]
    fn dhcp_v4_upstream_ports_and_vlan_push() {
        let builder = FlowBuilder::new(64);
        let tag = hsia();
        let obj = builder.dhcp_trap(
            PortNumber::new(16),
            FlowDirection::Upstream,
            false,
            Some(&tag),
            Some(MeterId::new(3)),
            ObjectiveOp::Add,
        );

        assert_eq!(obj.selector.udp_src(), Some(68));
        assert!(obj
            .selector
            .criteria
            .contains(&Criterion::UdpDst(67)));
        // uniTagMatch is ANY, so no VLAN criterion
        assert_eq!(obj.selector.vlan_vid(), None);
        assert!(obj.treatment.sets_vlan(VlanId::new(101)));
    }

    #[test]
    fn dhcp_v4_downstream_nni_has_no_rewrite() {
        let builder = FlowBuilder::new(64);
        let obj = builder.dhcp_trap(
            PortNumber::new(2),
            FlowDirection::Downstream,
            false,
            None,
            None,
            ObjectiveOp::Add,
        );

        assert_eq!(obj.selector.udp_src(), Some(67));
        assert!(obj.selector.criteria.contains(&Criterion::UdpDst(68)));
        assert_eq!(obj.treatment.pushed_vlan(), None);
        assert!(obj.treatment.meters().is_empty());
    }

    #[test]
    fn dhcp_v6_port_pairs() {
        let builder = FlowBuilder::new(64);
        let up = builder.dhcp_trap(
            PortNumber::new(16),
            FlowDirection::Upstream,
            true,
            None,
            None,
            ObjectiveOp::Add,
        );
        assert_eq!(up.selector.udp_src(), Some(546));
        assert!(up.selector.criteria.contains(&Criterion::UdpDst(547)));

        let down = builder.dhcp_trap(
            PortNumber::new(2),
            FlowDirection::Downstream,
            true,
            None,
            None,
            ObjectiveOp::Add,
        );
        assert_eq!(down.selector.udp_src(), Some(547));
        assert!(down.selector.criteria.contains(&Criterion::UdpDst(546)));
    }

    #[test]
    fn upstream_data_push_order() {
        let builder = FlowBuilder::new(64);
        let obj = builder.upstream_data(
            PortNumber::new(16),
            PortNumber::new(2),
            &hsia(),
            Some(MeterId::new(3)),
            None,
            ObjectiveOp::Add,
        );

        assert_eq!(obj.priority, MIN_PRIORITY);
        assert_eq!(obj.selector.in_port(), Some(PortNumber::new(16)));
        assert_eq!(obj.selector.vlan_vid(), Some(VlanId::ANY));

        // C tag pushed before S tag, then metered and forwarded to uplink
        let vlans: Vec<_> = obj
            .treatment
            .instructions
            .iter()
            .filter_map(|i| match i {
                Instruction::SetVlan(v) => Some(*v),
                _ => None,
            })
            .collect();
        assert_eq!(vlans, vec![VlanId::new(101), VlanId::new(7)]);
        assert!(obj
            .treatment
            .instructions
            .contains(&Instruction::Output(OutputPort::Port(PortNumber::new(2)))));
        assert_eq!(obj.treatment.meters(), vec![MeterId::new(3)]);
    }

    #[test]
    fn upstream_data_transparent_s_tag_pops() {
        let builder = FlowBuilder::new(64);
        let tag = UniTagInformation {
            pon_s_tag: VlanId::ANY,
            ..hsia()
        };
        let obj = builder.upstream_data(
            PortNumber::new(16),
            PortNumber::new(2),
            &tag,
            None,
            None,
            ObjectiveOp::Add,
        );
        assert!(obj.treatment.instructions.contains(&Instruction::PopVlan));
        assert!(!obj.treatment.sets_vlan(VlanId::ANY));
    }

    #[test]
    fn downstream_data_shape() {
        let builder = FlowBuilder::new(64);
        let obj = builder.downstream_data(
            PortNumber::new(16),
            PortNumber::new(2),
            &hsia(),
            Some(MeterId::new(4)),
            None,
            None,
            ObjectiveOp::Add,
        );

        assert_eq!(obj.selector.in_port(), Some(PortNumber::new(2)));
        assert_eq!(obj.selector.vlan_vid(), Some(VlanId::new(7)));
        assert!(obj
            .selector
            .criteria
            .contains(&Criterion::InnerVlanVid(VlanId::new(101))));
        assert!(obj.selector.criteria.contains(&Criterion::Metadata(101)));

        assert_eq!(obj.treatment.instructions[0], Instruction::PopVlan);
        assert!(obj
            .treatment
            .instructions
            .contains(&Instruction::Output(OutputPort::Port(PortNumber::new(16)))));
        assert_eq!(obj.treatment.meters(), vec![MeterId::new(4)]);
    }

    #[test]
    fn downstream_data_matches_learned_mac() {
        let builder = FlowBuilder::new(64);
        let mac: MacAddress = "a4:23:05:00:00:01".parse().unwrap();
        let obj = builder.downstream_data(
            PortNumber::new(16),
            PortNumber::new(2),
            &hsia(),
            None,
            None,
            Some(mac),
            ObjectiveOp::Add,
        );
        assert!(obj.selector.criteria.contains(&Criterion::EthDst(mac)));
    }

    #[test]
    fn tech_profile_substitution() {
        let builder = FlowBuilder::new(64);
        let tag = UniTagInformation {
            technology_profile_id: NONE_TP_ID,
            ..hsia()
        };
        let obj = builder.upstream_data(
            PortNumber::new(16),
            PortNumber::new(2),
            &tag,
            None,
            None,
            ObjectiveOp::Add,
        );
        let metadata = obj.treatment.instructions.iter().find_map(|i| match i {
            Instruction::WriteMetadata { value, .. } => Some(*value),
            _ => None,
        });
        assert_eq!(metadata, Some((101u64 << 48) | (64u64 << 32) | 2));
    }
}
