//! Shared test fixtures: a recording southbound driver and a fully wired
//! service over the in-memory adapters.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;

use olt_control::adapters::{LocalSubscriberRegistry, SingleNodeCluster, StaticInventory};
use olt_control::domain::errors::ObjectiveError;
use olt_control::domain::ports::{FlowProgrammer, HostDescriptor, HostService};
use olt_control::domain::value_objects::{
    BandwidthProfileInformation, ConnectPoint, DeviceId, MacAddress, MeterId, PortNumber,
    SubscriberAndDeviceInformation, UniTagInformation, VlanId,
};
use olt_control::flows::{
    Criterion, EthType, FilteringObjective, FlowRule, ForwardingObjective, Instruction,
    OutputPort, TrafficSelector, TrafficTreatment, MAX_PRIORITY,
};
use olt_control::listener::{FlowRuleEvent, FlowRuleEventKind};
use olt_control::meters::MeterRequest;
use olt_control::service::AccessDeviceService;
use olt_control::{OltConfig, APP_NAME};

pub const DEVICE: &str = "of:00000a0a0a0a0a0a";
pub const SERIAL: &str = "OLT-001";
pub const UNI_NAME: &str = "BBSM0001-1";
pub const UNI_PORT: u32 = 16;
pub const NNI_PORT: u32 = 2;

/// Everything the southbound was asked to do
#[derive(Debug, Clone)]
pub enum RecordedOp {
    Filter(DeviceId, FilteringObjective),
    Forward(DeviceId, ForwardingObjective),
    MeterSubmit(DeviceId, MeterRequest),
    MeterWithdraw(DeviceId, MeterId),
    Purge(DeviceId),
}

/// Recording [`FlowProgrammer`]; meter installs can be gated to simulate a
/// slow southbound
pub struct RecordingProgrammer {
    ops: Mutex<Vec<RecordedOp>>,
    next_meter: AtomicU32,
    gated: AtomicBool,
    meter_gate: tokio::sync::Semaphore,
}

impl RecordingProgrammer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            ops: Mutex::new(Vec::new()),
            next_meter: AtomicU32::new(0),
            gated: AtomicBool::new(false),
            meter_gate: tokio::sync::Semaphore::new(0),
        })
    }

    /// Hold every meter install until [`Self::release_meters`]
    pub fn gate_meters(&self) {
        self.gated.store(true, Ordering::SeqCst);
    }

    pub fn release_meters(&self, count: usize) {
        self.meter_gate.add_permits(count);
    }

    pub fn ops(&self) -> Vec<RecordedOp> {
        self.ops.lock().clone()
    }

    pub fn clear(&self) {
        self.ops.lock().clear();
    }

    pub fn filters(&self) -> Vec<FilteringObjective> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                RecordedOp::Filter(_, f) => Some(f),
                _ => None,
            })
            .collect()
    }

    pub fn forwards(&self) -> Vec<ForwardingObjective> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                RecordedOp::Forward(_, f) => Some(f),
                _ => None,
            })
            .collect()
    }

    pub fn submitted_profiles(&self) -> Vec<String> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                RecordedOp::MeterSubmit(_, request) => Some(request.bandwidth_profile),
                _ => None,
            })
            .collect()
    }

    pub fn purges(&self) -> usize {
        self.ops()
            .iter()
            .filter(|op| matches!(op, RecordedOp::Purge(_)))
            .count()
    }
}

#[async_trait]
impl FlowProgrammer for RecordingProgrammer {
    async fn filter(
        &self,
        device: &DeviceId,
        objective: FilteringObjective,
    ) -> Result<(), ObjectiveError> {
        self.ops
            .lock()
            .push(RecordedOp::Filter(device.clone(), objective));
        Ok(())
    }

    async fn forward(
        &self,
        device: &DeviceId,
        objective: ForwardingObjective,
    ) -> Result<(), ObjectiveError> {
        self.ops
            .lock()
            .push(RecordedOp::Forward(device.clone(), objective));
        Ok(())
    }

    async fn submit_meter(
        &self,
        device: &DeviceId,
        request: MeterRequest,
    ) -> Result<MeterId, ObjectiveError> {
        self.ops
            .lock()
            .push(RecordedOp::MeterSubmit(device.clone(), request));
        if self.gated.load(Ordering::SeqCst) {
            let permit = self
                .meter_gate
                .acquire()
                .await
                .map_err(|_| ObjectiveError::Unknown("gate closed".to_string()))?;
            permit.forget();
        }
        Ok(MeterId::new(self.next_meter.fetch_add(1, Ordering::SeqCst) + 1))
    }

    async fn withdraw_meter(
        &self,
        device: &DeviceId,
        meter: MeterId,
    ) -> Result<(), ObjectiveError> {
        self.ops
            .lock()
            .push(RecordedOp::MeterWithdraw(device.clone(), meter));
        Ok(())
    }

    async fn purge_flows(&self, device: &DeviceId) -> Result<(), ObjectiveError> {
        self.ops.lock().push(RecordedOp::Purge(device.clone()));
        Ok(())
    }
}

/// Mutable [`HostService`] for MAC-learning scenarios
#[derive(Default)]
pub struct FixedHosts {
    hosts: RwLock<HashMap<ConnectPoint, Vec<HostDescriptor>>>,
}

impl FixedHosts {
    pub fn learn(&self, cp: ConnectPoint, mac: MacAddress, vlan: VlanId) {
        self.hosts
            .write()
            .entry(cp)
            .or_default()
            .push(HostDescriptor { mac, vlan });
    }
}

impl HostService for FixedHosts {
    fn connected_hosts(&self, cp: &ConnectPoint) -> Vec<HostDescriptor> {
        self.hosts.read().get(cp).cloned().unwrap_or_default()
    }
}

/// A wired service over one OLT with one NNI and one UNI
pub struct Harness {
    pub service: AccessDeviceService,
    pub programmer: Arc<RecordingProgrammer>,
    pub inventory: Arc<StaticInventory>,
    pub sadis: Arc<LocalSubscriberRegistry>,
    pub hosts: Arc<FixedHosts>,
    pub device: DeviceId,
}

impl Harness {
    pub fn uni(&self) -> ConnectPoint {
        ConnectPoint::new(self.device.clone(), PortNumber::new(UNI_PORT))
    }

    pub fn nni(&self) -> ConnectPoint {
        ConnectPoint::new(self.device.clone(), PortNumber::new(NNI_PORT))
    }

    /// Simulate the southbound confirming the default EAPOL trap removal
    pub fn confirm_default_eapol_removed(&self) {
        let rule = FlowRule {
            device: self.device.clone(),
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
        self.service
            .flow_event_sender()
            .send(FlowRuleEvent {
                kind: FlowRuleEventKind::Removed,
                rule,
            })
            .unwrap();
    }
}

/// One HSIA service definition matching the provisioning scenarios
pub fn hsia_tag() -> UniTagInformation {
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

pub fn test_config() -> OltConfig {
    OltConfig {
        retry_delay_millis: 10,
        ..OltConfig::default()
    }
}

pub fn harness_with(config: OltConfig, tags: Vec<UniTagInformation>) -> Harness {
    let device = DeviceId::from(DEVICE);
    let programmer = RecordingProgrammer::new();

    let inventory = Arc::new(StaticInventory::new());
    inventory.add_device(device.clone(), SERIAL);
    inventory.add_port(&device, PortNumber::new(NNI_PORT), "nni-2", true);
    inventory.add_port(&device, PortNumber::new(UNI_PORT), UNI_NAME, true);

    let sadis = Arc::new(LocalSubscriberRegistry::new());
    sadis.add_subscriber(SubscriberAndDeviceInformation {
        id: SERIAL.to_string(),
        uplink_port: Some(NNI_PORT),
        uni_tag_list: Vec::new(),
    });
    sadis.add_subscriber(SubscriberAndDeviceInformation {
        id: UNI_NAME.to_string(),
        uplink_port: None,
        uni_tag_list: tags,
    });
    for id in ["Default", "HSIA-US", "HSIA-DS"] {
        sadis.add_bandwidth_profile(BandwidthProfileInformation {
            id: id.to_string(),
            committed_information_rate: 100_000,
            committed_burst_size: 30,
            exceeded_information_rate: 200_000,
            exceeded_burst_size: 30,
            assured_information_rate: 0,
        });
    }

    let hosts = Arc::new(FixedHosts::default());
    let service = AccessDeviceService::builder()
        .config(config)
        .programmer(programmer.clone() as Arc<dyn FlowProgrammer>)
        .subscribers(sadis.clone())
        .hosts(hosts.clone())
        .inventory(inventory.clone())
        .cluster(Arc::new(SingleNodeCluster::new("local")))
        .build()
        .unwrap();

    Harness {
        service,
        programmer,
        inventory,
        sadis,
        hosts,
        device,
    }
}

pub fn harness() -> Harness {
    harness_with(test_config(), vec![hsia_tag()])
}

/// Let the spawned pumps and workers drain
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(150)).await;
}
