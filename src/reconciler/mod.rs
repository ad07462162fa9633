//! # Reconciler
//!
//! Drives the forwarding state of every owned device towards the desired
//! state derived from operator intent and live device events. Work arrives
//! as [`ReconcileRequest`] values; each request is idempotent, so a task
//! that parks on a pending condition (meter install, MAC learning, flow
//! removal) is simply re-executed once the condition completes.

pub mod executor;

pub use executor::ReconcilerRunner;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::cluster::DeviceOwnership;
use crate::config::OltConfig;
use crate::domain::errors::{ObjectiveError, OltError};
use crate::domain::events::{AccessDeviceEvent, StampedEvent, SubscriberEventInfo};
use crate::domain::ports::{DeviceInventory, FlowProgrammer, HostService, SubscriberService};
use crate::domain::status::OltFlowsStatus;
use crate::domain::value_objects::{
    AccessDevicePort, ConnectPoint, DeviceId, MacAddress, MeterId, PortNumber, ServiceKey,
    UniTagInformation, VlanId,
};
use crate::flows::{FlowBuilder, FlowDirection, ObjectiveOp};
use crate::meters::{MeterCache, MeterOutcome};
use crate::store::{ReplicatedMap, StatusStore, StatusUpdate};

/// One unit of reconciliation work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReconcileRequest {
    PortUp(ConnectPoint),
    PortDown(ConnectPoint),
    DeviceUp(DeviceId),
    DeviceDown(DeviceId),
    Provision(ConnectPoint),
    Remove(ConnectPoint),
    ProvisionService {
        cp: ConnectPoint,
        s_tag: VlanId,
        c_tag: VlanId,
        tp_id: i32,
    },
    RemoveService {
        cp: ConnectPoint,
        s_tag: VlanId,
        c_tag: VlanId,
        tp_id: i32,
    },
}

/// Condition a task is waiting on when it reports "not done"
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParkReason {
    /// A required meter install has been requested but not confirmed
    MeterInstall { device: DeviceId },
    /// MAC learning is enabled and no host has been observed yet
    MacLearning { cp: ConnectPoint, vlan: VlanId },
    /// A flow removal must complete before the next add is emitted
    FlowRemoval,
}

/// Result of one reconciliation pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Desired state reached (or nothing to do)
    Done,
    /// Device not owned by this instance; no directives were emitted
    Skipped,
    /// Task parked on a pending condition; re-execute when it completes
    NotDone(ParkReason),
}

/// Meters resolved for one service
#[derive(Debug, Clone, Copy, Default)]
struct ServiceMeters {
    us: Option<MeterId>,
    ds: Option<MeterId>,
    us_olt: Option<MeterId>,
    ds_olt: Option<MeterId>,
}

/// The per-device reconciliation engine
pub struct Reconciler {
    config: OltConfig,
    builder: FlowBuilder,
    programmer: Arc<dyn FlowProgrammer>,
    subscribers: Arc<dyn SubscriberService>,
    hosts: Arc<dyn HostService>,
    inventory: Arc<dyn DeviceInventory>,
    ownership: Arc<DeviceOwnership>,
    meters: Arc<MeterCache>,
    store: StatusStore,
    additional_vlans: ReplicatedMap<ConnectPoint, Vec<(VlanId, VlanId)>>,
    events: broadcast::Sender<StampedEvent>,
    wake_tx: mpsc::UnboundedSender<ReconcileRequest>,
    mac_waiters: Mutex<HashMap<(ConnectPoint, VlanId), (Vec<ReconcileRequest>, u32)>>,
}

impl Reconciler {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        config: OltConfig,
        programmer: Arc<dyn FlowProgrammer>,
        subscribers: Arc<dyn SubscriberService>,
        hosts: Arc<dyn HostService>,
        inventory: Arc<dyn DeviceInventory>,
        ownership: Arc<DeviceOwnership>,
        meters: Arc<MeterCache>,
        store: StatusStore,
        events: broadcast::Sender<StampedEvent>,
        wake_tx: mpsc::UnboundedSender<ReconcileRequest>,
    ) -> Self {
        let builder = FlowBuilder::new(config.default_tech_profile_id);
        Self {
            config,
            builder,
            programmer,
            subscribers,
            hosts,
            inventory,
            ownership,
            meters,
            store,
            additional_vlans: ReplicatedMap::new("volt-additional-vlans"),
            events,
            wake_tx,
            mac_waiters: Mutex::new(HashMap::new()),
        }
    }

    /// Execute one request to completion or to its first pending condition
    pub async fn handle(&self, request: &ReconcileRequest) -> Result<Outcome, OltError> {
        match request {
            ReconcileRequest::PortUp(cp) => self.port_up(cp).await,
            ReconcileRequest::PortDown(cp) => self.port_down(cp).await,
            ReconcileRequest::DeviceUp(device) => self.device_up(device).await,
            ReconcileRequest::DeviceDown(device) => self.purge_device(device).await,
            ReconcileRequest::Provision(cp) => self.provision_subscriber(cp).await,
            ReconcileRequest::Remove(cp) => self.remove_subscriber(cp).await,
            ReconcileRequest::ProvisionService {
                cp,
                s_tag,
                c_tag,
                tp_id,
            } => self.provision_service(cp, *s_tag, *c_tag, *tp_id).await,
            ReconcileRequest::RemoveService {
                cp,
                s_tag,
                c_tag,
                tp_id,
            } => self.remove_service(cp, *s_tag, *c_tag, *tp_id).await,
        }
    }

    // ------------------------------------------------------------------
    // Device and port events
    // ------------------------------------------------------------------

    async fn device_up(&self, device: &DeviceId) -> Result<Outcome, OltError> {
        if !self.ownership.is_device_mine(device) {
            return Ok(Outcome::Skipped);
        }
        info!(%device, "device connected");
        self.post(AccessDeviceEvent::DeviceConnected {
            device_id: device.clone(),
        });

        let mut parked = None;
        for port in self.inventory.ports(device) {
            if !port.enabled {
                continue;
            }
            let cp = ConnectPoint::new(device.clone(), port.number);
            match self.port_up(&cp).await? {
                Outcome::NotDone(reason) if parked.is_none() => parked = Some(reason),
                _ => {}
            }
        }
        Ok(parked.map_or(Outcome::Done, Outcome::NotDone))
    }

    async fn port_up(&self, cp: &ConnectPoint) -> Result<Outcome, OltError> {
        if !self.ownership.is_device_mine(&cp.device) {
            return Ok(Outcome::Skipped);
        }
        let Some(descriptor) = self.inventory.port(cp) else {
            // Port disappeared between event and task execution
            return Ok(Outcome::Done);
        };
        if !descriptor.enabled {
            return Ok(Outcome::Done);
        }

        if self.is_nni(&cp.device, descriptor.number, &descriptor.name) {
            self.install_nni_flows(&cp.device, descriptor.number, ObjectiveOp::Add)
                .await?;
            return Ok(Outcome::Done);
        }

        let port = AccessDevicePort::new(cp.device.clone(), descriptor.number, descriptor.name);
        self.post(AccessDeviceEvent::UniAdded {
            device_id: cp.device.clone(),
            port: port.number(),
        });

        if self.config.enable_eapol && !self.store.has_default_eapol(&port) {
            return self.install_default_eapol(&port).await;
        }
        Ok(Outcome::Done)
    }

    async fn port_down(&self, cp: &ConnectPoint) -> Result<Outcome, OltError> {
        if !self.ownership.is_device_mine(&cp.device) {
            return Ok(Outcome::Skipped);
        }

        let uplink = self.uplink_port(&cp.device);
        let mut was_uni = false;

        for key in self.store.keys_for_connect_point(cp) {
            let service = key.service().clone();
            let port = key.port().clone();

            if service.service_name == UniTagInformation::nni().service_name {
                self.install_nni_flows(&cp.device, port.number(), ObjectiveOp::Remove)
                    .await?;
                continue;
            }
            was_uni = true;

            if service.service_name == UniTagInformation::default_eapol().service_name {
                self.remove_default_eapol(&port).await?;
                continue;
            }

            // Subscriber flows go, operator intent stays for reconnection
            self.remove_service_flows(&port, &service, uplink).await?;
        }

        if was_uni {
            self.post(AccessDeviceEvent::UniRemoved {
                device_id: cp.device.clone(),
                port: cp.port,
            });
        }
        Ok(Outcome::Done)
    }

    /// Bulk purge of a departing device
    async fn purge_device(&self, device: &DeviceId) -> Result<Outcome, OltError> {
        if !self.ownership.is_device_mine(device) {
            return Ok(Outcome::Skipped);
        }
        info!(%device, "purging device state");

        if let Err(err) = self.programmer.purge_flows(device).await {
            warn!(%device, %err, "southbound purge failed; dropping state anyway");
        }
        self.store.purge_device(device);
        self.meters.clear(device);
        self.mac_waiters
            .lock()
            .retain(|(cp, _), _| cp.device != *device);
        self.additional_vlans.retain(|cp, _| cp.device != *device);

        self.post(AccessDeviceEvent::DeviceDisconnected {
            device_id: device.clone(),
        });
        Ok(Outcome::Done)
    }

    // ------------------------------------------------------------------
    // Subscriber provisioning
    // ------------------------------------------------------------------

    async fn provision_subscriber(&self, cp: &ConnectPoint) -> Result<Outcome, OltError> {
        if !self.ownership.is_device_mine(&cp.device) {
            return Ok(Outcome::Skipped);
        }
        let port = self.access_port(cp)?;
        if self.is_nni(&cp.device, port.number(), port.name()) {
            return Err(OltError::BadRequest(format!(
                "{cp} is an NNI; subscribers live on UNIs"
            )));
        }

        let subscriber = self
            .subscribers
            .subscriber_by_port_name(port.name())
            .ok_or_else(|| OltError::NotConfigured(port.name().to_string()))?;
        let uplink = self
            .uplink_port(&cp.device)
            .ok_or_else(|| OltError::NotConfigured(cp.device.to_string()))?;

        // Every meter must be confirmed before any flow references it
        let mut meters_pending = false;
        for tag in &subscriber.uni_tag_list {
            meters_pending |= self.ensure_service_meters(&cp.device, tag)?;
        }
        if meters_pending {
            return Ok(Outcome::NotDone(ParkReason::MeterInstall {
                device: cp.device.clone(),
            }));
        }

        // The default trap and the tagged per-service trap are mutually
        // exclusive on one UNI
        if self.store.has_default_eapol(&port) {
            self.remove_default_eapol(&port).await?;
            if self.config.wait_for_removal {
                return Ok(Outcome::NotDone(ParkReason::FlowRemoval));
            }
        } else if self.store.is_default_eapol_pending_removal(&port) {
            return Ok(Outcome::NotDone(ParkReason::FlowRemoval));
        }

        for tag in &subscriber.uni_tag_list {
            if let Some(outcome) = self.provision_one_service(&port, tag, uplink).await? {
                return Ok(outcome);
            }
        }
        Ok(Outcome::Done)
    }

    /// Install flows for one service; returns `Some` when the task must park
    async fn provision_one_service(
        &self,
        port: &AccessDevicePort,
        tag: &UniTagInformation,
        uplink: PortNumber,
    ) -> Result<Option<Outcome>, OltError> {
        let key = ServiceKey::new(port.clone(), tag.clone());
        let meters = self.resolve_meters(port.device(), tag);

        if tag.is_dhcp_required && !self.store.has_dhcp_flows(port, tag) {
            self.install_dhcp(&key, tag, meters.us, ObjectiveOp::Add)
                .await?;
        }

        if tag.enable_mac_learning && self.downstream_dst_mac(port, tag).is_none() {
            debug!(%key, "waiting for MAC learning");
            return Ok(Some(Outcome::NotDone(ParkReason::MacLearning {
                cp: port.connect_point(),
                vlan: tag.pon_c_tag,
            })));
        }

        let is_multicast = tag.service_name == self.config.multicast_service_name;
        if !is_multicast && !self.store.has_subscriber_flows(port, tag) {
            self.install_dataplane(&key, tag, uplink, meters, ObjectiveOp::Add)
                .await?;

            if self.config.enable_eapol {
                if let Some(us_meter) = meters.us {
                    let objective = self.builder.tagged_eapol(
                        port.number(),
                        tag,
                        us_meter,
                        meters.us_olt,
                        ObjectiveOp::Add,
                    );
                    self.apply_filter(&key, port.device(), objective, StatusTrack::Subscriber)
                        .await?;
                } else {
                    warn!(%key, "no upstream meter; skipping tagged EAPOL trap");
                }
            }
        }

        if tag.is_igmp_required && !self.store.is_provisioned(&key) {
            let objective = self.builder.igmp_trap(
                port.number(),
                FlowDirection::Upstream,
                Some(tag),
                meters.us,
                ObjectiveOp::Add,
            );
            self.apply_filter(&key, port.device(), objective, StatusTrack::Subscriber)
                .await?;
        }

        if !self.store.is_provisioned(&key) {
            self.store.set_provisioned(key.clone(), true);
            self.post(AccessDeviceEvent::SubscriberUniTagRegistered(
                Self::event_info(&key),
            ));
        }
        Ok(None)
    }

    async fn remove_subscriber(&self, cp: &ConnectPoint) -> Result<Outcome, OltError> {
        if !self.ownership.is_device_mine(&cp.device) {
            return Ok(Outcome::Skipped);
        }
        let Some(descriptor) = self.inventory.port(cp) else {
            // The port is gone; intent cleanup is all that is left
            for key in self.store.provisioned_for_connect_point(cp) {
                self.store.clear_provisioned(&key);
            }
            return Ok(Outcome::Done);
        };
        let port = AccessDevicePort::new(cp.device.clone(), descriptor.number, descriptor.name);
        let uplink = self.uplink_port(&cp.device);

        // Subscriber-service record preferred; fall back to tracked keys so
        // removal still drains when the subscriber was deleted upstream
        let tags: Vec<UniTagInformation> = match self.subscribers.subscriber_by_port_name(port.name())
        {
            Some(info) => info.uni_tag_list,
            None => self
                .store
                .provisioned_for_port(&port)
                .into_iter()
                .map(|k| k.service().clone())
                .collect(),
        };

        for tag in &tags {
            self.remove_service_flows(&port, tag, uplink).await?;

            let key = ServiceKey::new(port.clone(), tag.clone());
            if self.store.is_provisioned(&key) {
                self.store.clear_provisioned(&key);
                self.post(AccessDeviceEvent::SubscriberUniTagUnregistered(
                    Self::event_info(&key),
                ));
            }
        }

        // The port reverts to its freshly-seen state
        if descriptor.enabled && self.config.enable_eapol && !self.store.has_default_eapol(&port) {
            return self.install_default_eapol(&port).await;
        }
        Ok(Outcome::Done)
    }

    // ------------------------------------------------------------------
    // Single-service (transparent tag) provisioning
    // ------------------------------------------------------------------

    async fn provision_service(
        &self,
        cp: &ConnectPoint,
        s_tag: VlanId,
        c_tag: VlanId,
        tp_id: i32,
    ) -> Result<Outcome, OltError> {
        if !self.ownership.is_device_mine(&cp.device) {
            return Ok(Outcome::Skipped);
        }
        let port = self.access_port(cp)?;
        let tag = self.find_service(&port, s_tag, c_tag, tp_id)?;
        let uplink = self
            .uplink_port(&cp.device)
            .ok_or_else(|| OltError::NotConfigured(cp.device.to_string()))?;

        if self.ensure_service_meters(&cp.device, &tag)? {
            return Ok(Outcome::NotDone(ParkReason::MeterInstall {
                device: cp.device.clone(),
            }));
        }

        let key = ServiceKey::new(port.clone(), tag.clone());
        if !self.store.has_subscriber_flows(&port, &tag) {
            let meters = self.resolve_meters(&cp.device, &tag);
            self.install_dataplane(&key, &tag, uplink, meters, ObjectiveOp::Add)
                .await?;
        }

        self.additional_vlans.compute(cp.clone(), |current| {
            let mut vlans = current.unwrap_or_default();
            if !vlans.contains(&(s_tag, c_tag)) {
                vlans.push((s_tag, c_tag));
            }
            Some(vlans)
        });

        if !self.store.is_provisioned(&key) {
            self.store.set_provisioned(key.clone(), true);
            self.post(AccessDeviceEvent::SubscriberUniTagRegistered(
                Self::event_info(&key),
            ));
        }
        Ok(Outcome::Done)
    }

    async fn remove_service(
        &self,
        cp: &ConnectPoint,
        s_tag: VlanId,
        c_tag: VlanId,
        tp_id: i32,
    ) -> Result<Outcome, OltError> {
        if !self.ownership.is_device_mine(&cp.device) {
            return Ok(Outcome::Skipped);
        }
        let port = self.access_port(cp)?;
        let tag = self.find_service(&port, s_tag, c_tag, tp_id)?;
        let uplink = self.uplink_port(&cp.device);

        let key = ServiceKey::new(port.clone(), tag.clone());
        if self.store.has_subscriber_flows(&port, &tag) {
            if let Some(uplink) = uplink {
                let meters = self.resolve_meters(&cp.device, &tag);
                self.install_dataplane(&key, &tag, uplink, meters, ObjectiveOp::Remove)
                    .await?;
            }
        }

        self.additional_vlans.compute(cp.clone(), |current| {
            let mut vlans = current.unwrap_or_default();
            vlans.retain(|pair| *pair != (s_tag, c_tag));
            (!vlans.is_empty()).then_some(vlans)
        });

        if self.store.is_provisioned(&key) {
            self.store.clear_provisioned(&key);
            self.post(AccessDeviceEvent::SubscriberUniTagUnregistered(
                Self::event_info(&key),
            ));
        }
        Ok(Outcome::Done)
    }

    // ------------------------------------------------------------------
    // Flow emission helpers
    // ------------------------------------------------------------------

    async fn install_default_eapol(&self, port: &AccessDevicePort) -> Result<Outcome, OltError> {
        let device = port.device().clone();
        match self.meters.ensure_meter(&device, &self.config.default_bp_id) {
            MeterOutcome::Ready(meter) => {
                let key = StatusStore::default_eapol_key(port);
                self.store
                    .update(&key, StatusUpdate::default_eapol(OltFlowsStatus::PendingAdd));
                let objective =
                    self.builder
                        .default_eapol(port.number(), meter, ObjectiveOp::Add);
                self.apply_filter(&key, &device, objective, StatusTrack::DefaultEapol)
                    .await?;
                Ok(Outcome::Done)
            }
            MeterOutcome::Requested => Ok(Outcome::NotDone(ParkReason::MeterInstall { device })),
            MeterOutcome::MissingProfile => {
                Err(OltError::NotConfigured(self.config.default_bp_id.clone()))
            }
        }
    }

    async fn remove_default_eapol(&self, port: &AccessDevicePort) -> Result<(), OltError> {
        let device = port.device().clone();
        let Some(meter) = self.meters.meter_for(&device, &self.config.default_bp_id) else {
            warn!(%port, "no default meter bound; skipping EAPOL removal");
            return Ok(());
        };
        let key = StatusStore::default_eapol_key(port);
        self.store.update(
            &key,
            StatusUpdate::default_eapol(OltFlowsStatus::PendingRemove),
        );
        let objective = self
            .builder
            .default_eapol(port.number(), meter, ObjectiveOp::Remove);
        self.apply_filter(&key, &device, objective, StatusTrack::DefaultEapol)
            .await
    }

    /// Withdraw every flow of one service, statuses transitioning to
    /// pending-remove. Operator intent is untouched.
    async fn remove_service_flows(
        &self,
        port: &AccessDevicePort,
        tag: &UniTagInformation,
        uplink: Option<PortNumber>,
    ) -> Result<(), OltError> {
        let key = ServiceKey::new(port.clone(), tag.clone());
        let meters = self.resolve_meters(port.device(), tag);

        if self.store.has_subscriber_flows(port, tag) {
            if self.config.enable_eapol {
                if let Some(us_meter) = meters.us {
                    let objective = self.builder.tagged_eapol(
                        port.number(),
                        tag,
                        us_meter,
                        meters.us_olt,
                        ObjectiveOp::Remove,
                    );
                    self.apply_filter(&key, port.device(), objective, StatusTrack::Subscriber)
                        .await?;
                }
            }
            if let Some(uplink) = uplink {
                self.install_dataplane(&key, tag, uplink, meters, ObjectiveOp::Remove)
                    .await?;
            } else {
                warn!(%key, "uplink unknown; data-plane flows left to device purge");
            }
        }

        if self.store.has_dhcp_flows(port, tag) {
            self.install_dhcp(&key, tag, meters.us, ObjectiveOp::Remove)
                .await?;
        }

        if tag.is_igmp_required {
            let objective = self.builder.igmp_trap(
                port.number(),
                FlowDirection::Upstream,
                Some(tag),
                meters.us,
                ObjectiveOp::Remove,
            );
            self.apply_filter(&key, port.device(), objective, StatusTrack::Subscriber)
                .await?;
        }
        Ok(())
    }

    async fn install_dhcp(
        &self,
        key: &ServiceKey,
        tag: &UniTagInformation,
        meter: Option<MeterId>,
        op: ObjectiveOp,
    ) -> Result<(), OltError> {
        let status = match op {
            ObjectiveOp::Add => OltFlowsStatus::PendingAdd,
            ObjectiveOp::Remove => OltFlowsStatus::PendingRemove,
        };
        self.store.update(key, StatusUpdate::dhcp(status));

        let port = key.port().number();
        if self.config.enable_dhcp_v4 {
            let objective = self
                .builder
                .dhcp_trap(port, FlowDirection::Upstream, false, Some(tag), meter, op);
            self.apply_filter(key, key.port().device(), objective, StatusTrack::Dhcp)
                .await?;
        }
        if self.config.enable_dhcp_v6 {
            let objective = self
                .builder
                .dhcp_trap(port, FlowDirection::Upstream, true, Some(tag), meter, op);
            self.apply_filter(key, key.port().device(), objective, StatusTrack::Dhcp)
                .await?;
        }
        Ok(())
    }

    async fn install_dataplane(
        &self,
        key: &ServiceKey,
        tag: &UniTagInformation,
        uplink: PortNumber,
        meters: ServiceMeters,
        op: ObjectiveOp,
    ) -> Result<(), OltError> {
        let status = match op {
            ObjectiveOp::Add => OltFlowsStatus::PendingAdd,
            ObjectiveOp::Remove => OltFlowsStatus::PendingRemove,
        };
        self.store.update(key, StatusUpdate::subscriber_flows(status));

        let port = key.port();
        let upstream = self.builder.upstream_data(
            port.number(),
            uplink,
            tag,
            meters.us,
            meters.us_olt,
            op,
        );
        self.apply_forward(key, port.device(), upstream).await?;

        let downstream = self.builder.downstream_data(
            port.number(),
            uplink,
            tag,
            meters.ds,
            meters.ds_olt,
            self.downstream_dst_mac(port, tag),
            op,
        );
        self.apply_forward(key, port.device(), downstream).await
    }

    async fn install_nni_flows(
        &self,
        device: &DeviceId,
        port: PortNumber,
        op: ObjectiveOp,
    ) -> Result<(), OltError> {
        debug!(%device, %port, %op, "programming NNI trap flows");
        self.programmer
            .filter(device, self.builder.lldp_trap(port, op))
            .await
            .map_err(OltError::Southbound)?;

        if self.config.enable_dhcp_on_nni {
            if self.config.enable_dhcp_v4 {
                let objective =
                    self.builder
                        .dhcp_trap(port, FlowDirection::Downstream, false, None, None, op);
                self.programmer
                    .filter(device, objective)
                    .await
                    .map_err(OltError::Southbound)?;
            }
            if self.config.enable_dhcp_v6 {
                let objective =
                    self.builder
                        .dhcp_trap(port, FlowDirection::Downstream, true, None, None, op);
                self.programmer
                    .filter(device, objective)
                    .await
                    .map_err(OltError::Southbound)?;
            }
        }
        if self.config.enable_igmp_on_nni {
            let objective =
                self.builder
                    .igmp_trap(port, FlowDirection::Downstream, None, None, op);
            self.programmer
                .filter(device, objective)
                .await
                .map_err(OltError::Southbound)?;
        }
        if self.config.enable_pppoe {
            let objective =
                self.builder
                    .pppoed_trap(port, FlowDirection::Downstream, None, None, op);
            self.programmer
                .filter(device, objective)
                .await
                .map_err(OltError::Southbound)?;
        }
        Ok(())
    }

    async fn apply_filter(
        &self,
        key: &ServiceKey,
        device: &DeviceId,
        objective: crate::flows::FilteringObjective,
        track: StatusTrack,
    ) -> Result<(), OltError> {
        let op = objective.op;
        match self.programmer.filter(device, objective).await {
            Ok(()) => Ok(()),
            Err(err) => {
                self.record_failure(key, track, op, &err);
                Err(OltError::Southbound(err))
            }
        }
    }

    async fn apply_forward(
        &self,
        key: &ServiceKey,
        device: &DeviceId,
        objective: crate::flows::ForwardingObjective,
    ) -> Result<(), OltError> {
        let op = objective.op;
        match self.programmer.forward(device, objective).await {
            Ok(()) => Ok(()),
            Err(err) => {
                self.record_failure(key, StatusTrack::Subscriber, op, &err);
                Err(OltError::Southbound(err))
            }
        }
    }

    fn record_failure(
        &self,
        key: &ServiceKey,
        track: StatusTrack,
        op: ObjectiveOp,
        err: &ObjectiveError,
    ) {
        warn!(%key, %op, %err, "southbound rejected objective");
        let update = match track {
            StatusTrack::DefaultEapol => StatusUpdate::default_eapol(OltFlowsStatus::Error),
            StatusTrack::Subscriber => StatusUpdate::subscriber_flows(OltFlowsStatus::Error),
            StatusTrack::Dhcp => StatusUpdate::dhcp(OltFlowsStatus::Error),
        };
        self.store.update(key, update);

        let info = Self::event_info(key);
        let event = match op {
            ObjectiveOp::Add => AccessDeviceEvent::SubscriberUniTagRegistrationFailed(info),
            ObjectiveOp::Remove => AccessDeviceEvent::SubscriberUniTagUnregistrationFailed(info),
        };
        self.post(event);
    }

    // ------------------------------------------------------------------
    // Parking
    // ------------------------------------------------------------------

    /// Hand a not-done task to whichever component completes its awaited
    /// condition
    pub fn park(&self, reason: ParkReason, request: ReconcileRequest) {
        match reason {
            ParkReason::MeterInstall { device } => self.meters.park(&device, request),
            ParkReason::MacLearning { cp, vlan } => self.park_on_mac(cp, vlan, request),
            ParkReason::FlowRemoval => {
                let tx = self.wake_tx.clone();
                let delay =
                    std::time::Duration::from_millis(self.config.retry_delay_millis);
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = tx.send(request);
                });
            }
        }
    }

    /// Park a task until a host appears on (connect point, ponCTag);
    /// attempts beyond the configured cap are dropped
    pub fn park_on_mac(&self, cp: ConnectPoint, vlan: VlanId, request: ReconcileRequest) {
        let key = (cp, vlan);
        {
            let mut waiters = self.mac_waiters.lock();
            let entry = waiters.entry(key.clone()).or_default();
            entry.1 += 1;
            let attempts = entry.1;
            if attempts > self.config.mac_learning_retries {
                warn!(cp = %key.0, %vlan, attempts, "giving up on MAC learning; dropping task");
                waiters.remove(&key);
                return;
            }
            entry.0.push(request);
        }
        // The host may have shown up between the caller's check and the
        // park; re-check so the task cannot strand
        let learned = self
            .hosts
            .connected_hosts(&key.0)
            .iter()
            .any(|h| h.vlan == key.1);
        if learned {
            self.on_host_discovered(&key.0, key.1);
        }
    }

    /// Host discovery completed; resume every task parked on the connect point
    pub fn on_host_discovered(&self, cp: &ConnectPoint, vlan: VlanId) {
        let parked = self.mac_waiters.lock().remove(&(cp.clone(), vlan));
        let Some((requests, _)) = parked else { return };
        debug!(%cp, %vlan, count = requests.len(), "host discovered; resuming parked work");
        for request in requests {
            if self.wake_tx.send(request).is_err() {
                warn!(%cp, "reconciler queue closed; dropping parked work");
            }
        }
    }

    // ------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------

    fn ensure_service_meters(
        &self,
        device: &DeviceId,
        tag: &UniTagInformation,
    ) -> Result<bool, OltError> {
        let mut pending = false;
        for bp_id in [
            tag.upstream_bandwidth_profile.as_deref(),
            tag.downstream_bandwidth_profile.as_deref(),
            tag.upstream_olt_bandwidth_profile.as_deref(),
            tag.downstream_olt_bandwidth_profile.as_deref(),
        ]
        .into_iter()
        .flatten()
        {
            match self.meters.ensure_meter(device, bp_id) {
                MeterOutcome::Ready(_) => {}
                MeterOutcome::Requested => pending = true,
                MeterOutcome::MissingProfile => {
                    return Err(OltError::NotConfigured(bp_id.to_string()))
                }
            }
        }
        Ok(pending)
    }

    fn resolve_meters(&self, device: &DeviceId, tag: &UniTagInformation) -> ServiceMeters {
        let lookup = |bp: &Option<String>| {
            bp.as_deref()
                .and_then(|id| self.meters.meter_for(device, id))
        };
        ServiceMeters {
            us: lookup(&tag.upstream_bandwidth_profile),
            ds: lookup(&tag.downstream_bandwidth_profile),
            us_olt: lookup(&tag.upstream_olt_bandwidth_profile),
            ds_olt: lookup(&tag.downstream_olt_bandwidth_profile),
        }
    }

    /// Destination MAC for the downstream forward: configured when valid,
    /// otherwise learned via the host service when MAC learning is enabled
    fn downstream_dst_mac(
        &self,
        port: &AccessDevicePort,
        tag: &UniTagInformation,
    ) -> Option<MacAddress> {
        if let Some(mac) = tag.configured_mac_address.filter(MacAddress::is_unicast) {
            return Some(mac);
        }
        if !tag.enable_mac_learning {
            return None;
        }
        self.hosts
            .connected_hosts(&port.connect_point())
            .into_iter()
            .find(|h| h.vlan == tag.pon_c_tag)
            .map(|h| h.mac)
    }

    fn find_service(
        &self,
        port: &AccessDevicePort,
        s_tag: VlanId,
        c_tag: VlanId,
        tp_id: i32,
    ) -> Result<UniTagInformation, OltError> {
        let subscriber = self
            .subscribers
            .subscriber_by_port_name(port.name())
            .ok_or_else(|| OltError::NotConfigured(port.name().to_string()))?;
        subscriber
            .uni_tag_list
            .into_iter()
            .find(|t| {
                t.pon_s_tag == s_tag && t.pon_c_tag == c_tag && t.technology_profile_id == tp_id
            })
            .ok_or_else(|| {
                OltError::BadRequest(format!(
                    "no service with sTag {s_tag}, cTag {c_tag}, tpId {tp_id} on {port}"
                ))
            })
    }

    fn access_port(&self, cp: &ConnectPoint) -> Result<AccessDevicePort, OltError> {
        self.inventory
            .port(cp)
            .map(|d| AccessDevicePort::new(cp.device.clone(), d.number, d.name))
            .ok_or_else(|| OltError::PortNotFound(cp.clone()))
    }

    /// A port is an NNI iff its number equals the configured uplink, or as a
    /// fallback its name begins with `nni-`
    fn is_nni(&self, device: &DeviceId, number: PortNumber, name: &str) -> bool {
        if let Some(uplink) = self.uplink_port(device) {
            if uplink == number {
                return true;
            }
        }
        name.starts_with("nni-")
    }

    fn uplink_port(&self, device: &DeviceId) -> Option<PortNumber> {
        let descriptor = self.inventory.device(device)?;
        self.subscribers
            .olt_info_by_serial(&descriptor.serial)?
            .uplink_port
            .map(PortNumber::new)
    }

    fn event_info(key: &ServiceKey) -> SubscriberEventInfo {
        SubscriberEventInfo {
            device_id: key.port().device().clone(),
            port: key.port().number(),
            s_tag: key.service().pon_s_tag,
            c_tag: key.service().pon_c_tag,
            tp_id: key.service().technology_profile_id,
        }
    }

    fn post(&self, event: AccessDeviceEvent) {
        let _ = self.events.send(event.stamped());
    }

    // ------------------------------------------------------------------
    // Read access used by the worker pool and the public service
    // ------------------------------------------------------------------

    pub(crate) fn config(&self) -> &OltConfig {
        &self.config
    }

    /// Bandwidth profiles referenced by any currently programmed service
    pub(crate) fn profiles_in_use(&self) -> std::collections::HashSet<String> {
        let mut profiles: std::collections::HashSet<String> =
            std::collections::HashSet::new();
        profiles.insert(self.config.default_bp_id.clone());
        for key in self.store.provisioned_keys() {
            let tag = key.service();
            for bp in [
                &tag.upstream_bandwidth_profile,
                &tag.downstream_bandwidth_profile,
                &tag.upstream_olt_bandwidth_profile,
                &tag.downstream_olt_bandwidth_profile,
            ]
            .into_iter()
            .flatten()
            {
                profiles.insert(bp.clone());
            }
        }
        profiles
    }
}

/// Which status track an objective belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatusTrack {
    DefaultEapol,
    Subscriber,
    Dhcp,
}
