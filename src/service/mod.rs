//! # Public service layer
//!
//! Operator-facing operations over the reconciliation core, plus the
//! explicit wiring of its components: ownership ring, meter cache, status
//! store, reconciler, worker pool and the two event pumps.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use olt_control::service::AccessDeviceService;
//!
//! let service = AccessDeviceService::builder()
//!     .programmer(driver)
//!     .subscribers(sadis)
//!     .hosts(host_service)
//!     .inventory(device_service)
//!     .cluster(cluster_service)
//!     .build()?;
//!
//! service.provision_subscriber(cp).await?;
//! ```

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tracing::info;

use crate::cluster::{ClusterEvent, DeviceOwnership};
use crate::config::OltConfig;
use crate::domain::errors::OltError;
use crate::domain::events::StampedEvent;
use crate::domain::ports::{
    ClusterService, DeviceDescriptor, DeviceInventory, FlowProgrammer, HostService,
    SubscriberService,
};
use crate::domain::status::OltPortStatus;
use crate::domain::value_objects::{ConnectPoint, DeviceId, MeterId, ServiceKey, VlanId};
use crate::listener::{DeviceEvent, DeviceEventPump, FlowEventListener, FlowRuleEvent};
use crate::meters::MeterCache;
use crate::reconciler::{Outcome, ReconcileRequest, Reconciler, ReconcilerRunner};
use crate::store::StatusStore;
use crate::APP_NAME;

/// Capacity of the public event channel; slow subscribers lag, they do
/// not block reconciliation
const EVENT_CHANNEL_CAPACITY: usize = 128;

/// Operator-facing entry point owning the wired component graph
pub struct AccessDeviceService {
    reconciler: Arc<Reconciler>,
    meters: Arc<MeterCache>,
    store: StatusStore,
    inventory: Arc<dyn DeviceInventory>,
    subscribers: Arc<dyn SubscriberService>,
    ownership: Arc<DeviceOwnership>,
    events: broadcast::Sender<StampedEvent>,
    device_tx: mpsc::UnboundedSender<DeviceEvent>,
    flow_tx: mpsc::UnboundedSender<FlowRuleEvent>,
}

impl AccessDeviceService {
    /// Create a new service builder
    pub fn builder() -> AccessDeviceServiceBuilder {
        AccessDeviceServiceBuilder::new()
    }

    // ------------------------------------------------------------------
    // Operator operations
    // ------------------------------------------------------------------

    /// Install the full subscriber suite on a connect point
    ///
    /// Runs one reconciliation pass inline; a pass that parks on a pending
    /// condition is accepted and converges in the background.
    pub async fn provision_subscriber(&self, cp: ConnectPoint) -> Result<(), OltError> {
        self.run_inline(ReconcileRequest::Provision(cp)).await
    }

    /// Withdraw the full subscriber suite from a connect point
    pub async fn remove_subscriber(&self, cp: ConnectPoint) -> Result<(), OltError> {
        self.run_inline(ReconcileRequest::Remove(cp)).await
    }

    /// Locate a subscriber by id and install either the full suite or,
    /// when all three tag selectors are given, only the data-plane pair of
    /// the matching service
    pub async fn provision_subscriber_by_id(
        &self,
        subscriber_id: &str,
        s_tag: Option<VlanId>,
        c_tag: Option<VlanId>,
        tp_id: Option<i32>,
    ) -> Result<(), OltError> {
        let cp = self.find_connect_point(subscriber_id)?;
        match Self::tag_selector(s_tag, c_tag, tp_id)? {
            Some((s_tag, c_tag, tp_id)) => {
                self.run_inline(ReconcileRequest::ProvisionService {
                    cp,
                    s_tag,
                    c_tag,
                    tp_id,
                })
                .await
            }
            None => self.run_inline(ReconcileRequest::Provision(cp)).await,
        }
    }

    /// Symmetric removal by subscriber id
    pub async fn remove_subscriber_by_id(
        &self,
        subscriber_id: &str,
        s_tag: Option<VlanId>,
        c_tag: Option<VlanId>,
        tp_id: Option<i32>,
    ) -> Result<(), OltError> {
        let cp = self.find_connect_point(subscriber_id)?;
        match Self::tag_selector(s_tag, c_tag, tp_id)? {
            Some((s_tag, c_tag, tp_id)) => {
                self.run_inline(ReconcileRequest::RemoveService {
                    cp,
                    s_tag,
                    c_tag,
                    tp_id,
                })
                .await
            }
            None => self.run_inline(ReconcileRequest::Remove(cp)).await,
        }
    }

    /// Every service the operator has programmed
    pub fn programmed_subscribers(&self) -> Vec<ServiceKey> {
        self.store.provisioned_keys()
    }

    /// Flow status of every tracked (port, service) tuple
    pub fn connect_point_status(&self) -> Vec<(ServiceKey, OltPortStatus)> {
        self.store.entries()
    }

    /// Devices known to the inventory that resolve to an OLT record in the
    /// subscriber-information service
    pub fn olts(&self) -> Vec<DeviceDescriptor> {
        self.inventory
            .devices()
            .into_iter()
            .filter(|d| self.subscribers.olt_info_by_serial(&d.serial).is_some())
            .collect()
    }

    /// Clear every flow, status entry, intent record and meter binding of
    /// a device
    pub async fn purge_device_flows(&self, device: DeviceId) -> Result<(), OltError> {
        self.run_inline(ReconcileRequest::DeviceDown(device)).await
    }

    /// Whether this instance drives the device
    pub fn is_device_mine(&self, device: &DeviceId) -> bool {
        self.ownership.is_device_mine(device)
    }

    // ------------------------------------------------------------------
    // Event intake
    // ------------------------------------------------------------------

    /// Queue feeding device/port events into the pump
    pub fn device_event_sender(&self) -> mpsc::UnboundedSender<DeviceEvent> {
        self.device_tx.clone()
    }

    /// Queue feeding flow-rule events into the flow listener
    pub fn flow_event_sender(&self) -> mpsc::UnboundedSender<FlowRuleEvent> {
        self.flow_tx.clone()
    }

    /// Apply a cluster membership change; devices may re-hash
    pub fn handle_cluster_event(&self, event: &ClusterEvent) {
        self.ownership.on_cluster_event(event);
    }

    /// Host discovery completed on (connect point, VLAN); resumes tasks
    /// parked on MAC learning
    pub fn host_discovered(&self, cp: &ConnectPoint, vlan: VlanId) {
        self.reconciler.on_host_discovered(cp, vlan);
    }

    /// The southbound reports a meter with no remaining references
    pub fn meter_reference_count_zero(&self, device: &DeviceId, meter: MeterId) {
        self.meters
            .on_meter_reference_count_zero(device, meter, &self.reconciler.profiles_in_use());
    }

    /// Subscribe to the public event sink
    pub fn subscribe_events(&self) -> broadcast::Receiver<StampedEvent> {
        self.events.subscribe()
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    async fn run_inline(&self, request: ReconcileRequest) -> Result<(), OltError> {
        match self.reconciler.handle(&request).await? {
            Outcome::Done | Outcome::Skipped => Ok(()),
            Outcome::NotDone(reason) => {
                // Accepted; the parked task converges in the background
                self.reconciler.park(reason, request);
                Ok(())
            }
        }
    }

    fn find_connect_point(&self, subscriber_id: &str) -> Result<ConnectPoint, OltError> {
        for device in self.inventory.devices() {
            for port in self.inventory.ports(&device.id) {
                if port.name == subscriber_id {
                    return Ok(ConnectPoint::new(device.id.clone(), port.number));
                }
            }
        }
        Err(OltError::NotConfigured(subscriber_id.to_string()))
    }

    fn tag_selector(
        s_tag: Option<VlanId>,
        c_tag: Option<VlanId>,
        tp_id: Option<i32>,
    ) -> Result<Option<(VlanId, VlanId, i32)>, OltError> {
        match (s_tag, c_tag, tp_id) {
            (Some(s), Some(c), Some(tp)) => Ok(Some((s, c, tp))),
            (None, None, None) => Ok(None),
            _ => Err(OltError::BadRequest(
                "sTag, cTag and tpId must be given together or not at all".to_string(),
            )),
        }
    }
}

/// Builder wiring the eight components against their collaborators
pub struct AccessDeviceServiceBuilder {
    config: OltConfig,
    programmer: Option<Arc<dyn FlowProgrammer>>,
    subscribers: Option<Arc<dyn SubscriberService>>,
    hosts: Option<Arc<dyn HostService>>,
    inventory: Option<Arc<dyn DeviceInventory>>,
    cluster: Option<Arc<dyn ClusterService>>,
}

impl AccessDeviceServiceBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: OltConfig::default(),
            programmer: None,
            subscribers: None,
            hosts: None,
            inventory: None,
            cluster: None,
        }
    }

    /// Override the component configuration
    pub fn config(mut self, config: OltConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the southbound driver
    pub fn programmer(mut self, programmer: Arc<dyn FlowProgrammer>) -> Self {
        self.programmer = Some(programmer);
        self
    }

    /// Set the subscriber-information service
    pub fn subscribers(mut self, subscribers: Arc<dyn SubscriberService>) -> Self {
        self.subscribers = Some(subscribers);
        self
    }

    /// Set the host/ARP service
    pub fn hosts(mut self, hosts: Arc<dyn HostService>) -> Self {
        self.hosts = Some(hosts);
        self
    }

    /// Set the device inventory
    pub fn inventory(mut self, inventory: Arc<dyn DeviceInventory>) -> Self {
        self.inventory = Some(inventory);
        self
    }

    /// Set the cluster membership service
    pub fn cluster(mut self, cluster: Arc<dyn ClusterService>) -> Self {
        self.cluster = Some(cluster);
        self
    }

    /// Wire and start the component graph
    ///
    /// Must run inside a tokio runtime: the worker pool and the event
    /// pumps are spawned here.
    pub fn build(self) -> Result<AccessDeviceService, OltError> {
        let programmer = self
            .programmer
            .ok_or_else(|| OltError::BadRequest("southbound driver is required".to_string()))?;
        let subscribers = self
            .subscribers
            .ok_or_else(|| OltError::BadRequest("subscriber service is required".to_string()))?;
        let hosts = self
            .hosts
            .ok_or_else(|| OltError::BadRequest("host service is required".to_string()))?;
        let inventory = self
            .inventory
            .ok_or_else(|| OltError::BadRequest("device inventory is required".to_string()))?;
        let cluster = self
            .cluster
            .ok_or_else(|| OltError::BadRequest("cluster service is required".to_string()))?;

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (reconcile_tx, reconcile_rx) = mpsc::unbounded_channel();
        let (device_tx, device_rx) = mpsc::unbounded_channel();
        let (flow_tx, flow_rx) = mpsc::unbounded_channel();

        let ownership = Arc::new(DeviceOwnership::new(cluster));
        let store = StatusStore::new();
        let meters = Arc::new(MeterCache::new(
            Arc::clone(&programmer),
            Arc::clone(&subscribers),
            reconcile_tx.clone(),
        ));

        let reconciler = Arc::new(Reconciler::new(
            self.config,
            programmer,
            Arc::clone(&subscribers),
            hosts,
            Arc::clone(&inventory),
            Arc::clone(&ownership),
            Arc::clone(&meters),
            store.clone(),
            events.clone(),
            reconcile_tx.clone(),
        ));

        let _ = ReconcilerRunner::new(Arc::clone(&reconciler)).spawn(reconcile_rx);
        let _ = DeviceEventPump::new(
            Arc::clone(&ownership),
            Arc::clone(&inventory),
            reconcile_tx.clone(),
        )
        .spawn(device_rx);
        let _ = FlowEventListener::new(
            APP_NAME,
            Arc::clone(&ownership),
            Arc::clone(&inventory),
            Arc::clone(&subscribers),
            store.clone(),
        )
        .spawn(flow_rx);

        info!("access-device service wired and running");
        Ok(AccessDeviceService {
            reconciler,
            meters,
            store,
            inventory,
            subscribers,
            ownership,
            events,
            device_tx,
            flow_tx,
        })
    }
}

impl Default for AccessDeviceServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}
