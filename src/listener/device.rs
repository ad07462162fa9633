//! Device event pump
//!
//! Serialises device and port events onto one queue, drops noisy event
//! types, filters by cluster ownership and dispatches the rest as
//! reconciliation requests.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::cluster::DeviceOwnership;
use crate::domain::ports::DeviceInventory;
use crate::domain::value_objects::{ConnectPoint, DeviceId};
use crate::reconciler::ReconcileRequest;

/// Raw device/port events from the southbound
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceEvent {
    DeviceAdded { device: DeviceId },
    DeviceRemoved { device: DeviceId },
    DeviceAvailabilityChanged { device: DeviceId },
    PortAdded { cp: ConnectPoint },
    PortRemoved { cp: ConnectPoint },
    /// Port attribute change; the enable bit decides whether this is
    /// effectively an add or a remove
    PortUpdated { cp: ConnectPoint, enabled: bool },
    /// Periodic counters; never acted upon
    PortStatsUpdated { cp: ConnectPoint },
    /// Mastership churn; never acted upon
    DeviceSuspended { device: DeviceId },
    /// Annotation/metadata change; never acted upon
    DeviceUpdated { device: DeviceId },
}

impl DeviceEvent {
    fn device(&self) -> &DeviceId {
        match self {
            DeviceEvent::DeviceAdded { device }
            | DeviceEvent::DeviceRemoved { device }
            | DeviceEvent::DeviceAvailabilityChanged { device }
            | DeviceEvent::DeviceSuspended { device }
            | DeviceEvent::DeviceUpdated { device } => device,
            DeviceEvent::PortAdded { cp }
            | DeviceEvent::PortRemoved { cp }
            | DeviceEvent::PortUpdated { cp, .. }
            | DeviceEvent::PortStatsUpdated { cp } => &cp.device,
        }
    }

    fn is_noise(&self) -> bool {
        matches!(
            self,
            DeviceEvent::PortStatsUpdated { .. }
                | DeviceEvent::DeviceSuspended { .. }
                | DeviceEvent::DeviceUpdated { .. }
        )
    }
}

/// Single-consumer pump feeding the reconciliation queue
pub struct DeviceEventPump {
    ownership: Arc<DeviceOwnership>,
    inventory: Arc<dyn DeviceInventory>,
    reconcile_tx: mpsc::UnboundedSender<ReconcileRequest>,
}

impl DeviceEventPump {
    pub fn new(
        ownership: Arc<DeviceOwnership>,
        inventory: Arc<dyn DeviceInventory>,
        reconcile_tx: mpsc::UnboundedSender<ReconcileRequest>,
    ) -> Self {
        Self {
            ownership,
            inventory,
            reconcile_tx,
        }
    }

    /// Translate one event into at most one reconciliation request
    pub fn dispatch(&self, event: &DeviceEvent) {
        if event.is_noise() {
            trace!(?event, "ignoring noisy device event");
            return;
        }
        if !self.ownership.is_device_mine(event.device()) {
            debug!(device = %event.device(), "device not owned; event dropped");
            return;
        }

        let request = match event {
            DeviceEvent::DeviceAdded { device } => ReconcileRequest::DeviceUp(device.clone()),
            DeviceEvent::DeviceRemoved { device } => ReconcileRequest::DeviceDown(device.clone()),
            DeviceEvent::DeviceAvailabilityChanged { device } => {
                if self.inventory.is_available(device) {
                    ReconcileRequest::DeviceUp(device.clone())
                } else {
                    ReconcileRequest::DeviceDown(device.clone())
                }
            }
            DeviceEvent::PortAdded { cp } => ReconcileRequest::PortUp(cp.clone()),
            DeviceEvent::PortRemoved { cp } => ReconcileRequest::PortDown(cp.clone()),
            DeviceEvent::PortUpdated { cp, enabled } => {
                if *enabled {
                    ReconcileRequest::PortUp(cp.clone())
                } else {
                    ReconcileRequest::PortDown(cp.clone())
                }
            }
            // Noise already filtered above
            DeviceEvent::PortStatsUpdated { .. }
            | DeviceEvent::DeviceSuspended { .. }
            | DeviceEvent::DeviceUpdated { .. } => return,
        };
        let _ = self.reconcile_tx.send(request);
    }

    /// Drain the event queue until the sender side closes
    pub fn spawn(self, mut rx: mpsc::UnboundedReceiver<DeviceEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                self.dispatch(&event);
            }
        })
    }
}
