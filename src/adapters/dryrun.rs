//! Dry-run southbound driver
//!
//! Accepts every objective, logs it, and assigns meter ids monotonically.
//! Lets the control plane run end to end without hardware.

use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use tracing::info;

use crate::domain::errors::ObjectiveError;
use crate::domain::ports::FlowProgrammer;
use crate::domain::value_objects::{DeviceId, MeterId};
use crate::flows::{FilteringObjective, ForwardingObjective};
use crate::meters::MeterRequest;

/// Logging [`FlowProgrammer`] that never fails
#[derive(Debug, Default)]
pub struct DryRunProgrammer {
    next_meter: AtomicU32,
}

impl DryRunProgrammer {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FlowProgrammer for DryRunProgrammer {
    async fn filter(
        &self,
        device: &DeviceId,
        objective: FilteringObjective,
    ) -> Result<(), ObjectiveError> {
        info!(%device, op = %objective.op, priority = objective.priority,
            criteria = objective.selector.criteria.len(), "filter objective accepted");
        Ok(())
    }

    async fn forward(
        &self,
        device: &DeviceId,
        objective: ForwardingObjective,
    ) -> Result<(), ObjectiveError> {
        info!(%device, op = %objective.op, priority = objective.priority,
            criteria = objective.selector.criteria.len(), "forward objective accepted");
        Ok(())
    }

    async fn submit_meter(
        &self,
        device: &DeviceId,
        request: MeterRequest,
    ) -> Result<MeterId, ObjectiveError> {
        let id = MeterId::new(self.next_meter.fetch_add(1, Ordering::SeqCst) + 1);
        info!(%device, bandwidth_profile = %request.bandwidth_profile, meter = %id,
            "meter accepted");
        Ok(id)
    }

    async fn withdraw_meter(
        &self,
        device: &DeviceId,
        meter: MeterId,
    ) -> Result<(), ObjectiveError> {
        info!(%device, %meter, "meter withdrawn");
        Ok(())
    }

    async fn purge_flows(&self, device: &DeviceId) -> Result<(), ObjectiveError> {
        info!(%device, "flows purged");
        Ok(())
    }
}
