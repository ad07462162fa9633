//! # Meter cache
//!
//! Guarantees at-most-one meter per (device, bandwidth-profile) and defers
//! flow work until the meter it references is confirmed installed.
//!
//! The binding map is cluster-replicated; the pending-install marker is a
//! process-local compare-and-set guard, so two concurrent `ensure_meter`
//! calls on this instance produce exactly one southbound create request.
//! The cache is a cheap handle over shared state and can be cloned across
//! tasks.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::domain::ports::{FlowProgrammer, SubscriberService};
use crate::domain::value_objects::{BandwidthProfileInformation, DeviceId, MeterId};
use crate::reconciler::ReconcileRequest;
use crate::store::ReplicatedMap;

/// One rate-limiting band; packets over the rate are dropped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeterBand {
    pub rate: u64,
    pub burst_size: u64,
}

/// Meter-install request synthesised from a bandwidth profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeterRequest {
    pub bandwidth_profile: String,
    pub bands: Vec<MeterBand>,
}

impl MeterRequest {
    /// Three bands: committed, exceeded, assured
    pub fn from_profile(profile: &BandwidthProfileInformation) -> Self {
        Self {
            bandwidth_profile: profile.id.clone(),
            bands: vec![
                MeterBand {
                    rate: profile.committed_information_rate,
                    burst_size: profile.committed_burst_size,
                },
                MeterBand {
                    rate: profile.exceeded_information_rate,
                    burst_size: profile.exceeded_burst_size,
                },
                MeterBand {
                    rate: profile.assured_information_rate,
                    burst_size: 0,
                },
            ],
        }
    }
}

/// Result of [`MeterCache::ensure_meter`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeterOutcome {
    /// Meter confirmed installed; directives may reference it
    Ready(MeterId),
    /// Install requested (now or previously) but not yet confirmed; the
    /// caller must park its work instead of emitting directives
    Requested,
    /// The bandwidth profile is unknown to the subscriber service
    MissingProfile,
}

/// Deduplicating (device, bandwidth-profile) → meter binding
#[derive(Clone)]
pub struct MeterCache {
    programmer: Arc<dyn FlowProgrammer>,
    subscribers: Arc<dyn SubscriberService>,
    bindings: ReplicatedMap<(DeviceId, String), MeterId>,
    pending: Arc<DashMap<(DeviceId, String), ()>>,
    parked: ReplicatedMap<DeviceId, Vec<ReconcileRequest>>,
    wake_tx: mpsc::UnboundedSender<ReconcileRequest>,
}

impl MeterCache {
    /// Create the cache; parked work re-enters reconciliation via `wake_tx`
    pub fn new(
        programmer: Arc<dyn FlowProgrammer>,
        subscribers: Arc<dyn SubscriberService>,
        wake_tx: mpsc::UnboundedSender<ReconcileRequest>,
    ) -> Self {
        Self {
            programmer,
            subscribers,
            bindings: ReplicatedMap::new("volt-bp-meter"),
            pending: Arc::new(DashMap::new()),
            parked: ReplicatedMap::new("volt-pending-eapol"),
            wake_tx,
        }
    }

    /// Idempotently make sure a meter exists for (device, bandwidth profile)
    ///
    /// Returns `Ready` with the bound id, or `Requested` after scheduling at
    /// most one install. Never blocks on the southbound.
    pub fn ensure_meter(&self, device: &DeviceId, bp_id: &str) -> MeterOutcome {
        let key = (device.clone(), bp_id.to_string());
        if let Some(id) = self.bindings.get(&key) {
            return MeterOutcome::Ready(id);
        }

        // Compare-and-set pending marker: the losing caller just waits
        if self.pending.insert(key.clone(), ()).is_some() {
            return MeterOutcome::Requested;
        }
        // A concurrent install may have completed between the two checks
        if let Some(id) = self.bindings.get(&key) {
            self.pending.remove(&key);
            return MeterOutcome::Ready(id);
        }

        let Some(profile) = self.subscribers.bandwidth_profile(bp_id) else {
            self.pending.remove(&key);
            warn!(%device, bp_id, "bandwidth profile not found; cannot create meter");
            return MeterOutcome::MissingProfile;
        };

        let request = MeterRequest::from_profile(&profile);
        info!(%device, bp_id, "requesting meter install");

        let cache = self.clone();
        let device = device.clone();
        let bp_id = bp_id.to_string();
        tokio::spawn(async move {
            match cache.programmer.submit_meter(&device, request).await {
                Ok(meter_id) => cache.on_meter_installed(&device, &bp_id, meter_id),
                Err(err) => cache.on_meter_failed(&device, &bp_id, &err.to_string()),
            }
        });

        MeterOutcome::Requested
    }

    /// Record a confirmed install and resume work parked on this device
    pub fn on_meter_installed(&self, device: &DeviceId, bp_id: &str, meter_id: MeterId) {
        let key = (device.clone(), bp_id.to_string());
        self.bindings.put(key.clone(), meter_id);
        self.pending.remove(&key);
        info!(%device, bp_id, %meter_id, "meter installed");
        self.drain_parked(device);
    }

    /// Record a failed install; parked work is resumed so it can re-request
    pub fn on_meter_failed(&self, device: &DeviceId, bp_id: &str, reason: &str) {
        let key = (device.clone(), bp_id.to_string());
        self.pending.remove(&key);
        warn!(%device, bp_id, reason, "meter install failed");
        self.drain_parked(device);
    }

    /// Current binding; never allocates
    pub fn meter_for(&self, device: &DeviceId, bp_id: &str) -> Option<MeterId> {
        self.bindings.get(&(device.clone(), bp_id.to_string()))
    }

    /// Park reconciliation work until a meter for this device is confirmed
    pub fn park(&self, device: &DeviceId, request: ReconcileRequest) {
        debug!(%device, ?request, "parking work on meter install");
        self.parked.compute(device.clone(), |current| {
            let mut queue = current.unwrap_or_default();
            queue.push(request);
            Some(queue)
        });
        // The awaited install may have completed between the caller's check
        // and the park; drain right away so the task cannot strand
        let still_pending = self.pending.iter().any(|entry| entry.key().0 == *device);
        if !still_pending {
            self.drain_parked(device);
        }
    }

    /// Drop every binding and parked task of a departing device
    pub fn clear(&self, device: &DeviceId) {
        self.bindings.retain(|(d, _), _| d != device);
        self.pending.retain(|(d, _), _| d != device);
        self.parked.remove(device);
    }

    /// The southbound reports nothing references this meter any more;
    /// withdraw it when we installed it and no programmed service still
    /// names its bandwidth profile
    pub fn on_meter_reference_count_zero(
        &self,
        device: &DeviceId,
        meter_id: MeterId,
        profiles_in_use: &HashSet<String>,
    ) {
        let binding = self
            .bindings
            .entries()
            .into_iter()
            .find(|((d, _), id)| d == device && *id == meter_id);

        let Some(((device, bp_id), _)) = binding else {
            // Not ours; leave it alone
            return;
        };
        if profiles_in_use.contains(&bp_id) {
            return;
        }

        info!(%device, bp_id, %meter_id, "withdrawing unreferenced meter");
        self.bindings.remove(&(device.clone(), bp_id));
        let cache = self.clone();
        tokio::spawn(async move {
            if let Err(err) = cache.programmer.withdraw_meter(&device, meter_id).await {
                warn!(%device, %meter_id, %err, "meter withdrawal failed");
            }
        });
    }

    fn drain_parked(&self, device: &DeviceId) {
        let Some(queue) = self.parked.remove(device) else {
            return;
        };
        debug!(%device, count = queue.len(), "resuming parked work");
        for request in queue {
            if self.wake_tx.send(request).is_err() {
                warn!(%device, "reconciler queue closed; dropping parked work");
            }
        }
    }
}
