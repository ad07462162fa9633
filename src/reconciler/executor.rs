//! Bounded execution of reconciliation tasks
//!
//! One queue feeds a semaphore-bounded pool of workers. A task that
//! reports "not done" is handed to whichever component completes its
//! awaited condition: the meter cache for meter installs, the MAC-waiter
//! registry for host discovery, a delayed requeue for flow removals.

use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{Outcome, ReconcileRequest, Reconciler};

/// Pump draining the reconciliation queue with bounded concurrency
pub struct ReconcilerRunner {
    reconciler: Arc<Reconciler>,
    workers: Arc<Semaphore>,
}

impl ReconcilerRunner {
    pub fn new(reconciler: Arc<Reconciler>) -> Self {
        let workers = reconciler.config().reconcile_workers.max(1);
        Self {
            reconciler,
            workers: Arc::new(Semaphore::new(workers)),
        }
    }

    /// Start draining the queue until the sender side closes
    pub fn spawn(self, mut rx: mpsc::UnboundedReceiver<ReconcileRequest>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(request) = rx.recv().await {
                let Ok(permit) = Arc::clone(&self.workers).acquire_owned().await else {
                    break;
                };
                let reconciler = Arc::clone(&self.reconciler);

                tokio::spawn(async move {
                    let task_id = Uuid::new_v4();
                    debug!(%task_id, ?request, "reconciliation task started");
                    match reconciler.handle(&request).await {
                        Ok(Outcome::Done) => {
                            debug!(%task_id, "reconciliation task done");
                        }
                        Ok(Outcome::Skipped) => {
                            debug!(%task_id, "device not owned; task skipped");
                        }
                        Ok(Outcome::NotDone(reason)) => {
                            debug!(%task_id, ?reason, "task parked");
                            reconciler.park(reason, request);
                        }
                        Err(err) => {
                            warn!(%task_id, %err, "reconciliation task failed");
                        }
                    }
                    drop(permit);
                });
            }
        })
    }
}
