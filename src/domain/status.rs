//! Per-service flow status state machine

use serde::{Deserialize, Serialize};
use strum_macros::Display;

/// Lifecycle of one family of flows for a (port, service) tuple
///
/// ```text
///           provision                      remove
/// None ───────────────▶ PendingAdd ─────────────────▶ PendingRemove
///                           │                               │
///                    onAdded│                       onRemoved
///                           ▼                               ▼
///                         Added ◀── provision ──          Removed
///                           │
///                    onError│
///                           ▼
///                         Error (retryable)
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, Default,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum OltFlowsStatus {
    #[default]
    None,
    PendingAdd,
    Added,
    PendingRemove,
    Removed,
    Error,
}

impl OltFlowsStatus {
    /// Get valid transitions from this state
    pub fn valid_transitions(&self) -> &[OltFlowsStatus] {
        match self {
            OltFlowsStatus::None => &[OltFlowsStatus::PendingAdd],
            OltFlowsStatus::PendingAdd => {
                &[OltFlowsStatus::Added, OltFlowsStatus::Error, OltFlowsStatus::PendingRemove]
            }
            OltFlowsStatus::Added => &[OltFlowsStatus::PendingRemove, OltFlowsStatus::Error],
            OltFlowsStatus::PendingRemove => &[OltFlowsStatus::Removed, OltFlowsStatus::Error],
            OltFlowsStatus::Removed => &[OltFlowsStatus::PendingAdd],
            OltFlowsStatus::Error => &[OltFlowsStatus::PendingAdd, OltFlowsStatus::PendingRemove],
        }
    }

    /// Check if transition to target state is valid
    pub fn can_transition_to(&self, target: OltFlowsStatus) -> bool {
        self.valid_transitions().contains(&target)
    }

    /// Flows exist or are on their way in. `Error` counts as present
    /// because the southbound keeps retrying a failed install.
    pub fn is_present(&self) -> bool {
        matches!(
            self,
            OltFlowsStatus::Added | OltFlowsStatus::PendingAdd | OltFlowsStatus::Error
        )
    }

    /// Installed or install requested; the narrower presence test used for
    /// subscriber and DHCP flows
    pub fn is_installed_or_pending(&self) -> bool {
        matches!(self, OltFlowsStatus::Added | OltFlowsStatus::PendingAdd)
    }

    /// Nothing installed and nothing in flight
    pub fn is_absent(&self) -> bool {
        matches!(self, OltFlowsStatus::None | OltFlowsStatus::Removed)
    }
}

/// Aggregate status of the three flow families tracked per [`super::ServiceKey`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OltPortStatus {
    pub default_eapol_status: OltFlowsStatus,
    pub subscriber_flows_status: OltFlowsStatus,
    pub dhcp_status: OltFlowsStatus,
}

impl OltPortStatus {
    /// True when every family has settled back to nothing-installed
    pub fn is_fully_absent(&self) -> bool {
        self.default_eapol_status.is_absent()
            && self.subscriber_flows_status.is_absent()
            && self.dhcp_status.is_absent()
    }
}
