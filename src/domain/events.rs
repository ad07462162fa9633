//! # Access-device events
//!
//! Everything the reconciliation core tells the outside world is expressed
//! as an immutable event on the public sink.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::value_objects::{DeviceId, PortNumber, VlanId};

/// Information about one (device, port, service) carried by every
/// subscriber-scoped event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriberEventInfo {
    pub device_id: DeviceId,
    pub port: PortNumber,
    pub s_tag: VlanId,
    pub c_tag: VlanId,
    pub tp_id: i32,
}

/// Public events emitted by the reconciliation core
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessDeviceEvent {
    /// An access device came under management
    DeviceConnected { device_id: DeviceId },

    /// An access device left management; its state has been purged
    DeviceDisconnected { device_id: DeviceId },

    /// A subscriber-facing port became available
    UniAdded { device_id: DeviceId, port: PortNumber },

    /// A subscriber-facing port went away
    UniRemoved { device_id: DeviceId, port: PortNumber },

    /// A service was programmed for a subscriber
    SubscriberUniTagRegistered(SubscriberEventInfo),

    /// A service was withdrawn for a subscriber
    SubscriberUniTagUnregistered(SubscriberEventInfo),

    /// Programming a service failed at the southbound
    SubscriberUniTagRegistrationFailed(SubscriberEventInfo),

    /// Withdrawing a service failed at the southbound
    SubscriberUniTagUnregistrationFailed(SubscriberEventInfo),
}

impl AccessDeviceEvent {
    /// The device the event concerns
    pub fn device_id(&self) -> &DeviceId {
        match self {
            AccessDeviceEvent::DeviceConnected { device_id }
            | AccessDeviceEvent::DeviceDisconnected { device_id }
            | AccessDeviceEvent::UniAdded { device_id, .. }
            | AccessDeviceEvent::UniRemoved { device_id, .. } => device_id,

            AccessDeviceEvent::SubscriberUniTagRegistered(info)
            | AccessDeviceEvent::SubscriberUniTagUnregistered(info)
            | AccessDeviceEvent::SubscriberUniTagRegistrationFailed(info)
            | AccessDeviceEvent::SubscriberUniTagUnregistrationFailed(info) => &info.device_id,
        }
    }

    /// Get the event type name
    pub fn event_type(&self) -> &'static str {
        match self {
            AccessDeviceEvent::DeviceConnected { .. } => "DEVICE_CONNECTED",
            AccessDeviceEvent::DeviceDisconnected { .. } => "DEVICE_DISCONNECTED",
            AccessDeviceEvent::UniAdded { .. } => "UNI_ADDED",
            AccessDeviceEvent::UniRemoved { .. } => "UNI_REMOVED",
            AccessDeviceEvent::SubscriberUniTagRegistered(_) => "SUBSCRIBER_UNI_TAG_REGISTERED",
            AccessDeviceEvent::SubscriberUniTagUnregistered(_) => "SUBSCRIBER_UNI_TAG_UNREGISTERED",
            AccessDeviceEvent::SubscriberUniTagRegistrationFailed(_) => {
                "SUBSCRIBER_UNI_TAG_REGISTRATION_FAILED"
            }
            AccessDeviceEvent::SubscriberUniTagUnregistrationFailed(_) => {
                "SUBSCRIBER_UNI_TAG_UNREGISTRATION_FAILED"
            }
        }
    }

    /// Stamp the event for publication
    pub fn stamped(self) -> StampedEvent {
        StampedEvent {
            time: Utc::now(),
            event: self,
        }
    }
}

/// An event together with its publication time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StampedEvent {
    pub time: DateTime<Utc>,
    pub event: AccessDeviceEvent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_names() {
        let ev = AccessDeviceEvent::DeviceConnected {
            device_id: DeviceId::from("of:0001"),
        };
        assert_eq!(ev.event_type(), "DEVICE_CONNECTED");
        assert_eq!(ev.device_id().as_str(), "of:0001");

        let info = SubscriberEventInfo {
            device_id: DeviceId::from("of:0001"),
            port: PortNumber::new(16),
            s_tag: VlanId::new(7),
            c_tag: VlanId::new(101),
            tp_id: 64,
        };
        let ev = AccessDeviceEvent::SubscriberUniTagRegistered(info);
        assert_eq!(ev.event_type(), "SUBSCRIBER_UNI_TAG_REGISTERED");
    }
}
