//! # Access-Device Domain Layer
//!
//! Data model of the reconciliation core: identifiers and service
//! definitions, the per-service status state machine, the public event
//! vocabulary, the error taxonomy, and the port traits that bound the
//! core against its external collaborators.

pub mod errors;
pub mod events;
pub mod ports;
pub mod status;
pub mod value_objects;

// Re-exports - explicit to avoid ambiguity
pub use errors::{ObjectiveError, OltError};
pub use events::{AccessDeviceEvent, StampedEvent, SubscriberEventInfo};
pub use ports::{
    ClusterService, DeviceDescriptor, DeviceInventory, FlowProgrammer, HostDescriptor,
    HostService, PortDescriptor, SubscriberService,
};
pub use status::{OltFlowsStatus, OltPortStatus};
pub use value_objects::{
    AccessDevicePort, BandwidthProfileInformation, ConnectPoint, DeviceId, MacAddress,
    MacAddressError, MeterId, NodeId, PortNumber, ServiceKey, SubscriberAndDeviceInformation,
    UniTagInformation, VlanId, NONE_TP_ID,
};
