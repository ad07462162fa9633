//! # OLT Control
//!
//! Reconciliation core for access-network edge switches (OLTs).
//!
//! For each subscriber port the core installs, tracks and withdraws the
//! OpenFlow-style forwarding entries and rate-limiting meters that trap
//! authentication, address acquisition, multicast signalling and discovery
//! traffic and that carry user data between UNI and NNI ports.
//! Provisioning is driven by operator requests, by live device events and
//! by the subscriber-information service; a consistent-hash ring shards
//! devices across cluster instances so exactly one instance drives each
//! device.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapters;
pub mod cluster;
pub mod config;
pub mod domain;
pub mod flows;
pub mod listener;
pub mod meters;
pub mod reconciler;
pub mod service;
pub mod store;

pub use config::OltConfig;
pub use domain::{
    AccessDeviceEvent, AccessDevicePort, BandwidthProfileInformation, ConnectPoint, DeviceId,
    MacAddress, MeterId, NodeId, OltError, OltFlowsStatus, OltPortStatus, PortNumber, ServiceKey,
    SubscriberAndDeviceInformation, UniTagInformation, VlanId,
};
pub use service::AccessDeviceService;

/// Application id stamped on every flow rule this component installs;
/// foreign rules are ignored by the flow listener
pub const APP_NAME: &str = "org.opencord.olt-control";
