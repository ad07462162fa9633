//! # Event pumps
//!
//! Southbound events enter the core through serialised, single-consumer
//! queues: one for device/port events, one for flow-rule events. Each pump
//! filters noise and ownership before touching shared state.

pub mod device;
pub mod flow;

pub use device::{DeviceEvent, DeviceEventPump};
pub use flow::{FlowEventListener, FlowRuleEvent, FlowRuleEventKind};
