//! Domain errors

use thiserror::Error;

use super::value_objects::{ConnectPoint, DeviceId};

/// Failure reported by the southbound driver for a filter, forward or
/// meter objective
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ObjectiveError {
    #[error("Bad objective parameters: {0}")]
    BadParams(String),

    #[error("Unknown southbound failure: {0}")]
    Unknown(String),

    #[error("Transient southbound failure: {0}")]
    Transient(String),
}

/// Access-control-plane errors
#[derive(Error, Debug)]
pub enum OltError {
    /// The device is driven by another cluster instance; callers skip silently
    #[error("Device {0} is not owned by this instance")]
    NotOwned(DeviceId),

    /// Subscriber or OLT record missing in the subscriber-information service
    #[error("No subscriber information for {0}")]
    NotConfigured(String),

    /// Malformed operator input, rejected synchronously
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Port unknown to the device inventory
    #[error("Port {0} not found")]
    PortNotFound(ConnectPoint),

    /// Install or remove failed at the driver
    #[error("Southbound error: {0}")]
    Southbound(#[from] ObjectiveError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::PortNumber;

    #[test]
    fn error_messages_carry_context() {
        let err = OltError::NotOwned(DeviceId::from("of:0001"));
        assert!(err.to_string().contains("of:0001"));

        let cp = ConnectPoint::new(DeviceId::from("of:0001"), PortNumber::new(16));
        let err = OltError::PortNotFound(cp);
        assert!(err.to_string().contains("of:0001/16"));
    }
}
