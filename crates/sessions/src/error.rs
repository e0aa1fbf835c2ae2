use std::time::Duration;

use crate::device::DeviceError;

/// Errors surfaced by [`SessionPool`](crate::SessionPool) operations.
///
/// Every creation failure means no session was inserted; callers may retry.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("device {0} is not registered")]
    DeviceNotRegistered(String),

    #[error("no credential configured for device {0} and no global credential set")]
    MissingCredential(String),

    #[error("connecting to device {serial}: {source}")]
    ConnectionFailed {
        serial: String,
        #[source]
        source: DeviceError,
    },

    #[error("health check for device {serial} failed: {source}")]
    HealthCheckFailed {
        serial: String,
        #[source]
        source: DeviceError,
    },

    #[error("event subscription for device {serial} failed: {source}")]
    SubscriptionFailed {
        serial: String,
        #[source]
        source: DeviceError,
    },

    #[error("gave up after {0:?} waiting for the session creation gate")]
    CreationGateTimeout(Duration),
}

impl SessionError {
    /// Short stage label used in logs and trace events.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::DeviceNotRegistered(_) => "lookup",
            Self::MissingCredential(_) => "credential",
            Self::ConnectionFailed { .. } => "connect",
            Self::HealthCheckFailed { .. } => "health_check",
            Self::SubscriptionFailed { .. } => "subscribe",
            Self::CreationGateTimeout(_) => "gate",
        }
    }
}
