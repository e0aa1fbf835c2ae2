//! Device session management for podbridge.
//!
//! A [`SessionPool`] owns one live control connection per robot, keyed by
//! the normalized device serial.  Sessions are created lazily on first
//! [`SessionPool::acquire`], shared across interactions, and evicted by a
//! per-session reaper task once they have been idle for the configured
//! number of ticks.
//!
//! The device control client itself is an external collaborator reached
//! through the [`DeviceConnector`] / [`DeviceConnection`] traits.

pub mod device;
pub mod error;
pub mod pool;
pub mod reaper;
pub mod session;
pub mod telemetry;

pub use device::{
    ConfigDirectory, DeviceConnection, DeviceConnector, DeviceDirectory, DeviceError, DeviceEvent,
    DeviceRecord, EventSubscription,
};
pub use error::SessionError;
pub use pb_domain::config::normalize_serial;
pub use pool::{ReleaseReason, SessionPool, SessionPoolConfig};
pub use reaper::ReaperExit;
pub use session::{AudioStreamGuard, Session, SessionInfo};
