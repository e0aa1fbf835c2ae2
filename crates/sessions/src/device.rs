//! Collaborator interfaces for the robot control client.
//!
//! The pool only needs four operations from a device client: open a
//! connection, probe it, subscribe to its event stream and close it.
//! Concrete transports live outside this crate.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::mpsc;

use pb_domain::config::{normalize_serial, DevicesConfig, RobotConfig};

/// Failure reported by a device client call.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DeviceError {
    #[error("connect to {target}: {message}")]
    Connect { target: String, message: String },

    #[error("rpc: {0}")]
    Rpc(String),

    #[error("connection closed")]
    Closed,
}

/// One event pushed by the device on its event subscription.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceEvent {
    pub name: String,
    pub payload: serde_json::Value,
}

/// Receiving half of a filtered device event stream.
pub struct EventSubscription {
    rx: mpsc::Receiver<DeviceEvent>,
}

impl EventSubscription {
    /// Create a subscription together with the sender a transport feeds.
    pub fn channel(buffer: usize) -> (mpsc::Sender<DeviceEvent>, Self) {
        let (tx, rx) = mpsc::channel(buffer);
        (tx, Self { rx })
    }

    /// Next event, or `None` once the device side has gone away.
    pub async fn next(&mut self) -> Option<DeviceEvent> {
        self.rx.recv().await
    }
}

/// An open control connection to a single robot.
#[async_trait]
pub trait DeviceConnection: Send + Sync {
    /// Cheap round trip proving the connection is usable.
    async fn health_check(&self) -> Result<(), DeviceError>;

    /// Open an event stream restricted to the given event names.
    async fn subscribe_events(&self, filter: &[String]) -> Result<EventSubscription, DeviceError>;

    /// Tear the connection down.  Must be safe to call more than once.
    async fn close(&self);
}

/// Factory for [`DeviceConnection`]s.
#[async_trait]
pub trait DeviceConnector: Send + Sync {
    async fn open(
        &self,
        target: &str,
        serial: &str,
        credential: &str,
    ) -> Result<Arc<dyn DeviceConnection>, DeviceError>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Device directory
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// What the pool needs to know about a registered robot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRecord {
    pub serial: String,
    pub target: String,
    pub credential: Option<String>,
}

/// Source of known devices.
pub trait DeviceDirectory: Send + Sync {
    /// Look up a device by serial (case-insensitive, trimmed).
    fn lookup(&self, serial: &str) -> Option<DeviceRecord>;

    /// Credential used when a device has none of its own.
    fn global_credential(&self) -> Option<String>;
}

/// [`DeviceDirectory`] backed by the `[devices]` config section.
///
/// Robots can also be registered at runtime.
pub struct ConfigDirectory {
    devices: RwLock<DevicesConfig>,
}

impl ConfigDirectory {
    pub fn new(devices: DevicesConfig) -> Self {
        Self {
            devices: RwLock::new(devices),
        }
    }

    /// Add a robot, replacing any existing entry with the same serial.
    pub fn register(&self, robot: RobotConfig) {
        let serial = normalize_serial(&robot.serial);
        let mut devices = self.devices.write();
        devices
            .robots
            .retain(|r| normalize_serial(&r.serial) != serial);
        tracing::info!(serial = %serial, addr = %robot.target(), "robot registered");
        devices.robots.push(robot);
    }

    pub fn robots(&self) -> Vec<RobotConfig> {
        self.devices.read().robots.clone()
    }
}

impl DeviceDirectory for ConfigDirectory {
    fn lookup(&self, serial: &str) -> Option<DeviceRecord> {
        let devices = self.devices.read();
        devices.find(serial).map(|robot| DeviceRecord {
            serial: normalize_serial(&robot.serial),
            target: robot.target(),
            credential: robot.credential.clone().filter(|c| !c.is_empty()),
        })
    }

    fn global_credential(&self) -> Option<String> {
        self.devices
            .read()
            .global_credential
            .clone()
            .filter(|c| !c.is_empty())
    }
}
