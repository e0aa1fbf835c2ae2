use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Known devices
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The list of robots this bridge is allowed to open control sessions to.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DevicesConfig {
    /// Credential used for any robot that does not carry its own.
    #[serde(default)]
    pub global_credential: Option<String>,
    #[serde(default)]
    pub robots: Vec<RobotConfig>,
}

/// A single registered robot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RobotConfig {
    /// Device serial.  Matched case-insensitively after trimming.
    pub serial: String,
    /// Host or IP address of the robot's control endpoint.
    pub address: String,
    #[serde(default = "d_443")]
    pub port: u16,
    #[serde(default)]
    pub credential: Option<String>,
}

impl RobotConfig {
    /// `address:port` as passed to the device connector.
    pub fn target(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

impl DevicesConfig {
    /// Find the robot whose serial matches `serial` case-insensitively.
    pub fn find(&self, serial: &str) -> Option<&RobotConfig> {
        let wanted = normalize_serial(serial);
        self.robots
            .iter()
            .find(|r| normalize_serial(&r.serial) == wanted)
    }

    /// Resolve the credential for `robot`, falling back to the global one.
    /// Empty strings count as "not configured".
    pub fn credential_for(&self, robot: &RobotConfig) -> Option<String> {
        robot
            .credential
            .as_deref()
            .filter(|c| !c.is_empty())
            .or_else(|| self.global_credential.as_deref().filter(|c| !c.is_empty()))
            .map(str::to_owned)
    }
}

/// Canonical form of a device identifier: trimmed and lower-cased.
pub fn normalize_serial(serial: &str) -> String {
    serial.trim().to_lowercase()
}

/// Connection behaviour for the device control client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Timeout for establishing the control connection.
    #[serde(default = "d_5000")]
    pub connect_timeout_ms: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5000,
        }
    }
}

fn d_443() -> u16 {
    443
}

fn d_5000() -> u64 {
    5000
}
