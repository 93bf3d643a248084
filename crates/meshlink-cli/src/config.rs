//! Configuration file for the `meshlink` binary.
//!
//! ```yaml
//! node:
//!   address: 2
//!   reliability:
//!     ack_timeout_ms: 3000
//!     max_attempts: 2
//! serial:
//!   device: /dev/ttyUSB0
//!   baud_rate: 115200
//! poll_interval_ms: 50
//! hello_interval_secs: 30
//! ```

use std::path::Path;
use std::time::Duration;

use meshlink_node::NodeConfig;
use serde::{Deserialize, Serialize};

use crate::CliError;

/// Serial link to the modem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Device path.
    pub device: String,
    /// Line speed.
    pub baud_rate: u32,
    /// Upper bound on a single read once data is known to be waiting.
    pub read_timeout_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        SerialConfig {
            device: "/dev/ttyUSB0".to_string(),
            baud_rate: 115_200,
            read_timeout_ms: 10,
        }
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub node: NodeConfig,
    pub serial: SerialConfig,
    /// Sleep between control-loop cycles.
    pub poll_interval_ms: u64,
    /// Send a Hello this often while running. `None` sends one at startup only.
    pub hello_interval_secs: Option<u64>,
}

impl Default for CliConfig {
    fn default() -> Self {
        CliConfig {
            node: NodeConfig::default(),
            serial: SerialConfig::default(),
            poll_interval_ms: 50,
            hello_interval_secs: None,
        }
    }
}

impl CliConfig {
    /// Parse a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, CliError> {
        serde_yaml::from_str(yaml).map_err(|e| CliError::Config(e.to_string()))
    }

    /// Load a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CliError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            CliError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&yaml)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn hello_interval(&self) -> Option<Duration> {
        self.hello_interval_secs.map(Duration::from_secs)
    }
}
