//! Node configuration.
//!
//! Configuration is plain serde data so it can be embedded in a larger YAML
//! file (the `meshlink` binary nests it under `node:`). Every field has a
//! default, so an empty document is a valid configuration.

use std::path::Path;
use std::time::Duration;

use meshlink_packet::{NodeAddress, ParseOptions, MAX_PAYLOAD_SIZE};
use serde::{Deserialize, Serialize};

use crate::{NodeError, NodeResult};

/// Default local address.
pub const DEFAULT_ADDRESS: NodeAddress = NodeAddress(0x0001);

/// Default time to wait for an Ack before sending again.
pub const DEFAULT_ACK_TIMEOUT_MS: u64 = 3_000;

/// Default number of transmissions per message, including the first.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 2;

/// Default Hello payload.
pub const DEFAULT_HELLO_PAYLOAD: &str = "hello";

/// Retry policy for messages that expect an Ack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Time since the last transmission after which a message is sent again
    /// or abandoned.
    pub ack_timeout_ms: u64,
    /// Total transmissions allowed, counting the original one.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            ack_timeout_ms: DEFAULT_ACK_TIMEOUT_MS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl RetryPolicy {
    /// The ack timeout as a `Duration`.
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    /// Whether a message already sent `transmissions` times may be sent again.
    pub fn allows_retry(&self, transmissions: u32) -> bool {
        transmissions < self.max_attempts
    }
}

/// Configuration of a single protocol stack instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Local node address.
    pub address: NodeAddress,
    /// Ack timeout and retry budget.
    pub reliability: RetryPolicy,
    /// Consistency checks applied to received packets.
    pub parse: ParseOptions,
    /// Refuse reliable sends to nodes no Hello has been received from.
    pub require_known_neighbor: bool,
    /// Neighbors not heard from for this long are treated as unknown.
    /// `None` keeps them forever.
    pub neighbor_max_age_secs: Option<u64>,
    /// First message identifier handed out.
    pub first_identifier: u16,
    /// Payload carried by outgoing Hello packets.
    pub hello_payload: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            address: DEFAULT_ADDRESS,
            reliability: RetryPolicy::default(),
            parse: ParseOptions::strict(),
            require_known_neighbor: true,
            neighbor_max_age_secs: None,
            first_identifier: 1,
            hello_payload: DEFAULT_HELLO_PAYLOAD.to_string(),
        }
    }
}

impl NodeConfig {
    /// Default configuration for the given address.
    pub fn with_address(address: NodeAddress) -> Self {
        NodeConfig {
            address,
            ..Default::default()
        }
    }

    /// Parse and validate a YAML document.
    pub fn from_yaml_str(yaml: &str) -> NodeResult<Self> {
        let config: NodeConfig =
            serde_yaml::from_str(yaml).map_err(|e| NodeError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML file.
    pub fn load(path: impl AsRef<Path>) -> NodeResult<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| NodeError::Config(format!("failed to read {}: {}", path.display(), e)))?;
        Self::from_yaml_str(&yaml)
    }

    /// Check the configuration for values the stack cannot run with.
    pub fn validate(&self) -> NodeResult<()> {
        if self.address.is_broadcast() {
            return Err(NodeError::Config(format!(
                "local address cannot be the broadcast address {}",
                self.address
            )));
        }
        if self.reliability.max_attempts == 0 {
            return Err(NodeError::Config(
                "reliability.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.reliability.ack_timeout_ms == 0 {
            return Err(NodeError::Config(
                "reliability.ack_timeout_ms must be positive".to_string(),
            ));
        }
        if self.hello_payload.len() > MAX_PAYLOAD_SIZE {
            return Err(NodeError::Config(format!(
                "hello_payload is {} bytes, max {}",
                self.hello_payload.len(),
                MAX_PAYLOAD_SIZE
            )));
        }
        Ok(())
    }

    /// Maximum neighbor age as a `Duration`, if one is configured.
    pub fn neighbor_max_age(&self) -> Option<Duration> {
        self.neighbor_max_age_secs.map(Duration::from_secs)
    }
}
