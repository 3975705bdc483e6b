//! Tunables for polling and the registry.

use std::time::Duration;

/// Heartbeat polling configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// Delay between two status queries.
    pub interval: Duration,
    /// How long one status query may take before it counts as a timeout.
    pub timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            timeout: Duration::from_secs(2),
        }
    }
}

/// Registry configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    pub heartbeat: HeartbeatConfig,
    /// Timeout for commands and manual-add probes.
    pub command_timeout: Duration,
    /// Send G-code preheat targets after a successful upload.
    pub apply_preheat: bool,
    /// Capacity of the event channel.
    pub event_capacity: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            heartbeat: HeartbeatConfig::default(),
            command_timeout: Duration::from_secs(10),
            apply_preheat: true,
            event_capacity: 256,
        }
    }
}
