//! Configuration for the DPA protocol engine
//!
//! Centralized configuration with sensible defaults. Loadable from JSON.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DpaError, Result};
use crate::protocol::DeviceInterface;
use crate::timing::NetworkTiming;

/// Main configuration of a protocol layer instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // -------------------------------------------------------------------------
    // State Machine Configuration
    // -------------------------------------------------------------------------
    /// How long to wait for a confirmation (milliseconds)
    pub time_to_wait_for_confirmation_ms: u64,

    /// Base of the response wait formula (milliseconds)
    pub base_time_to_wait_for_response_ms: u64,

    /// Bound on the worker's acknowledgement of an event (milliseconds)
    pub state_change_timeout_ms: u64,

    // -------------------------------------------------------------------------
    // Request Registry Configuration
    // -------------------------------------------------------------------------
    /// Registered requests older than this are evicted (milliseconds)
    pub max_request_duration_ms: u64,

    // -------------------------------------------------------------------------
    // Timing Configuration
    // -------------------------------------------------------------------------
    /// Timing of networks without their own entry
    pub default_timing: NetworkTiming,

    /// Per-network timing, keyed by network id
    pub networks: HashMap<String, NetworkTiming>,

    /// Calls exempt from state machine timing
    pub time_unlimited: TimeUnlimitedTable,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            time_to_wait_for_confirmation_ms: 2000,
            base_time_to_wait_for_response_ms: 2000,
            state_change_timeout_ms: 1000,
            max_request_duration_ms: 10_000,
            default_timing: NetworkTiming::default(),
            networks: HashMap::new(),
            time_unlimited: TimeUnlimitedTable::default(),
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Load a JSON config file; missing fields take their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| DpaError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn time_to_wait_for_confirmation(&self) -> Duration {
        Duration::from_millis(self.time_to_wait_for_confirmation_ms)
    }

    pub fn base_time_to_wait_for_response(&self) -> Duration {
        Duration::from_millis(self.base_time_to_wait_for_response_ms)
    }

    pub fn state_change_timeout(&self) -> Duration {
        Duration::from_millis(self.state_change_timeout_ms)
    }

    pub fn max_request_duration(&self) -> Duration {
        Duration::from_millis(self.max_request_duration_ms)
    }
}

/// Validate a signed millisecond tunable
pub fn non_negative_ms(name: &str, ms: i64) -> Result<Duration> {
    if ms < 0 {
        return Err(DpaError::InvalidArgument(format!(
            "{} cannot be less than 0: {}",
            name, ms
        )));
    }
    Ok(Duration::from_millis(ms as u64))
}

/// (interface, method) pairs whose calls bypass state machine timing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimeUnlimitedTable {
    entries: BTreeSet<(DeviceInterface, String)>,
}

impl Default for TimeUnlimitedTable {
    /// Discovery, bonding and FRC sweeps
    fn default() -> Self {
        Self::empty()
            .with(DeviceInterface::Coordinator, "run_discovery")
            .with(DeviceInterface::Coordinator, "bond_node")
            .with(DeviceInterface::Frc, "send")
    }
}

impl TimeUnlimitedTable {
    pub fn empty() -> Self {
        Self { entries: BTreeSet::new() }
    }

    pub fn with(mut self, interface: DeviceInterface, method: impl Into<String>) -> Self {
        self.entries.insert((interface, method.into()));
        self
    }

    pub fn contains(&self, interface: DeviceInterface, method: &str) -> bool {
        self.entries.contains(&(interface, method.to_string()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the confirmation wait (in milliseconds)
    pub fn time_to_wait_for_confirmation_ms(mut self, ms: u64) -> Self {
        self.config.time_to_wait_for_confirmation_ms = ms;
        self
    }

    /// Set the base of the response wait (in milliseconds)
    pub fn base_time_to_wait_for_response_ms(mut self, ms: u64) -> Self {
        self.config.base_time_to_wait_for_response_ms = ms;
        self
    }

    /// Set the state change acknowledgement bound (in milliseconds)
    pub fn state_change_timeout_ms(mut self, ms: u64) -> Self {
        self.config.state_change_timeout_ms = ms;
        self
    }

    /// Set the maximum request duration (in milliseconds)
    pub fn max_request_duration_ms(mut self, ms: u64) -> Self {
        self.config.max_request_duration_ms = ms;
        self
    }

    /// Set timing used by networks without their own entry
    pub fn default_timing(mut self, timing: NetworkTiming) -> Self {
        self.config.default_timing = timing;
        self
    }

    /// Set timing of one network
    pub fn network(mut self, network_id: impl Into<String>, timing: NetworkTiming) -> Self {
        self.config.networks.insert(network_id.into(), timing);
        self
    }

    /// Replace the time-unlimited call table
    pub fn time_unlimited(mut self, table: TimeUnlimitedTable) -> Self {
        self.config.time_unlimited = table;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
