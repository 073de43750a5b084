//! TOML-based configuration for the gateway daemon.

use std::path::Path;

use serde::Deserialize;

use cangw_gateway::table::DEFAULT_CAPACITY;

use crate::error::NodeError;

/// Top-level daemon configuration loaded from a TOML file.
#[derive(Debug, Default, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub gateway: GatewaySection,
    #[serde(default)]
    pub logging: LoggingSection,
    #[serde(default)]
    pub devices: Vec<DeviceEntry>,
    #[serde(default)]
    pub jobs: Vec<JobEntry>,
}

impl GatewayConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, NodeError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| NodeError::Config(format!("failed to read config file: {e}")))?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self, NodeError> {
        toml::from_str(s).map_err(|e| NodeError::Config(format!("failed to parse config: {e}")))
    }

    /// Resolve a configured device name to its interface index.
    pub fn device_index(&self, name: &str) -> Result<u32, NodeError> {
        self.devices
            .iter()
            .find(|d| d.name == name)
            .map(|d| d.index)
            .ok_or_else(|| NodeError::UnknownDevice(name.to_string()))
    }
}

/// The `[gateway]` section.
#[derive(Debug, Deserialize)]
pub struct GatewaySection {
    /// Bound on concurrently installed jobs.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// Interval in seconds between counter log lines. 0 disables. Default: 60.
    #[serde(default = "default_stats_interval")]
    pub stats_interval: u64,
}

fn default_capacity() -> usize {
    DEFAULT_CAPACITY
}

fn default_stats_interval() -> u64 {
    60
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            stats_interval: default_stats_interval(),
        }
    }
}

/// The `[logging]` section.
#[derive(Debug, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// A `[[devices]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceEntry {
    pub name: String,
    pub index: u32,
    #[serde(default = "default_up")]
    pub up: bool,
}

fn default_up() -> bool {
    true
}

/// A `[[jobs]]` entry describing one forwarding rule.
#[derive(Debug, Clone, Deserialize)]
pub struct JobEntry {
    /// Source device name.
    pub src: String,
    /// Destination device name.
    pub dst: String,
    /// Receive filter; omitted means match everything.
    pub filter: Option<FilterEntry>,
    /// Request frame echo on the destination interface.
    #[serde(default)]
    pub echo: bool,
    /// Preserve the receive timestamp on forwarded frames.
    #[serde(default)]
    pub keep_timestamp: bool,
    pub mod_and: Option<ModEntry>,
    pub mod_or: Option<ModEntry>,
    pub mod_xor: Option<ModEntry>,
    pub mod_set: Option<ModEntry>,
    pub checksum_xor: Option<ChecksumXorEntry>,
    pub checksum_crc8: Option<ChecksumCrc8Entry>,
}

/// A `filter` sub-table: masked identifier match.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct FilterEntry {
    #[serde(default)]
    pub id: u32,
    #[serde(default)]
    pub mask: u32,
}

/// One operator slot: the fields present select what the operator touches.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModEntry {
    pub id: Option<u32>,
    pub dlc: Option<u8>,
    /// Payload template as a hex word, first byte leftmost
    /// (e.g. `"aa00000000000000"`).
    pub data: Option<String>,
}

/// A `checksum_xor` sub-table.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ChecksumXorEntry {
    pub from: i8,
    pub to: i8,
    pub result: i8,
    #[serde(default)]
    pub init: u8,
}

/// A `checksum_crc8` sub-table. The lookup table is generated from the
/// polynomial.
#[derive(Debug, Clone, Deserialize)]
pub struct ChecksumCrc8Entry {
    pub from: i8,
    pub to: i8,
    pub result: i8,
    #[serde(default)]
    pub init: u8,
    #[serde(default)]
    pub final_xor: u8,
    #[serde(default = "default_poly")]
    pub poly: u8,
    /// `"xor-value"` or `"xor-dlc"`; omitted means no extension.
    pub profile: Option<String>,
    #[serde(default)]
    pub profile_data: u8,
}

fn default_poly() -> u8 {
    0x1D
}

/// Parse a payload template hex word.
pub fn parse_data_word(s: &str) -> Result<u64, NodeError> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    u64::from_str_radix(digits, 16)
        .map_err(|e| NodeError::Config(format!("bad payload template {s:?}: {e}")))
}
