//! Configuration type definitions.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Name of the table Moray keeps its bucket configuration in.
pub const DEFAULT_CONFIG_TABLE: &str = "buckets_config";

/// Extraction tuning.
///
/// Every field has a default, so an empty YAML document is a valid
/// configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    /// Table holding one row per bucket (default: "buckets_config").
    pub config_table: String,

    /// Number of tokenized events buffered between the dump reader and
    /// its consumer (default: 16).
    pub event_buffer: usize,

    /// Size of the decompressed-input read buffer in bytes (default: 1 MiB).
    pub read_buffer_bytes: usize,

    /// Size of each output file's write buffer in bytes (default: 64 KiB).
    pub write_buffer_bytes: usize,

    /// Interval between throughput reports in milliseconds (default: 1000).
    pub report_interval_ms: u64,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            config_table: DEFAULT_CONFIG_TABLE.to_string(),
            event_buffer: 16,
            read_buffer_bytes: 1024 * 1024,
            write_buffer_bytes: 64 * 1024,
            report_interval_ms: 1000,
        }
    }
}

impl ExtractConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the configuration table name.
    pub fn with_config_table(mut self, table: impl Into<String>) -> Self {
        self.config_table = table.into();
        self
    }

    /// Set the event channel capacity.
    pub fn with_event_buffer(mut self, size: usize) -> Self {
        self.event_buffer = size.max(1);
        self
    }

    /// Set the output write buffer size.
    pub fn with_write_buffer_bytes(mut self, size: usize) -> Self {
        self.write_buffer_bytes = size.max(1);
        self
    }

    /// Set the throughput report interval.
    pub fn with_report_interval(mut self, interval: Duration) -> Self {
        self.report_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX).max(1);
        self
    }

    /// Throughput report interval as a [`Duration`].
    pub fn report_interval(&self) -> Duration {
        Duration::from_millis(self.report_interval_ms)
    }
}
