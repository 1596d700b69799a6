//! cadence.toml configuration parser.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration for a Cadence deployment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CadenceConfig {
    #[serde(default)]
    pub scanner: ScannerConfig,
    #[serde(default)]
    pub workers: WorkersConfig,
}

/// Scanner cadence knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// System default check interval in seconds. Used for resources
    /// without an explicit cadence, for resource types, and as the
    /// retry latency bound when a check lock is contended.
    pub default_interval_secs: u64,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            default_interval_secs: 60,
        }
    }
}

impl ScannerConfig {
    pub fn default_interval(&self) -> Duration {
        Duration::from_secs(self.default_interval_secs)
    }
}

/// Retry policy knobs for worker connections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkersConfig {
    /// Attempts per operation, including the first.
    pub retry_max_attempts: u32,
    /// First retry delay in milliseconds; doubles per attempt.
    pub retry_base_ms: u64,
    /// Upper bound on a single retry delay.
    pub retry_cap_ms: u64,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            retry_max_attempts: 5,
            retry_base_ms: 500,
            retry_cap_ms: 16_000,
        }
    }
}

impl CadenceConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: CadenceConfig = toml::from_str(&content)?;
        Ok(config)
    }
}
