//! Engine configuration.
//!
//! Every section has serde defaults so partial files and environment
//! overrides deserialize cleanly.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level integrity engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntegrityConfig {
    #[serde(default)]
    pub gate: GateConfig,

    #[serde(default)]
    pub monitor: MonitorConfig,

    #[serde(default)]
    pub locks: LockConfig,
}

/// Mutation gate configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    /// Raise health to CRITICAL when a mutation handler fails, in addition
    /// to post-mutation verification failures.
    #[serde(default = "default_escalate_handler_failures")]
    pub escalate_handler_failures: bool,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            escalate_handler_failures: default_escalate_handler_failures(),
        }
    }
}

/// Integrity monitor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Interval between scans in milliseconds
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Repair passes allowed per failure streak
    #[serde(default = "default_max_repair_attempts")]
    pub max_repair_attempts: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            max_repair_attempts: default_max_repair_attempts(),
        }
    }
}

impl MonitorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Lease lock configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockConfig {
    /// Lease duration used when a caller does not pass one, in milliseconds
    #[serde(default = "default_lease_ms")]
    pub default_lease_ms: u64,

    /// Owner id the repair service acquires alliance leases as
    #[serde(default = "default_repair_owner")]
    pub repair_owner: String,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            default_lease_ms: default_lease_ms(),
            repair_owner: default_repair_owner(),
        }
    }
}

impl LockConfig {
    pub fn default_lease(&self) -> Duration {
        Duration::from_millis(self.default_lease_ms)
    }
}

fn default_escalate_handler_failures() -> bool {
    true
}

fn default_interval_ms() -> u64 {
    30_000
}

fn default_max_repair_attempts() -> u32 {
    2
}

fn default_lease_ms() -> u64 {
    30_000
}

fn default_repair_owner() -> String {
    "integrity-repair".to_string()
}
