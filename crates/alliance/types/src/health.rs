//! System health types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Tri-state system health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthState {
    Healthy,
    Warning,
    Critical,
}

impl HealthState {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthState::Healthy)
    }
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthState::Healthy => write!(f, "HEALTHY"),
            HealthState::Warning => write!(f, "WARNING"),
            HealthState::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Current health together with the reason for the last transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthRecord {
    pub state: HealthState,
    pub reason: String,
    pub changed_at: DateTime<Utc>,
}

impl Default for HealthRecord {
    fn default() -> Self {
        Self {
            state: HealthState::Healthy,
            reason: String::new(),
            changed_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_display_matches_wire_names() {
        assert_eq!(HealthState::Critical.to_string(), "CRITICAL");
        let json = serde_json::to_string(&HealthState::Warning).unwrap();
        assert_eq!(json, "\"WARNING\"");
    }

    #[test]
    fn default_record_is_healthy() {
        assert!(HealthRecord::default().state.is_healthy());
    }
}
