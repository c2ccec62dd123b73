//! System health registry.
//!
//! Health is a small state machine rather than a free-form field:
//!
//! ```text
//! HEALTHY <--> WARNING
//!    |            |
//!    +--> CRITICAL <+
//!            |
//!            +--> HEALTHY   (restore_after_repair only)
//! ```
//!
//! CRITICAL is sticky. Routine mutation success and clean scans never clear
//! it; only a successful repair does.

use std::sync::{PoisonError, RwLock};

use alliance_types::{HealthRecord, HealthState};
use chrono::Utc;
use tracing::{info, warn};

use crate::events::{EventBus, IntegrityEvent};

/// Process-wide health, injected wherever it is read or written.
pub struct HealthRegistry {
    record: RwLock<HealthRecord>,
    events: EventBus,
}

impl HealthRegistry {
    pub fn new(events: EventBus) -> Self {
        Self {
            record: RwLock::new(HealthRecord::default()),
            events,
        }
    }

    pub fn state(&self) -> HealthState {
        self.record().state
    }

    pub fn reason(&self) -> String {
        self.record().reason
    }

    pub fn record(&self) -> HealthRecord {
        self.record
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// HEALTHY or WARNING -> WARNING. Ignored while CRITICAL.
    ///
    /// Returns the state after the call.
    pub fn warn(&self, reason: impl Into<String>) -> HealthState {
        let mut record = self.record.write().unwrap_or_else(PoisonError::into_inner);
        if record.state == HealthState::Critical {
            return HealthState::Critical;
        }
        self.transition(&mut record, HealthState::Warning, reason.into());
        record.state
    }

    /// WARNING -> HEALTHY. Returns whether a transition happened.
    pub fn clear_warning(&self) -> bool {
        let mut record = self.record.write().unwrap_or_else(PoisonError::into_inner);
        if record.state != HealthState::Warning {
            return false;
        }
        self.transition(&mut record, HealthState::Healthy, String::new());
        true
    }

    /// Any state -> CRITICAL.
    pub fn escalate(&self, reason: impl Into<String>) {
        let mut record = self.record.write().unwrap_or_else(PoisonError::into_inner);
        self.transition(&mut record, HealthState::Critical, reason.into());
    }

    /// Any state -> HEALTHY after a successful repair.
    pub fn restore_after_repair(&self, reason: impl Into<String>) {
        let mut record = self.record.write().unwrap_or_else(PoisonError::into_inner);
        self.transition(&mut record, HealthState::Healthy, reason.into());
    }

    fn transition(&self, record: &mut HealthRecord, to: HealthState, reason: String) {
        let from = record.state;
        record.state = to;
        record.reason = reason.clone();
        record.changed_at = Utc::now();

        if from == to {
            return;
        }

        match to {
            HealthState::Healthy => info!(from = %from, reason = %reason, "Health restored"),
            HealthState::Warning => warn!(from = %from, reason = %reason, "Health degraded"),
            HealthState::Critical => warn!(from = %from, reason = %reason, "Health critical"),
        }

        self.events.emit(IntegrityEvent::HealthChanged { from, to, reason });
    }
}
