//! SafeMode circuit breaker.
//!
//! When active, the mutation gate rejects every mutation that does not carry
//! a system override. Only an explicit operator action or a successful repair
//! switches it off.

use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::events::{EventBus, IntegrityEvent};

/// Reason recorded when no bot owner is registered.
pub const BOT_OWNER_MISSING: &str = "BOT_OWNER_MISSING";

/// Point-in-time SafeMode state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafeModeStatus {
    pub active: bool,
    pub reason: Option<String>,
    pub activated_at: Option<DateTime<Utc>>,
}

/// Global mutation circuit breaker.
pub struct SafeMode {
    status: RwLock<SafeModeStatus>,
    events: EventBus,
}

impl SafeMode {
    pub fn new(events: EventBus) -> Self {
        Self {
            status: RwLock::new(SafeModeStatus::default()),
            events,
        }
    }

    /// Switch SafeMode on. Re-activating replaces the reason.
    pub fn activate(&self, reason: impl Into<String>) {
        let reason = reason.into();
        let mut status = self.status.write().unwrap_or_else(PoisonError::into_inner);

        if !status.active {
            status.activated_at = Some(Utc::now());
        }
        status.active = true;
        status.reason = Some(reason.clone());

        warn!(reason = %reason, "SafeMode activated");
        self.events.emit(IntegrityEvent::SafeModeActivated { reason });
    }

    /// Switch SafeMode off and clear the reason.
    pub fn deactivate(&self) {
        let mut status = self.status.write().unwrap_or_else(PoisonError::into_inner);
        let was_active = status.active;
        *status = SafeModeStatus::default();

        if was_active {
            info!("SafeMode deactivated");
            self.events.emit(IntegrityEvent::SafeModeDeactivated);
        }
    }

    pub fn is_active(&self) -> bool {
        self.status().active
    }

    pub fn reason(&self) -> Option<String> {
        self.status().reason
    }

    pub fn status(&self) -> SafeModeStatus {
        self.status
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_inactive() {
        let safe_mode = SafeMode::new(EventBus::default());
        assert!(!safe_mode.is_active());
        assert!(safe_mode.reason().is_none());
    }

    #[test]
    fn reactivation_overwrites_reason() {
        let safe_mode = SafeMode::new(EventBus::default());
        safe_mode.activate("first");
        let first_at = safe_mode.status().activated_at;

        safe_mode.activate("second");
        assert_eq!(safe_mode.reason().as_deref(), Some("second"));
        assert_eq!(safe_mode.status().activated_at, first_at);
    }

    #[test]
    fn deactivate_clears_reason() {
        let safe_mode = SafeMode::new(EventBus::default());
        safe_mode.activate(BOT_OWNER_MISSING);
        safe_mode.deactivate();

        assert!(!safe_mode.is_active());
        assert!(safe_mode.reason().is_none());
        assert!(safe_mode.status().activated_at.is_none());
    }
}
