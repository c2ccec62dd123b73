//! Journal status lifecycle
//!
//! ```text
//! PENDING --> EXECUTED --> CONFIRMED
//!    |
//!    +------> ABORTED
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of one mutation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JournalStatus {
    Pending,
    Executed,
    Confirmed,
    Aborted,
}

impl JournalStatus {
    /// Terminal states never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JournalStatus::Confirmed | JournalStatus::Aborted)
    }

    /// Whether `self -> next` is an allowed transition.
    pub fn can_transition_to(&self, next: JournalStatus) -> bool {
        use JournalStatus::*;
        matches!(
            (self, next),
            (Pending, Executed) | (Pending, Aborted) | (Executed, Confirmed)
        )
    }
}

impl fmt::Display for JournalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JournalStatus::Pending => write!(f, "PENDING"),
            JournalStatus::Executed => write!(f, "EXECUTED"),
            JournalStatus::Confirmed => write!(f, "CONFIRMED"),
            JournalStatus::Aborted => write!(f, "ABORTED"),
        }
    }
}
