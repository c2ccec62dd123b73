//! Core types for Alliance Guard.
//!
//! These types are shared between the integrity engine and the daemon that
//! hosts it. The alliance entity itself is owned by the chat-platform layer;
//! this crate only describes its shape so the engine can fingerprint it.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]

pub mod alliance;
pub mod health;
pub mod ids;
pub mod journal;

pub use alliance::{Alliance, AllianceMembers};
pub use health::{HealthRecord, HealthState};
pub use ids::{ActorId, AllianceId, JournalEntryId};
pub use journal::JournalStatus;
