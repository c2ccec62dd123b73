//! Alliance Guard integrity engine.
//!
//! Every structural change to an alliance (membership, roles, leadership)
//! and every change to bot ownership flows through one mutation gate that
//! journals intent, runs the change, and verifies the result against a
//! snapshot checksum. A background monitor re-verifies all alliances,
//! escalates system health on repeated failure, attempts a bounded repair,
//! and finally trips SafeMode, which blocks further mutations.
//!
//! ## Invariants
//!
//! - **Journal before action**: a PENDING entry exists before any handler runs.
//! - **Append-only journal**: entries only move PENDING -> EXECUTED -> CONFIRMED
//!   or PENDING -> ABORTED; terminal entries never change.
//! - **Order-independent checksums**: reordering officers or regulars never
//!   changes an alliance's checksum.
//! - **Sticky CRITICAL**: only a successful repair returns health from
//!   CRITICAL to HEALTHY.
//! - **SafeMode blocks mutations**: only `system_override` mutations run
//!   while it is active.
//! - **Single scan**: monitor scans never overlap.
//! - **Bot owner required**: without one the system sits in SafeMode.
//!
//! ## Components
//!
//! 1. [`MutationGate`]: journaled, verified execution of mutation handlers
//! 2. [`Journal`]: append-only mutation log
//! 3. [`SnapshotService`]: per-alliance checksums and verification
//! 4. [`IntegrityMonitor`]: periodic scan and escalation ladder
//! 5. [`RepairService`]: shrink corrupted alliances to their snapshot shape
//! 6. [`HealthRegistry`] and [`SafeMode`]: system state and circuit breaker
//! 7. [`LockManager`]: lease locks over the shared [`StateStore`]
//! 8. [`OwnershipRegistry`]: bot owner and authorities

#![deny(unsafe_code)]

pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod gate;
pub mod health;
pub mod journal;
pub mod lock;
pub mod monitor;
pub mod ownership;
pub mod repair;
pub mod repository;
pub mod safe_mode;
pub mod snapshot;
pub mod storage;

pub use config::{GateConfig, IntegrityConfig, LockConfig, MonitorConfig};
pub use context::IntegrityContext;
pub use error::{ErrorKind, IntegrityError, IntegrityResult, StorageError, StorageResult};
pub use events::{EventBus, IntegrityEvent};
pub use gate::{MutationGate, MutationOptions};
pub use health::HealthRegistry;
pub use journal::{ops, Journal, JournalDraft, JournalEntry, JournalFilter};
pub use lock::{Lease, LeaseLock, LockManager, LockScope};
pub use monitor::{IntegrityMonitor, ScanOutcome};
pub use ownership::{OwnershipRecord, OwnershipRegistry};
pub use repair::{RepairReport, RepairService};
pub use repository::{AllianceRepository, InMemoryAllianceRepository};
pub use safe_mode::{SafeMode, SafeModeStatus, BOT_OWNER_MISSING};
pub use snapshot::{compute_checksum, AllianceSnapshot, RoleCounts, SnapshotService};
pub use storage::{InMemoryStateStore, StateStore};
