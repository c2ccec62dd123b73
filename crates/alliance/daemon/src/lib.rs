//! Alliance Guard daemon library
//!
//! Hosts the integrity engine:
//! - Layered configuration (defaults, file, environment)
//! - Alliance seeding and integrity baseline
//! - Ownership bootstrap and SafeMode on a missing owner
//! - Background integrity monitor with graceful shutdown

pub mod config;
pub mod error;
pub mod guard;
pub mod seed;

pub use config::{DaemonConfig, LoggingConfig, Overrides};
pub use error::{DaemonError, DaemonResult};
pub use guard::GuardDaemon;
