//! Integrity monitor.
//!
//! A background loop that re-verifies every alliance and walks an
//! escalation ladder on consecutive failing scans:
//!
//! | failing scans | effect                                            |
//! |---------------|---------------------------------------------------|
//! | 1             | health WARNING                                    |
//! | 2             | health CRITICAL, bounded repair attempt           |
//! | 3 and more    | health CRITICAL, SafeMode on                      |
//!
//! A clean scan resets the streak and clears WARNING. CRITICAL is left for
//! repair to clear. The monitor never returns errors to its caller; scan
//! failures surface as health, SafeMode, journal entries and events.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use alliance_types::{ActorId, AllianceId};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

use crate::config::MonitorConfig;
use crate::error::IntegrityResult;
use crate::events::{EventBus, IntegrityEvent};
use crate::health::HealthRegistry;
use crate::journal::{ops, Journal, JournalDraft};
use crate::repair::RepairService;
use crate::safe_mode::SafeMode;
use crate::snapshot::SnapshotService;

/// Health reason on the second consecutive failing scan.
pub const UNSTABLE_REASON: &str = "integrity unstable: attempting repair";

/// Health and SafeMode reason from the third consecutive failing scan on.
pub const ESCALATION_REASON: &str = "integrity escalation";

/// What a single tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Every alliance verified.
    Clean,
    /// First failing scan of a streak; health WARNING.
    Degraded {
        corrupted: Vec<AllianceId>,
        failure_count: u32,
    },
    /// Second failing scan; repair was run.
    RepairAttempted {
        corrupted: Vec<AllianceId>,
        repaired: bool,
    },
    /// Second failing scan with the repair budget spent.
    Unstable { corrupted: Vec<AllianceId> },
    /// Third or later failing scan; SafeMode on.
    Escalated {
        corrupted: Vec<AllianceId>,
        failure_count: u32,
    },
    /// A scan was already in flight; this tick was dropped.
    Skipped,
    /// The scan itself failed.
    Errored { reason: String },
}

struct MonitorTask {
    handle: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

/// Clears the in-flight flag when a scan ends, however it ends.
struct ScanGuard<'a>(&'a AtomicBool);

impl<'a> ScanGuard<'a> {
    fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| ScanGuard(flag))
    }
}

impl Drop for ScanGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Periodic integrity scanner.
pub struct IntegrityMonitor {
    snapshots: Arc<SnapshotService>,
    journal: Arc<Journal>,
    health: Arc<HealthRegistry>,
    safe_mode: Arc<SafeMode>,
    repair: Arc<RepairService>,
    events: EventBus,
    config: MonitorConfig,
    failure_count: AtomicU32,
    repair_attempts: AtomicU32,
    scanning: AtomicBool,
    task: Mutex<Option<MonitorTask>>,
}

impl IntegrityMonitor {
    pub fn new(
        snapshots: Arc<SnapshotService>,
        journal: Arc<Journal>,
        health: Arc<HealthRegistry>,
        safe_mode: Arc<SafeMode>,
        repair: Arc<RepairService>,
        events: EventBus,
        config: MonitorConfig,
    ) -> Self {
        Self {
            snapshots,
            journal,
            health,
            safe_mode,
            repair,
            events,
            config,
            failure_count: AtomicU32::new(0),
            repair_attempts: AtomicU32::new(0),
            scanning: AtomicBool::new(false),
            task: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Consecutive failing scans in the current streak.
    pub fn failure_count(&self) -> u32 {
        self.failure_count.load(Ordering::SeqCst)
    }

    /// Repairs run in the current streak.
    pub fn repair_attempts(&self) -> u32 {
        self.repair_attempts.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Spawn the scan loop. Returns false if it is already running.
    ///
    /// The first scan runs immediately. Ticks missed while a scan runs long
    /// are skipped rather than bunched up.
    pub fn start(self: &Arc<Self>, interval: Duration) -> bool {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.is_some() {
            return false;
        }

        let interval = interval.max(Duration::from_millis(1));
        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let monitor = Arc::clone(self);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        monitor.tick().await;
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            debug!("Integrity monitor loop exited");
        });

        *task = Some(MonitorTask { handle, shutdown });
        info!(
            interval_ms = interval.as_millis() as u64,
            "Integrity monitor started"
        );
        true
    }

    /// Stop the scan loop, waiting for an in-flight scan to finish.
    /// Returns false if it was not running.
    pub async fn stop(&self) -> bool {
        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(task) = task else {
            return false;
        };

        let _ = task.shutdown.send(true);
        if let Err(err) = task.handle.await {
            warn!(error = %err, "Integrity monitor task ended abnormally");
        }

        info!("Integrity monitor stopped");
        true
    }

    /// Run one scan unless one is already in flight.
    pub async fn tick(&self) -> ScanOutcome {
        let Some(_guard) = ScanGuard::try_acquire(&self.scanning) else {
            debug!("Scan already in flight, tick dropped");
            return ScanOutcome::Skipped;
        };

        match self.scan().await {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(error = %err, "Integrity scan failed");
                ScanOutcome::Errored {
                    reason: err.to_string(),
                }
            }
        }
    }

    #[instrument(skip(self))]
    async fn scan(&self) -> IntegrityResult<ScanOutcome> {
        let corrupted = self.snapshots.verify_all().await?;

        if corrupted.is_empty() {
            self.failure_count.store(0, Ordering::SeqCst);
            self.repair_attempts.store(0, Ordering::SeqCst);
            self.health.clear_warning();
            self.events.emit(IntegrityEvent::ScanCompleted {
                corrupted: Vec::new(),
                failure_count: 0,
            });
            debug!("Integrity scan clean");
            return Ok(ScanOutcome::Clean);
        }

        let failure_count = self.failure_count.fetch_add(1, Ordering::SeqCst) + 1;
        warn!(
            corrupted = corrupted.len(),
            failure_count,
            "Integrity scan found corrupted alliances"
        );

        self.journal
            .record_outcome(
                JournalDraft::new(ops::INTEGRITY_SCAN_FAILED, ActorId::system()),
                Err(describe(&corrupted)),
            )
            .await?;
        self.events.emit(IntegrityEvent::ScanCompleted {
            corrupted: corrupted.clone(),
            failure_count,
        });

        let outcome = match failure_count {
            1 => {
                self.health.warn(format!(
                    "{} alliance(s) failed integrity verification",
                    corrupted.len()
                ));
                ScanOutcome::Degraded {
                    corrupted,
                    failure_count,
                }
            }
            2 => {
                self.health.escalate(UNSTABLE_REASON);
                if self.repair_attempts() < self.config.max_repair_attempts {
                    self.repair_attempts.fetch_add(1, Ordering::SeqCst);
                    let repaired = match self.repair.attempt_repair().await {
                        Ok(repaired) => repaired,
                        Err(err) => {
                            error!(error = %err, "Repair pass failed");
                            false
                        }
                    };
                    ScanOutcome::RepairAttempted {
                        corrupted,
                        repaired,
                    }
                } else {
                    ScanOutcome::Unstable { corrupted }
                }
            }
            _ => {
                self.health.escalate(ESCALATION_REASON);
                self.safe_mode.activate(ESCALATION_REASON);
                ScanOutcome::Escalated {
                    corrupted,
                    failure_count,
                }
            }
        };

        Ok(outcome)
    }
}

fn describe(corrupted: &[AllianceId]) -> String {
    let ids: Vec<&str> = corrupted.iter().map(|id| id.as_str()).collect();
    format!("verification failed for {}", ids.join(", "))
}
