//! Best-effort repair of corrupted alliances.
//!
//! Repair shrinks officer and regular lists back to the counts recorded in
//! the last snapshot. It never invents membership, so an alliance that lost
//! members or changed leader cannot be restored; it only discards excess.
//! Each alliance is repaired under its own lease, the same one ordinary
//! mutations take.

use std::sync::Arc;

use alliance_types::{ActorId, AllianceId};
use tracing::{debug, info, instrument, warn};

use crate::error::{IntegrityError, IntegrityResult, StorageError};
use crate::events::{EventBus, IntegrityEvent};
use crate::health::HealthRegistry;
use crate::journal::{ops, Journal, JournalDraft};
use crate::lock::LockManager;
use crate::repository::AllianceRepository;
use crate::safe_mode::SafeMode;
use crate::snapshot::SnapshotService;

/// Outcome of one repair pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepairReport {
    pub repaired: Vec<AllianceId>,
    /// Alliances left corrupted, with the reason.
    pub failed: Vec<(AllianceId, String)>,
}

impl RepairReport {
    pub fn any_repaired(&self) -> bool {
        !self.repaired.is_empty()
    }
}

/// Rolls corrupted alliances back toward their snapshot shape.
pub struct RepairService {
    snapshots: Arc<SnapshotService>,
    repository: Arc<dyn AllianceRepository>,
    journal: Arc<Journal>,
    health: Arc<HealthRegistry>,
    safe_mode: Arc<SafeMode>,
    locks: Arc<LockManager>,
    events: EventBus,
    owner: ActorId,
}

impl RepairService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        snapshots: Arc<SnapshotService>,
        repository: Arc<dyn AllianceRepository>,
        journal: Arc<Journal>,
        health: Arc<HealthRegistry>,
        safe_mode: Arc<SafeMode>,
        locks: Arc<LockManager>,
        events: EventBus,
        owner: ActorId,
    ) -> Self {
        Self {
            snapshots,
            repository,
            journal,
            health,
            safe_mode,
            locks,
            events,
            owner,
        }
    }

    /// Lease owner used while repairing.
    pub fn owner(&self) -> &ActorId {
        &self.owner
    }

    /// Repair every corrupted alliance. True if at least one was repaired.
    pub async fn attempt_repair(&self) -> IntegrityResult<bool> {
        Ok(self.repair_all().await?.any_repaired())
    }

    /// Repair every alliance that currently fails verification.
    ///
    /// Any success restores health to HEALTHY and lifts SafeMode.
    #[instrument(skip(self))]
    pub async fn repair_all(&self) -> IntegrityResult<RepairReport> {
        let corrupted = self.snapshots.verify_all().await?;
        let mut report = RepairReport::default();

        for id in corrupted {
            match self.repair_one(&id).await {
                Ok(()) => {
                    debug!(alliance_id = %id, "Alliance repaired");
                    report.repaired.push(id);
                }
                Err(err) => {
                    let message = err.to_string();
                    warn!(alliance_id = %id, error = %message, "Repair failed");
                    self.journal
                        .record_outcome(
                            JournalDraft::new(ops::REPAIR_FAILED, self.owner.clone())
                                .for_alliance(id.clone()),
                            Err(message.clone()),
                        )
                        .await?;
                    report.failed.push((id, message));
                }
            }
        }

        if report.any_repaired() {
            self.journal
                .record_outcome(
                    JournalDraft::new(ops::REPAIR_SUCCESS, self.owner.clone()),
                    Ok(()),
                )
                .await?;
            self.health.restore_after_repair("integrity repaired");
            self.safe_mode.deactivate();
            info!(
                repaired = report.repaired.len(),
                failed = report.failed.len(),
                "Repair pass restored integrity"
            );
        }

        self.events.emit(IntegrityEvent::RepairCompleted {
            repaired: report.repaired.clone(),
            failed: report.failed.iter().map(|(id, _)| id.clone()).collect(),
        });

        Ok(report)
    }

    /// Repair one alliance under its lease.
    pub async fn repair_one(&self, id: &AllianceId) -> IntegrityResult<()> {
        self.locks
            .alliance(id)
            .run(&self.owner, move || self.repair_locked(id))
            .await
    }

    async fn repair_locked(&self, id: &AllianceId) -> IntegrityResult<()> {
        let snapshot = self
            .snapshots
            .get_snapshot(id)
            .await?
            .ok_or_else(|| IntegrityError::IntegrityViolation {
                alliance_id: id.clone(),
                reason: "no snapshot to repair from".to_string(),
            })?;

        let mut alliance = self
            .repository
            .get_alliance(id)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("alliance {}", id)))?;

        let members = &mut alliance.members;
        members.officers.truncate(snapshot.role_counts.officers);
        members.regulars.truncate(snapshot.role_counts.regulars);

        self.repository.put_alliance(alliance.clone()).await?;
        self.snapshots.create_snapshot(&alliance).await?;

        if !self.snapshots.verify_snapshot(id).await? {
            return Err(IntegrityError::IntegrityViolation {
                alliance_id: id.clone(),
                reason: "verification failed after repair".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LockConfig;
    use crate::journal::JournalFilter;
    use crate::repository::InMemoryAllianceRepository;
    use crate::storage::{InMemoryStateStore, StateStore};
    use alliance_types::{Alliance, HealthState, JournalStatus};

    struct Fixture {
        service: RepairService,
        repository: Arc<InMemoryAllianceRepository>,
        snapshots: Arc<SnapshotService>,
        journal: Arc<Journal>,
        health: Arc<HealthRegistry>,
        safe_mode: Arc<SafeMode>,
        locks: Arc<LockManager>,
    }

    fn fixture(alliances: Vec<Alliance>) -> Fixture {
        let store: Arc<dyn StateStore> = Arc::new(InMemoryStateStore::new());
        let repository = Arc::new(InMemoryAllianceRepository::from_alliances(alliances));
        let events = EventBus::default();
        let snapshots = Arc::new(SnapshotService::new(store.clone(), repository.clone()));
        let journal = Arc::new(Journal::new(store.clone()));
        let health = Arc::new(HealthRegistry::new(events.clone()));
        let safe_mode = Arc::new(SafeMode::new(events.clone()));
        let locks = Arc::new(LockManager::new(store, &LockConfig::default()));
        let service = RepairService::new(
            snapshots.clone(),
            repository.clone(),
            journal.clone(),
            health.clone(),
            safe_mode.clone(),
            locks.clone(),
            events,
            ActorId::new("integrity-repair"),
        );
        Fixture {
            service,
            repository,
            snapshots,
            journal,
            health,
            safe_mode,
            locks,
        }
    }

    fn alliance() -> Alliance {
        Alliance::new("A1", "AAA", "Alpha")
            .with_leader("u0")
            .with_officers(["u2", "u1"])
            .with_regulars(["u4"])
    }

    async fn corrupt(f: &Fixture) {
        f.snapshots.create_snapshot(&alliance()).await.unwrap();
        let mut drifted = alliance();
        drifted.members.officers.push("u3".into());
        drifted.members.regulars.push("u5".into());
        f.repository.put_alliance(drifted).await.unwrap();
    }

    #[tokio::test]
    async fn truncates_to_snapshot_counts() {
        let f = fixture(vec![alliance()]);
        corrupt(&f).await;
        f.health.escalate("integrity unstable: attempting repair");
        f.safe_mode.activate("integrity escalation");

        assert!(f.service.attempt_repair().await.unwrap());

        let repaired = f
            .repository
            .get_alliance(&AllianceId::new("A1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(repaired.members.officers.len(), 2);
        assert_eq!(repaired.members.regulars.len(), 1);
        assert!(f
            .snapshots
            .verify_snapshot(&AllianceId::new("A1"))
            .await
            .unwrap());
        assert_eq!(f.health.state(), HealthState::Healthy);
        assert!(!f.safe_mode.is_active());

        let success = f
            .journal
            .query(&JournalFilter::new().with_operation(ops::REPAIR_SUCCESS))
            .await
            .unwrap();
        assert_eq!(success.len(), 1);
        assert_eq!(success[0].status, JournalStatus::Confirmed);
    }

    #[tokio::test]
    async fn missing_snapshot_is_recorded_as_failure() {
        let f = fixture(vec![alliance()]);
        f.health.escalate("integrity unstable: attempting repair");

        let report = f.service.repair_all().await.unwrap();
        assert!(!report.any_repaired());
        assert_eq!(report.failed.len(), 1);
        assert_eq!(f.health.state(), HealthState::Critical);

        let failed = f
            .journal
            .query(
                &JournalFilter::new()
                    .with_operation(ops::REPAIR_FAILED)
                    .with_alliance(AllianceId::new("A1")),
            )
            .await
            .unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].status, JournalStatus::Aborted);
    }

    #[tokio::test]
    async fn held_lease_blocks_repair() {
        let f = fixture(vec![alliance()]);
        corrupt(&f).await;
        let id = AllianceId::new("A1");
        f.locks
            .alliance(&id)
            .acquire(&ActorId::new("mutator"), None)
            .await
            .unwrap();

        let report = f.service.repair_all().await.unwrap();
        assert!(report.repaired.is_empty());
        assert!(report.failed[0].1.contains("unavailable"));

        let live = f.repository.get_alliance(&id).await.unwrap().unwrap();
        assert_eq!(live.members.officers.len(), 3);
    }

    #[tokio::test]
    async fn lease_is_released_after_repair() {
        let f = fixture(vec![alliance()]);
        corrupt(&f).await;
        f.service.repair_one(&AllianceId::new("A1")).await.unwrap();
        assert!(!f
            .locks
            .alliance(&AllianceId::new("A1"))
            .is_locked()
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn clean_state_repairs_nothing() {
        let f = fixture(vec![alliance()]);
        f.snapshots.create_snapshot(&alliance()).await.unwrap();
        assert!(!f.service.attempt_repair().await.unwrap());
        assert!(f.journal.is_empty().await.unwrap());
    }
}
