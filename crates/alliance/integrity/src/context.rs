//! Wiring of the integrity engine.
//!
//! All engine state is owned by one [`IntegrityContext`] and passed
//! explicitly; there are no process-wide singletons.

use std::sync::Arc;

use alliance_types::ActorId;
use tokio::sync::broadcast;
use tracing::info;

use crate::config::IntegrityConfig;
use crate::error::IntegrityResult;
use crate::events::{EventBus, IntegrityEvent};
use crate::gate::MutationGate;
use crate::health::HealthRegistry;
use crate::journal::Journal;
use crate::lock::LockManager;
use crate::monitor::IntegrityMonitor;
use crate::ownership::OwnershipRegistry;
use crate::repair::RepairService;
use crate::repository::AllianceRepository;
use crate::safe_mode::SafeMode;
use crate::snapshot::SnapshotService;
use crate::storage::{InMemoryStateStore, StateStore};

/// Every component of the engine, sharing one store and one event bus.
pub struct IntegrityContext {
    pub config: IntegrityConfig,
    pub store: Arc<dyn StateStore>,
    pub repository: Arc<dyn AllianceRepository>,
    pub events: EventBus,
    pub journal: Arc<Journal>,
    pub snapshots: Arc<SnapshotService>,
    pub health: Arc<HealthRegistry>,
    pub safe_mode: Arc<SafeMode>,
    pub locks: Arc<LockManager>,
    pub gate: Arc<MutationGate>,
    pub repair: Arc<RepairService>,
    pub monitor: Arc<IntegrityMonitor>,
    pub ownership: Arc<OwnershipRegistry>,
}

impl IntegrityContext {
    /// Build a context over a store without journal history.
    pub fn new(
        config: IntegrityConfig,
        store: Arc<dyn StateStore>,
        repository: Arc<dyn AllianceRepository>,
    ) -> Self {
        let journal = Journal::new(store.clone());
        Self::assemble(config, store, repository, journal)
    }

    /// Build a context over a store that may hold earlier journal entries.
    pub async fn open(
        config: IntegrityConfig,
        store: Arc<dyn StateStore>,
        repository: Arc<dyn AllianceRepository>,
    ) -> IntegrityResult<Self> {
        let journal = Journal::recover(store.clone()).await?;
        Ok(Self::assemble(config, store, repository, journal))
    }

    /// Default configuration over a fresh in-memory store.
    pub fn in_memory(repository: Arc<dyn AllianceRepository>) -> Self {
        Self::new(
            IntegrityConfig::default(),
            Arc::new(InMemoryStateStore::new()),
            repository,
        )
    }

    fn assemble(
        config: IntegrityConfig,
        store: Arc<dyn StateStore>,
        repository: Arc<dyn AllianceRepository>,
        journal: Journal,
    ) -> Self {
        let events = EventBus::default();
        let journal = Arc::new(journal);
        let snapshots = Arc::new(SnapshotService::new(store.clone(), repository.clone()));
        let health = Arc::new(HealthRegistry::new(events.clone()));
        let safe_mode = Arc::new(SafeMode::new(events.clone()));
        let locks = Arc::new(LockManager::new(store.clone(), &config.locks));

        let gate = Arc::new(MutationGate::new(
            journal.clone(),
            snapshots.clone(),
            repository.clone(),
            health.clone(),
            safe_mode.clone(),
            events.clone(),
            config.gate.clone(),
        ));

        let repair = Arc::new(RepairService::new(
            snapshots.clone(),
            repository.clone(),
            journal.clone(),
            health.clone(),
            safe_mode.clone(),
            locks.clone(),
            events.clone(),
            ActorId::new(config.locks.repair_owner.clone()),
        ));

        let monitor = Arc::new(IntegrityMonitor::new(
            snapshots.clone(),
            journal.clone(),
            health.clone(),
            safe_mode.clone(),
            repair.clone(),
            events.clone(),
            config.monitor.clone(),
        ));

        let ownership = Arc::new(OwnershipRegistry::new(
            gate.clone(),
            locks.clone(),
            health.clone(),
            safe_mode.clone(),
        ));

        Self {
            config,
            store,
            repository,
            events,
            journal,
            snapshots,
            health,
            safe_mode,
            locks,
            gate,
            repair,
            monitor,
            ownership,
        }
    }

    /// Subscribe to health, SafeMode, mutation and scan events.
    pub fn subscribe(&self) -> broadcast::Receiver<IntegrityEvent> {
        self.events.subscribe()
    }

    /// Snapshot every live alliance as known-good. Returns how many.
    pub async fn baseline(&self) -> IntegrityResult<usize> {
        let alliances = self.repository.list_alliances().await?;
        for alliance in &alliances {
            self.snapshots.create_snapshot(alliance).await?;
        }
        info!(alliances = alliances.len(), "Integrity baseline recorded");
        Ok(alliances.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::JournalDraft;
    use crate::repository::InMemoryAllianceRepository;
    use alliance_types::{Alliance, AllianceId, HealthState};

    #[tokio::test]
    async fn baseline_makes_every_alliance_verify() {
        let repository = Arc::new(InMemoryAllianceRepository::from_alliances([
            Alliance::new("A1", "AAA", "Alpha").with_leader("u1"),
            Alliance::new("A2", "BBB", "Beta").with_regulars(["u2", "u3"]),
        ]));
        let ctx = IntegrityContext::in_memory(repository);

        assert_eq!(ctx.snapshots.verify_all().await.unwrap().len(), 2);
        assert_eq!(ctx.baseline().await.unwrap(), 2);
        assert!(ctx.snapshots.verify_all().await.unwrap().is_empty());
        assert!(ctx
            .snapshots
            .verify_snapshot(&AllianceId::new("A2"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn components_share_one_event_bus() {
        let ctx = IntegrityContext::in_memory(Arc::new(InMemoryAllianceRepository::new()));
        let mut rx = ctx.subscribe();

        ctx.health.escalate("post-mutation integrity failure");
        match rx.recv().await.unwrap() {
            IntegrityEvent::HealthChanged { to, .. } => assert_eq!(to, HealthState::Critical),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn open_resumes_journal_sequence() {
        let store: Arc<dyn StateStore> = Arc::new(InMemoryStateStore::new());
        let repository: Arc<dyn AllianceRepository> =
            Arc::new(InMemoryAllianceRepository::new());

        let first = IntegrityContext::new(IntegrityConfig::default(), store.clone(), repository.clone());
        first
            .journal
            .create(JournalDraft::new("OP", ActorId::system()))
            .await
            .unwrap();

        let reopened = IntegrityContext::open(IntegrityConfig::default(), store, repository)
            .await
            .unwrap();
        let entry = reopened
            .journal
            .create(JournalDraft::new("OP", ActorId::system()))
            .await
            .unwrap();
        assert_eq!(entry.sequence, 2);
    }
}
