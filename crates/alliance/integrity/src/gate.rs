//! Mutation gate.
//!
//! Every state-changing operation on alliances or ownership passes through
//! [`MutationGate::execute`]:
//!
//! ```text
//! SafeMode check -> journal PENDING -> handler -> snapshot + verify
//!                                        |              |
//!                                        v              v
//!                                     ABORTED   EXECUTED -> CONFIRMED
//! ```
//!
//! The gate takes no locks. Callers that need exclusion wrap the call in a
//! [`LeaseLock::run`](crate::lock::LeaseLock::run).

use std::future::Future;
use std::sync::Arc;

use alliance_types::{ActorId, AllianceId, JournalStatus};
use tracing::{debug, info, instrument, warn};

use crate::config::GateConfig;
use crate::error::{IntegrityError, IntegrityResult};
use crate::events::{EventBus, IntegrityEvent};
use crate::health::HealthRegistry;
use crate::journal::{Journal, JournalDraft, JournalEntry};
use crate::repository::AllianceRepository;
use crate::safe_mode::SafeMode;
use crate::snapshot::SnapshotService;

/// Health reason recorded when a confirmed mutation leaves an alliance
/// that does not verify against its fresh snapshot.
pub const POST_MUTATION_FAILURE: &str = "post-mutation integrity failure";

/// Health reason recorded when a handler fails and escalation is enabled.
pub const HANDLER_FAILURE: &str = "mutation handler failure";

/// Health reason recorded when a mutation ran but its journal entry could
/// not be moved forward.
pub const JOURNAL_FAILURE: &str = "mutation journal failure";

/// Describes one mutation.
#[derive(Debug, Clone)]
pub struct MutationOptions {
    pub operation: String,
    pub actor: ActorId,
    /// Alliance the mutation touches; enables post-mutation verification.
    pub alliance_id: Option<AllianceId>,
    /// Recorded on the journal entry; the caller holds the global lease.
    pub require_global_lock: bool,
    /// Run even while SafeMode is active.
    pub system_override: bool,
}

impl MutationOptions {
    pub fn new(operation: impl Into<String>, actor: ActorId) -> Self {
        Self {
            operation: operation.into(),
            actor,
            alliance_id: None,
            require_global_lock: false,
            system_override: false,
        }
    }

    pub fn for_alliance(mut self, id: AllianceId) -> Self {
        self.alliance_id = Some(id);
        self
    }

    pub fn require_global_lock(mut self) -> Self {
        self.require_global_lock = true;
        self
    }

    pub fn system_override(mut self) -> Self {
        self.system_override = true;
        self
    }

    fn draft(&self) -> JournalDraft {
        let draft = JournalDraft::new(self.operation.clone(), self.actor.clone())
            .with_global_lock(self.require_global_lock);
        match &self.alliance_id {
            Some(id) => draft.for_alliance(id.clone()),
            None => draft,
        }
    }
}

/// Single entry point for journaled, verified mutations.
pub struct MutationGate {
    journal: Arc<Journal>,
    snapshots: Arc<SnapshotService>,
    repository: Arc<dyn AllianceRepository>,
    health: Arc<HealthRegistry>,
    safe_mode: Arc<SafeMode>,
    events: EventBus,
    config: GateConfig,
}

impl MutationGate {
    pub fn new(
        journal: Arc<Journal>,
        snapshots: Arc<SnapshotService>,
        repository: Arc<dyn AllianceRepository>,
        health: Arc<HealthRegistry>,
        safe_mode: Arc<SafeMode>,
        events: EventBus,
        config: GateConfig,
    ) -> Self {
        Self {
            journal,
            snapshots,
            repository,
            health,
            safe_mode,
            events,
            config,
        }
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Run `handler` as a journaled mutation.
    ///
    /// Handler errors are returned unchanged after the entry is ABORTED and,
    /// unless disabled in [`GateConfig`], health is raised to CRITICAL.
    /// A post-mutation verification failure raises health to CRITICAL and
    /// returns [`IntegrityError::IntegrityViolation`]; the handler's effects
    /// stay in place.
    #[instrument(
        skip_all,
        fields(operation = %options.operation, actor = %options.actor)
    )]
    pub async fn execute<T, F, Fut>(&self, options: MutationOptions, handler: F) -> IntegrityResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = IntegrityResult<T>>,
    {
        if self.safe_mode.is_active() && !options.system_override {
            let reason = self.safe_mode.reason().unwrap_or_default();
            warn!(reason = %reason, "Mutation rejected: safe mode active");
            return Err(IntegrityError::SafeModeActive { reason });
        }

        let entry = self.journal.create(options.draft()).await?;
        debug!(entry_id = %entry.id, "Mutation journaled");

        let value = match handler().await {
            Ok(value) => value,
            Err(err) => {
                if self.config.escalate_handler_failures {
                    self.health.escalate(HANDLER_FAILURE);
                }
                self.abort(&entry, err.to_string()).await;
                return Err(err);
            }
        };

        if let Some(ref alliance_id) = options.alliance_id {
            if let Err(err) = self.verify_post_mutation(alliance_id).await {
                self.health.escalate(POST_MUTATION_FAILURE);
                self.abort(&entry, err.to_string()).await;
                return Err(err);
            }
        }

        if let Err(err) = self
            .journal
            .update_status(&entry.id, JournalStatus::Executed, None)
            .await
        {
            self.health.escalate(JOURNAL_FAILURE);
            self.abort(&entry, err.to_string()).await;
            return Err(err);
        }

        if let Err(err) = self
            .journal
            .update_status(&entry.id, JournalStatus::Confirmed, None)
            .await
        {
            // EXECUTED has no path to ABORTED; the entry stays EXECUTED.
            self.health.escalate(JOURNAL_FAILURE);
            warn!(entry_id = %entry.id, error = %err, "Mutation executed but not confirmed");
            self.events.emit(IntegrityEvent::MutationAborted {
                entry_id: entry.id,
                operation: entry.operation,
                error: err.to_string(),
            });
            return Err(err);
        }

        info!(entry_id = %entry.id, "Mutation confirmed");
        self.events.emit(IntegrityEvent::MutationConfirmed {
            entry_id: entry.id,
            operation: entry.operation,
        });

        Ok(value)
    }

    /// Re-snapshot the alliance and check the snapshot against a fresh read.
    /// A deleted alliance loses its snapshot instead.
    async fn verify_post_mutation(&self, alliance_id: &AllianceId) -> IntegrityResult<()> {
        let Some(alliance) = self.repository.get_alliance(alliance_id).await? else {
            if self.snapshots.remove_snapshot(alliance_id).await? {
                debug!(alliance_id = %alliance_id, "Snapshot of deleted alliance discarded");
            }
            return Ok(());
        };

        self.snapshots.create_snapshot(&alliance).await?;

        if !self.snapshots.verify_snapshot(alliance_id).await? {
            return Err(IntegrityError::IntegrityViolation {
                alliance_id: alliance_id.clone(),
                reason: POST_MUTATION_FAILURE.to_string(),
            });
        }
        Ok(())
    }

    async fn abort(&self, entry: &JournalEntry, message: String) {
        warn!(entry_id = %entry.id, error = %message, "Mutation aborted");

        if let Err(err) = self
            .journal
            .update_status(&entry.id, JournalStatus::Aborted, Some(message.clone()))
            .await
        {
            warn!(entry_id = %entry.id, error = %err, "Failed to journal abort");
        }

        self.events.emit(IntegrityEvent::MutationAborted {
            entry_id: entry.id,
            operation: entry.operation.clone(),
            error: message,
        });
    }
}
