//! Mutation journal: append-only record of every mutation attempt.
//!
//! Entries are created once and afterwards only move along the status
//! lifecycle defined by [`JournalStatus`]. There is no delete operation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use alliance_types::{ActorId, AllianceId, JournalEntryId, JournalStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{IntegrityError, IntegrityResult};
use crate::storage::{self, StateStore, JOURNAL_NAMESPACE};

/// Operation tags written by the engine itself.
pub mod ops {
    pub const INTEGRITY_SCAN_FAILED: &str = "INTEGRITY_SCAN_FAILED";
    pub const REPAIR_SUCCESS: &str = "REPAIR_SUCCESS";
    pub const REPAIR_FAILED: &str = "REPAIR_FAILED";
    pub const OWNERSHIP_INITIALIZE: &str = "OWNERSHIP_INITIALIZE";
    pub const OWNERSHIP_TRANSFER: &str = "OWNERSHIP_TRANSFER";
    pub const AUTHORITY_GRANT: &str = "AUTHORITY_GRANT";
    pub const AUTHORITY_REVOKE: &str = "AUTHORITY_REVOKE";
}

/// One mutation attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: JournalEntryId,
    /// Position in the journal; strictly increasing.
    pub sequence: u64,
    pub operation: String,
    pub actor: ActorId,
    pub alliance_id: Option<AllianceId>,
    pub timestamp: DateTime<Utc>,
    pub status: JournalStatus,
    pub error_message: Option<String>,
    /// Caller declared that the mutation runs under the global lease.
    #[serde(default)]
    pub global_lock: bool,
}

/// Fields supplied by the caller when opening an entry.
#[derive(Debug, Clone)]
pub struct JournalDraft {
    pub operation: String,
    pub actor: ActorId,
    pub alliance_id: Option<AllianceId>,
    pub global_lock: bool,
}

impl JournalDraft {
    pub fn new(operation: impl Into<String>, actor: ActorId) -> Self {
        Self {
            operation: operation.into(),
            actor,
            alliance_id: None,
            global_lock: false,
        }
    }

    pub fn for_alliance(mut self, id: AllianceId) -> Self {
        self.alliance_id = Some(id);
        self
    }

    pub fn with_global_lock(mut self, global_lock: bool) -> Self {
        self.global_lock = global_lock;
        self
    }
}

/// Filter for querying the journal.
#[derive(Clone, Debug, Default)]
pub struct JournalFilter {
    pub operation: Option<String>,
    pub actor: Option<ActorId>,
    pub alliance_id: Option<AllianceId>,
    pub status: Option<JournalStatus>,
}

impl JournalFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    pub fn with_actor(mut self, actor: ActorId) -> Self {
        self.actor = Some(actor);
        self
    }

    pub fn with_alliance(mut self, id: AllianceId) -> Self {
        self.alliance_id = Some(id);
        self
    }

    pub fn with_status(mut self, status: JournalStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn matches(&self, entry: &JournalEntry) -> bool {
        if let Some(ref operation) = self.operation {
            if entry.operation != *operation {
                return false;
            }
        }
        if let Some(ref actor) = self.actor {
            if entry.actor != *actor {
                return false;
            }
        }
        if let Some(ref id) = self.alliance_id {
            if entry.alliance_id.as_ref() != Some(id) {
                return false;
            }
        }
        if let Some(status) = self.status {
            if entry.status != status {
                return false;
            }
        }
        true
    }
}

/// Append-only mutation journal backed by a [`StateStore`].
pub struct Journal {
    store: Arc<dyn StateStore>,
    next_sequence: AtomicU64,
}

impl Journal {
    /// Journal over an empty store.
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self {
            store,
            next_sequence: AtomicU64::new(1),
        }
    }

    /// Journal over a store that may already hold entries; sequencing
    /// continues after the highest stored entry.
    pub async fn recover(store: Arc<dyn StateStore>) -> IntegrityResult<Self> {
        let entries: Vec<JournalEntry> = storage::load_all(store.as_ref(), JOURNAL_NAMESPACE).await?;
        let next = entries.iter().map(|e| e.sequence).max().unwrap_or(0) + 1;
        debug!(entries = entries.len(), next_sequence = next, "Journal recovered");
        Ok(Self {
            store,
            next_sequence: AtomicU64::new(next),
        })
    }

    /// Open a new PENDING entry.
    pub async fn create(&self, draft: JournalDraft) -> IntegrityResult<JournalEntry> {
        let entry = JournalEntry {
            id: JournalEntryId::generate(),
            sequence: self.next_sequence.fetch_add(1, Ordering::SeqCst),
            operation: draft.operation,
            actor: draft.actor,
            alliance_id: draft.alliance_id,
            timestamp: Utc::now(),
            status: JournalStatus::Pending,
            error_message: None,
            global_lock: draft.global_lock,
        };

        storage::save(
            self.store.as_ref(),
            JOURNAL_NAMESPACE,
            &entry.id.as_uuid().to_string(),
            &entry,
        )
        .await?;

        debug!(
            entry_id = %entry.id,
            operation = %entry.operation,
            actor = %entry.actor,
            "Journal entry created"
        );
        Ok(entry)
    }

    /// Move an entry to `status`, attaching `error` if given.
    ///
    /// Unknown ids are ignored. Transitions the lifecycle forbids are
    /// rejected with [`IntegrityError::InvalidTransition`].
    pub async fn update_status(
        &self,
        id: &JournalEntryId,
        status: JournalStatus,
        error: Option<String>,
    ) -> IntegrityResult<()> {
        let key = id.as_uuid().to_string();
        let Some(mut entry) =
            storage::load::<JournalEntry>(self.store.as_ref(), JOURNAL_NAMESPACE, &key).await?
        else {
            debug!(entry_id = %id, "Status update for unknown journal entry ignored");
            return Ok(());
        };

        if !entry.status.can_transition_to(status) {
            return Err(IntegrityError::InvalidTransition {
                entry_id: *id,
                from: entry.status,
                to: status,
            });
        }

        entry.status = status;
        if error.is_some() {
            entry.error_message = error;
        }

        storage::save(self.store.as_ref(), JOURNAL_NAMESPACE, &key, &entry).await?;
        debug!(entry_id = %id, status = %status, "Journal entry updated");
        Ok(())
    }

    /// Open an entry and drive it straight to its terminal status.
    ///
    /// `Ok` ends CONFIRMED (via EXECUTED); `Err` ends ABORTED with the message.
    pub async fn record_outcome(
        &self,
        draft: JournalDraft,
        outcome: Result<(), String>,
    ) -> IntegrityResult<JournalEntry> {
        let entry = self.create(draft).await?;
        match outcome {
            Ok(()) => {
                self.update_status(&entry.id, JournalStatus::Executed, None)
                    .await?;
                self.update_status(&entry.id, JournalStatus::Confirmed, None)
                    .await?;
            }
            Err(message) => {
                self.update_status(&entry.id, JournalStatus::Aborted, Some(message))
                    .await?;
            }
        }
        Ok(self.get(&entry.id).await?.unwrap_or(entry))
    }

    pub async fn get(&self, id: &JournalEntryId) -> IntegrityResult<Option<JournalEntry>> {
        Ok(storage::load(
            self.store.as_ref(),
            JOURNAL_NAMESPACE,
            &id.as_uuid().to_string(),
        )
        .await?)
    }

    /// Every entry in journal order.
    pub async fn get_all(&self) -> IntegrityResult<Vec<JournalEntry>> {
        let mut entries: Vec<JournalEntry> =
            storage::load_all(self.store.as_ref(), JOURNAL_NAMESPACE).await?;
        entries.sort_by_key(|e| e.sequence);
        Ok(entries)
    }

    /// Entries matching a filter, in journal order.
    pub async fn query(&self, filter: &JournalFilter) -> IntegrityResult<Vec<JournalEntry>> {
        Ok(self
            .get_all()
            .await?
            .into_iter()
            .filter(|e| filter.matches(e))
            .collect())
    }

    pub async fn len(&self) -> IntegrityResult<usize> {
        Ok(self.store.count(JOURNAL_NAMESPACE).await?)
    }

    pub async fn is_empty(&self) -> IntegrityResult<bool> {
        Ok(self.len().await? == 0)
    }
}
