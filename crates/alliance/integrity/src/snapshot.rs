//! Alliance snapshots and checksums.
//!
//! A snapshot records the membership shape of an alliance at the end of
//! its last confirmed mutation. The checksum covers only fields whose
//! drift indicates corruption; member order is not one of them.

use std::sync::Arc;

use alliance_types::{Alliance, AllianceId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::IntegrityResult;
use crate::repository::AllianceRepository;
use crate::storage::{self, StateStore, SNAPSHOT_NAMESPACE};

/// Member counts per role.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleCounts {
    pub leaders: usize,
    pub officers: usize,
    pub regulars: usize,
}

/// Stored snapshot of one alliance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllianceSnapshot {
    pub alliance_id: AllianceId,
    pub checksum: String,
    pub member_count: usize,
    pub role_counts: RoleCounts,
    pub orphaned: bool,
    /// Creation time of the alliance itself.
    pub created_at: DateTime<Utc>,
    pub snapshot_at: DateTime<Utc>,
}

impl AllianceSnapshot {
    /// Capture the current state of `alliance`.
    pub fn capture(alliance: &Alliance) -> Self {
        let members = &alliance.members;
        Self {
            alliance_id: alliance.id.clone(),
            checksum: compute_checksum(alliance),
            member_count: members.count(),
            role_counts: RoleCounts {
                leaders: usize::from(members.leader.is_some()),
                officers: members.officers.len(),
                regulars: members.regulars.len(),
            },
            orphaned: alliance.orphaned,
            created_at: alliance.created_at,
            snapshot_at: Utc::now(),
        }
    }

    /// Whether `alliance` still matches this snapshot.
    pub fn matches(&self, alliance: &Alliance) -> bool {
        self.checksum == compute_checksum(alliance)
    }
}

/// Checksum of the integrity-relevant fields of an alliance.
///
/// Officers and regulars are hashed in sorted order. Every string is
/// length-prefixed so adjacent fields cannot run together.
pub fn compute_checksum(alliance: &Alliance) -> String {
    use sha2::{Digest, Sha256};

    fn update_str(hasher: &mut Sha256, value: &str) {
        hasher.update((value.len() as u64).to_le_bytes());
        hasher.update(value.as_bytes());
    }

    let mut hasher = Sha256::new();

    update_str(&mut hasher, alliance.id.as_str());

    match &alliance.members.leader {
        Some(leader) => {
            hasher.update([1u8]);
            update_str(&mut hasher, leader.as_str());
        }
        None => hasher.update([0u8]),
    }

    for list in [&alliance.members.officers, &alliance.members.regulars] {
        let mut sorted: Vec<&str> = list.iter().map(|a| a.as_str()).collect();
        sorted.sort_unstable();
        hasher.update((sorted.len() as u64).to_le_bytes());
        for id in sorted {
            update_str(&mut hasher, id);
        }
    }

    hasher.update([u8::from(alliance.orphaned)]);

    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(hasher.finalize())
}

/// Creates, stores and verifies alliance snapshots.
pub struct SnapshotService {
    store: Arc<dyn StateStore>,
    repository: Arc<dyn AllianceRepository>,
}

impl SnapshotService {
    pub fn new(store: Arc<dyn StateStore>, repository: Arc<dyn AllianceRepository>) -> Self {
        Self { store, repository }
    }

    /// Capture and store a snapshot, replacing any previous one.
    pub async fn create_snapshot(&self, alliance: &Alliance) -> IntegrityResult<AllianceSnapshot> {
        let snapshot = AllianceSnapshot::capture(alliance);
        storage::save(
            self.store.as_ref(),
            SNAPSHOT_NAMESPACE,
            alliance.id.as_str(),
            &snapshot,
        )
        .await?;
        debug!(
            alliance_id = %alliance.id,
            member_count = snapshot.member_count,
            "Snapshot stored"
        );
        Ok(snapshot)
    }

    pub async fn get_snapshot(&self, id: &AllianceId) -> IntegrityResult<Option<AllianceSnapshot>> {
        Ok(storage::load(self.store.as_ref(), SNAPSHOT_NAMESPACE, id.as_str()).await?)
    }

    /// Drop the stored snapshot of a deleted alliance.
    pub async fn remove_snapshot(&self, id: &AllianceId) -> IntegrityResult<bool> {
        let removed = self.store.remove(SNAPSHOT_NAMESPACE, id.as_str()).await?;
        Ok(removed.is_some())
    }

    /// Whether the live alliance matches its stored snapshot.
    ///
    /// False when either the alliance or its snapshot is missing.
    pub async fn verify_snapshot(&self, id: &AllianceId) -> IntegrityResult<bool> {
        let Some(snapshot) = self.get_snapshot(id).await? else {
            return Ok(false);
        };
        let Some(alliance) = self.repository.get_alliance(id).await? else {
            return Ok(false);
        };
        Ok(snapshot.matches(&alliance))
    }

    /// Ids of every live alliance that fails verification, in id order.
    pub async fn verify_all(&self) -> IntegrityResult<Vec<AllianceId>> {
        let alliances = self.repository.list_alliances().await?;
        let mut corrupted = Vec::new();

        for alliance in alliances {
            let verified = match self.get_snapshot(&alliance.id).await? {
                Some(snapshot) => snapshot.matches(&alliance),
                None => false,
            };
            if !verified {
                warn!(alliance_id = %alliance.id, "Snapshot verification failed");
                corrupted.push(alliance.id);
            }
        }

        Ok(corrupted)
    }
}
