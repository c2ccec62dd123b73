//! Read/write seam to the alliance domain store.
//!
//! The chat-platform layer owns alliances. The engine reads them to build
//! snapshots; only the repair service writes them back.

use std::collections::BTreeMap;
use std::sync::RwLock;

use alliance_types::{Alliance, AllianceId};
use async_trait::async_trait;

use crate::error::{StorageError, StorageResult};

/// Access to live alliance state.
#[async_trait]
pub trait AllianceRepository: Send + Sync {
    async fn get_alliance(&self, id: &AllianceId) -> StorageResult<Option<Alliance>>;

    async fn list_alliances(&self) -> StorageResult<Vec<Alliance>>;

    /// Insert or replace an alliance.
    async fn put_alliance(&self, alliance: Alliance) -> StorageResult<()>;
}

/// In-memory alliance repository.
#[derive(Default)]
pub struct InMemoryAllianceRepository {
    alliances: RwLock<BTreeMap<AllianceId, Alliance>>,
}

impl InMemoryAllianceRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_alliances(alliances: impl IntoIterator<Item = Alliance>) -> Self {
        let map = alliances
            .into_iter()
            .map(|alliance| (alliance.id.clone(), alliance))
            .collect();
        Self {
            alliances: RwLock::new(map),
        }
    }

    pub fn remove_alliance(&self, id: &AllianceId) -> StorageResult<Option<Alliance>> {
        let mut guard = self.alliances.write().map_err(|_| poisoned())?;
        Ok(guard.remove(id))
    }

    pub fn len(&self) -> usize {
        self.alliances.read().map(|guard| guard.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> StorageError {
    StorageError::Backend("alliance repository lock poisoned".to_string())
}

#[async_trait]
impl AllianceRepository for InMemoryAllianceRepository {
    async fn get_alliance(&self, id: &AllianceId) -> StorageResult<Option<Alliance>> {
        let guard = self.alliances.read().map_err(|_| poisoned())?;
        Ok(guard.get(id).cloned())
    }

    async fn list_alliances(&self) -> StorageResult<Vec<Alliance>> {
        let guard = self.alliances.read().map_err(|_| poisoned())?;
        Ok(guard.values().cloned().collect())
    }

    async fn put_alliance(&self, alliance: Alliance) -> StorageResult<()> {
        let mut guard = self.alliances.write().map_err(|_| poisoned())?;
        guard.insert(alliance.id.clone(), alliance);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get() {
        let repo = InMemoryAllianceRepository::new();
        repo.put_alliance(Alliance::new("A1", "AAA", "Alpha"))
            .await
            .unwrap();

        let loaded = repo.get_alliance(&AllianceId::new("A1")).await.unwrap();
        assert_eq!(loaded.map(|a| a.name), Some("Alpha".to_string()));
        assert_eq!(repo.len(), 1);
    }

    #[tokio::test]
    async fn list_is_ordered_by_id() {
        let repo = InMemoryAllianceRepository::from_alliances([
            Alliance::new("B", "BBB", "Beta"),
            Alliance::new("A", "AAA", "Alpha"),
        ]);
        let ids: Vec<String> = repo
            .list_alliances()
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.id.to_string())
            .collect();
        assert_eq!(ids, vec!["A", "B"]);
    }

    #[test]
    fn remove_returns_previous() {
        let repo = InMemoryAllianceRepository::from_alliances([Alliance::new("A", "AAA", "Alpha")]);
        assert!(repo.remove_alliance(&AllianceId::new("A")).unwrap().is_some());
        assert!(repo.is_empty());
    }
}
