//! In-memory reference implementation of [`StateStore`].
//!
//! Deterministic and test-friendly. State lives for the lifetime of the
//! process only.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::Value;

use super::traits::StateStore;
use crate::error::{StorageError, StorageResult};

type Key = (String, String);

/// In-memory state store.
#[derive(Default)]
pub struct InMemoryStateStore {
    records: RwLock<BTreeMap<Key, Value>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> StorageError {
    StorageError::Backend("state store lock poisoned".to_string())
}

fn key(namespace: &str, key: &str) -> Key {
    (namespace.to_string(), key.to_string())
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn get(&self, namespace: &str, k: &str) -> StorageResult<Option<Value>> {
        let guard = self.records.read().map_err(|_| poisoned())?;
        Ok(guard.get(&key(namespace, k)).cloned())
    }

    async fn set(&self, namespace: &str, k: &str, value: Value) -> StorageResult<()> {
        let mut guard = self.records.write().map_err(|_| poisoned())?;
        guard.insert(key(namespace, k), value);
        Ok(())
    }

    async fn remove(&self, namespace: &str, k: &str) -> StorageResult<Option<Value>> {
        let mut guard = self.records.write().map_err(|_| poisoned())?;
        Ok(guard.remove(&key(namespace, k)))
    }

    async fn scan(&self, namespace: &str) -> StorageResult<Vec<(String, Value)>> {
        let guard = self.records.read().map_err(|_| poisoned())?;
        Ok(guard
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|((_, k), v)| (k.clone(), v.clone()))
            .collect())
    }

    async fn compare_and_swap(
        &self,
        namespace: &str,
        k: &str,
        expected: Option<&Value>,
        new: Option<Value>,
    ) -> StorageResult<bool> {
        let mut guard = self.records.write().map_err(|_| poisoned())?;
        let slot = key(namespace, k);

        if guard.get(&slot) != expected {
            return Ok(false);
        }

        match new {
            Some(value) => {
                guard.insert(slot, value);
            }
            None => {
                guard.remove(&slot);
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn set_get_remove() {
        let store = InMemoryStateStore::new();
        store.set("ns", "a", json!({"v": 1})).await.unwrap();

        assert_eq!(store.get("ns", "a").await.unwrap(), Some(json!({"v": 1})));
        assert_eq!(store.get("other", "a").await.unwrap(), None);

        let removed = store.remove("ns", "a").await.unwrap();
        assert_eq!(removed, Some(json!({"v": 1})));
        assert!(store.get("ns", "a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn scan_is_namespaced_and_ordered() {
        let store = InMemoryStateStore::new();
        store.set("ns", "b", json!(2)).await.unwrap();
        store.set("ns", "a", json!(1)).await.unwrap();
        store.set("zz", "c", json!(3)).await.unwrap();

        let keys: Vec<String> = store
            .scan("ns")
            .await
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(store.count("zz").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn compare_and_swap_rejects_stale_expectation() {
        let store = InMemoryStateStore::new();

        assert!(store
            .compare_and_swap("ns", "k", None, Some(json!("first")))
            .await
            .unwrap());
        assert!(!store
            .compare_and_swap("ns", "k", None, Some(json!("second")))
            .await
            .unwrap());

        let current = json!("first");
        assert!(store
            .compare_and_swap("ns", "k", Some(&current), None)
            .await
            .unwrap());
        assert!(store.get("ns", "k").await.unwrap().is_none());
    }
}
