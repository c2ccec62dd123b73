use async_trait::async_trait;
use serde_json::Value;

use crate::error::StorageResult;

/// Namespaced key/value storage used by the journal, snapshot and lease layers.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Read one record.
    async fn get(&self, namespace: &str, key: &str) -> StorageResult<Option<Value>>;

    /// Insert or overwrite one record.
    async fn set(&self, namespace: &str, key: &str, value: Value) -> StorageResult<()>;

    /// Remove one record, returning the previous value.
    async fn remove(&self, namespace: &str, key: &str) -> StorageResult<Option<Value>>;

    /// List every record in a namespace, ordered by key.
    async fn scan(&self, namespace: &str) -> StorageResult<Vec<(String, Value)>>;

    /// Atomically replace `expected` with `new`.
    ///
    /// `None` on either side means "absent". Returns `false` without writing
    /// when the stored value differs from `expected`.
    async fn compare_and_swap(
        &self,
        namespace: &str,
        key: &str,
        expected: Option<&Value>,
        new: Option<Value>,
    ) -> StorageResult<bool>;

    /// Number of records in a namespace.
    async fn count(&self, namespace: &str) -> StorageResult<usize> {
        Ok(self.scan(namespace).await?.len())
    }
}
