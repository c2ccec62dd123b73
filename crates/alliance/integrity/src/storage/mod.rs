//! Pluggable state storage.
//!
//! Journal entries, snapshots and leases are all kept behind [`StateStore`],
//! a namespaced key/value contract over JSON values. The in-memory backend is
//! the reference implementation; a durable backend only has to honour the
//! same contract, including atomic [`StateStore::compare_and_swap`].

mod memory;
mod traits;

pub use memory::InMemoryStateStore;
pub use traits::StateStore;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::StorageResult;

/// Namespace holding journal entries keyed by entry id.
pub const JOURNAL_NAMESPACE: &str = "journal";

/// Namespace holding one snapshot per alliance id.
pub const SNAPSHOT_NAMESPACE: &str = "snapshots";

/// Namespace holding lease records keyed by lock scope.
pub const LEASE_NAMESPACE: &str = "leases";

/// Read and decode a typed record.
pub async fn load<T: DeserializeOwned>(
    store: &dyn StateStore,
    namespace: &str,
    key: &str,
) -> StorageResult<Option<T>> {
    match store.get(namespace, key).await? {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}

/// Encode and write a typed record.
pub async fn save<T: Serialize>(
    store: &dyn StateStore,
    namespace: &str,
    key: &str,
    record: &T,
) -> StorageResult<()> {
    let value = serde_json::to_value(record)?;
    store.set(namespace, key, value).await
}

/// Decode every record in a namespace.
pub async fn load_all<T: DeserializeOwned>(
    store: &dyn StateStore,
    namespace: &str,
) -> StorageResult<Vec<T>> {
    store
        .scan(namespace)
        .await?
        .into_iter()
        .map(|(_, value)| serde_json::from_value(value).map_err(Into::into))
        .collect()
}
