//! Lease locks.
//!
//! A lease is a time-bounded exclusive claim on a scope: the whole system
//! (`global`) or one alliance. A holder that crashes or hangs never starves
//! the scope for longer than its lease.
//!
//! ```text
//! (free) --acquire--> Held(owner, expires_at)
//! Held   --acquire by same owner--> Held(owner, extended)
//! Held   --run by any owner--> LockUnavailable
//! Held   --release by owner--> (free)
//! Held   --expires_at passes--> (free, reclaimed lazily)
//! ```
//!
//! Lease records live in the [`StateStore`] under [`LEASE_NAMESPACE`];
//! acquisition is a compare-and-swap against the record that was read, so
//! two contenders can never both win.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use alliance_types::{ActorId, AllianceId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::LockConfig;
use crate::error::{IntegrityError, IntegrityResult, StorageError};
use crate::storage::{StateStore, LEASE_NAMESPACE};

/// What a lease protects.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LockScope {
    Global,
    Alliance(AllianceId),
}

impl LockScope {
    /// Storage key of this scope.
    pub fn key(&self) -> String {
        match self {
            LockScope::Global => "global".to_string(),
            LockScope::Alliance(id) => format!("alliance:{}", id),
        }
    }
}

impl fmt::Display for LockScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// A stored lease.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    pub owner: ActorId,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Lease {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

fn expiry(now: DateTime<Utc>, lease: Duration) -> DateTime<Utc> {
    let millis = i64::try_from(lease.as_millis()).unwrap_or(i64::MAX);
    now.checked_add_signed(chrono::Duration::milliseconds(millis))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Lease lock over one scope.
#[derive(Clone)]
pub struct LeaseLock {
    scope: LockScope,
    store: Arc<dyn StateStore>,
    default_lease: Duration,
}

impl LeaseLock {
    pub fn new(scope: LockScope, store: Arc<dyn StateStore>, default_lease: Duration) -> Self {
        Self {
            scope,
            store,
            default_lease,
        }
    }

    pub fn scope(&self) -> &LockScope {
        &self.scope
    }

    async fn read(&self) -> IntegrityResult<Option<(Value, Lease)>> {
        let key = self.scope.key();
        match self.store.get(LEASE_NAMESPACE, &key).await? {
            Some(raw) => {
                let lease: Lease = serde_json::from_value(raw.clone())
                    .map_err(StorageError::from)?;
                Ok(Some((raw, lease)))
            }
            None => Ok(None),
        }
    }

    /// Try to take the lease for `owner`.
    ///
    /// Returns `false` when a different owner holds an unexpired lease. The
    /// current holder re-acquiring extends its lease from now.
    pub async fn acquire(&self, owner: &ActorId, lease: Option<Duration>) -> IntegrityResult<bool> {
        self.try_claim(owner, lease, true).await
    }

    async fn try_claim(
        &self,
        owner: &ActorId,
        lease: Option<Duration>,
        extend_own: bool,
    ) -> IntegrityResult<bool> {
        let now = Utc::now();
        let current = self.read().await?;

        let acquired_at = match &current {
            Some((_, held)) if !held.is_expired_at(now) => {
                if held.owner != *owner || !extend_own {
                    debug!(scope = %self.scope, holder = %held.owner, "Lease already held");
                    return Ok(false);
                }
                held.acquired_at
            }
            _ => now,
        };

        let next = Lease {
            owner: owner.clone(),
            acquired_at,
            expires_at: expiry(now, lease.unwrap_or(self.default_lease)),
        };
        let encoded = serde_json::to_value(&next).map_err(StorageError::from)?;

        let won = self
            .store
            .compare_and_swap(
                LEASE_NAMESPACE,
                &self.scope.key(),
                current.as_ref().map(|(raw, _)| raw),
                Some(encoded),
            )
            .await?;

        if won {
            debug!(scope = %self.scope, owner = %owner, expires_at = %next.expires_at, "Lease acquired");
        } else {
            debug!(scope = %self.scope, owner = %owner, "Lost lease race");
        }
        Ok(won)
    }

    /// Give the lease back.
    ///
    /// Fails with [`IntegrityError::NotOwner`] if `owner` is not the current
    /// holder, leaving the lease untouched. Releasing a free scope is a no-op.
    pub async fn release(&self, owner: &ActorId) -> IntegrityResult<()> {
        let Some((raw, held)) = self.read().await? else {
            return Ok(());
        };

        if held.owner != *owner {
            return Err(self.not_owner(owner));
        }

        let removed = self
            .store
            .compare_and_swap(LEASE_NAMESPACE, &self.scope.key(), Some(&raw), None)
            .await?;
        if !removed {
            return Err(self.not_owner(owner));
        }

        debug!(scope = %self.scope, owner = %owner, "Lease released");
        Ok(())
    }

    /// Whether an unexpired lease exists. Stale leases are removed on read.
    pub async fn is_locked(&self) -> IntegrityResult<bool> {
        Ok(self.holder().await?.is_some())
    }

    /// The live lease, if any.
    pub async fn holder(&self) -> IntegrityResult<Option<Lease>> {
        let Some((raw, held)) = self.read().await? else {
            return Ok(None);
        };

        if held.is_expired_at(Utc::now()) {
            // A concurrent acquire may have replaced it already; either way it is not ours to keep.
            self.store
                .compare_and_swap(LEASE_NAMESPACE, &self.scope.key(), Some(&raw), None)
                .await?;
            debug!(scope = %self.scope, owner = %held.owner, "Expired lease reclaimed");
            return Ok(None);
        }

        Ok(Some(held))
    }

    /// Acquire, run `handler`, and release on every exit path.
    ///
    /// Fails with [`IntegrityError::LockUnavailable`] while any live lease
    /// exists on the scope, including one held by `owner` itself.
    pub async fn run<T, F, Fut>(&self, owner: &ActorId, handler: F) -> IntegrityResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = IntegrityResult<T>>,
    {
        if !self.try_claim(owner, None, false).await? {
            let holder = self.holder().await.ok().flatten().map(|lease| lease.owner);
            return Err(IntegrityError::LockUnavailable {
                scope: self.scope.key(),
                holder,
            });
        }

        let result = handler().await;

        if let Err(err) = self.release(owner).await {
            // The lease ran out mid-handler and someone else now holds it.
            warn!(scope = %self.scope, owner = %owner, error = %err, "Lease release failed");
        }

        result
    }

    fn not_owner(&self, caller: &ActorId) -> IntegrityError {
        IntegrityError::NotOwner {
            scope: self.scope.key(),
            caller: caller.clone(),
        }
    }
}

/// Hands out lease locks that share one store and default lease.
pub struct LockManager {
    store: Arc<dyn StateStore>,
    default_lease: Duration,
}

impl LockManager {
    pub fn new(store: Arc<dyn StateStore>, config: &LockConfig) -> Self {
        Self {
            store,
            default_lease: config.default_lease(),
        }
    }

    pub fn lock(&self, scope: LockScope) -> LeaseLock {
        LeaseLock::new(scope, self.store.clone(), self.default_lease)
    }

    pub fn global(&self) -> LeaseLock {
        self.lock(LockScope::Global)
    }

    pub fn alliance(&self, id: &AllianceId) -> LeaseLock {
        self.lock(LockScope::Alliance(id.clone()))
    }

    /// Every stored lease keyed by scope, including ones not yet reclaimed.
    pub async fn leases(&self) -> IntegrityResult<Vec<(String, Lease)>> {
        self.store
            .scan(LEASE_NAMESPACE)
            .await?
            .into_iter()
            .map(|(key, raw)| {
                serde_json::from_value(raw)
                    .map(|lease| (key, lease))
                    .map_err(|err| IntegrityError::from(StorageError::from(err)))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStateStore;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn manager(lease_ms: u64) -> LockManager {
        let config = LockConfig {
            default_lease_ms: lease_ms,
            ..LockConfig::default()
        };
        LockManager::new(Arc::new(InMemoryStateStore::new()), &config)
    }

    fn actor(id: &str) -> ActorId {
        ActorId::new(id)
    }

    #[tokio::test]
    async fn second_owner_cannot_acquire_live_lease() {
        let lock = manager(10_000).global();

        assert!(lock.acquire(&actor("a"), None).await.unwrap());
        assert!(!lock.acquire(&actor("b"), None).await.unwrap());
        assert!(lock.is_locked().await.unwrap());
    }

    #[tokio::test]
    async fn same_owner_reacquire_extends() {
        let lock = manager(10_000).global();
        let owner = actor("a");

        assert!(lock.acquire(&owner, Some(Duration::from_millis(100))).await.unwrap());
        let first = lock.holder().await.unwrap().unwrap();

        assert!(lock.acquire(&owner, Some(Duration::from_secs(60))).await.unwrap());
        let second = lock.holder().await.unwrap().unwrap();

        assert_eq!(first.acquired_at, second.acquired_at);
        assert!(second.expires_at > first.expires_at);
    }

    #[tokio::test]
    async fn expired_lease_is_reclaimable() {
        let lock = manager(10_000).global();

        assert!(lock
            .acquire(&actor("a"), Some(Duration::from_millis(10)))
            .await
            .unwrap());
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert!(!lock.is_locked().await.unwrap());
        assert!(lock.acquire(&actor("b"), None).await.unwrap());
    }

    #[tokio::test]
    async fn release_by_non_owner_fails_and_keeps_lease() {
        let lock = manager(10_000).alliance(&AllianceId::new("A1"));
        lock.acquire(&actor("a"), None).await.unwrap();

        let err = lock.release(&actor("b")).await.unwrap_err();
        assert!(matches!(err, IntegrityError::NotOwner { .. }));
        assert_eq!(lock.holder().await.unwrap().unwrap().owner, actor("a"));
    }

    #[tokio::test]
    async fn late_release_cannot_clobber_new_holder() {
        let lock = manager(10_000).global();
        lock.acquire(&actor("slow"), Some(Duration::from_millis(10)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(lock.acquire(&actor("fast"), None).await.unwrap());

        assert!(lock.release(&actor("slow")).await.is_err());
        assert_eq!(lock.holder().await.unwrap().unwrap().owner, actor("fast"));
    }

    #[tokio::test]
    async fn release_of_free_lock_is_noop() {
        let lock = manager(10_000).global();
        lock.release(&actor("a")).await.unwrap();
    }

    #[tokio::test]
    async fn run_releases_after_handler_error() {
        let lock = manager(10_000).global();
        let owner = actor("a");

        let result: IntegrityResult<()> = lock
            .run(&owner, || async { Err(IntegrityError::handler("boom")) })
            .await;

        assert!(matches!(result, Err(IntegrityError::Handler(_))));
        assert!(!lock.is_locked().await.unwrap());
    }

    #[tokio::test]
    async fn run_fails_fast_when_held() {
        let locks = manager(10_000);
        let id = AllianceId::new("A1");
        locks.alliance(&id).acquire(&actor("a"), None).await.unwrap();

        let ran = AtomicBool::new(false);
        let flag = &ran;
        let result = locks
            .alliance(&id)
            .run(&actor("b"), move || async move {
                flag.store(true, Ordering::SeqCst);
                Ok(())
            })
            .await;

        assert!(!ran.load(Ordering::SeqCst));
        match result {
            Err(IntegrityError::LockUnavailable { scope, holder }) => {
                assert_eq!(scope, "alliance:A1");
                assert_eq!(holder, Some(actor("a")));
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[tokio::test]
    async fn run_rejects_scope_held_by_same_owner() {
        let lock = manager(10_000).alliance(&AllianceId::new("A1"));
        let owner = actor("integrity-repair");
        assert!(lock.acquire(&owner, None).await.unwrap());

        let ran = AtomicBool::new(false);
        let flag = &ran;
        let result = lock
            .run(&owner, move || async move {
                flag.store(true, Ordering::SeqCst);
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(IntegrityError::LockUnavailable { .. })));
        assert!(!ran.load(Ordering::SeqCst));
        assert_eq!(lock.holder().await.unwrap().unwrap().owner, owner);
    }

    #[tokio::test]
    async fn overlapping_runs_by_one_owner_are_exclusive() {
        let lock = manager(10_000).global();
        let owner = actor("bot");

        let inner_ran = AtomicBool::new(false);
        let flag = &inner_ran;
        let (lock_ref, owner_ref) = (&lock, &owner);
        let nested: IntegrityResult<()> = lock
            .run(&owner, move || async move {
                let inner = lock_ref
                    .run(owner_ref, move || async move {
                        flag.store(true, Ordering::SeqCst);
                        Ok(())
                    })
                    .await;
                assert!(matches!(inner, Err(IntegrityError::LockUnavailable { .. })));
                assert!(lock_ref.is_locked().await?);
                Ok(())
            })
            .await;

        nested.unwrap();
        assert!(!inner_ran.load(Ordering::SeqCst));
        assert!(!lock.is_locked().await.unwrap());
    }

    #[tokio::test]
    async fn scopes_are_independent() {
        let locks = manager(10_000);
        assert!(locks.global().acquire(&actor("a"), None).await.unwrap());
        assert!(locks
            .alliance(&AllianceId::new("A1"))
            .acquire(&actor("b"), None)
            .await
            .unwrap());
        assert_eq!(locks.leases().await.unwrap().len(), 2);
    }
}
