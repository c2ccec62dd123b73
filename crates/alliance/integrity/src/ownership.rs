//! Bot ownership and authority registry.
//!
//! Exactly one bot owner must exist. Without one the system runs in
//! SafeMode (`BOT_OWNER_MISSING`). Every change to the registry goes
//! through the mutation gate while holding the global lease.

use std::collections::BTreeSet;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use alliance_types::{ActorId, HealthState};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{IntegrityError, IntegrityResult};
use crate::gate::{MutationGate, MutationOptions};
use crate::health::HealthRegistry;
use crate::journal::ops;
use crate::lock::LockManager;
use crate::safe_mode::{SafeMode, BOT_OWNER_MISSING};

/// Registered owners and authorities.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipRecord {
    pub bot_owner_id: Option<ActorId>,
    pub discord_owner_id: Option<ActorId>,
    #[serde(default)]
    pub authority_ids: BTreeSet<ActorId>,
}

/// Holds the ownership record and guards changes to it.
pub struct OwnershipRegistry {
    record: RwLock<OwnershipRecord>,
    gate: Arc<MutationGate>,
    locks: Arc<LockManager>,
    health: Arc<HealthRegistry>,
    safe_mode: Arc<SafeMode>,
}

impl OwnershipRegistry {
    pub fn new(
        gate: Arc<MutationGate>,
        locks: Arc<LockManager>,
        health: Arc<HealthRegistry>,
        safe_mode: Arc<SafeMode>,
    ) -> Self {
        Self {
            record: RwLock::new(OwnershipRecord::default()),
            gate,
            locks,
            health,
            safe_mode,
        }
    }

    /// Register the bot owner and the platform owner in one step.
    ///
    /// Runs even while SafeMode is active, since a missing owner is the
    /// usual reason SafeMode is on at startup.
    pub async fn initialize(
        &self,
        bot_owner: ActorId,
        discord_owner: ActorId,
    ) -> IntegrityResult<()> {
        let system = ActorId::system();
        self.locks
            .global()
            .run(&system, move || self.initialize_locked(bot_owner, discord_owner))
            .await
    }

    async fn initialize_locked(
        &self,
        bot_owner: ActorId,
        discord_owner: ActorId,
    ) -> IntegrityResult<()> {
        if self.read().bot_owner_id.is_some() {
            return Err(IntegrityError::AlreadyInitialized);
        }

        let options = MutationOptions::new(ops::OWNERSHIP_INITIALIZE, ActorId::system())
            .require_global_lock()
            .system_override();

        self.gate
            .execute(options, move || async move {
                let mut record = self.write();
                if record.bot_owner_id.is_some() {
                    return Err(IntegrityError::AlreadyInitialized);
                }
                info!(bot_owner = %bot_owner, discord_owner = %discord_owner, "Ownership initialized");
                record.bot_owner_id = Some(bot_owner);
                record.discord_owner_id = Some(discord_owner);
                Ok(())
            })
            .await
    }

    pub fn is_bot_owner(&self, actor: &ActorId) -> bool {
        self.read().bot_owner_id.as_ref() == Some(actor)
    }

    pub fn is_discord_owner(&self, actor: &ActorId) -> bool {
        self.read().discord_owner_id.as_ref() == Some(actor)
    }

    /// Owners and explicitly granted actors.
    pub fn is_authority(&self, actor: &ActorId) -> bool {
        let record = self.read();
        record.bot_owner_id.as_ref() == Some(actor)
            || record.discord_owner_id.as_ref() == Some(actor)
            || record.authority_ids.contains(actor)
    }

    /// Hand bot ownership to `new_owner`.
    ///
    /// Only the current owner may do this, and only while SafeMode is off
    /// and health is HEALTHY.
    pub async fn transfer_bot_owner(
        &self,
        actor: &ActorId,
        new_owner: ActorId,
    ) -> IntegrityResult<()> {
        self.locks
            .global()
            .run(actor, move || self.transfer_locked(actor, new_owner))
            .await
    }

    async fn transfer_locked(&self, actor: &ActorId, new_owner: ActorId) -> IntegrityResult<()> {
        self.require_bot_owner(actor, "transfer bot ownership")?;

        if self.safe_mode.is_active() {
            return Err(IntegrityError::SafeModeActive {
                reason: self.safe_mode.reason().unwrap_or_default(),
            });
        }

        let health = self.health.record();
        if health.state != HealthState::Healthy {
            return Err(IntegrityError::SystemUnhealthy {
                state: health.state,
                reason: health.reason,
            });
        }

        let options =
            MutationOptions::new(ops::OWNERSHIP_TRANSFER, actor.clone()).require_global_lock();
        self.gate
            .execute(options, move || async move {
                let mut record = self.write();
                info!(from = %actor, to = %new_owner, "Bot ownership transferred");
                record.bot_owner_id = Some(new_owner);
                Ok(())
            })
            .await
    }

    /// Add `id` to the authorities. Returns false if it was already there.
    pub async fn grant_authority(&self, actor: &ActorId, id: ActorId) -> IntegrityResult<bool> {
        self.locks
            .global()
            .run(actor, move || async move {
                self.require_bot_owner(actor, "grant authority")?;
                let options =
                    MutationOptions::new(ops::AUTHORITY_GRANT, actor.clone()).require_global_lock();
                self.gate
                    .execute(options, move || async move {
                        Ok(self.write().authority_ids.insert(id))
                    })
                    .await
            })
            .await
    }

    /// Remove `id` from the authorities. Returns false if it was not there.
    ///
    /// Owners stay authorities regardless.
    pub async fn revoke_authority(&self, actor: &ActorId, id: &ActorId) -> IntegrityResult<bool> {
        self.locks
            .global()
            .run(actor, move || async move {
                self.require_bot_owner(actor, "revoke authority")?;
                let options = MutationOptions::new(ops::AUTHORITY_REVOKE, actor.clone())
                    .require_global_lock();
                self.gate
                    .execute(options, move || async move {
                        Ok(self.write().authority_ids.remove(id))
                    })
                    .await
            })
            .await
    }

    /// Put the system in SafeMode if no bot owner is registered.
    ///
    /// Returns whether the invariant holds.
    pub fn enforce_invariant(&self) -> bool {
        if self.read().bot_owner_id.is_some() {
            return true;
        }
        warn!("No bot owner registered");
        self.safe_mode.activate(BOT_OWNER_MISSING);
        false
    }

    pub fn snapshot(&self) -> OwnershipRecord {
        self.read().clone()
    }

    fn require_bot_owner(&self, actor: &ActorId, operation: &str) -> IntegrityResult<()> {
        let record = self.read();
        match record.bot_owner_id {
            None => Err(IntegrityError::MissingBotOwner),
            Some(ref owner) if owner == actor => Ok(()),
            Some(_) => Err(IntegrityError::Unauthorized {
                actor: actor.clone(),
                operation: operation.to_string(),
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, OwnershipRecord> {
        self.record.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, OwnershipRecord> {
        self.record.write().unwrap_or_else(PoisonError::into_inner)
    }
}
