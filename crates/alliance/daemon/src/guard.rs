//! Daemon lifecycle: build the engine, bootstrap ownership, run the monitor.

use std::future::Future;
use std::sync::Arc;

use alliance_integrity::{
    InMemoryAllianceRepository, InMemoryStateStore, IntegrityContext, IntegrityError,
    IntegrityEvent,
};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::DaemonConfig;
use crate::error::DaemonResult;
use crate::seed;

/// The running daemon.
pub struct GuardDaemon {
    config: DaemonConfig,
    context: Arc<IntegrityContext>,
}

impl GuardDaemon {
    /// Build the engine over in-memory stores, seeded from the configured
    /// file, and record a known-good snapshot of every seeded alliance.
    pub async fn new(config: DaemonConfig) -> DaemonResult<Self> {
        let alliances = match config.seed_path {
            Some(ref path) => seed::load_alliances(path).await?,
            None => Vec::new(),
        };
        info!(alliances = alliances.len(), "Alliances loaded");

        let repository = Arc::new(InMemoryAllianceRepository::from_alliances(alliances));
        let store = Arc::new(InMemoryStateStore::new());
        let context =
            IntegrityContext::open(config.integrity.clone(), store, repository).await?;
        context.baseline().await?;

        Ok(Self {
            config,
            context: Arc::new(context),
        })
    }

    pub fn context(&self) -> &Arc<IntegrityContext> {
        &self.context
    }

    /// Register configured owners and authorities, then check the owner
    /// invariant. Returns whether it holds.
    pub async fn bootstrap_ownership(&self) -> DaemonResult<bool> {
        let ownership = &self.config.ownership;
        let registry = &self.context.ownership;

        if let (Some(bot), Some(discord)) = (&ownership.bot_owner_id, &ownership.discord_owner_id)
        {
            match registry.initialize(bot.clone(), discord.clone()).await {
                Ok(()) | Err(IntegrityError::AlreadyInitialized) => {}
                Err(err) => return Err(err.into()),
            }
            for authority in &ownership.authorities {
                registry.grant_authority(bot, authority.clone()).await?;
            }
        }

        let holds = registry.enforce_invariant();
        if !holds {
            warn!("Starting in safe mode: no bot owner configured");
        }
        Ok(holds)
    }

    /// Run until `shutdown` resolves.
    pub async fn run_until<F>(self, shutdown: F) -> DaemonResult<()>
    where
        F: Future<Output = ()>,
    {
        self.bootstrap_ownership().await?;

        let event_log = spawn_event_log(&self.context);
        self.context
            .monitor
            .start(self.config.integrity.monitor.interval());

        shutdown.await;

        self.context.monitor.stop().await;
        event_log.abort();
        info!("Alliance guard stopped");
        Ok(())
    }
}

fn spawn_event_log(context: &IntegrityContext) -> JoinHandle<()> {
    let mut rx = context.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => log_event(&event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Integrity event log lagging");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

fn log_event(event: &IntegrityEvent) {
    match event {
        IntegrityEvent::HealthChanged { from, to, reason } => {
            info!(from = %from, to = %to, reason = %reason, "Health changed");
        }
        IntegrityEvent::SafeModeActivated { reason } => {
            warn!(reason = %reason, "Safe mode activated");
        }
        IntegrityEvent::SafeModeDeactivated => info!("Safe mode deactivated"),
        IntegrityEvent::MutationConfirmed { entry_id, operation } => {
            info!(entry_id = %entry_id, operation = %operation, "Mutation confirmed");
        }
        IntegrityEvent::MutationAborted {
            entry_id,
            operation,
            error,
        } => {
            warn!(entry_id = %entry_id, operation = %operation, error = %error, "Mutation aborted");
        }
        IntegrityEvent::ScanCompleted {
            corrupted,
            failure_count,
        } => {
            if !corrupted.is_empty() {
                warn!(corrupted = corrupted.len(), failure_count, "Integrity scan failed");
            }
        }
        IntegrityEvent::RepairCompleted { repaired, failed } => {
            info!(repaired = repaired.len(), failed = failed.len(), "Repair pass finished");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OwnershipConfig;
    use alliance_types::{ActorId, AllianceId};

    fn owned_config() -> DaemonConfig {
        DaemonConfig {
            ownership: OwnershipConfig {
                bot_owner_id: Some(ActorId::new("100")),
                discord_owner_id: Some(ActorId::new("200")),
                authorities: vec![ActorId::new("300")],
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_registers_owners_and_authorities() {
        let daemon = GuardDaemon::new(owned_config()).await.unwrap();
        assert!(daemon.bootstrap_ownership().await.unwrap());

        let ownership = &daemon.context().ownership;
        assert!(ownership.is_bot_owner(&ActorId::new("100")));
        assert!(ownership.is_authority(&ActorId::new("300")));
        assert!(!daemon.context().safe_mode.is_active());

        // Restart-style second bootstrap is harmless.
        assert!(daemon.bootstrap_ownership().await.unwrap());
    }

    #[tokio::test]
    async fn missing_owner_starts_in_safe_mode() {
        let daemon = GuardDaemon::new(DaemonConfig::default()).await.unwrap();
        assert!(!daemon.bootstrap_ownership().await.unwrap());
        assert_eq!(
            daemon.context().safe_mode.reason().as_deref(),
            Some(alliance_integrity::BOT_OWNER_MISSING)
        );
    }

    #[tokio::test]
    async fn seeded_alliances_start_verified() {
        let path = std::env::temp_dir().join(format!("alliance-guard-{}.json", std::process::id()));
        tokio::fs::write(
            &path,
            r#"[{"id": "A1", "tag": "AAA", "name": "Alpha",
                 "members": {"officers": ["u2", "u1"]},
                 "created_at": "2024-01-01T00:00:00Z"}]"#,
        )
        .await
        .unwrap();

        let config = DaemonConfig {
            seed_path: Some(path.clone()),
            ..owned_config()
        };
        let daemon = GuardDaemon::new(config).await.unwrap();
        tokio::fs::remove_file(&path).await.ok();

        assert!(daemon
            .context()
            .snapshots
            .verify_snapshot(&AllianceId::new("A1"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn run_until_stops_monitor() {
        let daemon = GuardDaemon::new(owned_config()).await.unwrap();
        let context = daemon.context().clone();

        daemon.run_until(async {}).await.unwrap();
        assert!(!context.monitor.is_running());
    }
}
