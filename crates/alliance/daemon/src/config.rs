//! Configuration for alliance-guardd

use std::path::PathBuf;

use alliance_integrity::IntegrityConfig;
use alliance_types::ActorId;
use serde::{Deserialize, Serialize};

/// Main daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Integrity engine configuration
    #[serde(default)]
    pub integrity: IntegrityConfig,

    /// Owners registered at startup
    #[serde(default)]
    pub ownership: OwnershipConfig,

    /// JSON file holding the initial alliances
    #[serde(default)]
    pub seed_path: Option<PathBuf>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Owners registered at startup.
///
/// Both owners must be set for the bootstrap to run; otherwise the daemon
/// starts in SafeMode.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OwnershipConfig {
    #[serde(default)]
    pub bot_owner_id: Option<ActorId>,

    #[serde(default)]
    pub discord_owner_id: Option<ActorId>,

    /// Extra authorities granted by the bot owner
    #[serde(default)]
    pub authorities: Vec<ActorId>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl LoggingConfig {
    /// Filter from `RUST_LOG` when set, otherwise from the configured level.
    pub fn env_filter(&self) -> tracing_subscriber::EnvFilter {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| self.level.clone().into())
    }
}

/// Command-line values layered over the loaded configuration.
///
/// `None` and `false` leave the loaded value in place.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub seed_path: Option<PathBuf>,
    pub bot_owner_id: Option<ActorId>,
    pub discord_owner_id: Option<ActorId>,
    pub interval_ms: Option<u64>,
    pub log_level: Option<String>,
    pub json: bool,
}

impl DaemonConfig {
    /// Load configuration: defaults, then the file if given, then
    /// `ALLIANCE_`-prefixed environment variables.
    ///
    /// Nested keys are separated by `__`, e.g.
    /// `ALLIANCE_INTEGRITY__MONITOR__INTERVAL_MS=5000`.
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        // Add default configuration
        builder = builder.add_source(config::Config::try_from(&DaemonConfig::default())?);

        // Add file configuration if provided
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("ALLIANCE")
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("ownership.authorities")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// Apply command-line overrides.
    pub fn apply_overrides(&mut self, overrides: Overrides) {
        if let Some(seed) = overrides.seed_path {
            self.seed_path = Some(seed);
        }
        if let Some(owner) = overrides.bot_owner_id {
            self.ownership.bot_owner_id = Some(owner);
        }
        if let Some(owner) = overrides.discord_owner_id {
            self.ownership.discord_owner_id = Some(owner);
        }
        if let Some(interval_ms) = overrides.interval_ms {
            self.integrity.monitor.interval_ms = interval_ms;
        }
        if let Some(level) = overrides.log_level {
            self.logging.level = level;
        }
        if overrides.json {
            self.logging.json = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DaemonConfig::default();
        assert_eq!(config.integrity.monitor.interval_ms, 30_000);
        assert_eq!(config.integrity.monitor.max_repair_attempts, 2);
        assert!(config.ownership.bot_owner_id.is_none());
        assert!(config.seed_path.is_none());
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_load_without_file() {
        let config = DaemonConfig::load(None).unwrap();
        assert_eq!(config.integrity.locks.repair_owner, "integrity-repair");
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!(
            "alliance-guardd-config-{}.toml",
            std::process::id()
        ));
        std::fs::write(
            &path,
            r#"
seed_path = "alliances.json"

[integrity.monitor]
interval_ms = 5000

[ownership]
bot_owner_id = "100"
discord_owner_id = "200"
authorities = ["300"]
"#,
        )
        .unwrap();

        let config = DaemonConfig::load(path.to_str()).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.integrity.monitor.interval_ms, 5000);
        assert_eq!(config.integrity.monitor.max_repair_attempts, 2);
        assert_eq!(config.ownership.bot_owner_id, Some(ActorId::new("100")));
        assert_eq!(config.ownership.authorities, vec![ActorId::new("300")]);
        assert_eq!(config.seed_path, Some(PathBuf::from("alliances.json")));
    }

    #[test]
    fn test_file_logging_survives_empty_overrides() {
        let path = std::env::temp_dir().join(format!(
            "alliance-guardd-logging-{}.toml",
            std::process::id()
        ));
        std::fs::write(
            &path,
            r#"
[logging]
level = "debug"
json = true
"#,
        )
        .unwrap();

        let mut config = DaemonConfig::load(path.to_str()).unwrap();
        std::fs::remove_file(&path).ok();
        config.apply_overrides(Overrides::default());

        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json);
    }

    #[test]
    fn test_overrides_replace_loaded_values() {
        let mut config = DaemonConfig::default();
        config.apply_overrides(Overrides {
            bot_owner_id: Some(ActorId::new("100")),
            interval_ms: Some(250),
            log_level: Some("trace".to_string()),
            ..Overrides::default()
        });

        assert_eq!(config.ownership.bot_owner_id, Some(ActorId::new("100")));
        assert!(config.ownership.discord_owner_id.is_none());
        assert_eq!(config.integrity.monitor.interval_ms, 250);
        assert_eq!(config.logging.level, "trace");
        assert!(!config.logging.json);
    }

    #[test]
    fn test_missing_file_is_ignored() {
        let config = DaemonConfig::load(Some("/nonexistent/alliance-guardd")).unwrap();
        assert!(!config.logging.json);
    }
}
