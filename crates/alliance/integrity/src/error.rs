use alliance_types::{ActorId, AllianceId, HealthState, JournalEntryId, JournalStatus};
use thiserror::Error;

/// Result type for integrity operations.
pub type IntegrityResult<T> = Result<T, IntegrityError>;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised by the integrity engine.
#[derive(Debug, Error)]
pub enum IntegrityError {
    #[error("safe mode active, mutation rejected: {reason}")]
    SafeModeActive { reason: String },

    #[error("integrity violation on alliance {alliance_id}: {reason}")]
    IntegrityViolation {
        alliance_id: AllianceId,
        reason: String,
    },

    #[error("lock {scope} unavailable: held by another owner")]
    LockUnavailable {
        scope: String,
        holder: Option<ActorId>,
    },

    #[error("{caller} does not hold lock {scope}")]
    NotOwner { scope: String, caller: ActorId },

    #[error("ownership registry already initialized")]
    AlreadyInitialized,

    #[error("no bot owner registered")]
    MissingBotOwner,

    #[error("{actor} is not authorized to {operation}")]
    Unauthorized { actor: ActorId, operation: String },

    #[error("system health is {state}: {reason}")]
    SystemUnhealthy { state: HealthState, reason: String },

    #[error("invalid journal transition for {entry_id}: {from} -> {to}")]
    InvalidTransition {
        entry_id: JournalEntryId,
        from: JournalStatus,
        to: JournalStatus,
    },

    #[error("mutation handler failed: {0}")]
    Handler(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Stable classification of [`IntegrityError`] for the command layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    SafeModeActive,
    IntegrityViolation,
    LockUnavailable,
    NotOwner,
    AlreadyInitialized,
    MissingBotOwner,
    Unauthorized,
    SystemUnhealthy,
    InvalidTransition,
    Handler,
    Storage,
    Other,
}

impl IntegrityError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IntegrityError::SafeModeActive { .. } => ErrorKind::SafeModeActive,
            IntegrityError::IntegrityViolation { .. } => ErrorKind::IntegrityViolation,
            IntegrityError::LockUnavailable { .. } => ErrorKind::LockUnavailable,
            IntegrityError::NotOwner { .. } => ErrorKind::NotOwner,
            IntegrityError::AlreadyInitialized => ErrorKind::AlreadyInitialized,
            IntegrityError::MissingBotOwner => ErrorKind::MissingBotOwner,
            IntegrityError::Unauthorized { .. } => ErrorKind::Unauthorized,
            IntegrityError::SystemUnhealthy { .. } => ErrorKind::SystemUnhealthy,
            IntegrityError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            IntegrityError::Handler(_) => ErrorKind::Handler,
            IntegrityError::Storage(_) => ErrorKind::Storage,
            IntegrityError::Other(_) => ErrorKind::Other,
        }
    }

    /// Shorthand for handler failures carrying a plain message.
    pub fn handler(message: impl Into<String>) -> Self {
        IntegrityError::Handler(message.into())
    }
}

/// Storage-layer errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("backend error: {0}")]
    Backend(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_errors_convert_into_integrity_errors() {
        let err: IntegrityError = StorageError::Backend("down".into()).into();
        assert_eq!(err.kind(), ErrorKind::Storage);
        assert!(err.to_string().contains("down"));
    }

    #[test]
    fn anyhow_errors_classify_as_other() {
        let err: IntegrityError = anyhow::anyhow!("role creation failed").into();
        assert_eq!(err.kind(), ErrorKind::Other);
        assert_eq!(err.to_string(), "role creation failed");
    }

    #[test]
    fn safe_mode_message_names_reason() {
        let err = IntegrityError::SafeModeActive {
            reason: "BOT_OWNER_MISSING".into(),
        };
        assert!(err.to_string().contains("BOT_OWNER_MISSING"));
    }
}
