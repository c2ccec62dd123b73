//! Strongly-typed identifiers
//!
//! Alliance and actor ids come from the chat platform and are kept as opaque
//! strings. Journal entry ids are generated locally.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier of an alliance entity
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AllianceId(String);

impl AllianceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AllianceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AllianceId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Identifier of a user or system actor
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(String);

impl ActorId {
    /// Actor recorded for entries the engine writes on its own behalf.
    pub const SYSTEM: &'static str = "system";

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn system() -> Self {
        Self::new(Self::SYSTEM)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ActorId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Identifier of a journal entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JournalEntryId(Uuid);

impl JournalEntryId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for JournalEntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "journal:{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_ids_display_verbatim() {
        assert_eq!(AllianceId::new("A1").to_string(), "A1");
        assert_eq!(ActorId::from("u1").to_string(), "u1");
        assert_eq!(ActorId::system().as_str(), "system");
    }

    #[test]
    fn alliance_id_serializes_as_plain_string() {
        let json = serde_json::to_string(&AllianceId::new("A1")).unwrap();
        assert_eq!(json, "\"A1\"");
    }

    #[test]
    fn journal_ids_are_unique() {
        assert_ne!(JournalEntryId::generate(), JournalEntryId::generate());
    }
}
