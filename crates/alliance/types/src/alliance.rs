//! Alliance entity as seen by the integrity engine.
//!
//! The chat-platform layer creates, renames and deletes alliances. The
//! engine only reads them to build snapshots, and the repair service writes
//! back truncated member lists.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ActorId, AllianceId};

/// Membership of an alliance, split by role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllianceMembers {
    /// Current leader, if any.
    pub leader: Option<ActorId>,

    /// Officer ids. Order carries no meaning.
    #[serde(default)]
    pub officers: Vec<ActorId>,

    /// Regular member ids. Order carries no meaning.
    #[serde(default)]
    pub regulars: Vec<ActorId>,
}

impl AllianceMembers {
    /// Total number of members across all roles.
    pub fn count(&self) -> usize {
        usize::from(self.leader.is_some()) + self.officers.len() + self.regulars.len()
    }

    /// Whether the actor holds any role in the alliance.
    pub fn contains(&self, actor: &ActorId) -> bool {
        self.leader.as_ref() == Some(actor)
            || self.officers.contains(actor)
            || self.regulars.contains(actor)
    }
}

/// An alliance inside the shared guild.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alliance {
    pub id: AllianceId,

    /// Short tag shown in member nicknames.
    pub tag: String,

    pub name: String,

    pub members: AllianceMembers,

    /// Platform role ids owned by the alliance.
    #[serde(default)]
    pub roles: Vec<String>,

    /// Platform channel ids owned by the alliance.
    #[serde(default)]
    pub channels: Vec<String>,

    /// Set when the alliance lost its leader and awaits a successor.
    #[serde(default)]
    pub orphaned: bool,

    pub created_at: DateTime<Utc>,
}

impl Alliance {
    pub fn new(id: impl Into<AllianceId>, tag: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tag: tag.into(),
            name: name.into(),
            members: AllianceMembers::default(),
            roles: Vec::new(),
            channels: Vec::new(),
            orphaned: false,
            created_at: Utc::now(),
        }
    }

    pub fn with_leader(mut self, leader: impl Into<ActorId>) -> Self {
        self.members.leader = Some(leader.into());
        self
    }

    pub fn with_officers<I, A>(mut self, officers: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<ActorId>,
    {
        self.members.officers = officers.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_regulars<I, A>(mut self, regulars: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<ActorId>,
    {
        self.members.regulars = regulars.into_iter().map(Into::into).collect();
        self
    }

    pub fn member_count(&self) -> usize {
        self.members.count()
    }
}

impl From<String> for AllianceId {
    fn from(value: String) -> Self {
        AllianceId::new(value)
    }
}

impl From<String> for ActorId {
    fn from(value: String) -> Self {
        ActorId::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn member_count_includes_leader() {
        let alliance = Alliance::new("A1", "AAA", "Alpha")
            .with_leader("u0")
            .with_officers(["u1", "u2"])
            .with_regulars(["u3"]);
        assert_eq!(alliance.member_count(), 4);
        assert!(alliance.members.contains(&ActorId::from("u3")));
        assert!(!alliance.members.contains(&ActorId::from("u9")));
    }

    #[test]
    fn leaderless_alliance_counts_only_lists() {
        let alliance = Alliance::new("A2", "BBB", "Beta").with_regulars(["u1"]);
        assert_eq!(alliance.member_count(), 1);
    }

    #[test]
    fn missing_lists_deserialize_empty() {
        let json = r#"{
            "id": "A3",
            "tag": "CCC",
            "name": "Gamma",
            "members": { "leader": "u1" },
            "created_at": "2024-01-01T00:00:00Z"
        }"#;
        let alliance: Alliance = serde_json::from_str(json).unwrap();
        assert!(alliance.members.officers.is_empty());
        assert!(!alliance.orphaned);
    }
}
