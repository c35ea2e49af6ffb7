use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Lifecycle status of a guild's tournament
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TournamentStatus {
    #[default]
    #[serde(rename = "none")]
    None,
    #[serde(rename = "scheduled")]
    Scheduled,
    #[serde(rename = "in-progress")]
    InProgress,
}

impl TournamentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TournamentStatus::None => "none",
            TournamentStatus::Scheduled => "scheduled",
            TournamentStatus::InProgress => "in-progress",
        }
    }
}

impl fmt::Display for TournamentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tournament id assigned by the bracket provider.
///
/// Challonge hands out numeric ids, older documents may hold them as strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct BracketId(String);

impl BracketId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BracketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for BracketId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Ok(BracketId(n.to_string())),
            Raw::Text(s) => Ok(BracketId(s)),
        }
    }
}

/// Roster snapshot pushed to the bracket provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BracketSnapshot {
    pub name: String,
    pub time: String,
    pub players: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// One roster line together with the member who submitted it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerEntry {
    pub user_id: String,
    pub name: String,
}

/// The match currently being played on the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveMatch {
    pub player1: String,
    pub player2: String,
    pub round: i64,
}
