use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::models::{BracketId, BracketSnapshot, TournamentStatus};

/// Guild id used for state that has no guild context
pub const GLOBAL_GUILD_ID: &str = "global";

/// Whole persisted document: guild id -> record
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct GuildDocument {
    pub guilds: IndexMap<String, GuildRecord>,
}

impl GuildDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a document from raw JSON, repairing anything malformed.
    ///
    /// Returns `true` alongside the document when the input was in the old
    /// single-tenant shape and has been wrapped under `legacy_guild_id`.
    pub fn from_value(value: Value, legacy_guild_id: &str) -> (Self, bool) {
        let Value::Object(mut root) = value else {
            warn!("Guild document is not a JSON object, starting fresh");
            return (Self::new(), false);
        };

        match root.remove("guilds") {
            Some(Value::Object(guilds)) => {
                let guilds = guilds
                    .into_iter()
                    .map(|(id, record)| (id, GuildRecord::from_value(record)))
                    .collect();
                (Self { guilds }, false)
            }
            Some(other) if !is_unset(&other) => {
                warn!("Guild document has a malformed 'guilds' entry, starting fresh");
                (Self::new(), false)
            }
            _ => {
                let mut legacy = Map::new();
                for key in ["players", "state", "nicknames"] {
                    if let Some(v) = root.remove(key) {
                        legacy.insert(key.to_string(), v);
                    }
                }
                let mut guilds = IndexMap::new();
                guilds.insert(
                    legacy_guild_id.to_string(),
                    GuildRecord::from_value(Value::Object(legacy)),
                );
                (Self { guilds }, true)
            }
        }
    }
}

/// `null`, `false`, `0` and `""` count as a missing `guilds` key
fn is_unset(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Everything the bot knows about one guild
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct GuildRecord {
    /// User id -> roster names submitted by that user, in submission order
    pub players: IndexMap<String, Vec<String>>,

    pub state: TournamentState,

    /// User id -> current nickname
    pub nicknames: IndexMap<String, String>,
}

impl GuildRecord {
    /// Lenient conversion: any non-object section becomes empty, non-string
    /// names are dropped, and users left with no names are removed.
    pub fn from_value(value: Value) -> Self {
        let Value::Object(mut obj) = value else {
            return Self::default();
        };

        let players = match obj.remove("players") {
            Some(Value::Object(players)) => players
                .into_iter()
                .filter_map(|(user_id, names)| {
                    let names: Vec<String> = match names {
                        Value::Array(items) => items
                            .into_iter()
                            .filter_map(|n| match n {
                                Value::String(s) => Some(s),
                                _ => None,
                            })
                            .collect(),
                        _ => Vec::new(),
                    };
                    (!names.is_empty()).then_some((user_id, names))
                })
                .collect(),
            _ => IndexMap::new(),
        };

        let state = match obj.remove("state") {
            Some(v @ Value::Object(_)) => serde_json::from_value(v).unwrap_or_default(),
            _ => TournamentState::default(),
        };

        let nicknames = match obj.remove("nicknames") {
            Some(Value::Object(nicks)) => nicks
                .into_iter()
                .filter_map(|(user_id, nick)| match nick {
                    Value::String(s) => Some((user_id, s)),
                    _ => None,
                })
                .collect(),
            _ => IndexMap::new(),
        };

        Self {
            players,
            state,
            nicknames,
        }
    }

    pub fn status(&self) -> TournamentStatus {
        self.state.tournament_status
    }
}

/// Tournament-scoped and configuration values for a guild.
///
/// Every field tolerates a wrong JSON type on load and falls back to its
/// default instead of failing the whole record.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TournamentState {
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub tournament_name: Option<String>,

    /// ISO date of the scheduled start
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub tournament_date: Option<String>,

    /// Human readable start time, including a Discord timestamp tag
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub tournament_time: Option<String>,

    /// Start instant as unix seconds
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub tournament_timestamp: Option<i64>,

    #[serde(default, deserialize_with = "lenient")]
    pub tournament_status: TournamentStatus,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub bracket: Option<BracketSnapshot>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub challonge_id: Option<BracketId>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub challonge_url: Option<String>,

    /// IANA zone used to interpret scheduling input
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub default_tz: Option<String>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub signup_message_id: Option<String>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub signup_channel_id: Option<String>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub owner_role_id: Option<String>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub staff_role_id: Option<String>,

    /// Keys this version does not know about, kept so they survive a rewrite
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TournamentState {
    pub fn default_tz(&self) -> &str {
        self.default_tz.as_deref().unwrap_or("UTC")
    }

    /// Drop everything tied to the current tournament cycle.
    /// Timezone, role and signup message configuration are kept.
    pub fn clear_tournament(&mut self) {
        self.tournament_name = None;
        self.tournament_date = None;
        self.tournament_time = None;
        self.tournament_timestamp = None;
        self.bracket = None;
        self.challonge_id = None;
        self.challonge_url = None;
        self.tournament_status = TournamentStatus::None;
    }
}

fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_malformed_sections_become_empty() {
        let record = GuildRecord::from_value(json!({
            "players": "oops",
            "state": [1, 2, 3],
            "nicknames": 42
        }));
        assert!(record.players.is_empty());
        assert!(record.nicknames.is_empty());
        assert_eq!(record.status(), TournamentStatus::None);
    }

    #[test]
    fn test_empty_and_invalid_player_lists_are_dropped() {
        let record = GuildRecord::from_value(json!({
            "players": {
                "1": [],
                "2": ["Ann", 7, "Bob"],
                "3": "not a list"
            }
        }));
        assert_eq!(record.players.len(), 1);
        assert_eq!(record.players["2"], vec!["Ann", "Bob"]);
    }

    #[test]
    fn test_state_fields_are_parsed_leniently() {
        let record = GuildRecord::from_value(json!({
            "state": {
                "tournamentName": "Cup",
                "tournamentStatus": "bogus",
                "challongeId": 998877,
                "challongeUrl": null,
                "defaultTz": 5,
                "signupChannelId": "42",
                "somethingElse": true
            }
        }));
        assert_eq!(record.state.tournament_name.as_deref(), Some("Cup"));
        assert_eq!(record.state.tournament_status, TournamentStatus::None);
        assert_eq!(record.state.challonge_id, Some(BracketId::new("998877")));
        assert_eq!(record.state.challonge_url, None);
        assert_eq!(record.state.default_tz(), "UTC");
        assert_eq!(record.state.signup_channel_id.as_deref(), Some("42"));
        assert_eq!(record.state.extra.get("somethingElse"), Some(&json!(true)));
    }

    #[test]
    fn test_legacy_document_is_wrapped() {
        let (doc, migrated) = GuildDocument::from_value(
            json!({
                "players": { "u1": ["Ann"] },
                "state": { "tournamentStatus": "scheduled" },
                "nicknames": { "u1": "Ann" }
            }),
            "555",
        );
        assert!(migrated);
        let record = &doc.guilds["555"];
        assert_eq!(record.players["u1"], vec!["Ann"]);
        assert_eq!(record.status(), TournamentStatus::Scheduled);
        assert_eq!(record.nicknames["u1"], "Ann");
    }

    #[test]
    fn test_null_guilds_is_treated_as_legacy() {
        let (doc, migrated) = GuildDocument::from_value(
            json!({ "guilds": null, "players": { "u1": ["Ann"] } }),
            "555",
        );
        assert!(migrated);
        assert_eq!(doc.guilds["555"].players["u1"], vec!["Ann"]);
    }

    #[test]
    fn test_non_object_guilds_is_discarded() {
        let (doc, migrated) = GuildDocument::from_value(
            json!({ "guilds": ["x"], "players": { "u1": ["Ann"] } }),
            "555",
        );
        assert!(!migrated);
        assert!(doc.guilds.is_empty());
    }

    #[test]
    fn test_wrapped_document_is_not_migrated() {
        let (doc, migrated) = GuildDocument::from_value(
            json!({ "guilds": { "1": { "players": {}, "state": {}, "nicknames": {} } } }),
            GLOBAL_GUILD_ID,
        );
        assert!(!migrated);
        assert!(doc.guilds.contains_key("1"));
    }

    #[test]
    fn test_clear_tournament_keeps_configuration() {
        let mut state = TournamentState {
            tournament_name: Some("Cup".to_string()),
            tournament_status: TournamentStatus::InProgress,
            challonge_id: Some(BracketId::new("1")),
            challonge_url: Some("https://challonge.com/x".to_string()),
            default_tz: Some("Europe/Oslo".to_string()),
            owner_role_id: Some("9".to_string()),
            ..Default::default()
        };
        state.clear_tournament();
        assert_eq!(state.tournament_name, None);
        assert_eq!(state.challonge_id, None);
        assert_eq!(state.tournament_status, TournamentStatus::None);
        assert_eq!(state.default_tz(), "Europe/Oslo");
        assert_eq!(state.owner_role_id.as_deref(), Some("9"));
    }

    #[test]
    fn test_serialized_shape() {
        let mut doc = GuildDocument::new();
        let mut record = GuildRecord::default();
        record.players.insert("u1".to_string(), vec!["Ann".to_string()]);
        doc.guilds.insert("g".to_string(), record);
        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value["guilds"]["g"]["players"]["u1"], json!(["Ann"]));
        assert_eq!(value["guilds"]["g"]["state"]["tournamentStatus"], json!("none"));
        assert_eq!(value["guilds"]["g"]["nicknames"], json!({}));
    }
}
