use std::path::PathBuf;

use crate::bracket::DEFAULT_CHALLONGE_BASE_URL;
use crate::error::{BotError, Result};
use crate::state::GLOBAL_GUILD_ID;

/// Process-wide settings read from the environment
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub discord_token: String,

    pub challonge_api_key: String,
    pub challonge_base_url: String,

    /// Directory holding `db.json`
    pub state_path: PathBuf,

    /// Guild the bot is primarily deployed to
    pub guild_id: Option<u64>,
    pub allowed_guild_ids: Vec<String>,

    /// Fallbacks for guilds that have not stored their own values yet
    pub default_channel_id: Option<u64>,
    pub default_owner_role_id: Option<String>,
    pub default_staff_role_id: Option<String>,

    pub live_refresh_secs: u64,
    pub http_timeout_secs: u64,
}

impl BotConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; empty values count as unset
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let require = |key: &str| {
            get(key).ok_or_else(|| BotError::ConfigMissing {
                key: key.to_string(),
            })
        };

        let allowed_guild_ids = get("ALLOWED_GUILD_IDS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            discord_token: require("DISCORD_TOKEN")?,
            challonge_api_key: require("CHALLONGE_API_KEY")?,
            challonge_base_url: get("CHALLONGE_BASE_URL")
                .unwrap_or_else(|| DEFAULT_CHALLONGE_BASE_URL.to_string()),
            state_path: PathBuf::from(get("STATE_PATH").unwrap_or_else(|| "state".to_string())),
            guild_id: parse_opt(&get, "GUILD_ID")?,
            allowed_guild_ids,
            default_channel_id: parse_opt(&get, "CHANNEL_ID")?,
            default_owner_role_id: get("OWNER_ROLE_ID"),
            default_staff_role_id: get("STAFF_ROLE_ID"),
            live_refresh_secs: parse_opt(&get, "LIVE_REFRESH_SECS")?.unwrap_or(5),
            http_timeout_secs: parse_opt(&get, "HTTP_TIMEOUT_SECS")?.unwrap_or(30),
        })
    }

    pub fn db_file(&self) -> PathBuf {
        self.state_path.join("db.json")
    }

    /// Guild that a legacy single-guild document is assigned to
    pub fn legacy_guild_id(&self) -> String {
        self.guild_id
            .map(|id| id.to_string())
            .or_else(|| self.allowed_guild_ids.first().cloned())
            .unwrap_or_else(|| GLOBAL_GUILD_ID.to_string())
    }
}

fn parse_opt<F>(get: &F, key: &str) -> Result<Option<u64>>
where
    F: Fn(&str) -> Option<String>,
{
    get(key)
        .map(|raw| {
            raw.parse::<u64>().map_err(|e| BotError::ConfigInvalid {
                key: key.to_string(),
                message: e.to_string(),
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<BotConfig> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        BotConfig::from_lookup(|key| map.get(key).cloned())
    }

    const BASE: [(&str, &str); 2] = [("DISCORD_TOKEN", "t"), ("CHALLONGE_API_KEY", "k")];

    #[test]
    fn test_defaults() {
        let cfg = config(&BASE).unwrap();
        assert_eq!(cfg.challonge_base_url, DEFAULT_CHALLONGE_BASE_URL);
        assert_eq!(cfg.db_file(), PathBuf::from("state").join("db.json"));
        assert_eq!(cfg.live_refresh_secs, 5);
        assert_eq!(cfg.legacy_guild_id(), "global");
    }

    #[test]
    fn test_missing_token_is_reported() {
        let err = config(&[("CHALLONGE_API_KEY", "k")]).unwrap_err();
        assert!(matches!(err, BotError::ConfigMissing { key } if key == "DISCORD_TOKEN"));
    }

    #[test]
    fn test_legacy_guild_precedence() {
        let mut vars = BASE.to_vec();
        vars.push(("ALLOWED_GUILD_IDS", " , 222, 333"));
        assert_eq!(config(&vars).unwrap().legacy_guild_id(), "222");

        vars.push(("GUILD_ID", "111"));
        assert_eq!(config(&vars).unwrap().legacy_guild_id(), "111");
    }

    #[test]
    fn test_invalid_number_is_rejected() {
        let mut vars = BASE.to_vec();
        vars.push(("LIVE_REFRESH_SECS", "soon"));
        assert!(matches!(
            config(&vars),
            Err(BotError::ConfigInvalid { .. })
        ));
    }
}
