use std::sync::Arc;
use tracing::{debug, info};

use crate::error::Result;
use crate::models::PlayerEntry;
use crate::state::{GuildRecord, SharedGuildStore};

/// Player roster and nickname bookkeeping for every guild
pub struct RosterManager {
    store: SharedGuildStore,
}

impl RosterManager {
    pub fn new(store: SharedGuildStore) -> Self {
        Self { store }
    }

    /// Append names to the user's roster, verbatim
    pub async fn add_players(&self, guild_id: &str, user_id: &str, names: &[String]) -> Result<()> {
        self.store
            .update(guild_id, |record| append(record, user_id, names.to_vec()))
            .await?;
        debug!("Added {:?} for user {} in guild {}", names, user_id, guild_id);
        Ok(())
    }

    /// Append whatever `select` picks, deciding against the record as it is at
    /// the moment of the write. Returns the names that were added; an error
    /// from `select` leaves the roster untouched.
    pub async fn admit<F>(&self, guild_id: &str, user_id: &str, select: F) -> Result<Vec<String>>
    where
        F: FnOnce(&GuildRecord) -> Result<Vec<String>> + Send,
    {
        let admitted = self
            .store
            .update(guild_id, |record| -> Result<Vec<String>> {
                let admitted = select(record)?;
                append(record, user_id, admitted.clone());
                Ok(admitted)
            })
            .await??;
        if !admitted.is_empty() {
            info!(
                "Signed up {:?} for user {} in guild {}",
                admitted, user_id, guild_id
            );
        }
        Ok(admitted)
    }

    /// Remove every occurrence of the given names from the user's roster
    pub async fn remove_players(&self, guild_id: &str, user_id: &str, names: &[String]) -> Result<()> {
        self.store
            .update(guild_id, |record| remove_all(record, user_id, names))
            .await
    }

    /// Remove the first occurrence of `name`; `false` when nothing matched
    pub async fn remove_one(&self, guild_id: &str, user_id: &str, name: &str) -> Result<bool> {
        self.store
            .update(guild_id, |record| remove_first(record, user_id, name))
            .await
    }

    /// Drop all of the user's entries, returning what was removed
    pub async fn take_for_user(&self, guild_id: &str, user_id: &str) -> Result<Vec<String>> {
        self.store
            .update(guild_id, |record| {
                record.players.shift_remove(user_id).unwrap_or_default()
            })
            .await
    }

    pub async fn list_all(&self, guild_id: &str) -> Vec<String> {
        flatten(&self.store.get(guild_id).await)
    }

    pub async fn list_for_user(&self, guild_id: &str, user_id: &str) -> Vec<String> {
        self.store
            .get(guild_id)
            .await
            .players
            .get(user_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Every (user, name) pair, in roster order
    pub async fn list_entries(&self, guild_id: &str) -> Vec<PlayerEntry> {
        entries(&self.store.get(guild_id).await)
    }

    pub async fn clear(&self, guild_id: &str) -> Result<()> {
        self.store
            .update(guild_id, |record| record.players.clear())
            .await?;
        info!("Cleared roster for guild {}", guild_id);
        Ok(())
    }

    pub async fn nickname(&self, guild_id: &str, user_id: &str) -> Option<String> {
        self.store.get(guild_id).await.nicknames.get(user_id).cloned()
    }

    /// Store a nickname, renaming the previous nickname's roster entry in place
    pub async fn set_nickname(&self, guild_id: &str, user_id: &str, nickname: &str) -> Result<()> {
        let renamed = self
            .store
            .update(guild_id, |record| rename(record, user_id, nickname))
            .await?;
        info!(
            "User {} in guild {} set nickname '{}'{}",
            user_id,
            guild_id,
            nickname,
            if renamed { " (roster entry renamed)" } else { "" }
        );
        Ok(())
    }
}

/// Shared roster manager type
pub type SharedRosterManager = Arc<RosterManager>;

pub fn create_shared_roster_manager(store: SharedGuildStore) -> SharedRosterManager {
    Arc::new(RosterManager::new(store))
}

pub(crate) fn flatten(record: &GuildRecord) -> Vec<String> {
    record.players.values().flatten().cloned().collect()
}

fn entries(record: &GuildRecord) -> Vec<PlayerEntry> {
    record
        .players
        .iter()
        .flat_map(|(user_id, names)| {
            names.iter().map(move |name| PlayerEntry {
                user_id: user_id.clone(),
                name: name.clone(),
            })
        })
        .collect()
}

fn append(record: &mut GuildRecord, user_id: &str, names: Vec<String>) {
    if names.is_empty() {
        return;
    }
    record
        .players
        .entry(user_id.to_string())
        .or_default()
        .extend(names);
}

fn remove_all(record: &mut GuildRecord, user_id: &str, names: &[String]) {
    let Some(list) = record.players.get_mut(user_id) else {
        return;
    };
    list.retain(|n| !names.contains(n));
    if list.is_empty() {
        record.players.shift_remove(user_id);
    }
}

fn remove_first(record: &mut GuildRecord, user_id: &str, name: &str) -> bool {
    let Some(list) = record.players.get_mut(user_id) else {
        return false;
    };
    let Some(idx) = list.iter().position(|n| n == name) else {
        return false;
    };
    list.remove(idx);
    if list.is_empty() {
        record.players.shift_remove(user_id);
    }
    true
}

fn rename(record: &mut GuildRecord, user_id: &str, nickname: &str) -> bool {
    let old = record
        .nicknames
        .insert(user_id.to_string(), nickname.to_string());

    let (Some(old), Some(list)) = (old, record.players.get_mut(user_id)) else {
        return false;
    };
    match list.iter().position(|n| *n == old) {
        Some(idx) => {
            list[idx] = nickname.to_string();
            true
        }
        None => false,
    }
}
