use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use super::guild_record::{GuildDocument, GuildRecord};
use crate::error::{BotError, Result};

/// Single owner of the per-guild document.
///
/// Every mutation goes through [`GuildStore::update`], which applies the
/// change and flushes the whole document before returning.
pub struct GuildStore {
    /// `None` keeps the document in memory only
    path: Option<PathBuf>,

    document: RwLock<GuildDocument>,

    /// Serializes mutate-and-flush so an older snapshot never lands after a newer one
    write_lock: Mutex<()>,
}

impl GuildStore {
    pub fn in_memory() -> Self {
        Self {
            path: None,
            document: RwLock::new(GuildDocument::new()),
            write_lock: Mutex::new(()),
        }
    }

    /// Load from a JSON file.
    ///
    /// Never fails: unreadable or unparsable files are logged and replaced by
    /// an empty document. A legacy single-guild file is wrapped under
    /// `legacy_guild_id` and written back once.
    pub async fn load(path: impl AsRef<Path>, legacy_guild_id: &str) -> Self {
        let path = path.as_ref().to_path_buf();
        let (document, migrated) = match tokio::fs::read_to_string(&path).await {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(value) => GuildDocument::from_value(value, legacy_guild_id),
                Err(e) => {
                    warn!(
                        "Failed to parse {}, starting fresh: {}",
                        path.display(),
                        e
                    );
                    (GuildDocument::new(), false)
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No state file at {}, starting fresh", path.display());
                (GuildDocument::new(), false)
            }
            Err(e) => {
                let err = BotError::StateLoad {
                    path: path.display().to_string(),
                    source: e,
                };
                error!("{}, starting fresh", err);
                (GuildDocument::new(), false)
            }
        };

        info!(
            "Loaded state for {} guild(s) from {}",
            document.guilds.len(),
            path.display()
        );

        let store = Self {
            path: Some(path),
            document: RwLock::new(document),
            write_lock: Mutex::new(()),
        };

        if migrated {
            info!(
                "Migrated legacy state into guild '{}'",
                legacy_guild_id
            );
            if let Err(e) = store.persist().await {
                error!("Failed to write migrated state: {}", e);
            }
        }

        store
    }

    /// Current record for a guild, created empty on first reference
    pub async fn get(&self, guild_id: &str) -> GuildRecord {
        {
            let doc = self.document.read().await;
            if let Some(record) = doc.guilds.get(guild_id) {
                return record.clone();
            }
        }

        let mut doc = self.document.write().await;
        doc.guilds.entry(guild_id.to_string()).or_default().clone()
    }

    /// Apply `f` to the guild's record and flush the document.
    ///
    /// `f` runs under the document lock, so a read-check-write done inside it
    /// cannot interleave with another update. If the flush fails the change
    /// stays in memory and is written by the next successful flush.
    pub async fn update<F, R>(&self, guild_id: &str, f: F) -> Result<R>
    where
        F: FnOnce(&mut GuildRecord) -> R + Send,
        R: Send,
    {
        let _write = self.write_lock.lock().await;

        let (result, content) = {
            let mut doc = self.document.write().await;
            let record = doc.guilds.entry(guild_id.to_string()).or_default();
            let result = f(record);
            (result, serde_json::to_string_pretty(&*doc)?)
        };

        self.write_content(&content).await?;
        Ok(result)
    }

    /// Write the full document to disk
    pub async fn persist(&self) -> Result<()> {
        let _write = self.write_lock.lock().await;
        let content = {
            let doc = self.document.read().await;
            serde_json::to_string_pretty(&*doc)?
        };
        self.write_content(&content).await
    }

    /// Ids of every guild currently held in memory
    pub async fn guild_ids(&self) -> Vec<String> {
        let doc = self.document.read().await;
        doc.guilds.keys().cloned().collect()
    }

    async fn write_content(&self, content: &str) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let save_err = |source: std::io::Error| {
            let err = BotError::StateSave {
                path: path.display().to_string(),
                source,
            };
            error!("{}", err);
            err
        };

        // Write to temp file first, then rename for atomicity
        let temp_path = path.with_extension("json.tmp");
        tokio::fs::write(&temp_path, content)
            .await
            .map_err(save_err)?;
        tokio::fs::rename(&temp_path, path)
            .await
            .map_err(save_err)?;

        debug!("Flushed state to {}", path.display());
        Ok(())
    }
}

/// Shared guild store type
pub type SharedGuildStore = Arc<GuildStore>;

pub fn create_shared_guild_store(store: GuildStore) -> SharedGuildStore {
    Arc::new(store)
}
