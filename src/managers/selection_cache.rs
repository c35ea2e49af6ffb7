use dashmap::DashMap;
use std::time::{Duration, Instant};
use tracing::debug;
use uuid::Uuid;

use crate::error::{BotError, Result};
use crate::models::PlayerEntry;

/// Entries shown per removal page (Discord select menus cap at 25 options)
pub const REMOVAL_PAGE_SIZE: usize = 25;

/// How long an opened removal page stays usable
pub const SELECTION_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SelectionKey {
    pub guild_id: String,
    pub admin_id: String,
    pub page: usize,
}

struct PendingSelection {
    token: Uuid,
    targets: Vec<PlayerEntry>,
    opened_at: Instant,
}

/// Short-lived index -> roster entry mapping behind the admin removal menu.
///
/// A select option only carries its index, so the targets are parked here
/// until the admin submits. Reopening a page replaces its entry; submitting
/// consumes it.
pub struct SelectionCache {
    pending: DashMap<SelectionKey, PendingSelection>,
    ttl: Duration,
}

impl SelectionCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            pending: DashMap::new(),
            ttl,
        }
    }

    /// Park the targets for a page and return the token the menu must echo back
    pub fn open(&self, key: SelectionKey, targets: Vec<PlayerEntry>) -> Uuid {
        self.sweep();
        let token = Uuid::new_v4();
        debug!(
            "Opened removal page {} for admin {} in guild {} ({} targets)",
            key.page,
            key.admin_id,
            key.guild_id,
            targets.len()
        );
        self.pending.insert(
            key,
            PendingSelection {
                token,
                targets,
                opened_at: Instant::now(),
            },
        );
        token
    }

    /// Consume the page and resolve the chosen indices
    pub fn take(&self, key: &SelectionKey, token: Uuid, indices: &[usize]) -> Result<Vec<PlayerEntry>> {
        let expired = || BotError::precondition("That selection has expired. Please open the list again.");

        // a stale token must not consume the page that replaced it
        let (_, pending) = self
            .pending
            .remove_if(key, |_, p| p.token == token)
            .ok_or_else(expired)?;
        if pending.opened_at.elapsed() >= self.ttl {
            return Err(expired());
        }

        // one row per distinct index; equal rows are separate roster entries
        let mut picked = indices.to_vec();
        picked.sort_unstable();
        picked.dedup();

        picked
            .into_iter()
            .map(|idx| {
                pending
                    .targets
                    .get(idx)
                    .cloned()
                    .ok_or_else(|| BotError::validation(format!("Unknown selection #{}", idx + 1)))
            })
            .collect()
    }

    /// Drop pages older than the TTL
    pub fn sweep(&self) {
        let ttl = self.ttl;
        self.pending.retain(|_, v| v.opened_at.elapsed() < ttl);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl Default for SelectionCache {
    fn default() -> Self {
        Self::new(SELECTION_TTL)
    }
}
