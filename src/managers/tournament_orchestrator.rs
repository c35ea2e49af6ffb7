use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::roster_manager::{flatten, SharedRosterManager};
use super::schedule::{parse_timezone, resolve_slot, ScheduleRequest};
use super::selection_cache::{SelectionCache, SelectionKey, REMOVAL_PAGE_SIZE};
use super::tournament_state::{self as machine, AccessLevel, TournamentAction};
use crate::bracket::{SharedBracketProvider, STATE_COMPLETE};
use crate::error::{BotError, Result};
use crate::models::{BracketId, BracketSnapshot, LiveMatch, PlayerEntry, TournamentStatus};
use crate::state::{GuildRecord, SharedGuildStore};

pub const DEFAULT_TOURNAMENT_NAME: &str = "Death Roll Tournament";
pub const DEFAULT_TOURNAMENT_TIME: &str = "TBD";

/// Friend names accepted per submission
pub const MAX_FRIENDS_PER_SUBMISSION: usize = 5;
pub const MAX_NICKNAME_LEN: usize = 233;

/// The member invoking an operation
#[derive(Debug, Clone)]
pub struct Actor {
    pub user_id: String,
    /// Platform display name, used when no nickname is stored
    pub display_name: String,
    pub role_ids: Vec<String>,
    pub is_administrator: bool,
}

/// Environment fallbacks for guilds that have not stored their own settings
#[derive(Debug, Clone, Default)]
pub struct GuildDefaults {
    pub owner_role_id: Option<String>,
    pub staff_role_id: Option<String>,
    /// Channel ids belong to one guild, so this only applies to `home_guild_id`
    pub signup_channel_id: Option<String>,
    pub home_guild_id: Option<String>,
}

impl GuildDefaults {
    fn signup_channel_for(&self, guild_id: &str) -> Option<String> {
        match self.home_guild_id.as_deref() {
            Some(home) if home == guild_id => self.signup_channel_id.clone(),
            _ => None,
        }
    }
}

/// What the provider said about the bracket's current match
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveStatus {
    Playing(LiveMatch),
    AllComplete,
    /// The provider could not be asked
    Unavailable,
}

/// How an end-bracket request was carried out
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndOutcome {
    Finalized,
    AlreadyComplete,
    /// The provider refused or was unreachable; local state was reset anyway
    LocalFallback { reason: String },
    /// In progress without a recorded bracket; only local state was reset
    NoRemoteBracket,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BracketCreated {
    pub name: String,
    pub url: String,
    pub player_count: usize,
}

/// One page of the admin removal menu
#[derive(Debug, Clone)]
pub struct RemovalPage {
    pub token: Uuid,
    pub page: usize,
    pub total_pages: usize,
    /// Option index in the menu is the position in this list
    pub options: Vec<PlayerEntry>,
}

/// Everything the signup board needs to render a guild
#[derive(Debug, Clone, PartialEq)]
pub struct GuildView {
    pub guild_id: String,
    pub name: String,
    pub time: String,
    pub status: TournamentStatus,
    pub player_count: usize,
    pub bracket_url: Option<String>,
    /// Only present while the tournament is in progress and a refresh has run
    pub live: Option<LiveStatus>,
    pub signup_channel_id: Option<String>,
    pub signup_message_id: Option<String>,
}

/// Redraws a guild's signup board
#[async_trait]
pub trait BoardSink: Send + Sync {
    async fn redraw(&self, view: &GuildView) -> Result<()>;
}

/// Admin and player operations on top of the roster, the lifecycle rules and
/// the bracket provider.
///
/// Multi-step flows that call out to the provider hold a per-guild lock so two
/// admins cannot interleave e.g. a bracket creation with a kill.
pub struct TournamentOrchestrator {
    store: SharedGuildStore,
    roster: SharedRosterManager,
    provider: SharedBracketProvider,
    selections: SelectionCache,
    live: DashMap<String, LiveStatus>,
    guild_locks: DashMap<String, Arc<Mutex<()>>>,
    defaults: GuildDefaults,
}

impl TournamentOrchestrator {
    pub fn new(
        store: SharedGuildStore,
        roster: SharedRosterManager,
        provider: SharedBracketProvider,
        defaults: GuildDefaults,
    ) -> Self {
        Self {
            store,
            roster,
            provider,
            selections: SelectionCache::default(),
            live: DashMap::new(),
            guild_locks: DashMap::new(),
            defaults,
        }
    }

    fn guild_lock(&self, guild_id: &str) -> Arc<Mutex<()>> {
        self.guild_locks
            .entry(guild_id.to_string())
            .or_default()
            .clone()
    }

    /// Owner when holding the owner role or Discord administrator, Staff when holding the staff role
    pub fn access_level(&self, record: &GuildRecord, actor: &Actor) -> AccessLevel {
        let holds = |role: Option<&str>| {
            role.map_or(false, |role| actor.role_ids.iter().any(|id| id == role))
        };
        let owner = record
            .state
            .owner_role_id
            .as_deref()
            .or(self.defaults.owner_role_id.as_deref());
        let staff = record
            .state
            .staff_role_id
            .as_deref()
            .or(self.defaults.staff_role_id.as_deref());

        if actor.is_administrator || holds(owner) {
            AccessLevel::Owner
        } else if holds(staff) {
            AccessLevel::Staff
        } else {
            AccessLevel::Member
        }
    }

    async fn authorize(&self, guild_id: &str, actor: &Actor, action: TournamentAction) -> Result<GuildRecord> {
        let record = self.store.get(guild_id).await;
        machine::authorize(self.access_level(&record, actor), action)?;
        Ok(record)
    }

    // ----- Admin lifecycle -----

    pub async fn schedule(&self, guild_id: &str, actor: &Actor, request: &ScheduleRequest) -> Result<GuildView> {
        let record = self
            .authorize(guild_id, actor, TournamentAction::Schedule)
            .await?;
        machine::check(&record, TournamentAction::Schedule)?;
        let slot = resolve_slot(request, record.state.default_tz())?;
        let label = format!("'{}' at {}", slot.name, slot.time);

        let lock = self.guild_lock(guild_id);
        let _guard = lock.lock().await;
        self.store
            .update(guild_id, |record| -> Result<()> {
                machine::check(record, TournamentAction::Schedule)?;
                machine::apply_schedule(record, slot);
                Ok(())
            })
            .await??;
        self.live.remove(guild_id);

        info!(
            "User {} scheduled {} in guild {}",
            actor.user_id, label, guild_id
        );
        Ok(self.view(guild_id).await)
    }

    /// Push the current roster to the provider as a new bracket
    pub async fn create_bracket(&self, guild_id: &str, actor: &Actor) -> Result<BracketCreated> {
        self.authorize(guild_id, actor, TournamentAction::CreateBracket)
            .await?;
        let lock = self.guild_lock(guild_id);
        let _guard = lock.lock().await;

        let record = self.store.get(guild_id).await;
        machine::check(&record, TournamentAction::CreateBracket)?;

        let players = flatten(&record);
        let snapshot = BracketSnapshot {
            name: record
                .state
                .tournament_name
                .clone()
                .unwrap_or_else(|| DEFAULT_TOURNAMENT_NAME.to_string()),
            time: record
                .state
                .tournament_time
                .clone()
                .unwrap_or_else(|| DEFAULT_TOURNAMENT_TIME.to_string()),
            players: players.clone(),
            created_at: Utc::now(),
        };

        let created = self.provider.create_tournament(&snapshot.name).await?;
        for name in &players {
            if let Err(e) = self.provider.add_participant(&created.id, name).await {
                warn!(
                    "Bracket {} for guild {} was created but adding '{}' failed: {}",
                    created.id, guild_id, name, e
                );
                return Err(e);
            }
        }

        let result = BracketCreated {
            name: snapshot.name.clone(),
            url: created.url.clone(),
            player_count: players.len(),
        };
        self.store
            .update(guild_id, |record| {
                machine::apply_bracket_created(record, snapshot, created.id, created.url)
            })
            .await?;

        info!(
            "User {} created bracket for '{}' in guild {} with {} players",
            actor.user_id, result.name, guild_id, result.player_count
        );
        Ok(result)
    }

    pub async fn start_bracket(&self, guild_id: &str, actor: &Actor) -> Result<GuildView> {
        self.authorize(guild_id, actor, TournamentAction::StartBracket)
            .await?;
        let lock = self.guild_lock(guild_id);
        let _guard = lock.lock().await;

        let record = self.store.get(guild_id).await;
        machine::check(&record, TournamentAction::StartBracket)?;
        let id = record
            .state
            .challonge_id
            .clone()
            .ok_or_else(|| BotError::precondition("No Challonge tournament created yet."))?;

        self.provider.start_tournament(&id).await?;
        self.store.update(guild_id, machine::apply_start).await?;
        self.live.remove(guild_id);

        info!(
            "User {} started bracket {} in guild {}",
            actor.user_id, id, guild_id
        );
        Ok(self.view(guild_id).await)
    }

    /// Finalize remotely when possible; the local reset happens regardless
    pub async fn end_bracket(&self, guild_id: &str, actor: &Actor) -> Result<EndOutcome> {
        self.authorize(guild_id, actor, TournamentAction::EndBracket)
            .await?;
        let lock = self.guild_lock(guild_id);
        let _guard = lock.lock().await;

        let record = self.store.get(guild_id).await;
        machine::check(&record, TournamentAction::EndBracket)?;

        let outcome = match &record.state.challonge_id {
            Some(id) => self.finish_remote(id).await,
            None => EndOutcome::NoRemoteBracket,
        };
        self.store.update(guild_id, machine::apply_end).await?;
        self.live.remove(guild_id);

        match &outcome {
            EndOutcome::LocalFallback { reason } => warn!(
                "Ended bracket in guild {} locally only: {}",
                guild_id, reason
            ),
            other => info!(
                "User {} ended bracket in guild {} ({:?})",
                actor.user_id, guild_id, other
            ),
        }
        Ok(outcome)
    }

    async fn finish_remote(&self, id: &BracketId) -> EndOutcome {
        match self.provider.fetch_state(id).await {
            Ok(state) if state == STATE_COMPLETE => return EndOutcome::AlreadyComplete,
            Ok(_) => {}
            Err(e) => {
                warn!("Could not look up bracket {}: {}", id, e);
                return EndOutcome::LocalFallback {
                    reason: fallback_reason(&e),
                };
            }
        }

        match self.provider.finalize(id).await {
            Ok(()) => EndOutcome::Finalized,
            Err(e) => {
                warn!("Could not finalize bracket {}: {}", id, e);
                EndOutcome::LocalFallback {
                    reason: fallback_reason(&e),
                }
            }
        }
    }

    /// Emergency reset; never contacts the provider
    pub async fn kill(&self, guild_id: &str, actor: &Actor) -> Result<()> {
        self.authorize(guild_id, actor, TournamentAction::Kill).await?;
        let lock = self.guild_lock(guild_id);
        let _guard = lock.lock().await;

        self.store.update(guild_id, machine::apply_kill).await?;
        self.live.remove(guild_id);
        info!("User {} killed the tournament in guild {}", actor.user_id, guild_id);
        Ok(())
    }

    // ----- Player operations -----

    /// Sign the actor up under their effective name; returns that name
    pub async fn sign_up(&self, guild_id: &str, actor: &Actor) -> Result<String> {
        let user_id = actor.user_id.as_str();
        let fallback = actor.display_name.trim().to_string();

        let admitted = self
            .roster
            .admit(guild_id, user_id, |record| {
                machine::check(record, TournamentAction::SignUp)?;
                let name = record.nicknames.get(user_id).cloned().unwrap_or(fallback);
                if name.is_empty() {
                    return Err(BotError::validation("Set a nickname before signing up."));
                }
                if flatten(record).contains(&name) {
                    return Err(BotError::precondition(format!(
                        "You're already signed up as **{}**.",
                        name
                    )));
                }
                Ok(vec![name])
            })
            .await?;

        admitted.into_iter().next().ok_or_else(|| BotError::Internal {
            message: "sign-up admitted no name".to_string(),
        })
    }

    /// Sign up names without an account of their own, attributed to the actor.
    /// Returns the names that were actually added.
    pub async fn sign_up_friends(&self, guild_id: &str, actor: &Actor, names: &[String]) -> Result<Vec<String>> {
        let mut seen = HashSet::new();
        let submitted: Vec<String> = names
            .iter()
            .map(|n| n.trim())
            .filter(|n| !n.is_empty())
            .take(MAX_FRIENDS_PER_SUBMISSION)
            .filter(|n| seen.insert(n.to_lowercase()))
            .map(String::from)
            .collect();
        if submitted.is_empty() {
            return Err(BotError::validation("Enter at least one name."));
        }

        self.roster
            .admit(guild_id, &actor.user_id, |record| {
                machine::check(record, TournamentAction::SignUp)?;
                let present: HashSet<String> =
                    flatten(record).iter().map(|n| n.to_lowercase()).collect();
                let fresh: Vec<String> = submitted
                    .into_iter()
                    .filter(|n| !present.contains(&n.to_lowercase()))
                    .collect();
                if fresh.is_empty() {
                    return Err(BotError::validation(
                        "All of those names are already signed up (or were duplicates).",
                    ));
                }
                Ok(fresh)
            })
            .await
    }

    /// Remove the given names from the actor's own entries; returns what was removed
    pub async fn withdraw(&self, guild_id: &str, actor: &Actor, names: &[String]) -> Result<Vec<String>> {
        let current = self.roster.list_for_user(guild_id, &actor.user_id).await;
        if current.is_empty() {
            return Err(BotError::precondition("You have no signups to withdraw."));
        }
        let removed: Vec<String> = current
            .into_iter()
            .filter(|n| names.contains(n))
            .collect();
        self.roster
            .remove_players(guild_id, &actor.user_id, names)
            .await?;
        Ok(removed)
    }

    pub async fn withdraw_all(&self, guild_id: &str, actor: &Actor) -> Result<Vec<String>> {
        let removed = self.roster.take_for_user(guild_id, &actor.user_id).await?;
        if removed.is_empty() {
            return Err(BotError::precondition("Nothing to withdraw."));
        }
        info!(
            "User {} withdrew all {} entries in guild {}",
            actor.user_id,
            removed.len(),
            guild_id
        );
        Ok(removed)
    }

    pub async fn list_players(&self, guild_id: &str) -> Vec<String> {
        self.roster.list_all(guild_id).await
    }

    /// The actor's own entries, for the withdraw menu
    pub async fn own_entries(&self, guild_id: &str, actor: &Actor) -> Vec<String> {
        self.roster.list_for_user(guild_id, &actor.user_id).await
    }

    /// Allowed in any status
    pub async fn set_nickname(&self, guild_id: &str, actor: &Actor, raw: &str) -> Result<String> {
        let nickname = raw.trim();
        if nickname.is_empty() {
            return Err(BotError::validation("Nickname cannot be empty."));
        }
        if nickname.chars().count() > MAX_NICKNAME_LEN {
            return Err(BotError::validation(format!(
                "Nickname is too long! Maximum {} characters allowed.",
                MAX_NICKNAME_LEN
            )));
        }
        self.roster
            .set_nickname(guild_id, &actor.user_id, nickname)
            .await?;
        Ok(nickname.to_string())
    }

    // ----- Guild settings -----

    /// Returns the canonical zone name
    pub async fn set_default_timezone(&self, guild_id: &str, actor: &Actor, tz: &str) -> Result<String> {
        self.authorize(guild_id, actor, TournamentAction::Configure)
            .await?;
        let tz = parse_timezone(tz)?.name().to_string();
        self.store
            .update(guild_id, |record| record.state.default_tz = Some(tz.clone()))
            .await?;
        info!("Guild {} default time zone set to {}", guild_id, tz);
        Ok(tz)
    }

    /// Move the board; the previous message is forgotten so a new one gets posted
    pub async fn set_signup_channel(&self, guild_id: &str, actor: &Actor, channel_id: &str) -> Result<()> {
        self.authorize(guild_id, actor, TournamentAction::Configure)
            .await?;
        self.store
            .update(guild_id, |record| {
                record.state.signup_channel_id = Some(channel_id.to_string());
                record.state.signup_message_id = None;
            })
            .await?;
        info!("Guild {} signup channel set to {}", guild_id, channel_id);
        Ok(())
    }

    /// Remember where the board was posted
    pub async fn record_signup_message(&self, guild_id: &str, channel_id: &str, message_id: &str) -> Result<()> {
        self.store
            .update(guild_id, |record| {
                record.state.signup_channel_id = Some(channel_id.to_string());
                record.state.signup_message_id = Some(message_id.to_string());
            })
            .await
    }

    /// `None` leaves the stored role unchanged
    pub async fn set_roles(
        &self,
        guild_id: &str,
        actor: &Actor,
        owner_role_id: Option<String>,
        staff_role_id: Option<String>,
    ) -> Result<()> {
        self.authorize(guild_id, actor, TournamentAction::AssignRoles)
            .await?;
        if owner_role_id.is_none() && staff_role_id.is_none() {
            return Err(BotError::validation("Pick an owner role, a staff role, or both."));
        }
        self.store
            .update(guild_id, |record| {
                if let Some(id) = owner_role_id {
                    record.state.owner_role_id = Some(id);
                }
                if let Some(id) = staff_role_id {
                    record.state.staff_role_id = Some(id);
                }
            })
            .await?;
        info!("User {} updated bot roles in guild {}", actor.user_id, guild_id);
        Ok(())
    }

    // ----- Admin removal -----

    /// Page is clamped to the last available page
    pub async fn open_removal_page(&self, guild_id: &str, actor: &Actor, page: usize) -> Result<RemovalPage> {
        self.authorize(guild_id, actor, TournamentAction::RemovePlayers)
            .await?;
        let all = self.roster.list_entries(guild_id).await;
        if all.is_empty() {
            return Err(BotError::precondition("No signups yet."));
        }

        let total_pages = all.len().div_ceil(REMOVAL_PAGE_SIZE);
        let page = page.min(total_pages - 1);
        let options: Vec<PlayerEntry> = all
            .into_iter()
            .skip(page * REMOVAL_PAGE_SIZE)
            .take(REMOVAL_PAGE_SIZE)
            .collect();

        let key = SelectionKey {
            guild_id: guild_id.to_string(),
            admin_id: actor.user_id.clone(),
            page,
        };
        let token = self.selections.open(key, options.clone());
        Ok(RemovalPage {
            token,
            page,
            total_pages,
            options,
        })
    }

    /// Resolve the submitted option indices and remove those entries
    pub async fn remove_selected(
        &self,
        guild_id: &str,
        actor: &Actor,
        page: usize,
        token: Uuid,
        indices: &[usize],
    ) -> Result<Vec<PlayerEntry>> {
        self.authorize(guild_id, actor, TournamentAction::RemovePlayers)
            .await?;
        let key = SelectionKey {
            guild_id: guild_id.to_string(),
            admin_id: actor.user_id.clone(),
            page,
        };
        let chosen = self.selections.take(&key, token, indices)?;

        // targets may have shifted since the page opened, so match by value
        let mut removed = Vec::with_capacity(chosen.len());
        for target in chosen.iter() {
            if self
                .roster
                .remove_one(guild_id, &target.user_id, &target.name)
                .await?
            {
                removed.push(target.clone());
            }
        }

        info!(
            "Admin {} removed {} of {} selected entries in guild {}",
            actor.user_id,
            removed.len(),
            chosen.len(),
            guild_id
        );
        Ok(removed)
    }

    // ----- Read path and live refresh -----

    pub async fn view(&self, guild_id: &str) -> GuildView {
        let record = self.store.get(guild_id).await;
        let status = record.status();
        let live = if status == TournamentStatus::InProgress {
            self.live.get(guild_id).map(|entry| entry.value().clone())
        } else {
            None
        };
        let state = record.state;

        GuildView {
            guild_id: guild_id.to_string(),
            name: state
                .tournament_name
                .unwrap_or_else(|| DEFAULT_TOURNAMENT_NAME.to_string()),
            time: state
                .tournament_time
                .unwrap_or_else(|| DEFAULT_TOURNAMENT_TIME.to_string()),
            status,
            player_count: record.players.values().map(Vec::len).sum(),
            bracket_url: state.challonge_url,
            live,
            signup_channel_id: state
                .signup_channel_id
                .or_else(|| self.defaults.signup_channel_for(guild_id)),
            signup_message_id: state.signup_message_id,
        }
    }

    /// Fetch the current match of every in-progress guild and redraw its
    /// board. Returns how many guilds were refreshed.
    pub async fn refresh_live_matches(&self, sink: &dyn BoardSink) -> usize {
        let mut targets = Vec::new();
        for guild_id in self.store.guild_ids().await {
            let record = self.store.get(&guild_id).await;
            if record.status() != TournamentStatus::InProgress {
                continue;
            }
            if let Some(id) = record.state.challonge_id {
                targets.push((guild_id, id));
            }
        }

        let refreshes = targets.into_iter().map(|(guild_id, id)| async move {
            let live = match self.provider.current_match(&id).await {
                Ok(Some(current)) => LiveStatus::Playing(current),
                Ok(None) => LiveStatus::AllComplete,
                Err(e) => {
                    warn!("Could not fetch current match for guild {}: {}", guild_id, e);
                    LiveStatus::Unavailable
                }
            };
            self.live.insert(guild_id.clone(), live);

            let view = self.view(&guild_id).await;
            if let Err(e) = sink.redraw(&view).await {
                warn!("Could not redraw board for guild {}: {}", guild_id, e);
            }
        });
        join_all(refreshes).await.len()
    }

    /// Background loop; never returns
    pub async fn run_live_refresh(self: Arc<Self>, sink: Arc<dyn BoardSink>, period: Duration) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("Live match refresh running every {:?}", period);
        loop {
            ticker.tick().await;
            let refreshed = self.refresh_live_matches(sink.as_ref()).await;
            if refreshed > 0 {
                debug!("Refreshed live match for {} guilds", refreshed);
            }
        }
    }
}

/// Split a free-form friends box on newlines and commas
pub fn split_friend_names(raw: &str) -> Vec<String> {
    raw.split(|c| c == '\n' || c == ',')
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(String::from)
        .collect()
}

fn fallback_reason(err: &BotError) -> String {
    match err {
        BotError::Provider { body, .. } => body.trim().to_string(),
        e if e.is_provider() => "Challonge could not be reached".to_string(),
        e => e.to_string(),
    }
}

/// Shared orchestrator type
pub type SharedTournamentOrchestrator = Arc<TournamentOrchestrator>;

pub fn create_shared_tournament_orchestrator(orchestrator: TournamentOrchestrator) -> SharedTournamentOrchestrator {
    Arc::new(orchestrator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bracket::{BracketProvider, ProviderTournament};
    use crate::managers::roster_manager::create_shared_roster_manager;
    use crate::state::{create_shared_guild_store, GuildStore};
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct FakeProvider {
        calls: StdMutex<Vec<String>>,
        fail_create: bool,
        fail_finalize: bool,
        remote_state: Option<String>,
        current: Option<LiveMatch>,
        unreachable_ids: Vec<String>,
    }

    impl FakeProvider {
        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }

        fn count(&self, prefix: &str) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|c| c.starts_with(prefix))
                .count()
        }
    }

    #[async_trait]
    impl BracketProvider for FakeProvider {
        async fn create_tournament(&self, name: &str) -> Result<ProviderTournament> {
            self.record(format!("create:{}", name));
            if self.fail_create {
                return Err(BotError::Provider {
                    status: 422,
                    body: "Name is taken".to_string(),
                });
            }
            Ok(ProviderTournament {
                id: BracketId::new("900"),
                url: "https://challonge.com/cup900".to_string(),
            })
        }

        async fn add_participant(&self, _id: &BracketId, name: &str) -> Result<()> {
            self.record(format!("add:{}", name));
            Ok(())
        }

        async fn start_tournament(&self, id: &BracketId) -> Result<()> {
            self.record(format!("start:{}", id));
            Ok(())
        }

        async fn current_match(&self, id: &BracketId) -> Result<Option<LiveMatch>> {
            if self.unreachable_ids.iter().any(|u| u == id.as_str()) {
                return Err(BotError::ProviderTransport {
                    message: "timed out".to_string(),
                });
            }
            Ok(self.current.clone())
        }

        async fn finalize(&self, id: &BracketId) -> Result<()> {
            self.record(format!("finalize:{}", id));
            if self.fail_finalize {
                return Err(BotError::Provider {
                    status: 422,
                    body: "Matches are not complete ".to_string(),
                });
            }
            Ok(())
        }

        async fn fetch_state(&self, _id: &BracketId) -> Result<String> {
            Ok(self
                .remote_state
                .clone()
                .unwrap_or_else(|| "underway".to_string()))
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        views: StdMutex<Vec<GuildView>>,
    }

    #[async_trait]
    impl BoardSink for RecordingSink {
        async fn redraw(&self, view: &GuildView) -> Result<()> {
            self.views.lock().unwrap().push(view.clone());
            Ok(())
        }
    }

    struct Harness {
        store: SharedGuildStore,
        provider: Arc<FakeProvider>,
        orchestrator: TournamentOrchestrator,
    }

    fn harness(provider: FakeProvider) -> Harness {
        let store = create_shared_guild_store(GuildStore::in_memory());
        let roster = create_shared_roster_manager(store.clone());
        let provider = Arc::new(provider);
        let orchestrator = TournamentOrchestrator::new(
            store.clone(),
            roster,
            provider.clone(),
            GuildDefaults {
                staff_role_id: Some("staff".to_string()),
                ..GuildDefaults::default()
            },
        );
        Harness {
            store,
            provider,
            orchestrator,
        }
    }

    fn admin() -> Actor {
        Actor {
            user_id: "admin".to_string(),
            display_name: "Admin".to_string(),
            role_ids: vec![],
            is_administrator: true,
        }
    }

    fn staff() -> Actor {
        Actor {
            user_id: "mod".to_string(),
            display_name: "Mod".to_string(),
            role_ids: vec!["staff".to_string()],
            is_administrator: false,
        }
    }

    fn member(id: &str, name: &str) -> Actor {
        Actor {
            user_id: id.to_string(),
            display_name: name.to_string(),
            role_ids: vec![],
            is_administrator: false,
        }
    }

    fn request() -> ScheduleRequest {
        ScheduleRequest {
            name: "Cup".to_string(),
            date: "11-01-26".to_string(),
            time: "08:00".to_string(),
            meridiem: "PM".to_string(),
        }
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_schedule_to_start_scenario() {
        let h = harness(FakeProvider::default());
        let o = &h.orchestrator;

        let view = o.schedule("g", &admin(), &request()).await.unwrap();
        assert_eq!(view.status, TournamentStatus::Scheduled);
        assert_eq!(view.player_count, 0);
        assert_eq!(view.name, "Cup");

        o.sign_up("g", &member("u1", "Ann")).await.unwrap();
        o.sign_up("g", &member("u2", "Bob")).await.unwrap();
        assert_eq!(o.list_players("g").await.len(), 2);

        let created = o.create_bracket("g", &admin()).await.unwrap();
        assert_eq!(created.player_count, 2);
        assert_eq!(h.provider.count("add:"), 2);
        let record = h.store.get("g").await;
        assert_eq!(record.state.challonge_id, Some(BracketId::new("900")));
        assert_eq!(record.state.bracket.map(|b| b.players), Some(names(&["Ann", "Bob"])));

        let view = o.start_bracket("g", &admin()).await.unwrap();
        assert_eq!(view.status, TournamentStatus::InProgress);
        assert!(o.list_players("g").await.is_empty());
        assert_eq!(h.provider.count("start:"), 1);
    }

    #[tokio::test]
    async fn test_friends_dedup_within_submission_and_roster() {
        let h = harness(FakeProvider::default());
        let o = &h.orchestrator;
        o.schedule("g", &admin(), &request()).await.unwrap();
        o.sign_up("g", &member("u1", "Bob")).await.unwrap();

        let added = o
            .sign_up_friends("g", &member("u2", "Cy"), &names(&["Ann", "ann", "Bob"]))
            .await
            .unwrap();

        assert_eq!(added, names(&["Ann"]));
        assert_eq!(o.list_players("g").await, names(&["Bob", "Ann"]));

        let err = o
            .sign_up_friends("g", &member("u2", "Cy"), &names(&["BOB", "ann"]))
            .await;
        assert!(matches!(err, Err(BotError::Validation { .. })));
    }

    #[tokio::test]
    async fn test_friends_capped_per_submission() {
        let h = harness(FakeProvider::default());
        let o = &h.orchestrator;
        o.schedule("g", &admin(), &request()).await.unwrap();

        let raw = "A, B\nC,,D, E, F";
        let added = o
            .sign_up_friends("g", &member("u1", "Host"), &split_friend_names(raw))
            .await
            .unwrap();
        assert_eq!(added, names(&["A", "B", "C", "D", "E"]));
        assert_eq!(o.own_entries("g", &member("u1", "Host")).await.len(), 5);
    }

    #[tokio::test]
    async fn test_self_signup_uses_nickname_and_rejects_duplicates() {
        let h = harness(FakeProvider::default());
        let o = &h.orchestrator;
        o.schedule("g", &admin(), &request()).await.unwrap();

        let ann = member("u1", "ann_discord");
        o.set_nickname("g", &ann, "  Ann  ").await.unwrap();
        assert_eq!(o.sign_up("g", &ann).await.unwrap(), "Ann");

        let err = o.sign_up("g", &ann).await;
        assert!(matches!(err, Err(BotError::Precondition { .. })));

        // someone else whose display name collides
        let err = o.sign_up("g", &member("u2", "Ann")).await;
        assert!(err.is_err());
        assert_eq!(o.list_players("g").await, names(&["Ann"]));
    }

    #[tokio::test]
    async fn test_signup_closed_outside_scheduled() {
        let h = harness(FakeProvider::default());
        let err = h.orchestrator.sign_up("g", &member("u1", "Ann")).await;
        assert!(matches!(err, Err(BotError::Precondition { .. })));
        assert!(h.orchestrator.list_players("g").await.is_empty());
    }

    #[tokio::test]
    async fn test_finalize_failure_falls_back_to_local_reset() {
        let h = harness(FakeProvider {
            fail_finalize: true,
            ..FakeProvider::default()
        });
        let o = &h.orchestrator;
        o.schedule("g", &admin(), &request()).await.unwrap();
        o.sign_up("g", &member("u1", "Ann")).await.unwrap();
        o.sign_up("g", &member("u2", "Bob")).await.unwrap();
        o.create_bracket("g", &admin()).await.unwrap();
        o.start_bracket("g", &admin()).await.unwrap();

        let outcome = o.end_bracket("g", &staff()).await.unwrap();
        assert_eq!(
            outcome,
            EndOutcome::LocalFallback {
                reason: "Matches are not complete".to_string()
            }
        );
        let record = h.store.get("g").await;
        assert_eq!(record.status(), TournamentStatus::None);
        assert!(record.state.challonge_id.is_none());
        assert!(record.state.challonge_url.is_none());
    }

    #[tokio::test]
    async fn test_end_skips_finalize_when_already_complete() {
        let h = harness(FakeProvider {
            remote_state: Some("complete".to_string()),
            ..FakeProvider::default()
        });
        h.store
            .update("g", |record| {
                record.state.tournament_status = TournamentStatus::InProgress;
                record.state.challonge_id = Some(BracketId::new("5"));
            })
            .await
            .unwrap();

        let outcome = h.orchestrator.end_bracket("g", &admin()).await.unwrap();
        assert_eq!(outcome, EndOutcome::AlreadyComplete);
        assert_eq!(h.provider.count("finalize:"), 0);
    }

    #[tokio::test]
    async fn test_end_without_bracket() {
        let h = harness(FakeProvider::default());
        let err = h.orchestrator.end_bracket("g", &admin()).await;
        assert!(matches!(err, Err(BotError::Precondition { .. })));

        h.store
            .update("g", |record| {
                record.state.tournament_status = TournamentStatus::InProgress
            })
            .await
            .unwrap();
        let outcome = h.orchestrator.end_bracket("g", &admin()).await.unwrap();
        assert_eq!(outcome, EndOutcome::NoRemoteBracket);
        assert_eq!(h.store.get("g").await.status(), TournamentStatus::None);
    }

    #[tokio::test]
    async fn test_kill_keeps_nickname() {
        let h = harness(FakeProvider::default());
        let o = &h.orchestrator;
        o.set_nickname("g", &member("u1", "Ann"), "Annie").await.unwrap();
        h.store
            .update("g", |record| {
                record.state.tournament_status = TournamentStatus::InProgress;
                record.state.challonge_id = Some(BracketId::new("5"));
                record.state.challonge_url = Some("https://challonge.com/x".to_string());
                for i in 0..5 {
                    record.players.insert(format!("u{}", i), vec![format!("P{}", i)]);
                }
            })
            .await
            .unwrap();

        o.kill("g", &staff()).await.unwrap();

        let record = h.store.get("g").await;
        assert!(record.players.is_empty());
        assert_eq!(record.status(), TournamentStatus::None);
        assert!(record.state.challonge_id.is_none());
        assert!(record.state.challonge_url.is_none());
        assert!(record.state.bracket.is_none());
        assert_eq!(record.nicknames.get("u1").map(String::as_str), Some("Annie"));
        assert!(h.provider.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_bracket_guard_leaves_state_alone() {
        let h = harness(FakeProvider::default());
        h.store
            .update("g", |record| {
                record.players.insert("u1".to_string(), names(&["Ann", "Bob"]));
            })
            .await
            .unwrap();
        let before = h.store.get("g").await;

        let err = h.orchestrator.create_bracket("g", &admin()).await;
        assert!(matches!(err, Err(BotError::Precondition { .. })));

        let after = h.store.get("g").await;
        assert_eq!(after.players, before.players);
        assert!(after.state.bracket.is_none());
        assert_eq!(h.provider.count("create:"), 0);
    }

    #[tokio::test]
    async fn test_provider_rejection_mutates_nothing() {
        let h = harness(FakeProvider {
            fail_create: true,
            ..FakeProvider::default()
        });
        let o = &h.orchestrator;
        o.schedule("g", &admin(), &request()).await.unwrap();
        o.sign_up("g", &member("u1", "Ann")).await.unwrap();
        o.sign_up("g", &member("u2", "Bob")).await.unwrap();

        let err = o.create_bracket("g", &admin()).await;
        assert!(matches!(err, Err(BotError::Provider { status: 422, .. })));

        let record = h.store.get("g").await;
        assert!(record.state.challonge_id.is_none());
        assert!(record.state.bracket.is_none());
        assert_eq!(o.list_players("g").await.len(), 2);
    }

    #[tokio::test]
    async fn test_role_tiers() {
        let h = harness(FakeProvider::default());
        let o = &h.orchestrator;

        let err = o.schedule("g", &member("u1", "Ann"), &request()).await;
        assert!(matches!(err, Err(BotError::PermissionDenied { .. })));

        o.schedule("g", &staff(), &request()).await.unwrap();
        let err = o.create_bracket("g", &staff()).await;
        assert!(matches!(err, Err(BotError::PermissionDenied { .. })));

        o.set_roles("g", &admin(), Some("owners".to_string()), None)
            .await
            .unwrap();
        let owner = Actor {
            role_ids: vec!["owners".to_string()],
            ..member("u9", "Olive")
        };
        let record = h.store.get("g").await;
        assert_eq!(o.access_level(&record, &owner), AccessLevel::Owner);
        assert_eq!(o.access_level(&record, &staff()), AccessLevel::Staff);
    }

    #[tokio::test]
    async fn test_withdraw_paths() {
        let h = harness(FakeProvider::default());
        let o = &h.orchestrator;
        let ann = member("u1", "Ann");

        let err = o.withdraw("g", &ann, &names(&["X"])).await;
        assert!(matches!(err, Err(BotError::Precondition { .. })));
        assert!(o.withdraw_all("g", &ann).await.is_err());

        o.schedule("g", &admin(), &request()).await.unwrap();
        o.sign_up_friends("g", &ann, &names(&["A", "B", "C"]))
            .await
            .unwrap();

        let removed = o.withdraw("g", &ann, &names(&["B", "Zed"])).await.unwrap();
        assert_eq!(removed, names(&["B"]));
        assert_eq!(o.withdraw_all("g", &ann).await.unwrap(), names(&["A", "C"]));
        assert!(o.list_players("g").await.is_empty());
    }

    #[tokio::test]
    async fn test_nickname_validation() {
        let h = harness(FakeProvider::default());
        let ann = member("u1", "Ann");
        let long = "x".repeat(MAX_NICKNAME_LEN + 1);
        assert!(matches!(
            h.orchestrator.set_nickname("g", &ann, &long).await,
            Err(BotError::Validation { .. })
        ));
        assert!(h.orchestrator.set_nickname("g", &ann, "   ").await.is_err());
        let ok = "y".repeat(MAX_NICKNAME_LEN);
        assert_eq!(h.orchestrator.set_nickname("g", &ann, &ok).await.unwrap(), ok);
    }

    #[tokio::test]
    async fn test_timezone_applies_to_schedule() {
        let h = harness(FakeProvider::default());
        let o = &h.orchestrator;

        assert!(o.set_default_timezone("g", &staff(), "Nowhere/City").await.is_err());
        assert!(o
            .set_default_timezone("g", &member("u1", "Ann"), "Europe/Paris")
            .await
            .is_err());

        let utc = o.schedule("g", &admin(), &request()).await.unwrap();
        let utc_ts = h.store.get("g").await.state.tournament_timestamp;

        o.set_default_timezone("g", &staff(), "Europe/Paris").await.unwrap();
        o.schedule("g", &admin(), &request()).await.unwrap();
        let paris_ts = h.store.get("g").await.state.tournament_timestamp;

        assert!(utc.time.contains("UTC"));
        // CET is UTC+1 in November
        assert_eq!(utc_ts.zip(paris_ts).map(|(u, p)| u - p), Some(3600));
    }

    #[tokio::test]
    async fn test_removal_selection_is_single_use() {
        let h = harness(FakeProvider::default());
        let o = &h.orchestrator;
        o.schedule("g", &admin(), &request()).await.unwrap();
        o.sign_up_friends("g", &member("u1", "Host"), &names(&["A", "B", "C"]))
            .await
            .unwrap();
        o.sign_up("g", &member("u2", "Dee")).await.unwrap();

        let err = o.open_removal_page("g", &member("u1", "Host"), 0).await;
        assert!(matches!(err, Err(BotError::PermissionDenied { .. })));

        let page = o.open_removal_page("g", &staff(), 3).await.unwrap();
        assert_eq!(page.page, 0);
        assert_eq!(page.total_pages, 1);
        assert_eq!(page.options.len(), 4);

        let removed = o
            .remove_selected("g", &staff(), 0, page.token, &[1, 3])
            .await
            .unwrap();
        assert_eq!(removed.len(), 2);
        assert_eq!(o.list_players("g").await, names(&["A", "C"]));

        let again = o.remove_selected("g", &staff(), 0, page.token, &[0]).await;
        assert!(matches!(again, Err(BotError::Precondition { .. })));
    }

    #[tokio::test]
    async fn test_removal_of_identical_rows_removes_each() {
        let h = harness(FakeProvider::default());
        let o = &h.orchestrator;
        let host = member("u1", "Host");
        o.schedule("g", &admin(), &request()).await.unwrap();
        o.set_nickname("g", &host, "X").await.unwrap();
        o.sign_up("g", &host).await.unwrap();
        o.sign_up_friends("g", &host, &names(&["Y"])).await.unwrap();
        o.set_nickname("g", &host, "Y").await.unwrap();
        assert_eq!(o.list_players("g").await, names(&["Y", "Y"]));

        let page = o.open_removal_page("g", &staff(), 0).await.unwrap();
        let removed = o
            .remove_selected("g", &staff(), 0, page.token, &[0, 1])
            .await
            .unwrap();

        assert_eq!(removed.len(), 2);
        assert!(o.list_players("g").await.is_empty());
    }

    #[tokio::test]
    async fn test_default_channel_stays_in_home_guild() {
        let store = create_shared_guild_store(GuildStore::in_memory());
        let roster = create_shared_roster_manager(store.clone());
        let o = TournamentOrchestrator::new(
            store,
            roster,
            Arc::new(FakeProvider::default()),
            GuildDefaults {
                signup_channel_id: Some("111".to_string()),
                home_guild_id: Some("home".to_string()),
                ..GuildDefaults::default()
            },
        );

        assert_eq!(o.view("home").await.signup_channel_id.as_deref(), Some("111"));
        assert_eq!(o.view("other").await.signup_channel_id, None);

        o.set_signup_channel("other", &admin(), "222").await.unwrap();
        assert_eq!(o.view("other").await.signup_channel_id.as_deref(), Some("222"));
    }

    #[tokio::test]
    async fn test_removal_pages_split_at_menu_limit() {
        let h = harness(FakeProvider::default());
        h.store
            .update("g", |record| {
                let many: Vec<String> = (0..30).map(|i| format!("P{}", i)).collect();
                record.players.insert("u1".to_string(), many);
            })
            .await
            .unwrap();

        let second = h.orchestrator.open_removal_page("g", &admin(), 1).await.unwrap();
        assert_eq!(second.total_pages, 2);
        assert_eq!(second.options.len(), 5);
        assert_eq!(second.options[0].name, "P25");
    }

    #[tokio::test]
    async fn test_live_refresh_isolates_failing_guilds() {
        let current = LiveMatch {
            player1: "Ann".to_string(),
            player2: "Bob".to_string(),
            round: 1,
        };
        let h = harness(FakeProvider {
            current: Some(current.clone()),
            unreachable_ids: vec!["2".to_string()],
            ..FakeProvider::default()
        });
        for (guild, id) in [("g1", "1"), ("g2", "2")] {
            h.store
                .update(guild, |record| {
                    record.state.tournament_status = TournamentStatus::InProgress;
                    record.state.challonge_id = Some(BracketId::new(id));
                })
                .await
                .unwrap();
        }
        h.store.get("idle").await;

        let sink = RecordingSink::default();
        let refreshed = h.orchestrator.refresh_live_matches(&sink).await;
        assert_eq!(refreshed, 2);
        assert_eq!(sink.views.lock().unwrap().len(), 2);

        assert_eq!(
            h.orchestrator.view("g1").await.live,
            Some(LiveStatus::Playing(current))
        );
        assert_eq!(
            h.orchestrator.view("g2").await.live,
            Some(LiveStatus::Unavailable)
        );
        assert_eq!(h.orchestrator.view("idle").await.live, None);
    }

    #[tokio::test]
    async fn test_view_defaults() {
        let h = harness(FakeProvider::default());
        let view = h.orchestrator.view("fresh").await;
        assert_eq!(view.name, DEFAULT_TOURNAMENT_NAME);
        assert_eq!(view.time, DEFAULT_TOURNAMENT_TIME);
        assert_eq!(view.status, TournamentStatus::None);
        assert_eq!(view.player_count, 0);
    }
}
