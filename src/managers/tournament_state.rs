//! Tournament lifecycle rules.
//!
//! `none -> scheduled -> in-progress -> none`, with `kill` returning to `none`
//! from anywhere. Guards only read the record; the `apply_*` functions perform
//! the transition side effects and are meant to run inside a store update.

use crate::error::{BotError, Result};
use crate::models::{BracketId, BracketSnapshot, TournamentStatus};
use crate::state::GuildRecord;

/// Players needed before a bracket can be pushed
pub const MIN_BRACKET_PLAYERS: usize = 2;

/// Role tiers, lowest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AccessLevel {
    Member,
    Staff,
    Owner,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TournamentAction {
    Schedule,
    CreateBracket,
    StartBracket,
    EndBracket,
    Kill,
    SignUp,
    /// Timezone and signup channel settings
    Configure,
    AssignRoles,
    RemovePlayers,
}

impl TournamentAction {
    pub fn required_access(&self) -> AccessLevel {
        match self {
            TournamentAction::CreateBracket
            | TournamentAction::StartBracket
            | TournamentAction::AssignRoles => AccessLevel::Owner,
            TournamentAction::Schedule
            | TournamentAction::EndBracket
            | TournamentAction::Kill
            | TournamentAction::Configure
            | TournamentAction::RemovePlayers => AccessLevel::Staff,
            TournamentAction::SignUp => AccessLevel::Member,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            TournamentAction::Schedule => "schedule tournaments",
            TournamentAction::CreateBracket => "create brackets",
            TournamentAction::StartBracket => "start the bracket",
            TournamentAction::EndBracket => "end the bracket",
            TournamentAction::Kill => "kill the tournament",
            TournamentAction::SignUp => "sign up",
            TournamentAction::Configure => "change tournament settings",
            TournamentAction::AssignRoles => "assign bot roles",
            TournamentAction::RemovePlayers => "remove players",
        }
    }
}

/// Reject callers below the action's required tier
pub fn authorize(level: AccessLevel, action: TournamentAction) -> Result<()> {
    if level >= action.required_access() {
        return Ok(());
    }
    let who = match action.required_access() {
        AccessLevel::Owner => "Owners",
        AccessLevel::Staff => "Staff and Owners",
        AccessLevel::Member => "members",
    };
    Err(BotError::permission_denied(format!(
        "only {} can {}.",
        who,
        action.label()
    )))
}

/// Check that `action` is legal for the record's current status
pub fn check(record: &GuildRecord, action: TournamentAction) -> Result<()> {
    let status = record.status();
    match action {
        TournamentAction::Schedule => {
            if status == TournamentStatus::InProgress {
                return Err(BotError::precondition(
                    "Cannot create a new tournament while one is currently in progress. \
                     Please end the current tournament first.",
                ));
            }
        }
        TournamentAction::CreateBracket => {
            if status != TournamentStatus::Scheduled {
                return Err(BotError::precondition(
                    "No scheduled tournament to create a bracket for.",
                ));
            }
            if record.state.challonge_id.is_some() {
                return Err(BotError::precondition(format!(
                    "A Challonge tournament already exists.\n{}",
                    record
                        .state
                        .challonge_url
                        .as_deref()
                        .unwrap_or("(no url saved)")
                )));
            }
            let players: usize = record.players.values().map(Vec::len).sum();
            if players < MIN_BRACKET_PLAYERS {
                return Err(BotError::precondition(
                    "Not enough players to create a bracket.",
                ));
            }
        }
        TournamentAction::StartBracket => {
            if status != TournamentStatus::Scheduled {
                return Err(BotError::precondition("No scheduled tournament to start."));
            }
            if record.state.challonge_id.is_none() {
                return Err(BotError::precondition(
                    "No Challonge tournament created yet.",
                ));
            }
        }
        TournamentAction::EndBracket => {
            if status != TournamentStatus::InProgress && record.state.challonge_id.is_none() {
                return Err(BotError::precondition("No existing bracket to end."));
            }
        }
        TournamentAction::Kill
        | TournamentAction::Configure
        | TournamentAction::AssignRoles
        | TournamentAction::RemovePlayers => {}
        TournamentAction::SignUp => {
            if status != TournamentStatus::Scheduled {
                return Err(BotError::precondition("Signups are closed right now."));
            }
        }
    }
    Ok(())
}

/// Start time of a newly scheduled tournament, in both forms that get stored
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledSlot {
    pub name: String,
    /// ISO date
    pub date: String,
    /// Display string
    pub time: String,
    /// Unix seconds
    pub timestamp: i64,
}

/// New cycle: roster and previous bracket are discarded
pub fn apply_schedule(record: &mut GuildRecord, slot: ScheduledSlot) {
    record.players.clear();
    let state = &mut record.state;
    state.challonge_id = None;
    state.challonge_url = None;
    state.bracket = None;
    state.tournament_name = Some(slot.name);
    state.tournament_date = Some(slot.date);
    state.tournament_time = Some(slot.time);
    state.tournament_timestamp = Some(slot.timestamp);
    state.tournament_status = TournamentStatus::Scheduled;
}

/// Bracket pushed; status stays `scheduled`
pub fn apply_bracket_created(
    record: &mut GuildRecord,
    snapshot: BracketSnapshot,
    id: BracketId,
    url: String,
) {
    record.state.bracket = Some(snapshot);
    record.state.challonge_id = Some(id);
    record.state.challonge_url = Some(url);
}

/// Bracket started remotely: signups are closed and the roster cleared
pub fn apply_start(record: &mut GuildRecord) {
    record.players.clear();
    record.state.tournament_status = TournamentStatus::InProgress;
}

/// Forget the external bracket and return to `none`
pub fn apply_end(record: &mut GuildRecord) {
    record.state.challonge_id = None;
    record.state.challonge_url = None;
    record.state.tournament_status = TournamentStatus::None;
}

/// Hard reset of everything tournament-scoped; nicknames and configuration survive
pub fn apply_kill(record: &mut GuildRecord) {
    record.players.clear();
    record.state.clear_tournament();
}
