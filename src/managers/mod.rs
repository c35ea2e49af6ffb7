pub mod roster_manager;
pub mod schedule;
pub mod selection_cache;
pub mod tournament_orchestrator;
pub mod tournament_state;

pub use roster_manager::create_shared_roster_manager;
pub use schedule::ScheduleRequest;
pub use tournament_orchestrator::{
    create_shared_tournament_orchestrator, split_friend_names, Actor, BoardSink, EndOutcome,
    GuildDefaults, GuildView, LiveStatus, SharedTournamentOrchestrator, TournamentOrchestrator,
};
