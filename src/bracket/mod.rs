//! External bracket hosting.
//!
//! The orchestrator only talks to [`BracketProvider`]; Challonge is the one
//! production implementation.

mod challonge;

pub use challonge::{ChallongeClient, DEFAULT_CHALLONGE_BASE_URL};

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;
use crate::models::{BracketId, LiveMatch};

/// Tournament as created on the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderTournament {
    pub id: BracketId,
    pub url: String,
}

/// Provider state string for a finished tournament
pub const STATE_COMPLETE: &str = "complete";

#[async_trait]
pub trait BracketProvider: Send + Sync {
    async fn create_tournament(&self, name: &str) -> Result<ProviderTournament>;

    async fn add_participant(&self, id: &BracketId, name: &str) -> Result<()>;

    async fn start_tournament(&self, id: &BracketId) -> Result<()>;

    /// First open match without a reported score, `None` once every match is played.
    /// Display callers treat an error as "unknown" rather than failing.
    async fn current_match(&self, id: &BracketId) -> Result<Option<LiveMatch>>;

    async fn finalize(&self, id: &BracketId) -> Result<()>;

    /// Raw provider state, e.g. `underway` or `complete`
    async fn fetch_state(&self, id: &BracketId) -> Result<String>;
}

/// Shared bracket provider type
pub type SharedBracketProvider = Arc<dyn BracketProvider>;
