use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

use super::{BracketProvider, ProviderTournament};
use crate::error::{BotError, Result};
use crate::models::{BracketId, LiveMatch};

pub const DEFAULT_CHALLONGE_BASE_URL: &str = "https://api.challonge.com/v1";

/// Challonge v1 REST client
pub struct ChallongeClient {
    api_key: String,
    base_url: String,
    http: Client,
}

impl ChallongeClient {
    pub fn new(api_key: &str, base_url: &str, timeout_seconds: u64) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()?;
        Ok(Self {
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Attach the credential, send, and turn any non-2xx into a provider error
    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request
            .query(&[("api_key", self.api_key.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BotError::Provider {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl BracketProvider for ChallongeClient {
    async fn create_tournament(&self, name: &str) -> Result<ProviderTournament> {
        let body = json!({
            "tournament": { "name": name, "tournament_type": "single elimination" }
        });
        let response = self
            .send(self.http.post(self.url("tournaments.json")).json(&body))
            .await?;
        let tournament = response.json::<TournamentItem>().await?.into_inner();

        info!(
            "Created Challonge tournament {} ({})",
            tournament.id, tournament.full_challonge_url
        );
        Ok(ProviderTournament {
            id: tournament.id,
            url: tournament.full_challonge_url,
        })
    }

    async fn add_participant(&self, id: &BracketId, name: &str) -> Result<()> {
        let body = json!({ "participant": { "name": name } });
        self.send(
            self.http
                .post(self.url(&format!("tournaments/{}/participants.json", id)))
                .json(&body),
        )
        .await?;
        debug!("Added participant '{}' to bracket {}", name, id);
        Ok(())
    }

    async fn start_tournament(&self, id: &BracketId) -> Result<()> {
        self.send(
            self.http
                .post(self.url(&format!("tournaments/{}/start.json", id))),
        )
        .await?;
        info!("Started Challonge tournament {}", id);
        Ok(())
    }

    async fn current_match(&self, id: &BracketId) -> Result<Option<LiveMatch>> {
        let matches: Vec<MatchItem> = self
            .send(
                self.http
                    .get(self.url(&format!("tournaments/{}/matches.json", id))),
            )
            .await?
            .json()
            .await?;

        let participants: Vec<ParticipantItem> = self
            .send(
                self.http
                    .get(self.url(&format!("tournaments/{}/participants.json", id))),
            )
            .await?
            .json()
            .await?;

        let names: HashMap<u64, String> = participants
            .into_iter()
            .map(ParticipantItem::into_inner)
            .filter_map(|p| p.name.map(|name| (p.id, name)))
            .collect();

        Ok(pick_current_match(
            matches.into_iter().map(MatchItem::into_inner),
            &names,
        ))
    }

    async fn finalize(&self, id: &BracketId) -> Result<()> {
        self.send(
            self.http
                .post(self.url(&format!("tournaments/{}/finalize.json", id))),
        )
        .await?;
        info!("Finalized Challonge tournament {}", id);
        Ok(())
    }

    async fn fetch_state(&self, id: &BracketId) -> Result<String> {
        let tournament = self
            .send(self.http.get(self.url(&format!("tournaments/{}.json", id))))
            .await?
            .json::<TournamentItem>()
            .await?
            .into_inner();
        Ok(tournament.state.unwrap_or_default())
    }
}

fn pick_current_match(
    matches: impl IntoIterator<Item = ChallongeMatch>,
    names: &HashMap<u64, String>,
) -> Option<LiveMatch> {
    let open = matches.into_iter().find(|m| {
        m.state == "open"
            && m
                .scores_csv
                .as_deref()
                .map_or(true, |s| s.trim().is_empty())
    })?;

    let name_of = |pid: Option<u64>| {
        pid.and_then(|pid| names.get(&pid).cloned())
            .unwrap_or_else(|| "TBD".to_string())
    };

    Some(LiveMatch {
        player1: name_of(open.player1_id),
        player2: name_of(open.player2_id),
        round: open.round,
    })
}

// Challonge wraps objects under their type name; accept both shapes.

#[derive(Deserialize)]
#[serde(untagged)]
enum TournamentItem {
    Wrapped { tournament: ChallongeTournament },
    Bare(ChallongeTournament),
}

impl TournamentItem {
    fn into_inner(self) -> ChallongeTournament {
        match self {
            TournamentItem::Wrapped { tournament } | TournamentItem::Bare(tournament) => tournament,
        }
    }
}

#[derive(Deserialize)]
struct ChallongeTournament {
    id: BracketId,
    #[serde(default)]
    full_challonge_url: String,
    #[serde(default)]
    state: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MatchItem {
    Wrapped {
        #[serde(rename = "match")]
        inner: ChallongeMatch,
    },
    Bare(ChallongeMatch),
}

impl MatchItem {
    fn into_inner(self) -> ChallongeMatch {
        match self {
            MatchItem::Wrapped { inner } | MatchItem::Bare(inner) => inner,
        }
    }
}

#[derive(Deserialize)]
struct ChallongeMatch {
    state: String,
    player1_id: Option<u64>,
    player2_id: Option<u64>,
    #[serde(default)]
    round: i64,
    scores_csv: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ParticipantItem {
    Wrapped { participant: ChallongeParticipant },
    Bare(ChallongeParticipant),
}

impl ParticipantItem {
    fn into_inner(self) -> ChallongeParticipant {
        match self {
            ParticipantItem::Wrapped { participant } | ParticipantItem::Bare(participant) => {
                participant
            }
        }
    }
}

#[derive(Deserialize)]
struct ChallongeParticipant {
    id: u64,
    name: Option<String>,
}
