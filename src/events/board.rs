//! The signup board: one message per guild showing the tournament's state.
//!
//! The board is edited in place whenever the guild changes. If the stored
//! message cannot be edited (deleted, missing permissions) a fresh one is
//! posted and its id recorded.

use async_trait::async_trait;
use poise::serenity_prelude as serenity;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::managers::{BoardSink, GuildView, LiveStatus, SharedTournamentOrchestrator};
use crate::models::TournamentStatus;

pub const BOARD_PREFIX: &str = "deathroll:";
pub const SIGNUP_BUTTON: &str = "deathroll:signup";
pub const WITHDRAW_ALL_BUTTON: &str = "deathroll:withdraw_all";
pub const LIST_BUTTON: &str = "deathroll:list";

/// Discord caps message content at 2000 characters
const MESSAGE_LIMIT: usize = 2000;

pub struct SignupBoard {
    http: Arc<serenity::Http>,
    orchestrator: SharedTournamentOrchestrator,
}

impl SignupBoard {
    pub fn new(http: Arc<serenity::Http>, orchestrator: SharedTournamentOrchestrator) -> Self {
        Self { http, orchestrator }
    }

    /// Redraw after a change; failures are logged, never returned
    pub async fn refresh(&self, guild_id: &str) {
        let view = self.orchestrator.view(guild_id).await;
        if let Err(e) = self.redraw(&view).await {
            warn!("Could not refresh signup board for guild {}: {}", guild_id, e);
        }
    }

    /// Replace the board with a new message at the bottom of the channel
    pub async fn repost(&self, guild_id: &str) -> Result<()> {
        let view = self.orchestrator.view(guild_id).await;
        let Some(channel_id) = channel_of(&view) else {
            debug!("Guild {} has no signup channel configured", guild_id);
            return Ok(());
        };
        if let Some(message_id) = parse_id(view.signup_message_id.as_deref()) {
            if let Err(e) = channel_id
                .delete_message(&self.http, serenity::MessageId::new(message_id))
                .await
            {
                debug!("Old signup board in guild {} not deleted: {}", guild_id, e);
            }
        }
        self.post(&view, channel_id).await
    }

    /// Post a plain message in the guild's signup channel
    pub async fn announce(&self, guild_id: &str, content: &str) -> Result<()> {
        let view = self.orchestrator.view(guild_id).await;
        if let Some(channel_id) = channel_of(&view) {
            channel_id.say(&self.http, content).await?;
        }
        Ok(())
    }

    async fn post(&self, view: &GuildView, channel_id: serenity::ChannelId) -> Result<()> {
        let message = channel_id
            .send_message(
                &self.http,
                serenity::CreateMessage::new()
                    .content(render(view))
                    .components(components(view)),
            )
            .await?;
        self.orchestrator
            .record_signup_message(&view.guild_id, &channel_id.to_string(), &message.id.to_string())
            .await?;
        info!(
            "Posted signup board {} in channel {} for guild {}",
            message.id, channel_id, view.guild_id
        );
        Ok(())
    }
}

#[async_trait]
impl BoardSink for SignupBoard {
    async fn redraw(&self, view: &GuildView) -> Result<()> {
        let Some(channel_id) = channel_of(view) else {
            return Ok(());
        };

        if let Some(message_id) = parse_id(view.signup_message_id.as_deref()) {
            let edit = serenity::EditMessage::new()
                .content(render(view))
                .components(components(view));
            match channel_id
                .edit_message(&self.http, serenity::MessageId::new(message_id), edit)
                .await
            {
                Ok(_) => return Ok(()),
                Err(e) => warn!(
                    "Signup board {} in guild {} could not be edited ({}), posting a new one",
                    message_id, view.guild_id, e
                ),
            }
        }
        self.post(view, channel_id).await
    }
}

fn parse_id(raw: Option<&str>) -> Option<u64> {
    raw.and_then(|s| s.parse::<u64>().ok()).filter(|id| *id != 0)
}

fn channel_of(view: &GuildView) -> Option<serenity::ChannelId> {
    parse_id(view.signup_channel_id.as_deref()).map(serenity::ChannelId::new)
}

/// Board text for the guild's current state
pub fn render(view: &GuildView) -> String {
    match view.status {
        TournamentStatus::None => {
            "⚔️ Death Roll signups are not open. An admin must create a tournament to begin."
                .to_string()
        }
        TournamentStatus::Scheduled => format!(
            "⚔️ **{}**\nScheduled: {}\nCurrent signups: **{}**",
            view.name, view.time, view.player_count
        ),
        TournamentStatus::InProgress if view.bracket_url.is_none() => {
            format!("⚔️ **{}**\n🏆 Tournament in progress...", view.name)
        }
        TournamentStatus::InProgress => match &view.live {
            Some(LiveStatus::Playing(current)) => format!(
                "⚔️ **{}**\n🏆 Tournament is live!\n⚡ **Current Match:** {} vs {} (Round {})",
                view.name, current.player1, current.player2, current.round
            ),
            Some(LiveStatus::AllComplete) => format!(
                "⚔️ **{}**\n🏆 Tournament is live!\n✅ All matches complete!",
                view.name
            ),
            Some(LiveStatus::Unavailable) | None => {
                format!("⚔️ **{}**\n🏆 Tournament is live!", view.name)
            }
        },
    }
}

pub fn components(view: &GuildView) -> Vec<serenity::CreateActionRow> {
    let mut buttons = Vec::new();
    if view.status == TournamentStatus::Scheduled {
        buttons.push(
            serenity::CreateButton::new(SIGNUP_BUTTON)
                .label("Sign Up")
                .style(serenity::ButtonStyle::Success),
        );
        buttons.push(
            serenity::CreateButton::new(WITHDRAW_ALL_BUTTON)
                .label("Withdraw All")
                .style(serenity::ButtonStyle::Danger),
        );
        buttons.push(
            serenity::CreateButton::new(LIST_BUTTON)
                .label("Signups")
                .style(serenity::ButtonStyle::Secondary),
        );
    }
    if let Some(url) = &view.bracket_url {
        buttons.push(serenity::CreateButton::new_link(url).label("View Bracket"));
    }

    if buttons.is_empty() {
        Vec::new()
    } else {
        vec![serenity::CreateActionRow::Buttons(buttons)]
    }
}

/// Numbered roster listing, cut short to fit in one message
pub fn format_roster(players: &[String]) -> String {
    if players.is_empty() {
        return "📝 No signups yet.".to_string();
    }

    let mut out = format!("**Signups ({})**", players.len());
    for (i, name) in players.iter().enumerate() {
        let line = format!("\n{}. {}", i + 1, name);
        let rest = format!("\n…and {} more", players.len() - i);
        if out.chars().count() + line.chars().count() + rest.chars().count() > MESSAGE_LIMIT {
            out.push_str(&rest);
            break;
        }
        out.push_str(&line);
    }
    out
}
