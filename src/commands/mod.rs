pub mod admin;
pub mod general;
pub mod player;

pub use admin::{
    create_bracket, end_bracket, kill_tournament, remove_players, schedule, set_roles,
    set_timezone, signup_channel, start_bracket,
};
pub use general::{help, ping};
pub use player::{nickname, players, signup, signup_friends, withdraw, withdraw_all};

use poise::serenity_prelude as serenity;
use tracing::{debug, error};

use crate::error::BotError;
use crate::managers::Actor;
use crate::{Context, Error};

/// Discord labels and descriptions for select options cap at 100 characters
pub(crate) const OPTION_TEXT_LIMIT: usize = 100;

pub(crate) fn actor_from_member(member: &serenity::Member) -> Actor {
    Actor {
        user_id: member.user.id.to_string(),
        display_name: member.display_name().to_string(),
        role_ids: member.roles.iter().map(|r| r.to_string()).collect(),
        is_administrator: member
            .permissions
            .map_or(false, |p| p.administrator()),
    }
}

/// The invoking member as an [`Actor`]; all commands are guild-only
pub(crate) async fn invoking_actor(ctx: Context<'_>) -> Result<(String, Actor), Error> {
    let guild_id = ctx
        .guild_id()
        .ok_or("This command only works in a server.")?;
    let member = ctx
        .author_member()
        .await
        .ok_or("Could not look up your server membership.")?;
    Ok((guild_id.to_string(), actor_from_member(&member)))
}

pub(crate) async fn reply(ctx: Context<'_>, content: impl Into<String>) -> Result<(), Error> {
    ctx.send(
        poise::CreateReply::default()
            .content(content)
            .ephemeral(true),
    )
    .await?;
    Ok(())
}

/// Tell the member why their action failed
pub(crate) async fn reply_error(ctx: Context<'_>, err: BotError) -> Result<(), Error> {
    match &err {
        BotError::Validation { .. } | BotError::Precondition { .. } | BotError::PermissionDenied { .. } => {
            debug!(
                "'{}' rejected for {}: {}",
                ctx.command().qualified_name,
                ctx.author().name,
                err
            );
        }
        _ => error!("'{}' failed: {}", ctx.command().qualified_name, err),
    }
    reply(ctx, err.user_message()).await
}

pub(crate) fn truncate(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(limit.saturating_sub(1)).collect();
    cut.push('…');
    cut
}
