use poise::serenity_prelude as serenity;
use tracing::{debug, error, info, warn};

use super::board::{format_roster, BOARD_PREFIX, LIST_BUTTON, SIGNUP_BUTTON, WITHDRAW_ALL_BUTTON};
use crate::commands::actor_from_member;
use crate::{Data, Error};

/// Handle when the bot joins a guild or starts up
pub async fn handle_guild_create(
    _ctx: &serenity::Context,
    guild: &serenity::Guild,
    data: &Data,
) -> Result<(), Error> {
    let guild_id = guild.id.to_string();
    if !data.config.allowed_guild_ids.is_empty() && !data.config.allowed_guild_ids.contains(&guild_id) {
        warn!(
            "Guild {} ({}) is not in ALLOWED_GUILD_IDS, not posting a signup board",
            guild.name, guild.id
        );
        return Ok(());
    }

    info!("Processing guild: {} ({})", guild.name, guild.id);
    if let Err(e) = data.board.repost(&guild_id).await {
        error!("Failed to post signup board for guild {}: {}", guild.id, e);
    }
    Ok(())
}

/// Buttons on the signup board
pub async fn handle_component(
    ctx: &serenity::Context,
    component: &serenity::ComponentInteraction,
    data: &Data,
) -> Result<(), Error> {
    let custom_id = component.data.custom_id.as_str();
    if !custom_id.starts_with(BOARD_PREFIX) {
        return Ok(());
    }
    let (Some(guild_id), Some(member)) = (component.guild_id, component.member.as_ref()) else {
        return Ok(());
    };

    let guild_id = guild_id.to_string();
    let actor = actor_from_member(member);
    let orchestrator = &data.orchestrator;

    let (content, changed) = match custom_id {
        SIGNUP_BUTTON => match orchestrator.sign_up(&guild_id, &actor).await {
            Ok(name) => (format!("✅ Signed up: {}", name), true),
            Err(e) => (e.user_message(), false),
        },
        WITHDRAW_ALL_BUTTON => match orchestrator.withdraw_all(&guild_id, &actor).await {
            Ok(_) => ("✅ All your signups have been withdrawn.".to_string(), true),
            Err(e) => (e.user_message(), false),
        },
        LIST_BUTTON => (format_roster(&orchestrator.list_players(&guild_id).await), false),
        other => {
            debug!("Ignoring unknown board button {}", other);
            return Ok(());
        }
    };

    component
        .create_response(
            &ctx.http,
            serenity::CreateInteractionResponse::Message(
                serenity::CreateInteractionResponseMessage::new()
                    .content(content)
                    .ephemeral(true),
            ),
        )
        .await?;

    if changed {
        data.board.refresh(&guild_id).await;
    }
    Ok(())
}
