use poise::serenity_prelude as serenity;
use std::time::Duration;
use tracing::{error, info};

use super::{invoking_actor, reply, reply_error, truncate, OPTION_TEXT_LIMIT};
use crate::error::BotError;
use crate::events::board::format_roster;
use crate::managers::split_friend_names;
use crate::{Context, Error};

const WITHDRAW_SELECT: &str = "withdraw_select";
const WITHDRAW_ALL: &str = "withdraw_all";
/// Discord select menus hold at most 25 options
const MENU_LIMIT: usize = 25;

/// Sign up for the scheduled tournament
#[poise::command(slash_command, guild_only)]
pub async fn signup(ctx: Context<'_>) -> Result<(), Error> {
    let (guild_id, actor) = invoking_actor(ctx).await?;
    match ctx.data().orchestrator.sign_up(&guild_id, &actor).await {
        Ok(name) => {
            reply(ctx, format!("✅ Signed up: {}", name)).await?;
            ctx.data().board.refresh(&guild_id).await;
        }
        Err(e) => reply_error(ctx, e).await?,
    }
    Ok(())
}

/// Sign up friends without a Discord account (up to 5 names)
#[poise::command(slash_command, guild_only)]
pub async fn signup_friends(
    ctx: Context<'_>,
    #[description = "Names separated by commas"] names: String,
) -> Result<(), Error> {
    let (guild_id, actor) = invoking_actor(ctx).await?;
    let submitted = split_friend_names(&names);
    match ctx
        .data()
        .orchestrator
        .sign_up_friends(&guild_id, &actor, &submitted)
        .await
    {
        Ok(added) => {
            reply(ctx, format!("✅ Friends signed up: {}", added.join(", "))).await?;
            ctx.data().board.refresh(&guild_id).await;
        }
        Err(e) => reply_error(ctx, e).await?,
    }
    Ok(())
}

/// Withdraw some of your signups
#[poise::command(slash_command, guild_only)]
pub async fn withdraw(
    ctx: Context<'_>,
    #[description = "Names to withdraw, separated by commas (leave empty to pick from a list)"]
    names: Option<String>,
) -> Result<(), Error> {
    let (guild_id, actor) = invoking_actor(ctx).await?;
    let orchestrator = &ctx.data().orchestrator;

    if let Some(names) = names {
        match orchestrator
            .withdraw(&guild_id, &actor, &split_friend_names(&names))
            .await
        {
            Ok(removed) if removed.is_empty() => {
                reply(ctx, "❌ None of those names are in your signups.").await?
            }
            Ok(removed) => {
                reply(ctx, format!("🗑️ Removed: {}", removed.join(", "))).await?;
                ctx.data().board.refresh(&guild_id).await;
            }
            Err(e) => reply_error(ctx, e).await?,
        }
        return Ok(());
    }

    let own = orchestrator.own_entries(&guild_id, &actor).await;
    if own.is_empty() {
        return reply(ctx, "❌ You have no signups to withdraw.").await;
    }

    let shown: Vec<&String> = own.iter().take(MENU_LIMIT).collect();
    let options: Vec<serenity::CreateSelectMenuOption> = shown
        .iter()
        .enumerate()
        .map(|(i, name)| {
            serenity::CreateSelectMenuOption::new(truncate(name, OPTION_TEXT_LIMIT), i.to_string())
        })
        .collect();
    let menu = serenity::CreateSelectMenu::new(
        WITHDRAW_SELECT,
        serenity::CreateSelectMenuKind::String { options },
    )
    .placeholder("Select players to withdraw")
    .min_values(1)
    .max_values(shown.len() as u8);
    let buttons = vec![serenity::CreateButton::new(WITHDRAW_ALL)
        .label("Withdraw All")
        .style(serenity::ButtonStyle::Danger)];

    let handle = ctx
        .send(
            poise::CreateReply::default()
                .content("🗑️ Select players to withdraw, or click **Withdraw All**:")
                .components(vec![
                    serenity::CreateActionRow::SelectMenu(menu),
                    serenity::CreateActionRow::Buttons(buttons),
                ])
                .ephemeral(true),
        )
        .await?;
    let message = handle.message().await?;

    let Some(interaction) = message
        .await_component_interaction(ctx.serenity_context().shard.clone())
        .author_id(ctx.author().id)
        .timeout(Duration::from_secs(120))
        .await
    else {
        return Ok(());
    };

    let content = match &interaction.data.kind {
        serenity::ComponentInteractionDataKind::StringSelect { values } => {
            let picked: Vec<String> = values
                .iter()
                .filter_map(|v| v.parse::<usize>().ok())
                .filter_map(|i| shown.get(i).map(|name| name.to_string()))
                .collect();
            match orchestrator.withdraw(&guild_id, &actor, &picked).await {
                Ok(removed) => format!("🗑️ Removed: {}", removed.join(", ")),
                Err(e) => e.user_message(),
            }
        }
        serenity::ComponentInteractionDataKind::Button => {
            withdraw_all_outcome(&orchestrator.withdraw_all(&guild_id, &actor).await)
        }
        _ => return Ok(()),
    };

    if let Err(e) = interaction
        .create_response(
            ctx.http(),
            serenity::CreateInteractionResponse::UpdateMessage(
                serenity::CreateInteractionResponseMessage::new()
                    .content(content)
                    .components(vec![]),
            ),
        )
        .await
    {
        error!("Failed to update withdraw menu: {}", e);
    }
    ctx.data().board.refresh(&guild_id).await;
    Ok(())
}

/// Withdraw every signup you submitted
#[poise::command(slash_command, guild_only)]
pub async fn withdraw_all(ctx: Context<'_>) -> Result<(), Error> {
    let (guild_id, actor) = invoking_actor(ctx).await?;
    match ctx.data().orchestrator.withdraw_all(&guild_id, &actor).await {
        Ok(removed) => {
            reply(ctx, format!("✅ Withdrew {} signups.", removed.len())).await?;
            ctx.data().board.refresh(&guild_id).await;
        }
        Err(e) => reply_error(ctx, e).await?,
    }
    Ok(())
}

/// List everyone signed up
#[poise::command(slash_command, guild_only)]
pub async fn players(ctx: Context<'_>) -> Result<(), Error> {
    let (guild_id, _) = invoking_actor(ctx).await?;
    let players = ctx.data().orchestrator.list_players(&guild_id).await;
    reply(ctx, format_roster(&players)).await
}

/// Set the name you sign up with
#[poise::command(slash_command, guild_only)]
pub async fn nickname(
    ctx: Context<'_>,
    #[description = "Your tournament nickname"] nickname: String,
) -> Result<(), Error> {
    let (guild_id, actor) = invoking_actor(ctx).await?;
    match ctx
        .data()
        .orchestrator
        .set_nickname(&guild_id, &actor, &nickname)
        .await
    {
        Ok(saved) => {
            info!("User {} in guild {} is now '{}'", actor.user_id, guild_id, saved);
            reply(ctx, format!("✅ Nickname set to: {}", saved)).await?;
            ctx.data().board.refresh(&guild_id).await;
        }
        Err(e) => reply_error(ctx, e).await?,
    }
    Ok(())
}

fn withdraw_all_outcome(result: &Result<Vec<String>, BotError>) -> String {
    match result {
        Ok(_) => "✅ All your signups have been withdrawn.".to_string(),
        Err(e) => e.user_message(),
    }
}
