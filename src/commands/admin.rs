use poise::serenity_prelude as serenity;
use tracing::{error, info, warn};

use super::{invoking_actor, reply, reply_error, truncate, OPTION_TEXT_LIMIT};
use crate::managers::selection_cache::SELECTION_TTL;
use crate::managers::tournament_orchestrator::RemovalPage;
use crate::managers::{Actor, EndOutcome, ScheduleRequest};
use crate::{Context, Error};

const REMOVE_SELECT: &str = "remove_select";
const REMOVE_PREV: &str = "remove_prev";
const REMOVE_NEXT: &str = "remove_next";

#[derive(Debug, poise::ChoiceParameter)]
pub enum Meridiem {
    AM,
    PM,
}

/// Schedule a new tournament in the server's time zone
#[poise::command(slash_command, guild_only)]
pub async fn schedule(
    ctx: Context<'_>,
    #[description = "Tournament name"] name: String,
    #[description = "Date as MM-DD-YY"] date: String,
    #[description = "Time as HH:MM (12-hour clock)"] time: String,
    #[description = "AM or PM"] meridiem: Meridiem,
) -> Result<(), Error> {
    let (guild_id, actor) = invoking_actor(ctx).await?;
    ctx.defer_ephemeral().await?;

    let request = ScheduleRequest {
        name,
        date,
        time,
        meridiem: format!("{:?}", meridiem),
    };
    match ctx
        .data()
        .orchestrator
        .schedule(&guild_id, &actor, &request)
        .await
    {
        Ok(view) => {
            reply(
                ctx,
                format!(
                    "✅ Tournament **{}** scheduled for {}\n🗑️ Previous signups have been cleared for the new tournament.",
                    view.name, view.time
                ),
            )
            .await?;
            ctx.data().board.refresh(&guild_id).await;
        }
        Err(e) => reply_error(ctx, e).await?,
    }
    Ok(())
}

/// Push the current signups to Challonge as a new bracket
#[poise::command(slash_command, guild_only)]
pub async fn create_bracket(ctx: Context<'_>) -> Result<(), Error> {
    let (guild_id, actor) = invoking_actor(ctx).await?;
    ctx.defer_ephemeral().await?;

    match ctx.data().orchestrator.create_bracket(&guild_id, &actor).await {
        Ok(created) => {
            reply(
                ctx,
                format!(
                    "🏆 Bracket created on Challonge for **{}** with {} players.\n{}",
                    created.name, created.player_count, created.url
                ),
            )
            .await?;
            let announcement = format!("🏆 Bracket for **{}** is live!\n{}", created.name, created.url);
            if let Err(e) = ctx.data().board.announce(&guild_id, &announcement).await {
                warn!("Could not announce bracket in guild {}: {}", guild_id, e);
            }
            ctx.data().board.refresh(&guild_id).await;
        }
        Err(e) => reply_error(ctx, e).await?,
    }
    Ok(())
}

/// Start the Challonge bracket and close signups
#[poise::command(slash_command, guild_only)]
pub async fn start_bracket(ctx: Context<'_>) -> Result<(), Error> {
    let (guild_id, actor) = invoking_actor(ctx).await?;
    ctx.defer_ephemeral().await?;

    match ctx.data().orchestrator.start_bracket(&guild_id, &actor).await {
        Ok(_) => {
            reply(ctx, "🏆 Tournament started on Challonge!").await?;
            ctx.data().board.refresh(&guild_id).await;
        }
        Err(e) => reply_error(ctx, e).await?,
    }
    Ok(())
}

/// Finalize the bracket on Challonge and reset the tournament
#[poise::command(slash_command, guild_only)]
pub async fn end_bracket(ctx: Context<'_>) -> Result<(), Error> {
    let (guild_id, actor) = invoking_actor(ctx).await?;
    ctx.defer_ephemeral().await?;

    match ctx.data().orchestrator.end_bracket(&guild_id, &actor).await {
        Ok(outcome) => {
            reply(ctx, end_message(&outcome)).await?;
            ctx.data().board.refresh(&guild_id).await;
        }
        Err(e) => reply_error(ctx, e).await?,
    }
    Ok(())
}

fn end_message(outcome: &EndOutcome) -> String {
    match outcome {
        EndOutcome::Finalized => "✅ Bracket finalized on Challonge and cleared locally.".to_string(),
        EndOutcome::AlreadyComplete => {
            "✅ Bracket is already complete. Cleared saved bracket and reset status.".to_string()
        }
        EndOutcome::LocalFallback { reason } => format!(
            "⚠️ Could not finalize on Challonge ({}). Cleared saved bracket locally so you can create a new one.",
            reason
        ),
        EndOutcome::NoRemoteBracket => {
            "✅ No Challonge bracket was saved. Tournament status has been reset.".to_string()
        }
    }
}

/// Wipe the current tournament without contacting Challonge
#[poise::command(slash_command, guild_only)]
pub async fn kill_tournament(ctx: Context<'_>) -> Result<(), Error> {
    let (guild_id, actor) = invoking_actor(ctx).await?;
    match ctx.data().orchestrator.kill(&guild_id, &actor).await {
        Ok(()) => {
            reply(ctx, "💀 Tournament killed. Signups and bracket data have been cleared.").await?;
            ctx.data().board.refresh(&guild_id).await;
        }
        Err(e) => reply_error(ctx, e).await?,
    }
    Ok(())
}

/// Set the time zone used when scheduling tournaments
#[poise::command(slash_command, guild_only)]
pub async fn set_timezone(
    ctx: Context<'_>,
    #[description = "IANA time zone, e.g. America/New_York or Europe/London"] timezone: String,
) -> Result<(), Error> {
    let (guild_id, actor) = invoking_actor(ctx).await?;
    match ctx
        .data()
        .orchestrator
        .set_default_timezone(&guild_id, &actor, &timezone)
        .await
    {
        Ok(tz) => reply(ctx, format!("✅ Default tournament time zone set to **{}**", tz)).await?,
        Err(e) => reply_error(ctx, e).await?,
    }
    Ok(())
}

/// Choose where the signup board lives and post it there
#[poise::command(slash_command, guild_only)]
pub async fn signup_channel(
    ctx: Context<'_>,
    #[description = "Channel for the signup board (defaults to this one)"]
    #[channel_types("Text")]
    channel: Option<serenity::GuildChannel>,
) -> Result<(), Error> {
    let (guild_id, actor) = invoking_actor(ctx).await?;
    let channel_id = channel.map(|c| c.id).unwrap_or_else(|| ctx.channel_id());

    if let Err(e) = ctx
        .data()
        .orchestrator
        .set_signup_channel(&guild_id, &actor, &channel_id.to_string())
        .await
    {
        return reply_error(ctx, e).await;
    }
    match ctx.data().board.repost(&guild_id).await {
        Ok(()) => reply(ctx, format!("✅ Signup board posted in <#{}>", channel_id)).await,
        Err(e) => reply_error(ctx, e).await,
    }
}

/// Choose which roles count as tournament Owners and Staff
#[poise::command(slash_command, guild_only)]
pub async fn set_roles(
    ctx: Context<'_>,
    #[description = "Role allowed to create and start brackets"] owner: Option<serenity::Role>,
    #[description = "Role allowed to schedule, end and moderate"] staff: Option<serenity::Role>,
) -> Result<(), Error> {
    let (guild_id, actor) = invoking_actor(ctx).await?;
    let owner_id = owner.as_ref().map(|r| r.id.to_string());
    let staff_id = staff.as_ref().map(|r| r.id.to_string());

    match ctx
        .data()
        .orchestrator
        .set_roles(&guild_id, &actor, owner_id, staff_id)
        .await
    {
        Ok(()) => {
            let mut lines = Vec::new();
            if let Some(role) = &owner {
                lines.push(format!("Owner role: **{}**", role.name));
            }
            if let Some(role) = &staff {
                lines.push(format!("Staff role: **{}**", role.name));
            }
            reply(ctx, format!("✅ Roles updated.\n{}", lines.join("\n"))).await?;
        }
        Err(e) => reply_error(ctx, e).await?,
    }
    Ok(())
}

/// Remove players from the signup list
#[poise::command(slash_command, guild_only)]
pub async fn remove_players(ctx: Context<'_>) -> Result<(), Error> {
    let (guild_id, actor) = invoking_actor(ctx).await?;
    let orchestrator = &ctx.data().orchestrator;

    let mut page = match orchestrator.open_removal_page(&guild_id, &actor, 0).await {
        Ok(page) => page,
        Err(e) => return reply_error(ctx, e).await,
    };

    let handle = ctx
        .send(
            poise::CreateReply::default()
                .content(page_header(&page))
                .components(removal_rows(&page))
                .ephemeral(true),
        )
        .await?;
    let message = handle.message().await?;

    while let Some(interaction) = message
        .await_component_interaction(ctx.serenity_context().shard.clone())
        .author_id(ctx.author().id)
        .timeout(SELECTION_TTL)
        .await
    {
        let custom_id = interaction.data.custom_id.as_str();
        let (content, rows, done) = match (&interaction.data.kind, custom_id) {
            (serenity::ComponentInteractionDataKind::StringSelect { values }, REMOVE_SELECT) => {
                let indices: Vec<usize> = values.iter().filter_map(|v| v.parse().ok()).collect();
                let text = match orchestrator
                    .remove_selected(&guild_id, &actor, page.page, page.token, &indices)
                    .await
                {
                    Ok(removed) if removed.is_empty() => {
                        "⚠️ Those players were already gone.".to_string()
                    }
                    Ok(removed) => {
                        let names: Vec<&str> = removed.iter().map(|e| e.name.as_str()).collect();
                        format!("🗑️ Removed: {}", names.join(", "))
                    }
                    Err(e) => e.user_message(),
                };
                (text, Vec::new(), true)
            }
            (_, REMOVE_PREV) | (_, REMOVE_NEXT) => {
                let target = if custom_id == REMOVE_NEXT {
                    page.page + 1
                } else {
                    page.page.saturating_sub(1)
                };
                match turn_page(orchestrator, &guild_id, &actor, target).await {
                    Ok(next) => {
                        page = next;
                        (page_header(&page), removal_rows(&page), false)
                    }
                    Err(text) => (text, Vec::new(), true),
                }
            }
            _ => continue,
        };

        if let Err(e) = interaction
            .create_response(
                ctx.http(),
                serenity::CreateInteractionResponse::UpdateMessage(
                    serenity::CreateInteractionResponseMessage::new()
                        .content(content)
                        .components(rows),
                ),
            )
            .await
        {
            error!("Failed to update removal menu: {}", e);
        }
        if done {
            info!("Removal menu closed by {} in guild {}", actor.user_id, guild_id);
            ctx.data().board.refresh(&guild_id).await;
            break;
        }
    }
    Ok(())
}

async fn turn_page(
    orchestrator: &crate::managers::TournamentOrchestrator,
    guild_id: &str,
    actor: &Actor,
    page: usize,
) -> Result<RemovalPage, String> {
    orchestrator
        .open_removal_page(guild_id, actor, page)
        .await
        .map_err(|e| e.user_message())
}

fn page_header(page: &RemovalPage) -> String {
    format!(
        "Select players to remove (page {}/{}):",
        page.page + 1,
        page.total_pages
    )
}

fn removal_rows(page: &RemovalPage) -> Vec<serenity::CreateActionRow> {
    let options: Vec<serenity::CreateSelectMenuOption> = page
        .options
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            serenity::CreateSelectMenuOption::new(truncate(&entry.name, OPTION_TEXT_LIMIT), i.to_string())
                .description(format!("Signed up by user {}", entry.user_id))
        })
        .collect();
    let menu = serenity::CreateSelectMenu::new(
        REMOVE_SELECT,
        serenity::CreateSelectMenuKind::String { options },
    )
    .placeholder("Players to remove")
    .min_values(1)
    .max_values(page.options.len() as u8);

    let mut rows = vec![serenity::CreateActionRow::SelectMenu(menu)];
    if page.total_pages > 1 {
        rows.push(serenity::CreateActionRow::Buttons(vec![
            serenity::CreateButton::new(REMOVE_PREV)
                .label("◀ Previous")
                .style(serenity::ButtonStyle::Secondary)
                .disabled(page.page == 0),
            serenity::CreateButton::new(REMOVE_NEXT)
                .label("Next ▶")
                .style(serenity::ButtonStyle::Secondary)
                .disabled(page.page + 1 >= page.total_pages),
        ]));
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_end_messages_mention_fallback_reason() {
        let text = end_message(&EndOutcome::LocalFallback {
            reason: "Matches are not complete".to_string(),
        });
        assert!(text.contains("(Matches are not complete)"));
        assert!(end_message(&EndOutcome::Finalized).contains("finalized"));
    }

    #[test]
    fn test_meridiem_renders_as_expected_by_parser() {
        assert_eq!(format!("{:?}", Meridiem::AM), "AM");
        assert_eq!(format!("{:?}", Meridiem::PM), "PM");
    }

    #[test]
    fn test_page_header_is_one_based() {
        let page = RemovalPage {
            token: uuid::Uuid::new_v4(),
            page: 1,
            total_pages: 3,
            options: vec![],
        };
        assert_eq!(page_header(&page), "Select players to remove (page 2/3):");
    }
}
