use poise::serenity_prelude as serenity;
use tracing::info;

use crate::{Context, Error};

/// Check if the bot is running
#[poise::command(slash_command)]
pub async fn ping(ctx: Context<'_>) -> Result<(), Error> {
    info!("Ping command called by {}", ctx.author().name);
    ctx.send(poise::CreateReply::default()
        .content("Pong! Bot is working!")
        .ephemeral(true))
        .await?;
    Ok(())
}

/// Show help information
#[poise::command(slash_command)]
pub async fn help(ctx: Context<'_>) -> Result<(), Error> {
    let embed = serenity::CreateEmbed::new()
        .title("Death Roll Commands")
        .description("Signups open once a tournament is scheduled.")
        .field(
            "Players",
            "/signup, /signup_friends, /withdraw, /withdraw_all, /players, /nickname",
            false,
        )
        .field(
            "Staff",
            "/schedule, /end_bracket, /kill_tournament, /set_timezone, /signup_channel, /remove_players",
            false,
        )
        .field("Owners", "/create_bracket, /start_bracket, /set_roles", false)
        .color(0xc0392b);

    ctx.send(poise::CreateReply::default().embed(embed).ephemeral(true)).await?;
    Ok(())
}
