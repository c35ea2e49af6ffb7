use anyhow::Result;
use clap::Parser;
use dotenv::dotenv;
use poise::serenity_prelude as serenity;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Discord bot running Death Roll tournament signups and brackets
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Register commands per-guild instead of globally (faster for testing)
    #[arg(long)]
    guild_commands: bool,

    /// Specific guild ID to register commands to (overrides GUILD_ID)
    #[arg(long)]
    guild_id: Option<u64>,

    /// Directory holding the guild database (overrides STATE_PATH)
    #[arg(long)]
    state_path: Option<PathBuf>,
}

mod bracket;
mod commands;
mod config;
mod error;
mod events;
mod logging;
mod managers;
mod models;
mod state;

use bracket::{ChallongeClient, SharedBracketProvider};
use commands::{
    create_bracket, end_bracket, help, kill_tournament, nickname, ping, players, remove_players,
    schedule, set_roles, set_timezone, signup, signup_channel, signup_friends, start_bracket,
    withdraw, withdraw_all,
};
use config::BotConfig;
use events::{handle_component, handle_guild_create, SignupBoard};
use managers::{
    create_shared_roster_manager, create_shared_tournament_orchestrator, BoardSink, GuildDefaults,
    SharedTournamentOrchestrator, TournamentOrchestrator,
};
use state::{create_shared_guild_store, GuildStore};

type Error = Box<dyn std::error::Error + Send + Sync>;
type Context<'a> = poise::Context<'a, Data, Error>;

/// Shared application state
pub struct Data {
    pub config: BotConfig,
    pub orchestrator: SharedTournamentOrchestrator,
    pub board: Arc<SignupBoard>,
}

async fn event_handler(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    match event {
        serenity::FullEvent::GuildCreate { guild, .. } => {
            if let Err(e) = handle_guild_create(ctx, guild, data).await {
                error!("Failed to handle guild create: {}", e);
            }
        }
        serenity::FullEvent::InteractionCreate { interaction } => {
            if let Some(component) = interaction.as_message_component() {
                if let Err(e) = handle_component(ctx, component, data).await {
                    error!("Failed to handle component interaction: {}", e);
                }
            }
        }
        _ => {}
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let args = Args::parse();
    logging::init();

    let mut config = BotConfig::from_env()?;
    if let Some(path) = args.state_path {
        config.state_path = path;
    }
    if args.guild_id.is_some() {
        config.guild_id = args.guild_id;
    }

    if let Err(e) = tokio::fs::create_dir_all(&config.state_path).await {
        warn!(
            "Could not create state directory {}: {}",
            config.state_path.display(),
            e
        );
    }

    info!("Loading guild database from {}...", config.db_file().display());
    let store = create_shared_guild_store(
        GuildStore::load(config.db_file(), &config.legacy_guild_id()).await,
    );
    let provider: SharedBracketProvider = Arc::new(ChallongeClient::new(
        &config.challonge_api_key,
        &config.challonge_base_url,
        config.http_timeout_secs,
    )?);
    let roster = create_shared_roster_manager(store.clone());
    let orchestrator = create_shared_tournament_orchestrator(TournamentOrchestrator::new(
        store,
        roster,
        provider,
        GuildDefaults {
            owner_role_id: config.default_owner_role_id.clone(),
            staff_role_id: config.default_staff_role_id.clone(),
            signup_channel_id: config.default_channel_id.map(|id| id.to_string()),
            home_guild_id: Some(config.legacy_guild_id()),
        },
    ));

    let guild_commands = args.guild_commands || config.guild_id.is_some();
    if guild_commands {
        info!("Registering commands per-guild (faster for testing)");
    } else {
        info!("Registering commands globally by default (takes up to 1 hour to propagate)");
    }

    let token = config.discord_token.clone();
    let refresh_period = Duration::from_secs(config.live_refresh_secs.max(1));

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: vec![
                ping(),
                help(),
                signup(),
                signup_friends(),
                withdraw(),
                withdraw_all(),
                players(),
                nickname(),
                schedule(),
                create_bracket(),
                start_bracket(),
                end_bracket(),
                kill_tournament(),
                set_timezone(),
                signup_channel(),
                set_roles(),
                remove_players(),
            ],
            event_handler: |ctx, event, framework, data| {
                Box::pin(event_handler(ctx, event, framework, data))
            },
            pre_command: |ctx| {
                Box::pin(async move {
                    info!(
                        "Command '{}' invoked by {} (ID: {}) in {}",
                        ctx.command().qualified_name,
                        ctx.author().name,
                        ctx.author().id,
                        ctx.guild_id().map(|g| g.to_string()).unwrap_or_else(|| "DM".to_string())
                    );
                })
            },
            post_command: |ctx| {
                Box::pin(async move {
                    info!(
                        "Command '{}' completed for {}",
                        ctx.command().qualified_name,
                        ctx.author().name
                    );
                })
            },
            on_error: |error| {
                Box::pin(async move {
                    match error {
                        poise::FrameworkError::Command { error, ctx, .. } => {
                            error!("Error in command '{}': {}", ctx.command().qualified_name, error);
                            let _ = ctx
                                .send(
                                    poise::CreateReply::default()
                                        .content(format!("❌ {}", error))
                                        .ephemeral(true),
                                )
                                .await;
                        }
                        poise::FrameworkError::ArgumentParse { error, input, ctx, .. } => {
                            error!("Argument parse error in '{}': {} (input: {:?})", ctx.command().qualified_name, error, input);
                        }
                        poise::FrameworkError::MissingBotPermissions { missing_permissions, ctx, .. } => {
                            error!("Bot missing permissions for '{}': {:?}", ctx.command().qualified_name, missing_permissions);
                            let _ = ctx.say(format!("Bot is missing permissions: {:?}", missing_permissions)).await;
                        }
                        poise::FrameworkError::GuildOnly { ctx, .. } => {
                            error!("Command '{}' is guild-only, used in DM by {}", ctx.command().qualified_name, ctx.author().name);
                        }
                        other => {
                            error!("Other framework error: {}", other);
                        }
                    }
                })
            },
            ..Default::default()
        })
        .setup(move |ctx, ready, framework| {
            Box::pin(async move {
                info!("Bot logged in as: {}", ready.user.name);

                let guilds_to_register: Vec<serenity::GuildId> = match config.guild_id {
                    Some(gid) => vec![serenity::GuildId::new(gid)],
                    None => ready.guilds.iter().map(|g| g.id).collect(),
                };

                if guild_commands {
                    for guild_id in &guilds_to_register {
                        info!("Registering commands to guild: {}", guild_id);
                        if let Err(e) = poise::builtins::register_in_guild(
                            ctx,
                            &framework.options().commands,
                            *guild_id,
                        ).await {
                            error!("Failed to register commands for guild {}: {}", guild_id, e);
                        } else {
                            info!("Successfully registered {} commands for guild {}",
                                  framework.options().commands.len(), guild_id);
                        }
                    }
                } else {
                    info!("Registering commands globally...");
                    if let Err(e) = poise::builtins::register_globally(
                        ctx,
                        &framework.options().commands,
                    ).await {
                        error!("Failed to register commands globally: {}", e);
                    } else {
                        info!("Successfully registered {} commands globally (may take up to 1 hour to propagate)",
                              framework.options().commands.len());
                    }
                }

                let board = Arc::new(SignupBoard::new(ctx.http.clone(), orchestrator.clone()));
                let sink: Arc<dyn BoardSink> = board.clone();
                info!("Refreshing live matches every {:?}", refresh_period);
                tokio::spawn(orchestrator.clone().run_live_refresh(sink, refresh_period));

                Ok(Data {
                    config,
                    orchestrator,
                    board,
                })
            })
        })
        .build();

    // Slash commands and buttons only; no privileged intents needed
    let intents = serenity::GatewayIntents::GUILDS;

    let mut client = serenity::ClientBuilder::new(token, intents)
        .framework(framework)
        .await?;

    info!("Starting bot...");
    client.start().await?;
    warn!("Bot ended.");
    Ok(())
}
