mod api;
mod collaborators;

use std::env;
use std::sync::Arc;
use std::time::Duration;

use poise::serenity_prelude as serenity;
use tracing::{debug, error, info, warn};
use tracing_subscriber::Layer;
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use rustls::crypto::ring::default_provider;

use collaborators::{DiscordGateway, ProxyRpc};
use warden_core::config::{
    AchievementCatalog, RankNames, RoleMap, VerificationConfig, WardenSettings, XpLimitsConfig,
    XpModifierTable,
};
use warden_core::{Data, Error, Warden};
use warden_database::{CacheService, Database, MIGRATOR};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let fmt_layer = tracing_subscriber::fmt::layer().with_filter(filter_fn(|metadata| {
        let target = metadata.target();

        let within_info_level = *metadata.level() <= tracing::Level::INFO;
        if !within_info_level {
            return false;
        }

        !(target.starts_with("serenity::gateway::bridge::shard_manager")
            || target.starts_with("serenity::gateway::bridge::shard_runner"))
    }));

    tracing_subscriber::registry().with(fmt_layer).init();

    default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls ring provider"))?;

    // Load the .env file
    dotenvy::dotenv().ok();

    let token = env::var("DISCORD_TOKEN")?;
    let database_url = env::var("DATABASE_URL")?;
    let guild_id = env::var("DISCORD_GUILD_ID")?.parse::<u64>()?;

    let redis_enabled = env_bool("REDIS_ENABLED", false);
    let redis_key_prefix =
        env::var("REDIS_KEY_PREFIX").unwrap_or_else(|_| "warden:prod".to_string());

    let cache = if redis_enabled {
        match env::var("REDIS_URL") {
            Ok(redis_url) => match CacheService::redis(&redis_url, redis_key_prefix.clone()) {
                Ok(cache) => {
                    info!(key_prefix = %redis_key_prefix, "Redis cache enabled.");
                    cache
                }
                Err(err) => {
                    warn!(?err, key_prefix = %redis_key_prefix, "Failed to initialize Redis cache; continuing with DB-only mode.");
                    CacheService::disabled(redis_key_prefix.clone())
                }
            },
            Err(_) => {
                warn!(key_prefix = %redis_key_prefix, "REDIS_ENABLED=true but REDIS_URL is missing; continuing with DB-only mode.");
                CacheService::disabled(redis_key_prefix.clone())
            }
        }
    } else {
        info!("Redis cache disabled (set REDIS_ENABLED=true to enable).");
        CacheService::disabled(redis_key_prefix.clone())
    };

    if cache.is_redis_enabled() {
        if let Err(err) = cache.ping().await {
            warn!(
                ?err,
                "Redis cache ping failed; cache operations will continue with fallback behavior."
            );
        } else {
            info!("Redis cache health check passed.");
        }
    }

    let db = Database::connect(&database_url, env_u64("DATABASE_MAX_CONNECTIONS", 5) as u32, cache)
        .await?;
    info!("PostgreSQL connection established.");

    let auto_run_migrations = env_bool("AUTO_RUN_MIGRATIONS", true);
    if auto_run_migrations {
        MIGRATOR.run(db.pool()).await?;
        info!("Database migrations applied.");
    } else {
        info!("Auto migrations disabled (set AUTO_RUN_MIGRATIONS=true to run at startup).");
    }

    let settings = settings_from_env()?;
    info!(
        code_ttl_seconds = settings.verification.code_ttl_seconds,
        max_attempts = settings.verification.max_attempts,
        xp_cooldown_seconds = settings.xp_limits.cooldown_seconds,
        "Verification and XP limits configured."
    );

    let proxy = Arc::new(ProxyRpc::new(
        env::var("PROXY_RPC_URL").unwrap_or_else(|_| "http://127.0.0.1:8600".to_owned()),
    ));
    let api_bind_addr = env::var("API_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8650".to_owned());

    let intents = serenity::GatewayIntents::GUILDS
        | serenity::GatewayIntents::GUILD_MESSAGES
        | serenity::GatewayIntents::MESSAGE_CONTENT;

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: warden_commands::commands(),
            on_error: |error| Box::pin(on_error(error)),
            prefix_options: poise::PrefixFrameworkOptions {
                prefix: Some(warden_utils::COMMAND_PREFIX.to_string()),
                mention_as_prefix: false,
                ..Default::default()
            },
            ..Default::default()
        })
        .setup(move |ctx, _ready, framework| {
            let db = db.clone();
            let proxy = proxy.clone();
            Box::pin(async move {
                info!("Warden is standing guard.");

                poise::builtins::register_in_guild(
                    ctx,
                    &framework.options().commands,
                    serenity::GuildId::new(guild_id),
                )
                .await?;

                let messenger = Arc::new(DiscordGateway::new(ctx.http.clone(), guild_id));
                let warden = Arc::new(Warden::new(
                    settings,
                    Arc::new(db),
                    proxy.clone(),
                    proxy.clone(),
                    proxy,
                    messenger,
                ));

                if let Err(err) = warden.reload_rank_definitions().await {
                    warn!(?err, "rank definition load failed; serving built-in defaults");
                }

                let api_warden = warden.clone();
                tokio::spawn(async move {
                    if let Err(err) = api::serve(api_bind_addr, api_warden).await {
                        error!(?err, "proxy API server exited");
                    }
                });
                spawn_session_sweep(warden.clone());

                Ok(Data { warden })
            })
        })
        .build();

    info!("Warden is connecting...");

    let mut client = serenity::ClientBuilder::new(token, intents)
        .framework(framework)
        .await?;

    client.start().await?;
    Ok(())
}

/// Periodically reclaim memory from expired and used sessions. Expiry
/// itself is enforced lazily on access; this loop only keeps the maps
/// small.
fn spawn_session_sweep(warden: Arc<Warden>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            let removed = warden.prune_sessions().await;
            if removed > 0 {
                debug!(removed, "pruned dead verification sessions");
            }
        }
    });
}

fn settings_from_env() -> anyhow::Result<WardenSettings> {
    let verification = VerificationConfig {
        code_ttl_seconds: env_u64("VERIFY_CODE_TTL_SECONDS", 600),
        max_attempts: env_u64("VERIFY_MAX_ATTEMPTS", 4) as u32,
        default_allowed_server: env::var("VERIFY_ALLOWED_SERVER")
            .unwrap_or_else(|_| "hub".to_owned()),
        completion_timeout_seconds: env_u64("VERIFY_COMPLETION_TIMEOUT_SECONDS", 10),
    };

    let xp_limits = XpLimitsConfig {
        cooldown_seconds: env_u64("XP_COOLDOWN_SECONDS", 5),
        max_per_minute: env_u64("XP_MAX_PER_MINUTE", 10) as i64,
        max_per_hour: env_u64("XP_MAX_PER_HOUR", 100) as i64,
        max_per_day: env_u64("XP_MAX_PER_DAY", 500) as i64,
    };

    let catalog = match env::var("ACHIEVEMENT_CATALOG_PATH") {
        Ok(path) => match std::fs::read_to_string(&path) {
            Ok(raw) => {
                let catalog = AchievementCatalog::from_json_str(&raw)?;
                info!(entries = catalog.len(), path = %path, "Achievement catalog loaded.");
                catalog
            }
            Err(err) => {
                warn!(?err, path = %path, "Could not read achievement catalog; continuing without one.");
                AchievementCatalog::default()
            }
        },
        Err(_) => AchievementCatalog::default(),
    };

    let roles = match env::var("ROLE_MAP_PATH") {
        Ok(path) => match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str::<RoleMap>(&raw)
                .map_err(|e| anyhow::anyhow!("malformed role map at {path}: {e}"))?,
            Err(err) => {
                warn!(?err, path = %path, "Could not read role map; Discord role sync disabled.");
                RoleMap::default()
            }
        },
        Err(_) => RoleMap::default(),
    };

    Ok(WardenSettings {
        verification,
        xp_limits,
        modifiers: XpModifierTable::default(),
        catalog,
        names: RankNames::default(),
        roles,
        gate_timeout_millis: env_u64("GATE_TIMEOUT_MILLIS", 3_000),
        announce_channel: env::var("ANNOUNCE_CHANNEL_ID")
            .ok()
            .and_then(|raw| raw.trim().parse().ok()),
    })
}

fn env_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(value) => matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        Err(_) => default,
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    match env::var(key) {
        Ok(value) => value.trim().parse::<u64>().unwrap_or(default),
        Err(_) => default,
    }
}

async fn on_error(error: poise::FrameworkError<'_, Data, Error>) {
    match error {
        poise::FrameworkError::Command { error, ctx, .. } => {
            error!(?error, "command error");

            let embed = serenity::CreateEmbed::new()
                .title("Command Error")
                .description("Something went wrong while running this command.")
                .color(warden_utils::embed::DEFAULT_EMBED_COLOR);

            let _ = ctx
                .send(poise::CreateReply::default().ephemeral(true).embed(embed))
                .await;
        }
        poise::FrameworkError::ArgumentParse { ctx, input, .. } => {
            let usage = format!("Usage: `!{}`", ctx.command().qualified_name);
            let description = if let Some(input) = input {
                format!("Invalid argument: `{}`\n{}", input, usage)
            } else {
                format!("Missing required argument.\n{}", usage)
            };

            let _ = ctx.say(description).await;
        }
        poise::FrameworkError::UnknownCommand { .. } => {
            debug!("unknown command invocation");
        }
        other => {
            error!(?other, "framework error");
        }
    }
}
