use std::path::Path;

use anyhow::Context as _;
use herald::{Bot, Configuration, lua::ScriptHost};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging("info");

    let config = Configuration::load()?;
    let mut bot = Bot::new(config.bot_options()?).context("Error creating bot")?;
    bot.set_max_listeners(config.discord.max_listeners);

    let commands_dir = &config.discord.commands_dir;
    if commands_dir.is_dir() {
        let report = bot.handler(commands_dir, config.discord.show_load)?;
        if report.failed() > 0 {
            tracing::warn!("{} handler(s) failed to load", report.failed());
        }
    } else {
        tracing::warn!("no commands directory at {}", commands_dir.display());
    }
    bot.register_commands();
    bot.register_interactions();
    bind_custom_events(&mut bot, &config.discord.events_dir)?;

    if let Some(presence) = &config.presence {
        bot.presence(
            presence.interval(),
            presence.activities.clone(),
            Some(presence.status),
        )?;
    }

    bot.ready(|_ctx, ready| async move {
        tracing::info!("{} is good to go!", ready.user.name);
        Ok(())
    });

    let kill_switch = bot.kill_switch();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            kill_switch.kill().await;
        }
    });

    bot.start().await?;
    tracing::info!("Shutting down...");
    Ok(())
}

/// Logs every custom event described in `events_dir`.
fn bind_custom_events(bot: &mut Bot, events_dir: &Path) -> anyhow::Result<()> {
    let Ok(entries) = std::fs::read_dir(events_dir) else {
        return Ok(());
    };
    for entry in entries {
        let path = entry?.path();
        let Some(name) = path.file_stem().and_then(|stem| stem.to_str()) else {
            continue;
        };
        if !ScriptHost::is_script(&path) {
            continue;
        }

        let event = name.to_string();
        let source = bot.event(name, move |args| {
            let event = event.clone();
            async move {
                tracing::info!(event = %event, "{:?} fired", args.event.kind());
                Ok(())
            }
        })?;
        tracing::debug!("bound {source:?}");
    }
    Ok(())
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
