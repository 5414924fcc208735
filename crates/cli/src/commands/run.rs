//! `m1nd run`: Start the bot on Telegram or in the terminal.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, bail};
use m1nd_bot::{AdminRegistry, Dispatcher};
use m1nd_channels::{CliChannel, DeliveryAdapter, TelegramChannel};
use m1nd_core::channel::Channel;
use tracing::{info, warn};

use crate::runtime::Runtime;

/// `terminal_user` selects the terminal channel and names its owner.
pub async fn run(config_path: &Path, terminal_user: Option<&str>) -> anyhow::Result<()> {
    let runtime = Runtime::load(config_path)?;
    let mut admins: Vec<String> = runtime
        .config
        .telegram
        .as_ref()
        .map(|t| t.admins.clone())
        .unwrap_or_default();

    let channel: Arc<dyn Channel> = if let Some(user) = terminal_user {
        // The terminal user owns the bot.
        admins.push(user.to_string());
        Arc::new(CliChannel::new(user))
    } else {
        let Some(telegram) = runtime.config.telegram.clone() else {
            bail!("no [telegram] section configured; set TELEGRAM_BOT_TOKEN or use `m1nd run --cli`");
        };
        if telegram.bot_token.is_empty() {
            bail!("telegram.bot_token is empty; set TELEGRAM_BOT_TOKEN");
        }
        Arc::new(TelegramChannel::new(telegram))
    };

    let delivery = DeliveryAdapter::from_config(channel.clone(), &runtime.config.delivery)
        .context("invalid [delivery] settings")?;
    let admins = AdminRegistry::seeded(&admins);
    if admins.is_empty().await {
        warn!("No admins configured; admin commands are unavailable");
    }

    let dispatcher = Arc::new(
        Dispatcher::new(runtime.orchestrator.clone(), delivery, runtime.priority()).with_admins(admins),
    );

    let inbound = channel.start().await.context("failed to start channel")?;

    if let Some(user) = terminal_user {
        println!("🧠 m1nd interactive mode as {user} (type 'exit' to quit)");
        println!("   Providers: {}", runtime.config.provider_priority.join(" → "));
        println!();
    }
    info!(channel = %channel.name(), "m1nd is running");

    let worker = tokio::spawn(dispatcher.run(inbound));
    tokio::select! {
        result = worker => {
            if let Err(e) = result {
                warn!(error = %e, "Dispatcher task failed");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown requested");
        }
    }

    channel.stop().await.context("failed to stop channel")?;
    info!("m1nd stopped");
    Ok(())
}
