//! Bankbot - Telegram bot that files bank notifications into Google Sheets
//!
//! Users forward transaction messages; each is matched against their own
//! regex patterns and appended as a row to their spreadsheet. Settings are
//! collected through multi-turn chat commands driven by the dialog engine.

mod bot;
mod config;
mod db;
mod dialog;
mod extract;
mod sheets;
mod telegram;

use bot::{bot_commands, Bot, DatabaseUsers, Services, UpdateQueues};
use config::BotConfig;
use db::Database;
use sheets::GoogleClient;
use std::sync::Arc;
use std::time::Duration;
use telegram::TelegramClient;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How often expired dialogues are swept
const REAP_INTERVAL: Duration = Duration::from_secs(5);

/// Pause after a failed poll
const POLL_BACKOFF: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = BotConfig::from_env()?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_filter().into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    // Ensure database directory exists
    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    tracing::info!(path = %config.db_path.display(), "Opening database");
    let db = Database::open(&config.db_path)?;

    let google = Arc::new(GoogleClient::new(&config.credentials)?);
    let telegram = Arc::new(TelegramClient::new(config.token.clone()));

    let services = Services {
        messenger: telegram.clone(),
        users: Arc::new(DatabaseUsers::new(db)),
        sheets: google,
    };
    let bot = Arc::new(Bot::new(services, config.dialog_timeout));

    if let Err(e) = telegram.set_my_commands(&bot_commands()).await {
        tracing::warn!(error = %e, "Failed to register bot commands");
    }

    let reaper = {
        let bot = Arc::clone(&bot);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(REAP_INTERVAL);
            loop {
                interval.tick().await;
                bot.reap_expired().await;
            }
        })
    };

    let queues = UpdateQueues::new(Arc::clone(&bot));
    let mut offset: Option<i64> = None;
    tracing::info!(
        dialog_timeout_secs = config.dialog_timeout.as_secs(),
        poll_timeout_secs = config.poll_timeout.as_secs(),
        "Bankbot polling for updates"
    );

    loop {
        let updates = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutdown requested");
                break;
            }
            result = telegram.get_updates(offset, config.poll_timeout) => result,
        };

        let updates = match updates {
            Ok(updates) => updates,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to fetch updates");
                tokio::time::sleep(POLL_BACKOFF).await;
                continue;
            }
        };

        for update in updates {
            offset = Some(update.update_id + 1);
            queues.enqueue(update).await;
        }
    }

    bot.shutdown();
    reaper.abort();
    Ok(())
}
