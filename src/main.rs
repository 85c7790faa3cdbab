mod config;
mod platform;
mod record;
mod relay;
mod sheets;
mod sink;
#[cfg(test)]
mod testing;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use teloxide::Bot;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Config, SheetsConfig};
use crate::platform::telegram::{self, Greeting, TelegramNotifier};
use crate::relay::{IntakeHandler, RelayQueue, RelaySettings};
use crate::sheets::auth::{ServiceAccountKey, TokenProvider};
use crate::sheets::{GoogleEndpoints, SheetsClient};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,diary_relay=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!("Configuration loaded successfully");
    info!("  Sheets: {:?}", config.sheets);
    info!("  Relay: {:?}", config.relay);

    let sink_timeout = Duration::from_secs(config.relay.sink_timeout_secs);

    let bot = Bot::new(&config.telegram.bot_token);
    telegram::check_bot(&bot).await?;

    let sheets = build_sheets_client(&config.sheets, sink_timeout)?;

    let admin_chat_id = config
        .telegram
        .admin_chat_id
        .context("Missing required configuration: telegram.admin_chat_id")?;
    let notifier = TelegramNotifier::new(bot.clone(), admin_chat_id);

    let handler = IntakeHandler::new(
        Arc::new(sheets),
        Arc::new(notifier),
        RelaySettings {
            product_label: config.relay.product_label.clone(),
            sink_timeout,
        },
    );
    let (relay, consumer) = RelayQueue::spawn(handler, config.relay.queue_capacity);

    info!("Bot started. Waiting for messages...");
    telegram::run(bot, relay, Greeting(config.telegram.greeting.clone())).await?;

    // Dispatcher is gone; drain whatever is still queued
    consumer.await.context("Relay consumer panicked")?;

    Ok(())
}

fn build_sheets_client(sheets: &SheetsConfig, timeout: Duration) -> Result<SheetsClient> {
    let key = match (&sheets.credentials_json, &sheets.credentials_file) {
        (Some(json), _) if !json.trim().is_empty() => ServiceAccountKey::from_json(json)?,
        (_, Some(path)) => ServiceAccountKey::from_file(path)?,
        _ => anyhow::bail!("Missing required configuration: Google service account credentials"),
    };

    let spreadsheet = sheets
        .spreadsheet()
        .context("Missing required configuration: spreadsheet id or name")?;

    let client = reqwest::Client::new();
    let tokens = TokenProvider::new(client.clone(), key, timeout)?;

    Ok(SheetsClient::new(
        client,
        tokens,
        GoogleEndpoints::default(),
        spreadsheet,
        sheets.worksheet.clone(),
        timeout,
    ))
}
