use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::sheets::SpreadsheetRef;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("Missing required configuration: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub sheets: SheetsConfig,
    #[serde(default)]
    pub relay: RelayConfig,
}

#[derive(Deserialize, Clone)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
    /// Chat that receives a copy of every relayed message
    pub admin_chat_id: Option<i64>,
    #[serde(default = "default_greeting")]
    pub greeting: String,
}

// Token is redacted
impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("bot_token", &"<redacted>")
            .field("admin_chat_id", &self.admin_chat_id)
            .field("greeting", &self.greeting)
            .finish()
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            admin_chat_id: None,
            greeting: default_greeting(),
        }
    }
}

#[derive(Deserialize, Clone)]
pub struct SheetsConfig {
    /// Unique key of the spreadsheet; preferred over `spreadsheet_name` when both are set
    pub spreadsheet_id: Option<String>,
    /// Spreadsheet title, resolved to an id through Drive on first use
    pub spreadsheet_name: Option<String>,
    #[serde(default = "default_worksheet")]
    pub worksheet: String,
    /// Path to a service-account JSON key
    pub credentials_file: Option<PathBuf>,
    /// The same key, inline
    pub credentials_json: Option<String>,
}

impl std::fmt::Debug for SheetsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SheetsConfig")
            .field("spreadsheet_id", &self.spreadsheet_id)
            .field("spreadsheet_name", &self.spreadsheet_name)
            .field("worksheet", &self.worksheet)
            .field("credentials_file", &self.credentials_file)
            .field(
                "credentials_json",
                &self.credentials_json.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

impl Default for SheetsConfig {
    fn default() -> Self {
        Self {
            spreadsheet_id: None,
            spreadsheet_name: None,
            worksheet: default_worksheet(),
            credentials_file: None,
            credentials_json: None,
        }
    }
}

impl SheetsConfig {
    pub fn spreadsheet(&self) -> Option<SpreadsheetRef> {
        if let Some(id) = non_blank(self.spreadsheet_id.as_deref()) {
            return Some(SpreadsheetRef::Id(id.to_string()));
        }
        non_blank(self.spreadsheet_name.as_deref()).map(|n| SpreadsheetRef::Name(n.to_string()))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RelayConfig {
    /// Second column of every logged row and the title of admin notifications
    #[serde(default = "default_product_label")]
    pub product_label: String,
    /// Upper bound for a single spreadsheet append or admin send
    #[serde(default = "default_sink_timeout_secs")]
    pub sink_timeout_secs: u64,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            product_label: default_product_label(),
            sink_timeout_secs: default_sink_timeout_secs(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

fn default_greeting() -> String {
    "OS Diary is ready to take your entries ✨".to_string()
}

fn default_worksheet() -> String {
    "DIARY".to_string()
}

fn default_product_label() -> String {
    "OS_DIARY".to_string()
}

fn default_sink_timeout_secs() -> u64 {
    30
}

fn default_queue_capacity() -> usize {
    64
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

impl Config {
    /// Read the TOML file (if present), apply environment overrides and validate.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            toml::from_str::<Config>(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            tracing::warn!(
                "Config file {} not found, using environment only",
                path.display()
            );
            Config::default()
        };

        dotenvy::dotenv().ok();
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;

        Ok(config)
    }

    /// Overlay values from a key lookup (the process environment in production).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup("TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = token;
        }
        if let Some(raw) = lookup("ADMIN_CHAT_ID") {
            let id = raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid("ADMIN_CHAT_ID", raw.clone()))?;
            self.telegram.admin_chat_id = Some(id);
        }
        if let Some(id) = lookup("SPREADSHEET_ID") {
            self.sheets.spreadsheet_id = Some(id);
        }
        if let Some(name) = lookup("SPREADSHEET_NAME") {
            self.sheets.spreadsheet_name = Some(name);
        }
        if let Some(worksheet) = lookup("WORKSHEET_NAME") {
            self.sheets.worksheet = worksheet;
        }
        if let Some(file) = lookup("GOOGLE_CREDENTIALS_FILE") {
            self.sheets.credentials_file = Some(PathBuf::from(file));
        }
        if let Some(json) = lookup("GOOGLE_CREDENTIALS_JSON") {
            self.sheets.credentials_json = Some(json);
        }
        Ok(())
    }

    /// Report the first required input that is absent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.telegram.bot_token.trim().is_empty() {
            return Err(ConfigError::Missing("telegram.bot_token / TELEGRAM_BOT_TOKEN"));
        }
        if self.telegram.admin_chat_id.is_none() {
            return Err(ConfigError::Missing("telegram.admin_chat_id / ADMIN_CHAT_ID"));
        }
        if self.sheets.spreadsheet().is_none() {
            return Err(ConfigError::Missing(
                "sheets.spreadsheet_id or sheets.spreadsheet_name / SPREADSHEET_ID or SPREADSHEET_NAME",
            ));
        }
        if self.sheets.worksheet.trim().is_empty() {
            return Err(ConfigError::Missing("sheets.worksheet / WORKSHEET_NAME"));
        }
        if self.sheets.credentials_file.is_none()
            && non_blank(self.sheets.credentials_json.as_deref()).is_none()
        {
            return Err(ConfigError::Missing(
                "sheets.credentials_file or sheets.credentials_json / GOOGLE_CREDENTIALS_FILE or GOOGLE_CREDENTIALS_JSON",
            ));
        }
        if self.relay.sink_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "relay.sink_timeout_secs",
                "must be greater than zero".to_string(),
            ));
        }
        if self.relay.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "relay.queue_capacity",
                "must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
