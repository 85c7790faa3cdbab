use chrono::{DateTime, Local};

/// Layout of the timestamp column and the notification's time line.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Only plain text is relayed, so the type column is constant.
pub const TEXT_TYPE_LABEL: &str = "text";

const NO_NAME_PLACEHOLDER: &str = "(no name)";

/// Author of an inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sender {
    pub id: u64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub is_bot: bool,
}

impl Sender {
    /// First and last name joined by a space and trimmed. Empty when neither is set.
    pub fn full_name(&self) -> String {
        let first = self.first_name.as_deref().unwrap_or("").trim();
        let last = self.last_name.as_deref().unwrap_or("").trim();
        format!("{} {}", first, last).trim().to_string()
    }

    /// Name shown to the administrator, never empty.
    pub fn display_name(&self) -> String {
        let name = self.full_name();
        if name.is_empty() {
            NO_NAME_PLACEHOLDER.to_string()
        } else {
            name
        }
    }

    /// `@username`, if the sender has one.
    pub fn handle(&self) -> Option<String> {
        self.username
            .as_deref()
            .filter(|u| !u.is_empty())
            .map(|u| format!("@{}", u))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatKind {
    Private,
    Group,
    Supergroup,
    Channel,
}

/// A message as delivered by the messaging platform, reduced to what the relay needs
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub sender: Option<Sender>,
    pub chat_id: i64,
    pub chat_kind: ChatKind,
    pub text: Option<String>,
}

/// One spreadsheet row, always seven cells in this order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub timestamp: String,
    pub product: String,
    pub user_id: String,
    pub username: String,
    pub full_name: String,
    pub message_type: String,
    pub text: String,
}

impl LogRecord {
    pub fn new(sender: &Sender, product: &str, text: &str, now: DateTime<Local>) -> Self {
        Self {
            timestamp: format_timestamp(now),
            product: product.to_string(),
            user_id: sender.id.to_string(),
            username: sender.username.clone().unwrap_or_default(),
            full_name: sender.full_name(),
            message_type: TEXT_TYPE_LABEL.to_string(),
            text: text.to_string(),
        }
    }

    pub fn into_row(self) -> Vec<String> {
        vec![
            self.timestamp,
            self.product,
            self.user_id,
            self.username,
            self.full_name,
            self.message_type,
            self.text,
        ]
    }
}

/// Text forwarded to the administrator chat
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminNotification {
    pub text: String,
}

impl AdminNotification {
    pub fn new(sender: &Sender, product: &str, text: &str, timestamp: &str) -> Self {
        let from = match sender.handle() {
            Some(handle) => format!("{} {}", sender.display_name(), handle),
            None => sender.display_name(),
        };

        let text = format!(
            "New message in {product}\n\
             From: {from}\n\
             User ID: {id}\n\
             Type: {kind}\n\
             Time: {timestamp}\n\
             Text:\n\
             {text}",
            id = sender.id,
            kind = TEXT_TYPE_LABEL,
        );

        Self { text }
    }
}

pub fn format_timestamp(at: DateTime<Local>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}
