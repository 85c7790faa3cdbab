use anyhow::{Context, Result};
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{Chat, MessageEntityKind, User};
use tracing::{debug, info};

use crate::record::{ChatKind, InboundMessage, Sender};
use crate::relay::RelaySender;
use crate::sink::NotificationSink;

/// Reply to `/start`
#[derive(Debug, Clone)]
pub struct Greeting(pub String);

/// Forwards notifications to the configured administrator chat
pub struct TelegramNotifier {
    bot: Bot,
    admin_chat: ChatId,
}

impl TelegramNotifier {
    pub fn new(bot: Bot, admin_chat_id: i64) -> Self {
        Self {
            bot,
            admin_chat: ChatId(admin_chat_id),
        }
    }
}

#[async_trait]
impl NotificationSink for TelegramNotifier {
    async fn notify(&self, text: &str) -> Result<()> {
        self.bot
            .send_message(self.admin_chat, text)
            .await
            .with_context(|| format!("Failed to send message to chat {}", self.admin_chat.0))?;
        Ok(())
    }
}

/// Confirm the token works before anything else starts.
pub async fn check_bot(bot: &Bot) -> Result<()> {
    let me = bot
        .get_me()
        .await
        .context("Failed to reach Telegram with the configured bot token")?;
    info!("Telegram bot authorized as @{}", me.username());
    Ok(())
}

/// What the dispatcher does with an incoming message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Greet,
    Relay,
    Ignore,
}

pub fn route(msg: &Message) -> Route {
    if is_start_command(msg) {
        Route::Greet
    } else if msg.chat.is_private() && msg.text().is_some() && !is_command(msg) {
        Route::Relay
    } else {
        Route::Ignore
    }
}

/// Run the Telegram dispatcher until the process is stopped
pub async fn run(bot: Bot, relay: RelaySender, greeting: Greeting) -> Result<()> {
    info!("Starting Telegram platform...");

    let handler = Update::filter_message().endpoint(handle_message);

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![relay, greeting])
        .default_handler(|upd| async move {
            debug!("Ignored update: {:?}", upd.id);
        })
        .error_handler(LoggingErrorHandler::with_custom_text("telegram"))
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    info!("Telegram dispatcher stopped");
    Ok(())
}

async fn handle_message(
    bot: Bot,
    msg: Message,
    relay: RelaySender,
    greeting: Greeting,
) -> ResponseResult<()> {
    match route(&msg) {
        Route::Greet => {
            bot.send_message(msg.chat.id, greeting.0).await?;
        }
        Route::Relay => relay.submit(to_inbound(&msg)).await,
        Route::Ignore => debug!("Ignored message {} in chat {}", msg.id.0, msg.chat.id.0),
    }
    Ok(())
}

/// Reduce a Telegram message to the relay's view of it.
pub fn to_inbound(msg: &Message) -> InboundMessage {
    InboundMessage {
        sender: msg.from.as_ref().map(to_sender),
        chat_id: msg.chat.id.0,
        chat_kind: chat_kind(&msg.chat),
        text: msg.text().map(String::from),
    }
}

fn to_sender(user: &User) -> Sender {
    Sender {
        id: user.id.0,
        username: user.username.clone(),
        first_name: Some(user.first_name.clone()),
        last_name: user.last_name.clone(),
        is_bot: user.is_bot,
    }
}

fn chat_kind(chat: &Chat) -> ChatKind {
    if chat.is_private() {
        ChatKind::Private
    } else if chat.is_channel() {
        ChatKind::Channel
    } else if chat.is_supergroup() {
        ChatKind::Supergroup
    } else {
        ChatKind::Group
    }
}

/// The `/command[@bot]` Telegram marked at the very start of the text, if any.
pub fn leading_command(msg: &Message) -> Option<&str> {
    let text = msg.text()?;
    msg.entities()?
        .iter()
        .find(|e| e.offset == 0 && matches!(e.kind, MessageEntityKind::BotCommand))
        .and_then(|e| text.get(..e.length))
}

pub fn is_command(msg: &Message) -> bool {
    leading_command(msg).is_some()
}

/// `/start`, `/start@SomeBot` or `/start payload`
pub fn is_start_command(msg: &Message) -> bool {
    leading_command(msg)
        .and_then(|cmd| cmd.strip_prefix('/'))
        .and_then(|cmd| cmd.split('@').next())
        .is_some_and(|name| name.eq_ignore_ascii_case("start"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::{IntakeHandler, RelayQueue, RelaySettings};
    use crate::testing::{test_client, RecordingNotifier, RecordingRows, StubServer};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::Duration;

    fn parse(value: Value) -> Message {
        serde_json::from_value(value).unwrap()
    }

    fn private_chat() -> Value {
        json!({"id": 42, "type": "private", "first_name": "Alex", "username": "alex"})
    }

    fn alex() -> Value {
        json!({"id": 42, "is_bot": false, "first_name": "Alex", "username": "alex"})
    }

    fn text_message(chat: Value, text: &str) -> Message {
        parse(json!({
            "message_id": 1,
            "date": 1700000000,
            "chat": chat,
            "from": alex(),
            "text": text
        }))
    }

    /// A message whose first `length` UTF-16 units Telegram tagged as a bot command
    fn command_message(chat: Value, text: &str, length: usize) -> Message {
        parse(json!({
            "message_id": 1,
            "date": 1700000000,
            "chat": chat,
            "from": alex(),
            "text": text,
            "entities": [{"type": "bot_command", "offset": 0, "length": length}]
        }))
    }

    fn group_chat() -> Value {
        json!({"id": -100123, "type": "supergroup", "title": "Team"})
    }

    #[test]
    fn test_leading_command() {
        let msg = command_message(private_chat(), "/start@OsDiaryBot ref", 17);
        assert_eq!(leading_command(&msg), Some("/start@OsDiaryBot"));
        assert!(is_start_command(&msg));

        let msg = command_message(private_chat(), "/help me", 5);
        assert_eq!(leading_command(&msg), Some("/help"));
        assert!(is_command(&msg));
        assert!(!is_start_command(&msg));
    }

    #[test]
    fn test_command_entity_must_start_the_text() {
        let msg = parse(json!({
            "message_id": 1,
            "date": 1700000000,
            "chat": private_chat(),
            "from": alex(),
            "text": "note /start",
            "entities": [{"type": "bot_command", "offset": 5, "length": 6}]
        }));
        assert!(!is_command(&msg));
        assert_eq!(route(&msg), Route::Relay);
    }

    #[test]
    fn test_slash_text_without_command_entity_is_relayed() {
        for text in ["/-) rough day", "/😀 good", "/shrug/ meh", "/ spaced"] {
            let msg = text_message(private_chat(), text);
            assert!(!is_command(&msg), "{text}");
            assert_eq!(route(&msg), Route::Relay, "{text}");
        }
    }

    #[test]
    fn test_routes() {
        assert_eq!(
            route(&text_message(private_chat(), "Had a good day")),
            Route::Relay
        );
        assert_eq!(
            route(&command_message(private_chat(), "/start", 6)),
            Route::Greet
        );
        assert_eq!(
            route(&command_message(private_chat(), "/stop", 5)),
            Route::Ignore
        );
        assert_eq!(
            route(&command_message(private_chat(), "/startle", 8)),
            Route::Ignore
        );
        assert_eq!(route(&text_message(group_chat(), "ping")), Route::Ignore);
        assert_eq!(
            route(&command_message(group_chat(), "/start", 6)),
            Route::Greet
        );
    }

    #[test]
    fn test_to_inbound_private_text() {
        let inbound = to_inbound(&text_message(private_chat(), "Had a good day"));
        assert_eq!(inbound.chat_id, 42);
        assert_eq!(inbound.chat_kind, ChatKind::Private);
        assert_eq!(inbound.text.as_deref(), Some("Had a good day"));
        assert_eq!(
            inbound.sender,
            Some(Sender {
                id: 42,
                username: Some("alex".to_string()),
                first_name: Some("Alex".to_string()),
                last_name: None,
                is_bot: false,
            })
        );
    }

    #[test]
    fn test_to_inbound_group_chat() {
        let msg = parse(json!({
            "message_id": 2,
            "date": 1700000000,
            "chat": group_chat(),
            "from": {"id": 7, "is_bot": true, "first_name": "Helper", "last_name": "Bot"},
            "text": "ping"
        }));

        let inbound = to_inbound(&msg);
        assert_eq!(inbound.chat_kind, ChatKind::Supergroup);
        let sender = inbound.sender.unwrap();
        assert!(sender.is_bot);
        assert_eq!(sender.full_name(), "Helper Bot");
        assert_eq!(sender.username, None);
    }

    #[tokio::test]
    async fn test_start_greets_and_skips_relay() {
        let reply = json!({
            "ok": true,
            "result": {
                "message_id": 2,
                "date": 1700000001,
                "chat": private_chat(),
                "text": "Welcome!"
            }
        })
        .to_string();
        let server = StubServer::start(vec![(200, reply.as_str())]).await;
        let bot = Bot::with_client("123:abc", test_client())
            .set_api_url(reqwest::Url::parse(&server.url).unwrap());

        let rows = Arc::new(RecordingRows::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let handler = IntakeHandler::new(
            rows.clone(),
            notifier.clone(),
            RelaySettings {
                product_label: "OS_DIARY".to_string(),
                sink_timeout: Duration::from_secs(5),
            },
        );
        let (relay, consumer) = RelayQueue::spawn(handler, 4);

        let greeting = Greeting("Welcome!".to_string());
        handle_message(
            bot.clone(),
            command_message(private_chat(), "/start", 6),
            relay.clone(),
            greeting.clone(),
        )
        .await
        .unwrap();
        handle_message(
            bot,
            text_message(private_chat(), "Had a good day"),
            relay.clone(),
            greeting,
        )
        .await
        .unwrap();

        drop(relay);
        consumer.await.unwrap();

        let requests = server.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].to_ascii_lowercase().contains("/bot123:abc/sendmessage"));
        assert!(requests[0].contains("Welcome!"));

        let rows = rows.rows.lock().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][6], "Had a good day");
        assert_eq!(notifier.sent.lock().unwrap().len(), 1);
    }
}
