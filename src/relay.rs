use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::record::{format_timestamp, AdminNotification, InboundMessage, LogRecord};
use crate::sink::{NotificationSink, RowSink, SinkOutcome};

#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub product_label: String,
    pub sink_timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    NoSender,
    FromBot,
    EmptyText,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleOutcome {
    Ignored(IgnoreReason),
    Relayed {
        sheet: SinkOutcome,
        admin: SinkOutcome,
    },
}

/// Turns accepted messages into a spreadsheet row and an admin notification.
pub struct IntakeHandler {
    rows: Arc<dyn RowSink>,
    notifier: Arc<dyn NotificationSink>,
    settings: RelaySettings,
}

impl IntakeHandler {
    pub fn new(
        rows: Arc<dyn RowSink>,
        notifier: Arc<dyn NotificationSink>,
        settings: RelaySettings,
    ) -> Self {
        Self {
            rows,
            notifier,
            settings,
        }
    }

    pub async fn handle(&self, msg: &InboundMessage) -> HandleOutcome {
        let sender = match msg.sender.as_ref() {
            Some(sender) => sender,
            None => return HandleOutcome::Ignored(IgnoreReason::NoSender),
        };

        if sender.is_bot {
            debug!("Ignoring message from bot {}", sender.id);
            return HandleOutcome::Ignored(IgnoreReason::FromBot);
        }

        let text = msg.text.as_deref().unwrap_or("").trim();
        if text.is_empty() {
            return HandleOutcome::Ignored(IgnoreReason::EmptyText);
        }

        let now = Local::now();
        let product = &self.settings.product_label;
        let timeout = self.settings.sink_timeout;

        let row = LogRecord::new(sender, product, text, now).into_row();
        let sheet = SinkOutcome::run(timeout, self.rows.append_row(&row)).await;
        match &sheet {
            SinkOutcome::Delivered => info!("LOGGED_ROW: {:?}", row),
            other => error!("SHEET_ERROR: user {}: {}", sender.id, other),
        }

        let note = AdminNotification::new(sender, product, text, &format_timestamp(now));
        let admin = SinkOutcome::run(timeout, self.notifier.notify(&note.text)).await;
        if !admin.is_delivered() {
            error!("ADMIN_SEND_ERROR: user {}: {}", sender.id, admin);
        }

        HandleOutcome::Relayed { sheet, admin }
    }
}

/// Producer side of the relay queue
#[derive(Clone)]
pub struct RelaySender {
    tx: mpsc::Sender<InboundMessage>,
}

impl RelaySender {
    /// Enqueue a message, waiting for room if the consumer is behind.
    pub async fn submit(&self, msg: InboundMessage) {
        if self.tx.send(msg).await.is_err() {
            warn!("Relay consumer has stopped, message dropped");
        }
    }
}

/// Single consumer that feeds queued messages through the handler one at a time.
pub struct RelayQueue;

impl RelayQueue {
    pub fn spawn(handler: IntakeHandler, capacity: usize) -> (RelaySender, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<InboundMessage>(capacity);

        let consumer = tokio::spawn(async move {
            info!("Relay consumer started");
            while let Some(msg) = rx.recv().await {
                let outcome = handler.handle(&msg).await;
                debug!(
                    "Relay outcome for {:?} chat {}: {:?}",
                    msg.chat_kind, msg.chat_id, outcome
                );
            }
            info!("Relay consumer stopped");
        });

        (RelaySender { tx }, consumer)
    }
}
