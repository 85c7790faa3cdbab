use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

/// Destination for logged rows (the spreadsheet in production)
#[async_trait]
pub trait RowSink: Send + Sync {
    async fn append_row(&self, row: &[String]) -> Result<()>;
}

/// Destination for administrator notifications
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, text: &str) -> Result<()>;
}

/// Result of one sink call. Failures are values here, not errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkOutcome {
    Delivered,
    Failed(String),
    TimedOut,
}

impl SinkOutcome {
    /// Drive a sink call to completion, bounded by `limit`.
    pub async fn run<F>(limit: Duration, call: F) -> Self
    where
        F: Future<Output = Result<()>>,
    {
        match tokio::time::timeout(limit, call).await {
            Ok(Ok(())) => SinkOutcome::Delivered,
            Ok(Err(e)) => SinkOutcome::Failed(format!("{:#}", e)),
            Err(_) => SinkOutcome::TimedOut,
        }
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self, SinkOutcome::Delivered)
    }
}

impl std::fmt::Display for SinkOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkOutcome::Delivered => write!(f, "delivered"),
            SinkOutcome::Failed(reason) => write!(f, "failed: {}", reason),
            SinkOutcome::TimedOut => write!(f, "timed out"),
        }
    }
}
