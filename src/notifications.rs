//! User-facing notifications for the workspace.
//!
//! Every warning or error the sync and import machinery wants the user to see
//! goes through a [`Notifier`]. Sending is fire-and-forget: it never blocks and
//! never fails from the caller's point of view.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

/// A single message delivered to the notification sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub message: String,
    pub severity: Severity,
    pub created_at: i64,
}

pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str, severity: Severity);
}

/// Writes notifications to the log. Used when no UI is attached.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, message: &str, severity: Severity) {
        match severity {
            Severity::Info | Severity::Success => tracing::info!("{}", message),
            Severity::Warning => tracing::warn!("{}", message),
            Severity::Error => tracing::error!("{}", message),
        }
    }
}

/// Forwards notifications to a UI surface over an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, message: &str, severity: Severity) {
        let notification = Notification {
            message: message.to_string(),
            severity,
            created_at: chrono::Utc::now().timestamp(),
        };
        // A closed receiver means nobody is listening any more
        if self.tx.send(notification).is_err() {
            tracing::debug!("Notification dropped, receiver closed: {}", message);
        }
    }
}

/// Pluralize `item` for user-facing counts.
pub fn items(count: usize) -> &'static str {
    if count == 1 {
        "item"
    } else {
        "items"
    }
}
