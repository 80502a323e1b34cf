//! Notifications emitted for accepted decisions.
//!
//! The engine only knows the [`NotificationSink`] trait. [`Broadcaster`] is
//! the in-process fan-out used by the server; live observers subscribe to it.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// What an accepted scan did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
  Checkin,
  Checkout,
}

/// Payload pushed to observers after a decision is durable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
  pub subject_id: Uuid,
  pub name:       String,
  pub action:     Action,
  pub time:       NaiveDateTime,
  pub message:    String,
}

/// Best-effort, non-blocking outlet for notifications.
///
/// `publish` must return promptly and must not fail the decision that
/// produced the notification.
pub trait NotificationSink: Send + Sync {
  fn publish(&self, notification: Notification);
}

/// Default ring size for [`Broadcaster::new`].
pub const DEFAULT_CAPACITY: usize = 64;

/// Fan-out over a tokio broadcast channel. Slow subscribers lag and lose the
/// oldest notifications; nothing ever waits on them.
#[derive(Clone)]
pub struct Broadcaster {
  tx: broadcast::Sender<Notification>,
}

impl Broadcaster {
  pub fn new() -> Self { Self::with_capacity(DEFAULT_CAPACITY) }

  pub fn with_capacity(capacity: usize) -> Self {
    let (tx, _) = broadcast::channel(capacity.max(1));
    Self { tx }
  }

  pub fn subscribe(&self) -> broadcast::Receiver<Notification> { self.tx.subscribe() }

  pub fn subscriber_count(&self) -> usize { self.tx.receiver_count() }
}

impl Default for Broadcaster {
  fn default() -> Self { Self::new() }
}

impl NotificationSink for Broadcaster {
  fn publish(&self, notification: Notification) {
    // Only fails when nobody is listening.
    if self.tx.send(notification).is_err() {
      tracing::debug!("notification dropped: no subscribers");
    }
  }
}
