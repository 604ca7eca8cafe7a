//! # Notifications
//!
//! Best-effort push notifications for request lifecycle events.
//!
//! ```text
//! RequestLedger ──notify()──► mpsc channel ──► worker task ──spawn──► PushSink::send
//!   (sync, never blocks)        (unbounded)                    (one task per message)
//! ```
//!
//! The ledger never waits for delivery and never sees a delivery error.
//! Failures are logged by the worker and dropped; there is no retry.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::Result;

/// Sent to the recipient when a request is created.
pub const REQUEST_RECEIVED_MESSAGE: &str = "Someone has requested your contact details!";

/// Sent to the requester when their request is granted.
pub const REQUEST_ACCEPTED_MESSAGE: &str = "Your request has been accepted!";

/// A single push to a single device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Alert text
    pub message: String,
    /// Device push token
    pub device_token: String,
}

/// Something that can deliver a push notification.
#[async_trait]
pub trait PushSink: Send + Sync + 'static {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Deliver one notification.
    async fn send(&self, notification: &Notification) -> Result<()>;
}

/// A sink that only logs. Used when no push provider is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

#[async_trait]
impl PushSink for LogSink {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn send(&self, notification: &Notification) -> Result<()> {
        tracing::info!(
            message = notification.message.as_str(),
            "Push notification (no provider configured)"
        );
        Ok(())
    }
}

/// Handle used to enqueue notifications. Cheap to clone.
#[derive(Clone)]
pub struct NotificationDispatcher {
    tx: mpsc::UnboundedSender<Notification>,
}

impl NotificationDispatcher {
    /// Create a dispatcher and the receiving end of its queue, without
    /// starting a worker.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Create a dispatcher whose queue is drained by a worker delivering to
    /// `sink`. Must be called from within a tokio runtime.
    pub fn spawn(sink: Arc<dyn PushSink>) -> (Self, JoinHandle<()>) {
        let (dispatcher, rx) = Self::channel();
        tracing::info!(sink = sink.name(), "Notification dispatcher started");
        let handle = tokio::spawn(run_worker(sink, rx));
        (dispatcher, handle)
    }

    /// Queue a notification. Returns immediately; delivery happens later,
    /// or not at all.
    pub fn notify(&self, message: &str, device_token: &str) {
        let notification = Notification {
            message: message.to_string(),
            device_token: device_token.to_string(),
        };

        if self.tx.send(notification).is_err() {
            tracing::warn!("Notification dispatcher is not running, dropping notification");
        }
    }
}

/// Drain the queue until every dispatcher handle has been dropped.
async fn run_worker(sink: Arc<dyn PushSink>, mut rx: mpsc::UnboundedReceiver<Notification>) {
    while let Some(notification) = rx.recv().await {
        let sink = sink.clone();
        tokio::spawn(async move {
            if let Err(e) = sink.send(&notification).await {
                tracing::warn!(
                    sink = sink.name(),
                    error = %e,
                    "Notification dispatch failed"
                );
            }
        });
    }

    tracing::debug!("Notification dispatcher stopped");
}
