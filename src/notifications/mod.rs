//! Outbound notifications for signup codes and application decisions.
//!
//! Callers enqueue a [`Notification`] through a [`NotificationSender`]; a
//! [`NotificationDispatcher`] task drains the queue and hands each message
//! to a [`Notifier`]. Delivery failures are logged and never reach the
//! request that triggered them.

pub mod email;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

pub use email::SmtpNotifier;

/// Capacity of the outbound queue
const QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    SignupOtp {
        email: String,
        code: String,
        ttl_minutes: u64,
    },
    ApplicationApproved {
        email: String,
        username: String,
        business_name: String,
    },
    ApplicationRejected {
        email: String,
        username: String,
        business_name: String,
        reason: Option<String>,
    },
}

impl Notification {
    pub fn recipient(&self) -> &str {
        match self {
            Notification::SignupOtp { email, .. }
            | Notification::ApplicationApproved { email, .. }
            | Notification::ApplicationRejected { email, .. } => email,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Notification::SignupOtp { .. } => "signup_otp",
            Notification::ApplicationApproved { .. } => "application_approved",
            Notification::ApplicationRejected { .. } => "application_rejected",
        }
    }

    pub fn subject(&self) -> String {
        match self {
            Notification::SignupOtp { .. } => "Your CraveIt verification code".to_string(),
            Notification::ApplicationApproved { .. } => {
                "CraveIt : Your Vendor Application Has Been Approved".to_string()
            }
            Notification::ApplicationRejected { .. } => {
                "CraveIt : Your Vendor Application has been Rejected".to_string()
            }
        }
    }
}

/// Delivery backend for notifications
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, notification: &Notification) -> Result<()>;
}

/// Used when SMTP is not configured: records the message in the log instead
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn deliver(&self, notification: &Notification) -> Result<()> {
        match notification {
            Notification::SignupOtp { email, code, .. } => {
                tracing::debug!(to = %email, code = %code, "Email not configured, signup code");
            }
            other => {
                tracing::info!(
                    to = %other.recipient(),
                    kind = other.kind(),
                    "Email not configured, skipping notification"
                );
            }
        }
        Ok(())
    }
}

/// Cloneable handle for enqueueing notifications
#[derive(Clone)]
pub struct NotificationSender {
    tx: mpsc::Sender<Notification>,
}

impl NotificationSender {
    /// Create a sender and the receiving end of its queue
    pub fn channel() -> (Self, mpsc::Receiver<Notification>) {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        (Self { tx }, rx)
    }

    /// Queue a notification without waiting. Returns whether it was accepted.
    pub fn enqueue(&self, notification: Notification) -> bool {
        let kind = notification.kind();
        match self.tx.try_send(notification) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(n)) => {
                tracing::error!(to = %n.recipient(), kind, "Notification queue full, dropping");
                false
            }
            Err(mpsc::error::TrySendError::Closed(n)) => {
                tracing::error!(to = %n.recipient(), kind, "Notification queue closed, dropping");
                false
            }
        }
    }
}

/// Background worker delivering queued notifications
pub struct NotificationDispatcher {
    rx: mpsc::Receiver<Notification>,
    notifier: Arc<dyn Notifier>,
}

impl NotificationDispatcher {
    pub fn new(rx: mpsc::Receiver<Notification>, notifier: Arc<dyn Notifier>) -> Self {
        Self { rx, notifier }
    }

    /// Run until every sender has been dropped
    pub async fn run(mut self) {
        while let Some(notification) = self.rx.recv().await {
            if let Err(e) = self.notifier.deliver(&notification).await {
                tracing::warn!(
                    to = %notification.recipient(),
                    kind = notification.kind(),
                    error = %e,
                    "Failed to deliver notification"
                );
            }
        }
        tracing::info!("Notification dispatcher stopped");
    }
}
