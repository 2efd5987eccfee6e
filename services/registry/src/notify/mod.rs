//! Notification gateway.
//!
//! Email delivery is fire-and-forget from the core's perspective: callers
//! invoke the gateway after their own state is committed, log any failure,
//! and never roll back or propagate it. A flaky mail transport must not be
//! able to block an administrative decision.

mod smtp;

#[cfg(any(test, feature = "test-utils"))]
mod mock;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::db::Registration;

pub use smtp::{SmtpConfig, SmtpNotifier};

#[cfg(any(test, feature = "test-utils"))]
pub use mock::{MockNotifier, SentNotice};

/// The decision a status email announces.
///
/// Only terminal decisions are notifiable; moving a registration to
/// `under_review` is silent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approved,
    Declined,
}

/// Notification delivery errors. Logged by callers, never surfaced.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// A mailbox address could not be parsed.
    #[error("invalid mailbox address: {0}")]
    Address(String),

    /// The message could not be built.
    #[error("failed to build message: {0}")]
    Message(String),

    /// The SMTP transport rejected or failed the send.
    #[error("smtp transport error: {0}")]
    Transport(String),
}

/// Outbound notification seam.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Confirmation email sent when a registration is created.
    async fn registration_received(&self, registration: &Registration) -> Result<(), NotifyError>;

    /// Decision email sent when a registration is approved or declined.
    async fn status_changed(
        &self,
        registration: &Registration,
        decision: Decision,
        message: &str,
    ) -> Result<(), NotifyError>;
}

/// Notifier used when no SMTP relay is configured. Logs and succeeds, so
/// dev instances run without a mail transport.
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn registration_received(&self, registration: &Registration) -> Result<(), NotifyError> {
        debug!(
            registration_id = %registration.registration_id,
            email = %registration.email,
            "No SMTP relay configured; skipping confirmation email"
        );
        Ok(())
    }

    async fn status_changed(
        &self,
        registration: &Registration,
        decision: Decision,
        _message: &str,
    ) -> Result<(), NotifyError> {
        debug!(
            registration_id = %registration.registration_id,
            decision = ?decision,
            "No SMTP relay configured; skipping status email"
        );
        Ok(())
    }
}
