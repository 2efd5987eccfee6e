//! Recording notifier for tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use marma_id::RegistrationId;

use super::{Decision, Notifier, NotifyError};
use crate::db::Registration;

/// A notice the mock was asked to deliver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentNotice {
    Received {
        registration_id: RegistrationId,
    },
    StatusChanged {
        registration_id: RegistrationId,
        decision: Decision,
        message: String,
    },
}

/// Mock notifier that records every delivered notice.
///
/// When failing, sends return `NotifyError::Transport` and nothing is
/// recorded, which is how a real transport outage behaves.
#[derive(Clone, Default)]
pub struct MockNotifier {
    sent: Arc<Mutex<Vec<SentNotice>>>,
    fail: Arc<AtomicBool>,
}

impl MockNotifier {
    /// Create a mock that delivers successfully.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock whose sends fail.
    pub fn failing() -> Self {
        let mock = Self::default();
        mock.fail.store(true, Ordering::SeqCst);
        mock
    }

    /// Toggle failure mode.
    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }

    /// Everything delivered so far.
    pub fn sent(&self) -> Vec<SentNotice> {
        self.sent.lock().expect("mock notifier lock poisoned").clone()
    }

    /// Count of delivered status-change notices.
    pub fn status_changes(&self) -> usize {
        self.sent()
            .iter()
            .filter(|n| matches!(n, SentNotice::StatusChanged { .. }))
            .count()
    }

    fn deliver(&self, notice: SentNotice) -> Result<(), NotifyError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(NotifyError::Transport("mock transport down".to_string()));
        }
        self.sent
            .lock()
            .expect("mock notifier lock poisoned")
            .push(notice);
        Ok(())
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn registration_received(&self, registration: &Registration) -> Result<(), NotifyError> {
        self.deliver(SentNotice::Received {
            registration_id: registration.registration_id,
        })
    }

    async fn status_changed(
        &self,
        registration: &Registration,
        decision: Decision,
        message: &str,
    ) -> Result<(), NotifyError> {
        self.deliver(SentNotice::StatusChanged {
            registration_id: registration.registration_id,
            decision,
            message: message.to_string(),
        })
    }
}
