//! Registration status lifecycle.
//!
//! ```text
//! pending ──► under_review ──► approved
//!    │              │
//!    ├──────────────┴────────► declined
//!    └───────────────────────► approved
//! ```
//!
//! `approved` and `declined` are terminal. Reapplying a record's current
//! status is a full no-op: no write, no timestamp change, no email. Every
//! other backward transition is rejected without mutating the record.

use std::sync::Arc;

use marma_id::RegistrationId;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::db::{self, Database, DbError, Registration};
use crate::notify::{Decision, Notifier};

/// Registration status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pending,
    Approved,
    Declined,
    UnderReview,
}

impl Status {
    /// The value stored in the registrations table.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Declined => "declined",
            Self::UnderReview => "under_review",
        }
    }

    /// Whether no further transitions leave this status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Declined)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error parsing a stored status value.
#[derive(Debug, Error)]
#[error("unknown registration status: {0}")]
pub struct ParseStatusError(String);

impl std::str::FromStr for Status {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "declined" => Ok(Self::Declined),
            "under_review" => Ok(Self::UnderReview),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

/// Whether a *changed*-status transition is permitted.
///
/// Same-status requests never reach this guard; they take the no-op path.
pub fn transition_allowed(from: Status, to: Status) -> bool {
    use Status::*;
    matches!(
        (from, to),
        (Pending, UnderReview)
            | (Pending, Approved)
            | (Pending, Declined)
            | (UnderReview, Approved)
            | (UnderReview, Declined)
    )
}

/// Status-transition errors.
#[derive(Debug, Error)]
pub enum TransitionError {
    /// No registration with this id exists.
    #[error("registration not found: {0}")]
    NotFound(RegistrationId),

    /// The requested transition is not permitted from the current status.
    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition { from: Status, to: Status },

    /// The transition could not be persisted; no status change occurred.
    #[error(transparent)]
    Db(#[from] DbError),
}

/// Validates and applies status transitions, and triggers the at-most-once
/// decision notification.
#[derive(Clone)]
pub struct LifecycleController {
    db: Database,
    notifier: Arc<dyn Notifier>,
}

impl LifecycleController {
    /// Create a new controller.
    pub fn new(db: Database, notifier: Arc<dyn Notifier>) -> Self {
        Self { db, notifier }
    }

    /// Apply a status to a registration.
    ///
    /// The read-compare-write runs inside one transaction holding the
    /// registration's row lock, so concurrent identical requests serialize:
    /// the loser observes the winner's committed status and becomes a no-op.
    ///
    /// The notification fires only after commit, only when the new status is
    /// `approved` or `declined`, and only on an actual change. A notification
    /// failure is logged and swallowed; the committed status stands.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown id, `InvalidTransition` when the guard
    /// rejects the change; in both cases the record is untouched.
    pub async fn apply_status(
        &self,
        id: &RegistrationId,
        new_status: Status,
        message: Option<&str>,
        reviewer: Option<&str>,
    ) -> Result<Registration, TransitionError> {
        let mut tx = self.db.pool().begin().await.map_err(DbError::Query)?;

        let Some(current) = db::registrations::fetch_for_update(&mut tx, id).await? else {
            return Err(TransitionError::NotFound(*id));
        };

        if current.status == new_status {
            // Idempotent re-apply: release the lock and hand back the record
            // exactly as stored, ignoring any new message or reviewer.
            tx.commit().await.map_err(DbError::Query)?;
            return Ok(current);
        }

        if !transition_allowed(current.status, new_status) {
            return Err(TransitionError::InvalidTransition {
                from: current.status,
                to: new_status,
            });
        }

        let updated =
            db::registrations::update_status(&mut tx, id, new_status, message, reviewer).await?;
        tx.commit().await.map_err(DbError::Query)?;

        let decision = match new_status {
            Status::Approved => Some(Decision::Approved),
            Status::Declined => Some(Decision::Declined),
            Status::Pending | Status::UnderReview => None,
        };

        if let Some(decision) = decision {
            if let Err(e) = self
                .notifier
                .status_changed(&updated, decision, message.unwrap_or(""))
                .await
            {
                warn!(
                    registration_id = %id,
                    status = %new_status,
                    error = %e,
                    "Status notification failed; transition stands"
                );
            }
        }

        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Status::Pending, Status::UnderReview, true)]
    #[case(Status::Pending, Status::Approved, true)]
    #[case(Status::Pending, Status::Declined, true)]
    #[case(Status::UnderReview, Status::Approved, true)]
    #[case(Status::UnderReview, Status::Declined, true)]
    #[case(Status::UnderReview, Status::Pending, false)]
    #[case(Status::Approved, Status::Pending, false)]
    #[case(Status::Approved, Status::Declined, false)]
    #[case(Status::Approved, Status::UnderReview, false)]
    #[case(Status::Declined, Status::Pending, false)]
    #[case(Status::Declined, Status::Approved, false)]
    #[case(Status::Declined, Status::UnderReview, false)]
    fn test_transition_guard(#[case] from: Status, #[case] to: Status, #[case] allowed: bool) {
        assert_eq!(transition_allowed(from, to), allowed);
    }

    #[test]
    fn test_status_string_roundtrip() {
        for status in [
            Status::Pending,
            Status::Approved,
            Status::Declined,
            Status::UnderReview,
        ] {
            assert_eq!(status.as_str().parse::<Status>().unwrap(), status);
        }
    }

    #[test]
    fn test_status_parse_rejects_unknown() {
        assert!("cancelled".parse::<Status>().is_err());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(Status::Approved.is_terminal());
        assert!(Status::Declined.is_terminal());
        assert!(!Status::Pending.is_terminal());
        assert!(!Status::UnderReview.is_terminal());
    }
}
