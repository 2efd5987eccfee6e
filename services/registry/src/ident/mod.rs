//! Identifier allocation.
//!
//! The allocator wraps the counter store in a bounded-retry loop and renders
//! the post-increment value as a human-readable code. Each call advances
//! exactly one `(category_key, scope)` counter; a registration needs two
//! independent calls, one per category, so unrelated allocations are never
//! serialized against each other.

pub mod codes;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

use crate::db::{CounterStore, Database, DbError};

pub use codes::Category;

/// Attempts per allocation before giving up.
const MAX_ATTEMPTS: u32 = 3;

/// Backoff before the second attempt; doubles per retry.
const INITIAL_BACKOFF: Duration = Duration::from_millis(25);

/// Allocation errors.
///
/// Fatal to the enclosing creation request; the caller must not persist a
/// partially-identified registration.
#[derive(Debug, Error)]
pub enum AllocationError {
    /// The counter transaction kept failing after bounded retries.
    #[error("allocation for ({category}, {scope}) failed after {attempts} attempts: {source}")]
    Exhausted {
        category: &'static str,
        scope: String,
        attempts: u32,
        #[source]
        source: DbError,
    },

    /// The counter store failed in a way retrying cannot fix.
    #[error(transparent)]
    Db(#[from] DbError),
}

/// A freshly issued code.
#[derive(Debug, Clone)]
pub struct IssuedCode {
    /// The formatted, human-readable code.
    pub code: String,
    /// The raw counter value embedded in the code.
    pub value: i64,
}

/// Allocation seam used by the creation path.
///
/// The production implementation is [`Allocator`]; tests substitute failing
/// doubles to exercise the all-or-nothing creation contract.
#[async_trait]
pub trait CodeAllocator: Send + Sync {
    async fn allocate(
        &self,
        category: Category,
        country: &str,
    ) -> Result<IssuedCode, AllocationError>;
}

/// Issues unique, monotonic codes backed by the counter store.
#[derive(Clone)]
pub struct Allocator {
    counters: CounterStore,
}

impl Allocator {
    /// Create an allocator over the database's counter store.
    pub fn new(db: &Database) -> Self {
        Self {
            counters: db.counters(),
        }
    }
}

#[async_trait]
impl CodeAllocator for Allocator {
    async fn allocate(
        &self,
        category: Category,
        country: &str,
    ) -> Result<IssuedCode, AllocationError> {
        let mut backoff = INITIAL_BACKOFF;
        let mut attempt = 1;

        loop {
            match self.counters.next_value(category.key(), country).await {
                Ok(value) => {
                    return Ok(IssuedCode {
                        code: codes::format_code(category, country, value),
                        value,
                    });
                }
                Err(e) if e.is_retryable() && attempt < MAX_ATTEMPTS => {
                    warn!(
                        category = %category,
                        scope = %country,
                        attempt,
                        error = %e,
                        "Counter transaction failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                    attempt += 1;
                }
                Err(e) if e.is_retryable() => {
                    return Err(AllocationError::Exhausted {
                        category: category.key(),
                        scope: country.to_string(),
                        attempts: attempt,
                        source: e,
                    });
                }
                Err(e) => return Err(AllocationError::Db(e)),
            }
        }
    }
}
