//! Database error types.

use thiserror::Error;

/// Database operation errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// Failed to connect to the database.
    #[error("failed to connect to database: {0}")]
    Connect(#[source] sqlx::Error),

    /// Failed to execute a query.
    #[error("query failed: {0}")]
    Query(#[source] sqlx::Error),

    /// Failed to run migrations.
    #[error("migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),

    /// Migration directory not found in the current environment.
    #[error("migration directory not found; tried {tried}. Last error: {last_error}. Run from repo root or services/registry.")]
    MigrationDirNotFound { tried: String, last_error: String },

    /// A unique constraint was violated.
    #[error("duplicate value for unique column '{column}'")]
    UniqueViolation {
        column: String,
        #[source]
        source: sqlx::Error,
    },
}

impl DbError {
    /// Whether retrying the failed operation could succeed.
    ///
    /// Deadlocks (40P01), serialization failures (40001), and transport-level
    /// errors clear up on their own; everything else is a caller bug or a
    /// constraint violation and retrying would just repeat it.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Query(e) | Self::Connect(e) => match e {
                sqlx::Error::Database(db_err) => {
                    matches!(db_err.code().as_deref(), Some("40001") | Some("40P01"))
                }
                sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => true,
                _ => false,
            },
            _ => false,
        }
    }
}

/// Map a query error, attributing unique violations (SQLSTATE 23505) to the
/// column named in the violated constraint.
///
/// Relies on the `<table>_<column>_key` index naming used by our migrations.
pub(crate) fn map_insert_error(table: &str, e: sqlx::Error) -> DbError {
    if let sqlx::Error::Database(ref db_err) = e {
        if db_err.code().as_deref() == Some("23505") {
            let column = db_err
                .constraint()
                .and_then(|c| c.strip_prefix(table))
                .and_then(|c| c.strip_prefix('_'))
                .and_then(|c| c.strip_suffix("_key"))
                .unwrap_or("unknown")
                .to_string();
            return DbError::UniqueViolation { column, source: e };
        }
    }
    DbError::Query(e)
}
