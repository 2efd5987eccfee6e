//! Per-category, per-scope issuance counters.
//!
//! Counter rows are created lazily on first use and only ever move forward.
//! The read-increment-commit sequence runs inside a single transaction
//! holding a row lock, so concurrent requests for the same
//! (category_key, scope) pair serialize and never observe the same value.

use sqlx::postgres::PgPool;

use super::DbError;

/// Store for the monotonic issuance counters.
///
/// No other component reads or writes counter rows; callers go through the
/// identifier allocator.
#[derive(Clone)]
pub struct CounterStore {
    pool: PgPool,
}

impl CounterStore {
    /// Create a new counter store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Atomically advance the counter for `(category_key, scope)` and return
    /// the post-increment value.
    ///
    /// The first call for a pair creates its row with `current_value = 0`
    /// before incrementing, so the first issued value is 1. Creation is
    /// race-safe: the insert leans on the `(category_key, scope)` unique
    /// constraint and a concurrent creator simply wins, after which the
    /// locked re-select blocks until that transaction completes.
    ///
    /// The increment and the commit are the same transaction; a value from
    /// an aborted transaction is never observed outside it.
    pub async fn next_value(&self, category_key: &str, scope: &str) -> Result<i64, DbError> {
        let mut tx = self.pool.begin().await.map_err(DbError::Query)?;

        let existing: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT current_value
            FROM counters
            WHERE category_key = $1 AND scope = $2
            FOR UPDATE
            "#,
        )
        .bind(category_key)
        .bind(scope)
        .fetch_optional(&mut *tx)
        .await
        .map_err(DbError::Query)?;

        if existing.is_none() {
            sqlx::query(
                r#"
                INSERT INTO counters (category_key, scope, current_value)
                VALUES ($1, $2, 0)
                ON CONFLICT (category_key, scope) DO NOTHING
                "#,
            )
            .bind(category_key)
            .bind(scope)
            .execute(&mut *tx)
            .await
            .map_err(DbError::Query)?;

            // Lock whichever row exists now, ours or a concurrent creator's.
            sqlx::query_scalar::<_, i64>(
                r#"
                SELECT current_value
                FROM counters
                WHERE category_key = $1 AND scope = $2
                FOR UPDATE
                "#,
            )
            .bind(category_key)
            .bind(scope)
            .fetch_one(&mut *tx)
            .await
            .map_err(DbError::Query)?;
        }

        let next: i64 = sqlx::query_scalar(
            r#"
            UPDATE counters
            SET current_value = current_value + 1, updated_at = now()
            WHERE category_key = $1 AND scope = $2
            RETURNING current_value
            "#,
        )
        .bind(category_key)
        .bind(scope)
        .fetch_one(&mut *tx)
        .await
        .map_err(DbError::Query)?;

        tx.commit().await.map_err(DbError::Query)?;

        Ok(next)
    }

    /// Read the current value for `(category_key, scope)` without advancing
    /// it. Returns `None` if the pair has never been allocated.
    pub async fn current(&self, category_key: &str, scope: &str) -> Result<Option<i64>, DbError> {
        sqlx::query_scalar(
            r#"
            SELECT current_value
            FROM counters
            WHERE category_key = $1 AND scope = $2
            "#,
        )
        .bind(category_key)
        .bind(scope)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::Query)
    }
}
