//! Named advisory locks backed by a unique-name table.
//!
//! Serializes cross-node work such as seed application. A lock is a row;
//! holding it means having inserted the row, releasing it means deleting
//! the row under the owner that took it.

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use sqlx::PgPool;

use crate::error::Result;

/// Repository for advisory lock rows.
pub struct LockRepository {
    pool: Arc<PgPool>,
}

impl LockRepository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Attempts to take the named lock for `owner`.
    ///
    /// Returns `false` when another owner already holds it.
    ///
    /// # Errors
    ///
    /// Surfaces database failures.
    pub async fn acquire(&self, name: &str, owner: &str) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO broker_locks (name, owner, acquired_at) VALUES ($1, $2, $3) \
             ON CONFLICT (name) DO NOTHING",
        )
        .bind(name)
        .bind(owner)
        .bind(Utc::now())
        .execute(&*self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Releases the named lock, but only for the owner that holds it.
    ///
    /// Returns `false` when the lock was not held by `owner`.
    ///
    /// # Errors
    ///
    /// Surfaces database failures.
    pub async fn release(&self, name: &str, owner: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM broker_locks WHERE name = $1 AND owner = $2")
            .bind(name)
            .bind(owner)
            .execute(&*self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Breaks locks older than `max_age`, left behind by crashed holders.
    ///
    /// # Errors
    ///
    /// Surfaces database failures.
    pub async fn release_stale(&self, max_age: Duration) -> Result<u64> {
        let Ok(age) = chrono::Duration::from_std(max_age) else {
            return Ok(0);
        };

        let result = sqlx::query("DELETE FROM broker_locks WHERE acquired_at <= $1")
            .bind(Utc::now() - age)
            .execute(&*self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
