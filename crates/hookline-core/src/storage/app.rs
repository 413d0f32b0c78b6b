//! Singleton bootstrap-state repository.
//!
//! Exactly one row exists; it records which seed data fingerprint has been
//! applied so that a fleet of broker nodes initializes once, not once per
//! node.

use std::sync::Arc;

use chrono::Utc;
use sqlx::PgPool;

use crate::{
    error::{CoreError, Result},
    models::{App, AppStatus, APP_SINGLETON_ID},
};

/// Repository for the singleton app row.
pub struct AppRepository {
    pool: Arc<PgPool>,
}

impl AppRepository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Inserts the singleton row when absent; a no-op otherwise.
    ///
    /// # Errors
    ///
    /// Surfaces database failures.
    pub async fn ensure_exists(&self) -> Result<()> {
        sqlx::query(
            "INSERT INTO broker_app (id, seed_data_hash, status, updated_at) \
             VALUES ($1, '', $2, $3) \
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(APP_SINGLETON_ID)
        .bind(AppStatus::NotInitialized)
        .bind(Utc::now())
        .execute(&*self.pool)
        .await?;

        Ok(())
    }

    /// Loads the singleton row.
    ///
    /// # Errors
    ///
    /// [`CoreError::NotFound`] before [`AppRepository::ensure_exists`] has
    /// run.
    pub async fn get(&self) -> Result<App> {
        let app = sqlx::query_as::<_, App>(
            "SELECT id, seed_data_hash, status, updated_at FROM broker_app WHERE id = $1",
        )
        .bind(APP_SINGLETON_ID)
        .fetch_optional(&*self.pool)
        .await?;

        app.ok_or(CoreError::NotFound)
    }

    /// Marks the row initialized with the given seed fingerprint.
    ///
    /// Guarded optimistically on the caller's view of `updated_at`; a
    /// concurrent transition loses with [`CoreError::StaleData`].
    ///
    /// # Errors
    ///
    /// [`CoreError::StaleData`] on a lost optimistic race.
    pub async fn mark_initialized(&self, current: &App, seed_data_hash: &str) -> Result<App> {
        let result = sqlx::query(
            "UPDATE broker_app SET seed_data_hash = $1, status = $2, updated_at = $3 \
             WHERE id = $4 AND updated_at = $5",
        )
        .bind(seed_data_hash)
        .bind(AppStatus::Initialized)
        .bind(Utc::now())
        .bind(APP_SINGLETON_ID)
        .bind(current.updated_at)
        .execute(&*self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::StaleData);
        }

        self.get().await
    }
}
