//! Channel repository.

use std::sync::Arc;

use chrono::Utc;
use futures::future::BoxFuture;
use sqlx::PgPool;

use crate::{
    error::{CoreError, Result},
    models::{Channel, ChannelId},
    pagination::{Pagination, PAGE_SIZE},
    storage::ChannelStore,
};

const SELECT_CHANNEL: &str = "SELECT id, public_id, name, token, created_at, updated_at, deleted_at \
     FROM channels";

/// Repository for channel rows.
pub struct ChannelRepository {
    pool: Arc<PgPool>,
}

impl ChannelRepository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Persists a channel, keyed on its business key.
    ///
    /// A single `INSERT .. ON CONFLICT` statement, so re-storing an
    /// existing business key is an update, not a duplicate, and two
    /// writers racing to create the same key both succeed. `updated_at`
    /// is always refreshed; the conflict action carries the optimistic
    /// guard, so a concurrent update of a row this writer had seen loses
    /// with [`CoreError::StaleData`]. Storing a soft-deleted business key
    /// revives the row. Returns the canonical persisted entity.
    ///
    /// # Errors
    ///
    /// [`CoreError::InvalidState`] when the entity fails its validity
    /// predicate, [`CoreError::StaleData`] on a lost optimistic race.
    pub async fn store(&self, channel: &Channel) -> Result<Channel> {
        if !channel.is_in_valid_state() {
            return Err(CoreError::InvalidState);
        }

        // The guard is the version this writer observed; no live row means
        // the conflict action applies unconditionally (create race or
        // soft-deleted row).
        let guard = match self.find(&channel.public_id).await {
            Ok(existing) => Some(existing.updated_at),
            Err(CoreError::NotFound) => None,
            Err(err) => return Err(err),
        };

        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO channels (id, public_id, name, token, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $5) \
             ON CONFLICT (public_id) DO UPDATE \
                 SET name = EXCLUDED.name, token = EXCLUDED.token, \
                     updated_at = EXCLUDED.updated_at, deleted_at = NULL \
                 WHERE channels.updated_at = $6 OR $6 IS NULL",
        )
        .bind(channel.id)
        .bind(&channel.public_id)
        .bind(&channel.name)
        .bind(&channel.token)
        .bind(now)
        .bind(guard)
        .execute(&*self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::StaleData);
        }

        self.find(&channel.public_id).await
    }

    /// Finds a live channel by business key.
    ///
    /// # Errors
    ///
    /// [`CoreError::NotFound`] when no live row matches.
    pub async fn find(&self, public_id: &str) -> Result<Channel> {
        let channel = sqlx::query_as::<_, Channel>(&format!(
            "{SELECT_CHANNEL} WHERE public_id = $1 AND deleted_at IS NULL"
        ))
        .bind(public_id)
        .fetch_optional(&*self.pool)
        .await?;

        channel.ok_or(CoreError::NotFound)
    }

    /// Finds a channel by internal id.
    ///
    /// # Errors
    ///
    /// [`CoreError::NotFound`] when no live row matches.
    pub async fn find_by_id(&self, id: ChannelId) -> Result<Channel> {
        let channel = sqlx::query_as::<_, Channel>(&format!(
            "{SELECT_CHANNEL} WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(id)
        .fetch_optional(&*self.pool)
        .await?;

        channel.ok_or(CoreError::NotFound)
    }

    /// Lists channels newest-first with cursor pagination.
    ///
    /// # Errors
    ///
    /// [`CoreError::PaginationDeadlock`] when both bounds are supplied.
    pub async fn list(&self, page: &Pagination) -> Result<(Vec<Channel>, Pagination)> {
        if page.is_deadlocked() {
            return Err(CoreError::PaginationDeadlock);
        }

        let channels = if let Some(next) = page.next {
            sqlx::query_as::<_, Channel>(&format!(
                "{SELECT_CHANNEL} WHERE deleted_at IS NULL AND (created_at, id) < ($1, $2) \
                 ORDER BY created_at DESC, id DESC LIMIT $3"
            ))
            .bind(next.created_at)
            .bind(next.id)
            .bind(PAGE_SIZE)
            .fetch_all(&*self.pool)
            .await?
        } else if let Some(previous) = page.previous {
            let mut rows = sqlx::query_as::<_, Channel>(&format!(
                "{SELECT_CHANNEL} WHERE deleted_at IS NULL AND (created_at, id) > ($1, $2) \
                 ORDER BY created_at ASC, id ASC LIMIT $3"
            ))
            .bind(previous.created_at)
            .bind(previous.id)
            .bind(PAGE_SIZE)
            .fetch_all(&*self.pool)
            .await?;
            rows.reverse();
            rows
        } else {
            sqlx::query_as::<_, Channel>(&format!(
                "{SELECT_CHANNEL} WHERE deleted_at IS NULL \
                 ORDER BY created_at DESC, id DESC LIMIT $1"
            ))
            .bind(PAGE_SIZE)
            .fetch_all(&*self.pool)
            .await?
        };

        let page = Pagination::of_page(&channels);
        Ok((channels, page))
    }

    /// Soft-deletes a channel; the row stays for audit but leaves every
    /// lookup.
    ///
    /// # Errors
    ///
    /// [`CoreError::NotFound`] when the channel is already gone.
    pub async fn delete(&self, channel: &Channel) -> Result<()> {
        let result = sqlx::query(
            "UPDATE channels SET deleted_at = $1, updated_at = $1 \
             WHERE public_id = $2 AND deleted_at IS NULL",
        )
        .bind(Utc::now())
        .bind(&channel.public_id)
        .execute(&*self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound);
        }
        Ok(())
    }
}

impl ChannelStore for ChannelRepository {
    fn find<'a>(&'a self, public_id: &'a str) -> BoxFuture<'a, Result<Channel>> {
        Box::pin(self.find(public_id))
    }

    fn find_by_id(&self, id: ChannelId) -> BoxFuture<'_, Result<Channel>> {
        Box::pin(self.find_by_id(id))
    }
}
