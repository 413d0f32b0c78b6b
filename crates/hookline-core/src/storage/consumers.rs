//! Consumer repository.
//!
//! Consumer rows store the owning channel's internal id; reads rehydrate
//! the channel aggregate through the [`ChannelStore`] seam so the
//! back-reference stays a relation, never ownership.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::{
    error::{CoreError, Result},
    models::{Channel, ChannelId, Consumer, ConsumerId, ConsumerType},
    pagination::{Pagination, PAGE_SIZE},
    storage::ChannelStore,
};

const SELECT_CONSUMER: &str = "SELECT id, public_id, channel_fk, name, token, callback_url, consumer_type, \
            created_at, updated_at, deleted_at \
     FROM consumers";

#[derive(sqlx::FromRow)]
struct ConsumerRow {
    id: ConsumerId,
    public_id: String,
    channel_fk: ChannelId,
    name: String,
    token: String,
    callback_url: String,
    consumer_type: ConsumerType,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl ConsumerRow {
    fn into_consumer(self, channel: Channel) -> Consumer {
        Consumer {
            id: self.id,
            public_id: self.public_id,
            channel,
            name: self.name,
            token: self.token,
            callback_url: self.callback_url,
            consumer_type: self.consumer_type,
            created_at: self.created_at,
            updated_at: self.updated_at,
            deleted_at: self.deleted_at,
        }
    }
}

/// Repository for consumer rows.
pub struct ConsumerRepository {
    pool: Arc<PgPool>,
    channels: Arc<dyn ChannelStore>,
}

impl ConsumerRepository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<PgPool>, channels: Arc<dyn ChannelStore>) -> Self {
        Self { pool, channels }
    }

    /// Persists a consumer, keyed on `(channel, public_id)`.
    ///
    /// The owning channel is resolved through its business key; a missing
    /// channel propagates [`CoreError::NotFound`]. The write itself is one
    /// atomic `INSERT .. ON CONFLICT` statement, so a create race resolves
    /// as an update instead of a unique violation, the optimistic guard
    /// rides in the conflict action, and storing a soft-deleted business
    /// key revives the row.
    ///
    /// # Errors
    ///
    /// [`CoreError::InvalidState`] on a failed validity predicate,
    /// [`CoreError::NotFound`] for an unknown channel,
    /// [`CoreError::StaleData`] on a lost optimistic race.
    pub async fn store(&self, consumer: &Consumer) -> Result<Consumer> {
        if !consumer.is_in_valid_state() {
            return Err(CoreError::InvalidState);
        }

        let channel = self.channels.find(&consumer.channel.public_id).await?;

        let guard = match self.find(&channel.public_id, &consumer.public_id).await {
            Ok(existing) => Some(existing.updated_at),
            Err(CoreError::NotFound) => None,
            Err(err) => return Err(err),
        };

        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO consumers (id, public_id, channel_fk, name, token, callback_url, \
                    consumer_type, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8) \
             ON CONFLICT (channel_fk, public_id) DO UPDATE \
                 SET name = EXCLUDED.name, token = EXCLUDED.token, \
                     callback_url = EXCLUDED.callback_url, \
                     consumer_type = EXCLUDED.consumer_type, \
                     updated_at = EXCLUDED.updated_at, deleted_at = NULL \
                 WHERE consumers.updated_at = $9 OR $9 IS NULL",
        )
        .bind(consumer.id)
        .bind(&consumer.public_id)
        .bind(channel.id)
        .bind(&consumer.name)
        .bind(&consumer.token)
        .bind(&consumer.callback_url)
        .bind(consumer.consumer_type)
        .bind(now)
        .bind(guard)
        .execute(&*self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::StaleData);
        }

        self.find(&channel.public_id, &consumer.public_id).await
    }

    /// Finds a live consumer by `(channel business key, consumer business
    /// key)`.
    ///
    /// # Errors
    ///
    /// [`CoreError::NotFound`] for an unknown channel or consumer.
    pub async fn find(&self, channel_public_id: &str, public_id: &str) -> Result<Consumer> {
        let channel = self.channels.find(channel_public_id).await?;

        let row = sqlx::query_as::<_, ConsumerRow>(&format!(
            "{SELECT_CONSUMER} WHERE channel_fk = $1 AND public_id = $2 AND deleted_at IS NULL"
        ))
        .bind(channel.id)
        .bind(public_id)
        .fetch_optional(&*self.pool)
        .await?;

        row.map(|row| row.into_consumer(channel)).ok_or(CoreError::NotFound)
    }

    /// Finds a consumer by internal id, rehydrating its channel.
    ///
    /// # Errors
    ///
    /// [`CoreError::NotFound`] when no live row matches.
    pub async fn find_by_id(&self, id: ConsumerId) -> Result<Consumer> {
        let row = sqlx::query_as::<_, ConsumerRow>(&format!(
            "{SELECT_CONSUMER} WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(id)
        .fetch_optional(&*self.pool)
        .await?
        .ok_or(CoreError::NotFound)?;

        let channel = self.channels.find_by_id(row.channel_fk).await?;
        Ok(row.into_consumer(channel))
    }

    /// Returns the fan-out set: live push consumers of the channel.
    ///
    /// # Errors
    ///
    /// [`CoreError::NotFound`] for an unknown channel.
    pub async fn active_for_channel(&self, channel_public_id: &str) -> Result<Vec<Consumer>> {
        let channel = self.channels.find(channel_public_id).await?;

        let rows = sqlx::query_as::<_, ConsumerRow>(&format!(
            "{SELECT_CONSUMER} WHERE channel_fk = $1 AND consumer_type = 'push' \
                   AND deleted_at IS NULL \
             ORDER BY created_at ASC, id ASC"
        ))
        .bind(channel.id)
        .fetch_all(&*self.pool)
        .await?;

        Ok(rows.into_iter().map(|row| row.into_consumer(channel.clone())).collect())
    }

    /// Lists a channel's consumers newest-first with cursor pagination.
    ///
    /// # Errors
    ///
    /// [`CoreError::PaginationDeadlock`] when both bounds are supplied,
    /// [`CoreError::NotFound`] for an unknown channel.
    pub async fn list(
        &self,
        channel_public_id: &str,
        page: &Pagination,
    ) -> Result<(Vec<Consumer>, Pagination)> {
        if page.is_deadlocked() {
            return Err(CoreError::PaginationDeadlock);
        }

        let channel = self.channels.find(channel_public_id).await?;

        let rows = if let Some(next) = page.next {
            sqlx::query_as::<_, ConsumerRow>(&format!(
                "{SELECT_CONSUMER} WHERE channel_fk = $1 AND deleted_at IS NULL \
                       AND (created_at, id) < ($2, $3) \
                 ORDER BY created_at DESC, id DESC LIMIT $4"
            ))
            .bind(channel.id)
            .bind(next.created_at)
            .bind(next.id)
            .bind(PAGE_SIZE)
            .fetch_all(&*self.pool)
            .await?
        } else if let Some(previous) = page.previous {
            let mut rows = sqlx::query_as::<_, ConsumerRow>(&format!(
                "{SELECT_CONSUMER} WHERE channel_fk = $1 AND deleted_at IS NULL \
                       AND (created_at, id) > ($2, $3) \
                 ORDER BY created_at ASC, id ASC LIMIT $4"
            ))
            .bind(channel.id)
            .bind(previous.created_at)
            .bind(previous.id)
            .bind(PAGE_SIZE)
            .fetch_all(&*self.pool)
            .await?;
            rows.reverse();
            rows
        } else {
            sqlx::query_as::<_, ConsumerRow>(&format!(
                "{SELECT_CONSUMER} WHERE channel_fk = $1 AND deleted_at IS NULL \
                 ORDER BY created_at DESC, id DESC LIMIT $2"
            ))
            .bind(channel.id)
            .bind(PAGE_SIZE)
            .fetch_all(&*self.pool)
            .await?
        };

        let consumers: Vec<Consumer> =
            rows.into_iter().map(|row| row.into_consumer(channel.clone())).collect();
        let page = Pagination::of_page(&consumers);
        Ok((consumers, page))
    }

    /// Soft-deletes a consumer.
    ///
    /// # Errors
    ///
    /// [`CoreError::NotFound`] when the consumer is already gone.
    pub async fn delete(&self, consumer: &Consumer) -> Result<()> {
        let channel = self.channels.find(&consumer.channel.public_id).await?;

        let result = sqlx::query(
            "UPDATE consumers SET deleted_at = $1, updated_at = $1 \
             WHERE channel_fk = $2 AND public_id = $3 AND deleted_at IS NULL",
        )
        .bind(Utc::now())
        .bind(channel.id)
        .bind(&consumer.public_id)
        .execute(&*self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound);
        }
        Ok(())
    }
}
