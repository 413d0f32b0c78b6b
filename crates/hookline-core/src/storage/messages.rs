//! Message repository.
//!
//! Owns idempotent message insertion, paginated channel reads, the
//! dispatch status transition, and the stuck-message scan used by the
//! recovery sweeper. Channel and producer aggregates are rehydrated
//! through the store seams so the repository can be exercised against
//! failing collaborators.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::error;

use crate::{
    db::Session,
    error::{normalize_db_result, CoreError, Result, UniqueViolationTarget},
    models::{ChannelId, Message, MessageId, MessageStatus, ProducerId},
    pagination::{Pagination, PAGE_SIZE},
    storage::{ChannelStore, ProducerStore},
};

/// Upper bound on one stuck-message scan; the next sweep picks up the rest.
const STUCK_SCAN_LIMIT: i64 = 100;

const SELECT_MESSAGE: &str = "SELECT id, source_message_id, channel_fk, producer_fk, payload, content_type, \
            priority, status, received_at, outboxed_at, created_at, updated_at \
     FROM messages";

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: MessageId,
    source_message_id: String,
    channel_fk: ChannelId,
    producer_fk: ProducerId,
    payload: String,
    content_type: String,
    priority: i32,
    status: MessageStatus,
    received_at: DateTime<Utc>,
    outboxed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Repository for message rows.
pub struct MessageRepository {
    pool: Arc<PgPool>,
    channels: Arc<dyn ChannelStore>,
    producers: Arc<dyn ProducerStore>,
}

impl MessageRepository {
    /// Creates a new repository instance.
    pub fn new(
        pool: Arc<PgPool>,
        channels: Arc<dyn ChannelStore>,
        producers: Arc<dyn ProducerStore>,
    ) -> Self {
        Self { pool, channels, producers }
    }

    /// Persists a freshly accepted message.
    ///
    /// Channel and producer are resolved through their business keys; a
    /// missing aggregate propagates [`CoreError::NotFound`] before any row
    /// is written. A second message with the same `source_message_id` on
    /// the channel is rejected with [`CoreError::DuplicateMessage`], the
    /// publish idempotency signal.
    ///
    /// # Errors
    ///
    /// [`CoreError::InvalidState`], [`CoreError::NotFound`],
    /// [`CoreError::DuplicateMessage`].
    pub async fn create(&self, message: &Message) -> Result<Message> {
        if !message.is_in_valid_state() {
            return Err(CoreError::InvalidState);
        }

        let channel = self.channels.find(&message.channel.public_id).await?;
        let producer = self.producers.find(&message.producer.public_id).await?;
        let now = Utc::now();

        let insert = sqlx::query(
            "INSERT INTO messages (id, source_message_id, channel_fk, producer_fk, payload, \
                    content_type, priority, status, received_at, outboxed_at, created_at, \
                    updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(message.id)
        .bind(&message.source_message_id)
        .bind(channel.id)
        .bind(producer.id)
        .bind(&message.payload)
        .bind(&message.content_type)
        .bind(message.priority)
        .bind(message.status)
        .bind(message.received_at)
        .bind(message.outboxed_at)
        .bind(now)
        .bind(now)
        .execute(&*self.pool)
        .await;

        normalize_db_result(insert, UniqueViolationTarget::Message)?;

        let mut persisted = message.clone();
        persisted.channel = channel;
        persisted.producer = producer;
        persisted.created_at = now;
        persisted.updated_at = now;
        Ok(persisted)
    }

    /// Loads a message by `(channel business key, source message id)`.
    ///
    /// Foreign aggregates are rehydrated through the channel and producer
    /// seams; a failing producer lookup is surfaced to the caller verbatim.
    ///
    /// # Errors
    ///
    /// [`CoreError::NotFound`] for an unknown channel or message, or
    /// whatever the producer seam returns.
    pub async fn get(&self, channel_public_id: &str, source_message_id: &str) -> Result<Message> {
        let channel = self.channels.find(channel_public_id).await?;

        let row = sqlx::query_as::<_, MessageRow>(&format!(
            "{SELECT_MESSAGE} WHERE channel_fk = $1 AND source_message_id = $2"
        ))
        .bind(channel.id)
        .bind(source_message_id)
        .fetch_optional(&*self.pool)
        .await?
        .ok_or(CoreError::NotFound)?;

        let producer = self.producers.find_by_id(row.producer_fk).await?;
        Ok(assemble(row, channel.clone(), producer))
    }

    /// Loads a message by its internal id.
    ///
    /// # Errors
    ///
    /// [`CoreError::NotFound`] when no row matches.
    pub async fn get_by_id(&self, id: MessageId) -> Result<Message> {
        let row = sqlx::query_as::<_, MessageRow>(&format!("{SELECT_MESSAGE} WHERE id = $1"))
            .bind(id)
            .fetch_optional(&*self.pool)
            .await?
            .ok_or(CoreError::NotFound)?;

        self.hydrate(row).await
    }

    /// Lists a channel's messages newest-first with cursor pagination.
    ///
    /// A request carrying both bounds is rejected with
    /// [`CoreError::PaginationDeadlock`]; an unknown channel with
    /// [`CoreError::NotFound`]. A `next` cursor pages strictly older
    /// rows, a `previous` cursor strictly newer ones. The returned page
    /// bounds come from the boundary rows of the result; an exhausted
    /// cursor yields an empty page with no bounds.
    ///
    /// # Errors
    ///
    /// [`CoreError::PaginationDeadlock`], [`CoreError::NotFound`].
    pub async fn list_for_channel(
        &self,
        channel_public_id: &str,
        page: &Pagination,
    ) -> Result<(Vec<Message>, Pagination)> {
        if page.is_deadlocked() {
            return Err(CoreError::PaginationDeadlock);
        }

        let channel = self.channels.find(channel_public_id).await?;

        let rows = if let Some(next) = page.next {
            sqlx::query_as::<_, MessageRow>(&format!(
                "{SELECT_MESSAGE} WHERE channel_fk = $1 AND (created_at, id) < ($2, $3) \
                 ORDER BY created_at DESC, id DESC LIMIT $4"
            ))
            .bind(channel.id)
            .bind(next.created_at)
            .bind(next.id)
            .bind(PAGE_SIZE)
            .fetch_all(&*self.pool)
            .await?
        } else if let Some(previous) = page.previous {
            let mut rows = sqlx::query_as::<_, MessageRow>(&format!(
                "{SELECT_MESSAGE} WHERE channel_fk = $1 AND (created_at, id) > ($2, $3) \
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
            sqlx::query_as::<_, MessageRow>(&format!(
                "{SELECT_MESSAGE} WHERE channel_fk = $1 \
                 ORDER BY created_at DESC, id DESC LIMIT $2"
            ))
            .bind(channel.id)
            .bind(PAGE_SIZE)
            .fetch_all(&*self.pool)
            .await?
        };

        let mut messages = Vec::with_capacity(rows.len());
        for row in rows {
            let producer = self.producers.find_by_id(row.producer_fk).await?;
            messages.push(assemble(row, channel.clone(), producer));
        }

        let page = Pagination::of_page(&messages);
        Ok((messages, page))
    }

    /// Transitions a message `Accepted → Dispatched` under the ambient
    /// transaction, stamping `outboxed_at` and refreshing `updated_at`.
    ///
    /// # Errors
    ///
    /// [`CoreError::InvalidState`] when the message fails its validity
    /// predicate, [`CoreError::NoActiveTransaction`] when the session does
    /// not carry a transaction.
    pub async fn set_dispatched(&self, session: &mut Session<'_>, message: &Message) -> Result<()> {
        if !message.is_in_valid_state() {
            return Err(CoreError::InvalidState);
        }

        let tx = session.tx()?;
        let now = Utc::now();
        sqlx::query(
            "UPDATE messages SET status = $1, outboxed_at = $2, updated_at = $2 WHERE id = $3",
        )
        .bind(MessageStatus::Dispatched)
        .bind(now)
        .bind(message.id)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    /// Returns up to `limit` accepted messages for the fan-out tick,
    /// highest priority first, then oldest receive time.
    ///
    /// # Errors
    ///
    /// Surfaces query and rehydration failures; the dispatcher logs and
    /// retries on the next tick.
    pub async fn accepted_for_dispatch(&self, limit: i64) -> Result<Vec<Message>> {
        let rows = sqlx::query_as::<_, MessageRow>(&format!(
            "{SELECT_MESSAGE} WHERE status = 'accepted' \
             ORDER BY priority DESC, received_at ASC LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(&*self.pool)
        .await?;

        let mut messages = Vec::with_capacity(rows.len());
        for row in rows {
            messages.push(self.hydrate(row).await?);
        }
        Ok(messages)
    }

    /// Returns accepted messages whose receive time is at least `period`
    /// in the past, oldest first, bounded by an internal cap.
    ///
    /// Best-effort by contract: any query or rehydration failure is logged
    /// and an empty slice returned, so the sweeper simply retries on its
    /// next pass. Request-path reads must not reuse this shape.
    pub async fn not_dispatched_for(&self, period: Duration) -> Vec<Message> {
        let Ok(age) = chrono::Duration::from_std(period) else {
            return Vec::new();
        };
        let cutoff = Utc::now() - age;

        let rows = sqlx::query_as::<_, MessageRow>(&format!(
            "{SELECT_MESSAGE} WHERE status = 'accepted' AND received_at <= $1 \
             ORDER BY received_at ASC LIMIT $2"
        ))
        .bind(cutoff)
        .bind(STUCK_SCAN_LIMIT)
        .fetch_all(&*self.pool)
        .await;

        let rows = match rows {
            Ok(rows) => rows,
            Err(err) => {
                error!(error = %err, "stuck message scan failed");
                return Vec::new();
            },
        };

        let mut messages = Vec::with_capacity(rows.len());
        for row in rows {
            match self.hydrate(row).await {
                Ok(message) => messages.push(message),
                Err(err) => {
                    error!(error = %err, "stuck message rehydration failed");
                    return Vec::new();
                },
            }
        }
        messages
    }

    async fn hydrate(&self, row: MessageRow) -> Result<Message> {
        let channel = self.channels.find_by_id(row.channel_fk).await?;
        let producer = self.producers.find_by_id(row.producer_fk).await?;
        Ok(assemble(row, channel, producer))
    }
}

fn assemble(
    row: MessageRow,
    channel: crate::models::Channel,
    producer: crate::models::Producer,
) -> Message {
    Message {
        id: row.id,
        source_message_id: row.source_message_id,
        channel,
        producer,
        payload: row.payload,
        content_type: row.content_type,
        priority: row.priority,
        status: row.status,
        received_at: row.received_at,
        outboxed_at: row.outboxed_at,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}
