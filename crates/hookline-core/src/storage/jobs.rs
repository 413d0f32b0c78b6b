//! Delivery job repository.
//!
//! Materializes fan-out under the ambient transaction, hands queued jobs
//! to workers through a `FOR UPDATE SKIP LOCKED` claim, and records
//! delivery outcomes. The unique `(message_fk, consumer_fk)` index makes
//! fan-out idempotent across dispatcher crash-restarts.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::error;
use uuid::Uuid;

use crate::{
    db::Session,
    error::{CoreError, Result},
    models::{ConsumerId, DeliveryJob, JobId, JobStatus, Message, MessageId},
    storage::{ConsumerRepository, MessageRepository},
};

const SELECT_JOB: &str = "SELECT id, message_fk, consumer_fk, status, retry_attempt_count, \
            dispatch_received_at, status_changed_at, earliest_next_attempt_at, incoming_ip, \
            priority, created_at, updated_at \
     FROM delivery_jobs";

const RETURNING_JOB: &str = "RETURNING id, message_fk, consumer_fk, status, retry_attempt_count, \
            dispatch_received_at, status_changed_at, earliest_next_attempt_at, incoming_ip, \
            priority, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct JobRow {
    id: JobId,
    message_fk: MessageId,
    consumer_fk: ConsumerId,
    status: JobStatus,
    retry_attempt_count: i32,
    dispatch_received_at: DateTime<Utc>,
    status_changed_at: DateTime<Utc>,
    earliest_next_attempt_at: DateTime<Utc>,
    incoming_ip: Option<String>,
    priority: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Repository for delivery job rows.
pub struct JobRepository {
    pool: Arc<PgPool>,
    messages: Arc<MessageRepository>,
    consumers: Arc<ConsumerRepository>,
}

impl JobRepository {
    /// Creates a new repository instance.
    pub fn new(
        pool: Arc<PgPool>,
        messages: Arc<MessageRepository>,
        consumers: Arc<ConsumerRepository>,
    ) -> Self {
        Self { pool, messages, consumers }
    }

    /// Transactional fan-out: inserts every job `Queued`, then marks the
    /// message dispatched, all under the ambient transaction.
    ///
    /// A job that already exists for its `(message, consumer)` pair is
    /// skipped, not an error, so re-running fan-out after a crash settles
    /// on the same job set. Any real failure aborts the caller's
    /// transaction and leaves the message `Accepted` for the next pass.
    ///
    /// # Errors
    ///
    /// [`CoreError::InvalidState`] for an invalid message or job,
    /// [`CoreError::NoActiveTransaction`] without an ambient transaction.
    pub async fn dispatch_message(
        &self,
        session: &mut Session<'_>,
        message: &Message,
        jobs: &[DeliveryJob],
    ) -> Result<()> {
        if !message.is_in_valid_state() {
            return Err(CoreError::InvalidState);
        }
        if jobs.iter().any(|job| !job.is_in_valid_state()) {
            return Err(CoreError::InvalidState);
        }

        let tx = session.tx()?;
        let now = Utc::now();
        for job in jobs {
            sqlx::query(
                "INSERT INTO delivery_jobs (id, message_fk, consumer_fk, status, \
                        retry_attempt_count, dispatch_received_at, status_changed_at, \
                        earliest_next_attempt_at, incoming_ip, priority, created_at, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
                 ON CONFLICT (message_fk, consumer_fk) DO NOTHING",
            )
            .bind(job.id)
            .bind(message.id)
            .bind(job.consumer.id)
            .bind(JobStatus::Queued)
            .bind(job.retry_attempt_count)
            .bind(job.dispatch_received_at)
            .bind(job.status_changed_at)
            .bind(job.earliest_next_attempt_at)
            .bind(&job.incoming_ip)
            .bind(job.priority)
            .bind(now)
            .bind(now)
            .execute(&mut **tx)
            .await?;
        }

        self.messages.set_dispatched(session, message).await
    }

    /// Atomically claims up to `limit` due jobs for delivery.
    ///
    /// Selects `Queued` jobs whose `earliest_next_attempt_at` has passed
    /// with `FOR UPDATE SKIP LOCKED`, so concurrent workers never
    /// double-claim, and transitions them to `Inflight` in the same
    /// transaction.
    ///
    /// # Errors
    ///
    /// Surfaces database failures; the dispatcher logs and retries.
    pub async fn claim_queued(&self, limit: i64) -> Result<Vec<DeliveryJob>> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let ids: Vec<Uuid> = sqlx::query_scalar(
            "SELECT id FROM delivery_jobs \
             WHERE status = 'queued' AND earliest_next_attempt_at <= $1 \
             ORDER BY priority DESC, earliest_next_attempt_at ASC \
             LIMIT $2 \
             FOR UPDATE SKIP LOCKED",
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&mut *tx)
        .await?;

        if ids.is_empty() {
            tx.rollback().await?;
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, JobRow>(&format!(
            "UPDATE delivery_jobs \
             SET status = 'inflight', status_changed_at = $1, updated_at = $1 \
             WHERE id = ANY($2) {RETURNING_JOB}"
        ))
        .bind(now)
        .bind(&ids)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        let mut jobs = Vec::with_capacity(rows.len());
        for row in rows {
            jobs.push(self.hydrate(row).await?);
        }
        Ok(jobs)
    }

    /// Records a successful callback: `Inflight → Delivered`, terminal.
    ///
    /// # Errors
    ///
    /// [`CoreError::StaleData`] when the job is no longer inflight.
    pub async fn mark_delivered(&self, job: &DeliveryJob) -> Result<()> {
        let result = sqlx::query(
            "UPDATE delivery_jobs SET status = 'delivered', status_changed_at = $1, \
                    updated_at = $1 \
             WHERE id = $2 AND status = 'inflight'",
        )
        .bind(Utc::now())
        .bind(job.id)
        .execute(&*self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::StaleData);
        }
        Ok(())
    }

    /// Records a failed callback that still has retry budget:
    /// `Inflight → Queued` with an incremented attempt count and the next
    /// earliest attempt time.
    ///
    /// # Errors
    ///
    /// [`CoreError::StaleData`] when the job is no longer inflight.
    pub async fn mark_failed(
        &self,
        job: &DeliveryJob,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE delivery_jobs SET status = 'queued', \
                    retry_attempt_count = retry_attempt_count + 1, \
                    earliest_next_attempt_at = $1, status_changed_at = $2, updated_at = $2 \
             WHERE id = $3 AND status = 'inflight'",
        )
        .bind(next_attempt_at)
        .bind(Utc::now())
        .bind(job.id)
        .execute(&*self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::StaleData);
        }
        Ok(())
    }

    /// Records a failure with the retry budget exhausted:
    /// `Inflight → Dead`, terminal.
    ///
    /// # Errors
    ///
    /// [`CoreError::StaleData`] when the job is no longer inflight.
    pub async fn mark_dead(&self, job: &DeliveryJob) -> Result<()> {
        let result = sqlx::query(
            "UPDATE delivery_jobs SET status = 'dead', \
                    retry_attempt_count = retry_attempt_count + 1, \
                    status_changed_at = $1, updated_at = $1 \
             WHERE id = $2 AND status = 'inflight'",
        )
        .bind(Utc::now())
        .bind(job.id)
        .execute(&*self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::StaleData);
        }
        Ok(())
    }

    /// Forces jobs stuck `Inflight` past `max_age` back to `Queued`; the
    /// claiming worker is presumed dead.
    ///
    /// Best-effort by contract: failures are logged and zero returned so
    /// the sweeper retries on its next pass.
    pub async fn requeue_stuck_inflight(&self, max_age: Duration) -> u64 {
        let Ok(age) = chrono::Duration::from_std(max_age) else {
            return 0;
        };
        let now = Utc::now();
        let cutoff = now - age;

        let result = sqlx::query(
            "UPDATE delivery_jobs SET status = 'queued', status_changed_at = $1, updated_at = $1 \
             WHERE status = 'inflight' AND status_changed_at <= $2",
        )
        .bind(now)
        .bind(cutoff)
        .execute(&*self.pool)
        .await;

        match result {
            Ok(done) => done.rows_affected(),
            Err(err) => {
                error!(error = %err, "stuck inflight requeue failed");
                0
            },
        }
    }

    /// Returns the jobs materialized for a message, oldest first.
    ///
    /// # Errors
    ///
    /// Surfaces query and rehydration failures.
    pub async fn find_for_message(&self, message_id: MessageId) -> Result<Vec<DeliveryJob>> {
        let rows = sqlx::query_as::<_, JobRow>(&format!(
            "{SELECT_JOB} WHERE message_fk = $1 ORDER BY created_at ASC, id ASC"
        ))
        .bind(message_id)
        .fetch_all(&*self.pool)
        .await?;

        let mut jobs = Vec::with_capacity(rows.len());
        for row in rows {
            jobs.push(self.hydrate(row).await?);
        }
        Ok(jobs)
    }

    /// Counts the jobs materialized for a message.
    ///
    /// # Errors
    ///
    /// Surfaces query failures.
    pub async fn count_for_message(&self, message_id: MessageId) -> Result<i64> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM delivery_jobs WHERE message_fk = $1")
                .bind(message_id)
                .fetch_one(&*self.pool)
                .await?;

        Ok(count.0)
    }

    async fn hydrate(&self, row: JobRow) -> Result<DeliveryJob> {
        let message = self.messages.get_by_id(row.message_fk).await?;
        let consumer = self.consumers.find_by_id(row.consumer_fk).await?;

        Ok(DeliveryJob {
            id: row.id,
            message,
            consumer,
            status: row.status,
            retry_attempt_count: row.retry_attempt_count,
            dispatch_received_at: row.dispatch_received_at,
            status_changed_at: row.status_changed_at,
            earliest_next_attempt_at: row.earliest_next_attempt_at,
            incoming_ip: row.incoming_ip,
            priority: row.priority,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
