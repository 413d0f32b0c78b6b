//! Producer repository.

use std::sync::Arc;

use chrono::Utc;
use futures::future::BoxFuture;
use sqlx::PgPool;

use crate::{
    error::{CoreError, Result},
    models::{Producer, ProducerId},
    pagination::{Pagination, PAGE_SIZE},
    storage::ProducerStore,
};

const SELECT_PRODUCER: &str = "SELECT id, public_id, name, token, created_at, updated_at, deleted_at \
     FROM producers";

/// Repository for producer rows.
pub struct ProducerRepository {
    pool: Arc<PgPool>,
}

impl ProducerRepository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Persists a producer, keyed on its business key.
    ///
    /// Same contract as the channel repository: one atomic
    /// `INSERT .. ON CONFLICT` statement, so a create race resolves as an
    /// update instead of a unique violation, the optimistic guard rides
    /// in the conflict action, and storing a soft-deleted business key
    /// revives the row.
    ///
    /// # Errors
    ///
    /// [`CoreError::InvalidState`] on a failed validity predicate,
    /// [`CoreError::StaleData`] on a lost optimistic race.
    pub async fn store(&self, producer: &Producer) -> Result<Producer> {
        if !producer.is_in_valid_state() {
            return Err(CoreError::InvalidState);
        }

        let guard = match self.find(&producer.public_id).await {
            Ok(existing) => Some(existing.updated_at),
            Err(CoreError::NotFound) => None,
            Err(err) => return Err(err),
        };

        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO producers (id, public_id, name, token, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $5) \
             ON CONFLICT (public_id) DO UPDATE \
                 SET name = EXCLUDED.name, token = EXCLUDED.token, \
                     updated_at = EXCLUDED.updated_at, deleted_at = NULL \
                 WHERE producers.updated_at = $6 OR $6 IS NULL",
        )
        .bind(producer.id)
        .bind(&producer.public_id)
        .bind(&producer.name)
        .bind(&producer.token)
        .bind(now)
        .bind(guard)
        .execute(&*self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::StaleData);
        }

        self.find(&producer.public_id).await
    }

    /// Finds a live producer by business key.
    ///
    /// # Errors
    ///
    /// [`CoreError::NotFound`] when no live row matches.
    pub async fn find(&self, public_id: &str) -> Result<Producer> {
        let producer = sqlx::query_as::<_, Producer>(&format!(
            "{SELECT_PRODUCER} WHERE public_id = $1 AND deleted_at IS NULL"
        ))
        .bind(public_id)
        .fetch_optional(&*self.pool)
        .await?;

        producer.ok_or(CoreError::NotFound)
    }

    /// Finds a producer by internal id.
    ///
    /// # Errors
    ///
    /// [`CoreError::NotFound`] when no live row matches.
    pub async fn find_by_id(&self, id: ProducerId) -> Result<Producer> {
        let producer = sqlx::query_as::<_, Producer>(&format!(
            "{SELECT_PRODUCER} WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(id)
        .fetch_optional(&*self.pool)
        .await?;

        producer.ok_or(CoreError::NotFound)
    }

    /// Lists producers newest-first with cursor pagination.
    ///
    /// # Errors
    ///
    /// [`CoreError::PaginationDeadlock`] when both bounds are supplied.
    pub async fn list(&self, page: &Pagination) -> Result<(Vec<Producer>, Pagination)> {
        if page.is_deadlocked() {
            return Err(CoreError::PaginationDeadlock);
        }

        let producers = if let Some(next) = page.next {
            sqlx::query_as::<_, Producer>(&format!(
                "{SELECT_PRODUCER} WHERE deleted_at IS NULL AND (created_at, id) < ($1, $2) \
                 ORDER BY created_at DESC, id DESC LIMIT $3"
            ))
            .bind(next.created_at)
            .bind(next.id)
            .bind(PAGE_SIZE)
            .fetch_all(&*self.pool)
            .await?
        } else if let Some(previous) = page.previous {
            let mut rows = sqlx::query_as::<_, Producer>(&format!(
                "{SELECT_PRODUCER} WHERE deleted_at IS NULL AND (created_at, id) > ($1, $2) \
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
            sqlx::query_as::<_, Producer>(&format!(
                "{SELECT_PRODUCER} WHERE deleted_at IS NULL \
                 ORDER BY created_at DESC, id DESC LIMIT $1"
            ))
            .bind(PAGE_SIZE)
            .fetch_all(&*self.pool)
            .await?
        };

        let page = Pagination::of_page(&producers);
        Ok((producers, page))
    }

    /// Soft-deletes a producer.
    ///
    /// # Errors
    ///
    /// [`CoreError::NotFound`] when the producer is already gone.
    pub async fn delete(&self, producer: &Producer) -> Result<()> {
        let result = sqlx::query(
            "UPDATE producers SET deleted_at = $1, updated_at = $1 \
             WHERE public_id = $2 AND deleted_at IS NULL",
        )
        .bind(Utc::now())
        .bind(&producer.public_id)
        .execute(&*self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound);
        }
        Ok(())
    }
}

impl ProducerStore for ProducerRepository {
    fn find<'a>(&'a self, public_id: &'a str) -> BoxFuture<'a, Result<Producer>> {
        Box::pin(self.find(public_id))
    }

    fn find_by_id(&self, id: ProducerId) -> BoxFuture<'_, Result<Producer>> {
        Box::pin(self.find_by_id(id))
    }
}
