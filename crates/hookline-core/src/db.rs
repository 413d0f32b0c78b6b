//! Database gateway: pool construction and the ambient-transaction session.
//!
//! Mutating dispatcher operations require an open transaction. Rather than
//! smuggling one through task-local state, callers open a transaction on
//! the gateway, wrap it in a [`Session`], and pass that to the repository;
//! operations that must run transactionally call [`Session::tx`] and fail
//! with [`CoreError::NoActiveTransaction`] when handed a pool-backed
//! session. Composed operations share one transaction by reborrowing the
//! same session; commit on success and roll back on error at the scope
//! that opened it.

use std::time::Duration;

use sqlx::{postgres::PgPoolOptions, PgPool, Postgres, Transaction};

use crate::error::{CoreError, Result};

/// Connection gateway owning the shared pool.
#[derive(Clone)]
pub struct Db {
    pool: PgPool,
}

impl Db {
    /// Connects a pool with the given sizing.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Database`] when the pool cannot be established.
    pub async fn connect(
        url: &str,
        max_connections: u32,
        min_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(acquire_timeout)
            .connect(url)
            .await?;

        Ok(Self { pool })
    }

    /// Wraps an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns the shared pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Opens a transaction for an ambient [`Session`].
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Database`] when no connection is available.
    pub async fn begin(&self) -> Result<Transaction<'static, Postgres>> {
        Ok(self.pool.begin().await?)
    }
}

/// Execution context for repository operations.
///
/// `Pool` runs statements on the shared pool; `Tx` carries the ambient
/// transaction that transactional operations require.
pub enum Session<'c> {
    /// Auto-commit execution on the shared pool.
    Pool(&'c PgPool),
    /// Execution inside an open transaction.
    Tx(&'c mut Transaction<'static, Postgres>),
}

impl Session<'_> {
    /// Returns the ambient transaction.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NoActiveTransaction`] for pool-backed sessions.
    pub fn tx(&mut self) -> Result<&mut Transaction<'static, Postgres>> {
        match self {
            Session::Tx(tx) => Ok(&mut **tx),
            Session::Pool(_) => Err(CoreError::NoActiveTransaction),
        }
    }
}
