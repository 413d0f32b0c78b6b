//! Test infrastructure for hookline integration tests.
//!
//! Database-backed suites run against a disposable PostgreSQL database
//! created per test from `TEST_DATABASE_URL` (falling back to
//! `DATABASE_URL`). When neither points at a reachable server the suite
//! skips instead of failing, so unit-only environments stay green.

use anyhow::{Context, Result};
use hookline_core::storage::Storage;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

pub mod fixtures;

/// A disposable database with migrations applied.
///
/// Every instance gets a unique database name, so suites can run in
/// parallel without sharing state.
pub struct TestDb {
    pool: PgPool,
    database_name: String,
}

impl TestDb {
    /// Creates a fresh database, or `None` when no server is configured or
    /// reachable. Callers early-return on `None` to skip.
    pub async fn try_new() -> Option<Self> {
        init_tracing();

        let base_url = std::env::var("TEST_DATABASE_URL")
            .or_else(|_| std::env::var("DATABASE_URL"))
            .ok()?;

        match Self::create(&base_url).await {
            Ok(db) => Some(db),
            Err(err) => {
                eprintln!("skipping database test: {err:#}");
                None
            },
        }
    }

    async fn create(base_url: &str) -> Result<Self> {
        let database_name = format!("hookline_test_{}", Uuid::new_v4().simple());

        let admin_pool = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(std::time::Duration::from_secs(5))
            .connect(base_url)
            .await
            .context("connecting to the admin database")?;

        sqlx::query(&format!("CREATE DATABASE \"{database_name}\""))
            .execute(&admin_pool)
            .await
            .context("creating the test database")?;
        admin_pool.close().await;

        let mut url = url::Url::parse(base_url).context("parsing database url")?;
        url.set_path(&format!("/{database_name}"));

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(std::time::Duration::from_secs(5))
            .connect(url.as_str())
            .await
            .context("connecting to the test database")?;

        sqlx::migrate!("../../migrations").run(&pool).await.context("running migrations")?;

        Ok(Self { pool, database_name })
    }

    /// Returns the pool for this database.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Builds a repository container over this database.
    pub fn storage(&self) -> Storage {
        Storage::new(self.pool.clone())
    }

    /// Returns the generated database name, mostly for debugging.
    pub fn database_name(&self) -> &str {
        &self.database_name
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}
