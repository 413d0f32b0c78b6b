//! Repository layer translating between aggregates and rows.
//!
//! All database access goes through these repositories; SQL outside this
//! module is forbidden so the schema can evolve without touching domain
//! logic. The message repository reaches its channel and producer
//! collaborators through the [`ChannelStore`] / [`ProducerStore`] seams so
//! tests can substitute failing doubles.

use std::sync::Arc;

use futures::future::BoxFuture;
use sqlx::PgPool;

use crate::{
    error::Result,
    models::{Channel, ChannelId, Producer, ProducerId},
};

pub mod app;
pub mod channels;
pub mod consumers;
pub mod jobs;
pub mod locks;
pub mod messages;
pub mod producers;

pub use app::AppRepository;
pub use channels::ChannelRepository;
pub use consumers::ConsumerRepository;
pub use jobs::JobRepository;
pub use locks::LockRepository;
pub use messages::MessageRepository;
pub use producers::ProducerRepository;

/// Channel lookups required by collaborating repositories.
pub trait ChannelStore: Send + Sync {
    /// Finds a live channel by business key.
    fn find<'a>(&'a self, public_id: &'a str) -> BoxFuture<'a, Result<Channel>>;

    /// Finds a channel by internal id, used for rehydration.
    fn find_by_id(&self, id: ChannelId) -> BoxFuture<'_, Result<Channel>>;
}

/// Producer lookups required by collaborating repositories.
pub trait ProducerStore: Send + Sync {
    /// Finds a live producer by business key.
    fn find<'a>(&'a self, public_id: &'a str) -> BoxFuture<'a, Result<Producer>>;

    /// Finds a producer by internal id, used for rehydration.
    fn find_by_id(&self, id: ProducerId) -> BoxFuture<'_, Result<Producer>>;
}

/// Container wiring every repository onto one shared pool.
#[derive(Clone)]
pub struct Storage {
    pool: PgPool,
    /// Channel CRUD.
    pub channels: Arc<ChannelRepository>,
    /// Producer CRUD.
    pub producers: Arc<ProducerRepository>,
    /// Consumer CRUD, keyed within a channel.
    pub consumers: Arc<ConsumerRepository>,
    /// Message persistence, pagination, and the stuck-message scan.
    pub messages: Arc<MessageRepository>,
    /// Delivery-job lifecycle: fan-out, claim, outcome recording.
    pub jobs: Arc<JobRepository>,
    /// Named advisory locks.
    pub locks: Arc<LockRepository>,
    /// Singleton bootstrap row.
    pub app: Arc<AppRepository>,
}

impl Storage {
    /// Wires all repositories onto `pool`.
    pub fn new(pool: PgPool) -> Self {
        let shared = Arc::new(pool.clone());

        let channels = Arc::new(ChannelRepository::new(shared.clone()));
        let producers = Arc::new(ProducerRepository::new(shared.clone()));
        let consumers = Arc::new(ConsumerRepository::new(
            shared.clone(),
            channels.clone() as Arc<dyn ChannelStore>,
        ));
        let messages = Arc::new(MessageRepository::new(
            shared.clone(),
            channels.clone() as Arc<dyn ChannelStore>,
            producers.clone() as Arc<dyn ProducerStore>,
        ));
        let jobs = Arc::new(JobRepository::new(shared.clone(), messages.clone(), consumers.clone()));
        let locks = Arc::new(LockRepository::new(shared.clone()));
        let app = Arc::new(AppRepository::new(shared));

        Self { pool, channels, producers, consumers, messages, jobs, locks, app }
    }

    /// Returns the shared pool, for transaction scoping and health checks.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Pings the database.
    ///
    /// # Errors
    ///
    /// Returns a database error when the pool is unhealthy.
    pub async fn health_check(&self) -> Result<()> {
        let _: (i32,) = sqlx::query_as("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }
}
