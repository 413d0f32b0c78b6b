//! Fixture builders for stored aggregates.
//!
//! Every helper goes through the production factories and repositories so
//! fixtures satisfy the same invariants real traffic does. Business keys
//! get a random suffix to keep parallel tests out of each other's way.

use anyhow::Result;
use hookline_core::{storage::Storage, Channel, Consumer, Producer};
use uuid::Uuid;

/// Returns a business key with a random suffix.
pub fn unique_id(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4().simple())
}

/// Creates and stores a channel.
pub async fn stored_channel(storage: &Storage, prefix: &str) -> Result<Channel> {
    let channel = Channel::new(&unique_id(prefix), "channel-token")?;
    Ok(storage.channels.store(&channel).await?)
}

/// Creates and stores a producer.
pub async fn stored_producer(storage: &Storage, prefix: &str) -> Result<Producer> {
    let producer = Producer::new(&unique_id(prefix), "producer-token")?;
    Ok(storage.producers.store(&producer).await?)
}

/// Creates and stores a push consumer on `channel`.
pub async fn stored_consumer(
    storage: &Storage,
    channel: &Channel,
    prefix: &str,
    callback_url: &str,
) -> Result<Consumer> {
    let consumer = Consumer::new(channel, &unique_id(prefix), "consumer-token", callback_url)?;
    Ok(storage.consumers.store(&consumer).await?)
}
