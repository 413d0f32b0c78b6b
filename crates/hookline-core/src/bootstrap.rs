//! Coordinated seed application across broker nodes.
//!
//! Every node computes a fingerprint of its configured seed data and
//! compares it to the singleton app row. The first node to notice a stale
//! fingerprint takes the bootstrap lock, upserts the seed entities through
//! the normal factories and repositories, and records the new fingerprint.
//! Nodes losing the lock race simply skip; the winner's work is visible to
//! everyone through the database.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    error::Result,
    models::{AppStatus, Channel, Consumer, Producer},
    storage::Storage,
};

/// Name of the advisory lock serializing seed application.
pub const BOOTSTRAP_LOCK: &str = "hookline-bootstrap";

/// Locks older than this are presumed abandoned by a crashed node.
const STALE_LOCK_AGE: std::time::Duration = std::time::Duration::from_secs(300);

/// A seed channel or producer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedResource {
    /// Business key.
    pub public_id: String,
    /// Shared-secret token.
    pub token: String,
    /// Optional display name; defaults to the business key.
    #[serde(default)]
    pub name: Option<String>,
}

/// A seed consumer subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedConsumer {
    /// Business key of the owning channel; must appear in the seed
    /// channels or already exist.
    pub channel: String,
    /// Business key.
    pub public_id: String,
    /// Shared-secret token.
    pub token: String,
    /// Absolute callback URL.
    pub callback_url: String,
}

/// Declarative initial state applied once per fingerprint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeedData {
    /// Channels to upsert.
    #[serde(default)]
    pub channels: Vec<SeedResource>,
    /// Producers to upsert.
    #[serde(default)]
    pub producers: Vec<SeedResource>,
    /// Consumers to upsert.
    #[serde(default)]
    pub consumers: Vec<SeedConsumer>,
}

impl SeedData {
    /// SHA-256 fingerprint of the canonical JSON encoding.
    pub fn fingerprint(&self) -> String {
        let canonical = serde_json::to_string(self).unwrap_or_default();
        hex::encode(Sha256::digest(canonical.as_bytes()))
    }
}

/// Applies seed data exactly once per fingerprint, fleet-wide.
///
/// # Errors
///
/// Surfaces repository failures; losing the lock race is not an error.
pub async fn bootstrap(storage: &Storage, seed: &SeedData) -> Result<()> {
    storage.app.ensure_exists().await?;

    let fingerprint = seed.fingerprint();
    let app = storage.app.get().await?;
    if app.status == AppStatus::Initialized && app.seed_data_hash == fingerprint {
        debug!("seed data already applied");
        return Ok(());
    }

    let owner = Uuid::new_v4().to_string();
    storage.locks.release_stale(STALE_LOCK_AGE).await?;
    if !storage.locks.acquire(BOOTSTRAP_LOCK, &owner).await? {
        info!("another node holds the bootstrap lock, skipping seed application");
        return Ok(());
    }

    let result = apply_seed(storage, seed, &fingerprint).await;
    if let Err(err) = storage.locks.release(BOOTSTRAP_LOCK, &owner).await {
        warn!(error = %err, "failed to release bootstrap lock");
    }

    result
}

async fn apply_seed(storage: &Storage, seed: &SeedData, fingerprint: &str) -> Result<()> {
    for resource in &seed.channels {
        let mut channel = Channel::new(&resource.public_id, &resource.token)?;
        if let Some(name) = &resource.name {
            channel.name = name.clone();
        }
        channel.quick_fix();
        storage.channels.store(&channel).await?;
    }

    for resource in &seed.producers {
        let mut producer = Producer::new(&resource.public_id, &resource.token)?;
        if let Some(name) = &resource.name {
            producer.name = name.clone();
        }
        producer.quick_fix();
        storage.producers.store(&producer).await?;
    }

    for subscription in &seed.consumers {
        let channel = storage.channels.find(&subscription.channel).await?;
        let consumer = Consumer::new(
            &channel,
            &subscription.public_id,
            &subscription.token,
            &subscription.callback_url,
        )?;
        storage.consumers.store(&consumer).await?;
    }

    // Re-read inside the lock: the fingerprint check above ran before the
    // lock was held.
    let app = storage.app.get().await?;
    storage.app.mark_initialized(&app, fingerprint).await?;

    info!(
        channels = seed.channels.len(),
        producers = seed.producers.len(),
        consumers = seed.consumers.len(),
        "seed data applied"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_stable_for_equal_seeds() {
        let seed = SeedData {
            channels: vec![SeedResource {
                public_id: "orders".into(),
                token: "tk".into(),
                name: None,
            }],
            producers: Vec::new(),
            consumers: Vec::new(),
        };
        assert_eq!(seed.fingerprint(), seed.clone().fingerprint());
    }

    #[test]
    fn fingerprint_changes_with_content() {
        let empty = SeedData::default();
        let seeded = SeedData {
            channels: vec![SeedResource {
                public_id: "orders".into(),
                token: "tk".into(),
                name: None,
            }],
            ..Default::default()
        };
        assert_ne!(empty.fingerprint(), seeded.fingerprint());
    }
}
