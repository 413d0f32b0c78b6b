//! Recovery sweeper re-queuing stalled work.
//!
//! Runs on a slower cadence than the dispatcher. Everything here is
//! best-effort: a failed sweep is logged and the next one retries, because
//! the database state it repairs only accumulates, never corrupts.

use std::time::Duration;

use hookline_core::storage::Storage;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::dispatcher::fan_out_message;

/// Tuning knobs for the recovery sweep.
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// Pause between sweeps.
    pub interval: Duration,
    /// Inflight jobs older than this are presumed abandoned.
    pub stuck_inflight_after: Duration,
    /// Accepted messages older than this get fan-out re-run.
    pub stuck_accepted_after: Duration,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            stuck_inflight_after: Duration::from_secs(300),
            stuck_accepted_after: Duration::from_secs(60),
        }
    }
}

/// Periodic scan for stuck messages and jobs.
pub struct Sweeper {
    storage: Storage,
    config: SweeperConfig,
    cancel: CancellationToken,
}

impl Sweeper {
    /// Builds a sweeper over the given storage.
    pub fn new(storage: Storage, config: SweeperConfig, cancel: CancellationToken) -> Self {
        Self { storage, config, cancel }
    }

    /// Runs sweeps until cancelled.
    pub async fn run(self) {
        info!(interval_secs = self.config.interval.as_secs(), "recovery sweeper started");

        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => break,
                _ = ticker.tick() => self.sweep().await,
            }
        }

        info!("recovery sweeper stopped");
    }

    /// One recovery pass: requeue abandoned inflight jobs, then re-run
    /// fan-out for messages stuck in `Accepted`.
    pub async fn sweep(&self) {
        let requeued =
            self.storage.jobs.requeue_stuck_inflight(self.config.stuck_inflight_after).await;
        if requeued > 0 {
            info!(requeued, "re-queued stuck inflight jobs");
        }

        let stalled =
            self.storage.messages.not_dispatched_for(self.config.stuck_accepted_after).await;
        for message in &stalled {
            if let Err(err) = fan_out_message(&self.storage, message).await {
                error!(message_id = %message.id, error = %err, "stuck message fan-out failed");
            }
        }
        if !stalled.is_empty() {
            info!(messages = stalled.len(), "re-ran fan-out for stuck messages");
        }
    }
}
