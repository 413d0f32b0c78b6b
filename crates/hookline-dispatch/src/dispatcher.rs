//! Fan-out and delivery loops.
//!
//! Any number of dispatcher instances may run against the same database:
//! fan-out is idempotent through the unique `(message, consumer)` index
//! and delivery claims are serialized by `FOR UPDATE SKIP LOCKED`. Loop
//! errors are logged and the next tick retries; only cancellation stops a
//! dispatcher.

use std::time::Duration;

use chrono::Utc;
use hookline_core::{storage::Storage, CoreError, DeliveryJob, Message, Session};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    client::{CallbackClient, CallbackConfig},
    retry::RetryPolicy,
    Result, DEFAULT_CLAIM_BATCH, DEFAULT_FAN_OUT_BATCH,
};

/// Tuning knobs for the dispatcher loops.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Messages expanded per fan-out tick.
    pub fan_out_batch: i64,
    /// Jobs claimed per delivery tick.
    pub claim_batch: i64,
    /// Pause between ticks.
    pub poll_interval: Duration,
    /// Retry schedule for failed deliveries.
    pub retry_policy: RetryPolicy,
    /// Outbound HTTP client settings.
    pub callback: CallbackConfig,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            fan_out_batch: DEFAULT_FAN_OUT_BATCH,
            claim_batch: DEFAULT_CLAIM_BATCH,
            poll_interval: Duration::from_secs(1),
            retry_policy: RetryPolicy::default(),
            callback: CallbackConfig::default(),
        }
    }
}

/// Expands one accepted message into queued jobs within a single
/// transaction.
///
/// Loads the channel's active push consumers, builds one job per consumer,
/// and runs the transactional fan-out. A channel with no consumers sends
/// the message straight to `Dispatched`. Shared with the recovery sweeper.
///
/// # Errors
///
/// Surfaces repository failures; the message stays `Accepted` and the
/// next pass retries.
pub async fn fan_out_message(
    storage: &Storage,
    message: &Message,
) -> std::result::Result<usize, CoreError> {
    let consumers = storage.consumers.active_for_channel(&message.channel.public_id).await?;
    let jobs = consumers
        .iter()
        .map(|consumer| DeliveryJob::new(message, consumer))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut tx = storage.pool().begin().await?;
    {
        let mut session = Session::Tx(&mut tx);
        storage.jobs.dispatch_message(&mut session, message, &jobs).await?;
    }
    tx.commit().await?;

    debug!(message_id = %message.id, jobs = jobs.len(), "message fanned out");
    Ok(jobs.len())
}

/// The dispatcher: one fan-out loop and one delivery loop per instance.
pub struct Dispatcher {
    storage: Storage,
    client: CallbackClient,
    config: DispatcherConfig,
    cancel: CancellationToken,
}

impl Dispatcher {
    /// Builds a dispatcher over the given storage.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the callback client cannot be
    /// built.
    pub fn new(
        storage: Storage,
        config: DispatcherConfig,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let client = CallbackClient::new(config.callback.clone())?;
        Ok(Self { storage, client, config, cancel })
    }

    /// Runs fan-out and delivery ticks until cancelled.
    pub async fn run(self) {
        info!(
            fan_out_batch = self.config.fan_out_batch,
            claim_batch = self.config.claim_batch,
            "dispatcher started"
        );

        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(err) = self.fan_out_tick().await {
                        error!(error = %err, "fan-out tick failed");
                    }
                    if let Err(err) = self.delivery_tick().await {
                        error!(error = %err, "delivery tick failed");
                    }
                }
            }
        }

        info!("dispatcher stopped");
    }

    /// Expands a batch of accepted messages into delivery jobs.
    ///
    /// # Errors
    ///
    /// Surfaces the batch read failure; per-message fan-out failures are
    /// logged and skipped so one poisoned message cannot stall the rest.
    pub async fn fan_out_tick(&self) -> std::result::Result<usize, CoreError> {
        let messages = self.storage.messages.accepted_for_dispatch(self.config.fan_out_batch).await?;

        let mut fanned_out = 0;
        for message in &messages {
            match fan_out_message(&self.storage, message).await {
                Ok(_) => fanned_out += 1,
                Err(err) => {
                    error!(message_id = %message.id, error = %err, "fan-out failed");
                },
            }
        }
        Ok(fanned_out)
    }

    /// Claims due jobs and attempts their callbacks concurrently.
    ///
    /// # Errors
    ///
    /// Surfaces the claim failure; per-job outcomes are recorded
    /// individually.
    pub async fn delivery_tick(&self) -> std::result::Result<usize, CoreError> {
        let jobs = self.storage.jobs.claim_queued(self.config.claim_batch).await?;
        if jobs.is_empty() {
            return Ok(0);
        }

        let attempts = jobs.iter().map(|job| self.deliver_job(job));
        futures::future::join_all(attempts).await;
        Ok(jobs.len())
    }

    /// Attempts one claimed job and records the outcome.
    async fn deliver_job(&self, job: &DeliveryJob) {
        let success = match self.client.deliver(job).await {
            Ok(outcome) if outcome.is_success => true,
            Ok(outcome) => {
                warn!(
                    job_id = %job.id,
                    status = outcome.status_code,
                    "callback rejected delivery"
                );
                false
            },
            Err(err) => {
                warn!(job_id = %job.id, error = %err, "callback attempt failed");
                false
            },
        };

        let recorded = if success {
            self.storage.jobs.mark_delivered(job).await
        } else {
            let attempt = job.retry_attempt_count as u32 + 1;
            if self.config.retry_policy.is_exhausted(attempt) {
                warn!(job_id = %job.id, attempt, "retry budget exhausted, job is dead");
                self.storage.jobs.mark_dead(job).await
            } else {
                let next_attempt_at = self.config.retry_policy.next_attempt_at(attempt, Utc::now());
                self.storage.jobs.mark_failed(job, next_attempt_at).await
            }
        };

        if let Err(err) = recorded {
            // The sweeper re-queues the job once it looks abandoned.
            error!(job_id = %job.id, error = %err, "failed to record delivery outcome");
        }
    }
}
