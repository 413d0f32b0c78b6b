//! End-to-end dispatcher and sweeper tests against a disposable database
//! and a mock consumer endpoint. Skips when no PostgreSQL is configured.

use std::time::Duration;

use hookline_core::{JobStatus, Message, MessageStatus};
use hookline_dispatch::{Dispatcher, DispatcherConfig, RetryPolicy, Sweeper, SweeperConfig};
use hookline_testing::{fixtures, TestDb};
use tokio_util::sync::CancellationToken;
use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

const SAMPLE_PAYLOAD: &str = "some payload";
const SAMPLE_CONTENT_TYPE: &str = "a content type";

fn dispatcher_with(storage: &hookline_core::storage::Storage, policy: RetryPolicy) -> Dispatcher {
    let config = DispatcherConfig { retry_policy: policy, ..Default::default() };
    Dispatcher::new(storage.clone(), config, CancellationToken::new()).unwrap()
}

async fn accepted_message(
    storage: &hookline_core::storage::Storage,
    callback_url: &str,
) -> Message {
    let channel = fixtures::stored_channel(storage, "ch").await.unwrap();
    let producer = fixtures::stored_producer(storage, "p").await.unwrap();
    fixtures::stored_consumer(storage, &channel, "c", callback_url).await.unwrap();

    let message = Message::new(&channel, &producer, SAMPLE_PAYLOAD, SAMPLE_CONTENT_TYPE).unwrap();
    storage.messages.create(&message).await.unwrap()
}

#[tokio::test]
async fn accepted_message_is_delivered_end_to_end() {
    let Some(db) = TestDb::try_new().await else { return };
    let storage = db.storage();

    let server = MockServer::start().await;
    Mock::given(matchers::method("POST"))
        .and(matchers::path("/hook"))
        .and(matchers::body_string(SAMPLE_PAYLOAD))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let message = accepted_message(&storage, &format!("{}/hook", server.uri())).await;
    let dispatcher = dispatcher_with(&storage, RetryPolicy::default());

    assert_eq!(dispatcher.fan_out_tick().await.unwrap(), 1);
    let read = storage.messages.get_by_id(message.id).await.unwrap();
    assert_eq!(read.status, MessageStatus::Dispatched);

    assert_eq!(dispatcher.delivery_tick().await.unwrap(), 1);
    let jobs = storage.jobs.find_for_message(message.id).await.unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].status, JobStatus::Delivered);
}

#[tokio::test]
async fn rejected_delivery_requeues_with_backoff() {
    let Some(db) = TestDb::try_new().await else { return };
    let storage = db.storage();

    let server = MockServer::start().await;
    Mock::given(matchers::method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let message = accepted_message(&storage, &server.uri()).await;
    let dispatcher = dispatcher_with(
        &storage,
        RetryPolicy {
            base_delay: std::time::Duration::from_secs(60),
            jitter_factor: 0.0,
            ..Default::default()
        },
    );

    dispatcher.fan_out_tick().await.unwrap();
    dispatcher.delivery_tick().await.unwrap();

    let jobs = storage.jobs.find_for_message(message.id).await.unwrap();
    assert_eq!(jobs[0].status, JobStatus::Queued);
    assert_eq!(jobs[0].retry_attempt_count, 1);
    assert!(jobs[0].earliest_next_attempt_at > jobs[0].dispatch_received_at);

    // The backoff horizon keeps the job out of the next claim.
    assert_eq!(dispatcher.delivery_tick().await.unwrap(), 0);
}

#[tokio::test]
async fn exhausted_retry_budget_goes_dead() {
    let Some(db) = TestDb::try_new().await else { return };
    let storage = db.storage();

    let server = MockServer::start().await;
    Mock::given(matchers::method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let message = accepted_message(&storage, &server.uri()).await;
    let dispatcher =
        dispatcher_with(&storage, RetryPolicy { max_attempts: 1, ..Default::default() });

    dispatcher.fan_out_tick().await.unwrap();
    dispatcher.delivery_tick().await.unwrap();

    let jobs = storage.jobs.find_for_message(message.id).await.unwrap();
    assert_eq!(jobs[0].status, JobStatus::Dead);
}

#[tokio::test]
async fn sweeper_recovers_stuck_accepted_messages() {
    let Some(db) = TestDb::try_new().await else { return };
    let storage = db.storage();

    let channel = fixtures::stored_channel(&storage, "ch").await.unwrap();
    let producer = fixtures::stored_producer(&storage, "p").await.unwrap();
    fixtures::stored_consumer(&storage, &channel, "c", "http://imytech.net/hook").await.unwrap();

    // A message the dispatcher never picked up.
    let mut message =
        Message::new(&channel, &producer, SAMPLE_PAYLOAD, SAMPLE_CONTENT_TYPE).unwrap();
    message.received_at -= chrono::Duration::seconds(120);
    let message = storage.messages.create(&message).await.unwrap();

    let sweeper = Sweeper::new(
        storage.clone(),
        SweeperConfig { stuck_accepted_after: Duration::from_secs(60), ..Default::default() },
        CancellationToken::new(),
    );
    sweeper.sweep().await;

    let read = storage.messages.get_by_id(message.id).await.unwrap();
    assert_eq!(read.status, MessageStatus::Dispatched);
    assert_eq!(storage.jobs.count_for_message(message.id).await.unwrap(), 1);
}
