//! Construction gates and validity predicates for the aggregate types.

use chrono::{DateTime, Utc};
use hookline_core::{Channel, Consumer, ConsumerType, CoreError, DeliveryJob, Message, Producer};

fn sample_channel() -> Channel {
    Channel::new("sample-channel", "channel-token").unwrap()
}

fn sample_producer() -> Producer {
    Producer::new("sample-producer", "producer-token").unwrap()
}

#[test]
fn consumer_requires_id_token_and_absolute_url() {
    let channel = sample_channel();

    let err = Consumer::new(&channel, "", "t", "http://h/").unwrap_err();
    assert!(matches!(err, CoreError::InsufficientInformation));

    let err = Consumer::new(&channel, "c1", "", "http://h/").unwrap_err();
    assert!(matches!(err, CoreError::InsufficientInformation));

    let err = Consumer::new(&channel, "c1", "tk", "./").unwrap_err();
    assert!(matches!(err, CoreError::InsufficientInformation));
}

#[test]
fn consumer_construction_defaults() {
    let channel = sample_channel();
    let consumer = Consumer::new(&channel, "c1", "tk", "http://imytech.net/").unwrap();

    assert_eq!(consumer.public_id, "c1");
    assert_eq!(consumer.name, "c1");
    assert_eq!(consumer.token, "tk");
    assert_eq!(consumer.consumer_type, ConsumerType::Push);
    assert_eq!(consumer.channel.public_id, channel.public_id);
    assert!(consumer.is_in_valid_state());
}

#[test]
fn consumer_quick_fix_restores_name_from_business_key() {
    let channel = sample_channel();
    let mut consumer = Consumer::new(&channel, "c1", "tk", "http://imytech.net/").unwrap();

    consumer.name.clear();
    assert!(!consumer.is_in_valid_state());

    consumer.quick_fix();
    assert!(consumer.is_in_valid_state());
    assert_eq!(consumer.name, "c1");
}

#[test]
fn consumer_invalid_when_mutated_out_of_shape() {
    let channel = sample_channel();
    let mut consumer = Consumer::new(&channel, "c1", "tk", "http://imytech.net/").unwrap();
    consumer.public_id.clear();
    assert!(!consumer.is_in_valid_state());

    let mut consumer = Consumer::new(&channel, "c1", "tk", "http://imytech.net/").unwrap();
    consumer.callback_url = "./".to_string();
    assert!(!consumer.is_in_valid_state());
}

#[test]
fn channel_and_producer_factories_reject_empty_input() {
    assert!(matches!(Channel::new("", "t"), Err(CoreError::InsufficientInformation)));
    assert!(matches!(Channel::new("ch", ""), Err(CoreError::InsufficientInformation)));
    assert!(matches!(Producer::new("", "t"), Err(CoreError::InsufficientInformation)));
    assert!(matches!(Producer::new("p", ""), Err(CoreError::InsufficientInformation)));
}

#[test]
fn channel_quick_fix_restores_name() {
    let mut channel = sample_channel();
    channel.name.clear();
    assert!(!channel.is_in_valid_state());
    channel.quick_fix();
    assert!(channel.is_in_valid_state());
    assert_eq!(channel.name, channel.public_id);
}

#[test]
fn message_factory_rejects_empty_payload_and_content_type() {
    let channel = sample_channel();
    let producer = sample_producer();

    assert!(matches!(
        Message::new(&channel, &producer, "", "a content type"),
        Err(CoreError::InsufficientInformation)
    ));
    assert!(matches!(
        Message::new(&channel, &producer, "some payload", ""),
        Err(CoreError::InsufficientInformation)
    ));
}

#[test]
fn message_validity_covers_receive_time_and_idempotency_key() {
    let channel = sample_channel();
    let producer = sample_producer();
    let message = Message::new(&channel, &producer, "some payload", "a content type").unwrap();
    assert!(message.is_in_valid_state());
    assert!(!message.source_message_id.is_empty());

    let mut cleared = message.clone();
    cleared.source_message_id.clear();
    assert!(!cleared.is_in_valid_state());
    cleared.quick_fix();
    assert!(cleared.is_in_valid_state());

    let mut zeroed = message.clone();
    zeroed.received_at = DateTime::<Utc>::UNIX_EPOCH;
    assert!(!zeroed.is_in_valid_state());
    zeroed.quick_fix();
    assert!(zeroed.is_in_valid_state());
}

#[test]
fn delivery_job_requires_valid_references() {
    let channel = sample_channel();
    let producer = sample_producer();
    let consumer = Consumer::new(&channel, "c1", "tk", "http://imytech.net/").unwrap();
    let message = Message::new(&channel, &producer, "some payload", "a content type").unwrap();

    let job = DeliveryJob::new(&message, &consumer).unwrap();
    assert!(job.is_in_valid_state());
    assert_eq!(job.priority, message.priority);
    assert_eq!(job.retry_attempt_count, 0);

    let mut broken_message = message.clone();
    broken_message.payload.clear();
    assert!(matches!(
        DeliveryJob::new(&broken_message, &consumer),
        Err(CoreError::InsufficientInformation)
    ));
}
