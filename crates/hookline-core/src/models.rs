//! Aggregate types and strongly-typed identifiers.
//!
//! Every aggregate carries an internal UUID id plus repository-maintained
//! timestamps, a total validity predicate checked before every write, and a
//! `quick_fix` normalization that fills derivable defaults. Entities are
//! built through fallible factories; under-specified input is rejected at
//! construction time, never at the database.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::{CoreError, Result},
    pagination::{Cursor, Paginateable},
};

type PgDb = sqlx::Postgres;
type PgValueRef<'r> = sqlx::postgres::PgValueRef<'r>;
type PgTypeInfo = sqlx::postgres::PgTypeInfo;
type PgArgumentBuffer = sqlx::postgres::PgArgumentBuffer;
type EncodeResult =
    std::result::Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync + 'static>>;
type BoxDynError = sqlx::error::BoxDynError;

/// The singleton row id of the bootstrap [`App`] aggregate.
pub const APP_SINGLETON_ID: i16 = 1;

fn is_absolute_url(raw: &str) -> bool {
    url::Url::parse(raw).map(|u| u.has_host()).unwrap_or(false)
}

/// Strongly-typed channel identifier.
///
/// Wraps the internal UUID; the API-visible business key is
/// [`Channel::public_id`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelId(pub Uuid);

impl ChannelId {
    /// Creates a new random channel id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ChannelId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for ChannelId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl sqlx::Type<PgDb> for ChannelId {
    fn type_info() -> PgTypeInfo {
        <Uuid as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for ChannelId {
    fn decode(value: PgValueRef<'r>) -> std::result::Result<Self, BoxDynError> {
        Ok(Self(<Uuid as sqlx::Decode<PgDb>>::decode(value)?))
    }
}

impl sqlx::Encode<'_, PgDb> for ChannelId {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <Uuid as sqlx::Encode<PgDb>>::encode_by_ref(&self.0, buf)
    }
}

/// Strongly-typed producer identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProducerId(pub Uuid);

impl ProducerId {
    /// Creates a new random producer id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ProducerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProducerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for ProducerId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl sqlx::Type<PgDb> for ProducerId {
    fn type_info() -> PgTypeInfo {
        <Uuid as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for ProducerId {
    fn decode(value: PgValueRef<'r>) -> std::result::Result<Self, BoxDynError> {
        Ok(Self(<Uuid as sqlx::Decode<PgDb>>::decode(value)?))
    }
}

impl sqlx::Encode<'_, PgDb> for ProducerId {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <Uuid as sqlx::Encode<PgDb>>::encode_by_ref(&self.0, buf)
    }
}

/// Strongly-typed consumer identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConsumerId(pub Uuid);

impl ConsumerId {
    /// Creates a new random consumer id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConsumerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for ConsumerId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl sqlx::Type<PgDb> for ConsumerId {
    fn type_info() -> PgTypeInfo {
        <Uuid as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for ConsumerId {
    fn decode(value: PgValueRef<'r>) -> std::result::Result<Self, BoxDynError> {
        Ok(Self(<Uuid as sqlx::Decode<PgDb>>::decode(value)?))
    }
}

impl sqlx::Encode<'_, PgDb> for ConsumerId {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <Uuid as sqlx::Encode<PgDb>>::encode_by_ref(&self.0, buf)
    }
}

/// Strongly-typed message identifier (internal).
///
/// The producer-supplied idempotency key is [`Message::source_message_id`];
/// this id is assigned by the broker at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub Uuid);

impl MessageId {
    /// Creates a new random message id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for MessageId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl sqlx::Type<PgDb> for MessageId {
    fn type_info() -> PgTypeInfo {
        <Uuid as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for MessageId {
    fn decode(value: PgValueRef<'r>) -> std::result::Result<Self, BoxDynError> {
        Ok(Self(<Uuid as sqlx::Decode<PgDb>>::decode(value)?))
    }
}

impl sqlx::Encode<'_, PgDb> for MessageId {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <Uuid as sqlx::Encode<PgDb>>::encode_by_ref(&self.0, buf)
    }
}

/// Strongly-typed delivery job identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    /// Creates a new random job id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for JobId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl sqlx::Type<PgDb> for JobId {
    fn type_info() -> PgTypeInfo {
        <Uuid as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for JobId {
    fn decode(value: PgValueRef<'r>) -> std::result::Result<Self, BoxDynError> {
        Ok(Self(<Uuid as sqlx::Decode<PgDb>>::decode(value)?))
    }
}

impl sqlx::Encode<'_, PgDb> for JobId {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <Uuid as sqlx::Encode<PgDb>>::encode_by_ref(&self.0, buf)
    }
}

/// Message lifecycle status.
///
/// ```text
/// Accepted --fan-out--> Dispatched (terminal)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    /// Persisted from a producer publish; fan-out has not happened yet.
    Accepted,
    /// Fan-out materialized delivery jobs (or the channel had no consumers).
    Dispatched,
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Accepted => write!(f, "accepted"),
            Self::Dispatched => write!(f, "dispatched"),
        }
    }
}

impl sqlx::Type<PgDb> for MessageStatus {
    fn type_info() -> PgTypeInfo {
        <&str as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for MessageStatus {
    fn decode(value: PgValueRef<'r>) -> std::result::Result<Self, BoxDynError> {
        match <&str as sqlx::Decode<PgDb>>::decode(value)? {
            "accepted" => Ok(Self::Accepted),
            "dispatched" => Ok(Self::Dispatched),
            other => Err(format!("invalid message status: {other}").into()),
        }
    }
}

impl sqlx::Encode<'_, PgDb> for MessageStatus {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <String as sqlx::Encode<PgDb>>::encode_by_ref(&self.to_string(), buf)
    }
}

/// Delivery job lifecycle status.
///
/// ```text
/// Queued --claim--> Inflight --2xx--> Delivered (terminal)
///    ^                 |
///    |                 +--failure, retry budget left--> Queued
///    |                 +--failure, budget exhausted--> Dead (terminal)
///    +--sweeper (inflight too long)--+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting for a worker; eligible once `earliest_next_attempt_at` passes.
    Queued,
    /// Claimed by a worker; the callback is being attempted.
    Inflight,
    /// Callback returned 2xx. Terminal.
    Delivered,
    /// Retry budget exhausted. Terminal.
    Dead,
}

impl JobStatus {
    /// True for states that permit no further transition.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Dead)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queued => write!(f, "queued"),
            Self::Inflight => write!(f, "inflight"),
            Self::Delivered => write!(f, "delivered"),
            Self::Dead => write!(f, "dead"),
        }
    }
}

impl sqlx::Type<PgDb> for JobStatus {
    fn type_info() -> PgTypeInfo {
        <&str as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for JobStatus {
    fn decode(value: PgValueRef<'r>) -> std::result::Result<Self, BoxDynError> {
        match <&str as sqlx::Decode<PgDb>>::decode(value)? {
            "queued" => Ok(Self::Queued),
            "inflight" => Ok(Self::Inflight),
            "delivered" => Ok(Self::Delivered),
            "dead" => Ok(Self::Dead),
            other => Err(format!("invalid job status: {other}").into()),
        }
    }
}

impl sqlx::Encode<'_, PgDb> for JobStatus {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <String as sqlx::Encode<PgDb>>::encode_by_ref(&self.to_string(), buf)
    }
}

/// How a consumer receives messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConsumerType {
    /// The broker POSTs to the consumer's callback URL.
    #[default]
    Push,
    /// Reserved: the consumer polls the broker.
    Pull,
}

impl fmt::Display for ConsumerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Push => write!(f, "push"),
            Self::Pull => write!(f, "pull"),
        }
    }
}

impl sqlx::Type<PgDb> for ConsumerType {
    fn type_info() -> PgTypeInfo {
        <&str as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for ConsumerType {
    fn decode(value: PgValueRef<'r>) -> std::result::Result<Self, BoxDynError> {
        match <&str as sqlx::Decode<PgDb>>::decode(value)? {
            "push" => Ok(Self::Push),
            "pull" => Ok(Self::Pull),
            other => Err(format!("invalid consumer type: {other}").into()),
        }
    }
}

impl sqlx::Encode<'_, PgDb> for ConsumerType {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <String as sqlx::Encode<PgDb>>::encode_by_ref(&self.to_string(), buf)
    }
}

/// Bootstrap state of the singleton [`App`] row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppStatus {
    /// Seed data has not been applied on this deployment.
    NotInitialized,
    /// Seed data matching `seed_data_hash` has been applied.
    Initialized,
}

impl fmt::Display for AppStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotInitialized => write!(f, "not_initialized"),
            Self::Initialized => write!(f, "initialized"),
        }
    }
}

impl sqlx::Type<PgDb> for AppStatus {
    fn type_info() -> PgTypeInfo {
        <&str as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for AppStatus {
    fn decode(value: PgValueRef<'r>) -> std::result::Result<Self, BoxDynError> {
        match <&str as sqlx::Decode<PgDb>>::decode(value)? {
            "not_initialized" => Ok(Self::NotInitialized),
            "initialized" => Ok(Self::Initialized),
            other => Err(format!("invalid app status: {other}").into()),
        }
    }
}

impl sqlx::Encode<'_, PgDb> for AppStatus {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <String as sqlx::Encode<PgDb>>::encode_by_ref(&self.to_string(), buf)
    }
}

/// A named fan-out target carrying a shared-secret admin token.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Channel {
    /// Internal id.
    pub id: ChannelId,
    /// Unique business key, set by the operator.
    pub public_id: String,
    /// Human-readable name; defaults to the business key.
    pub name: String,
    /// Shared secret authorizing channel-scoped admin operations.
    pub token: String,
    /// First persisted at.
    pub created_at: DateTime<Utc>,
    /// Last persisted at.
    pub updated_at: DateTime<Utc>,
    /// Soft-delete marker; deleted rows stay out of every lookup.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Channel {
    /// Builds a channel from its business key and admin token.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InsufficientInformation`] when either input is
    /// empty.
    pub fn new(public_id: &str, token: &str) -> Result<Self> {
        if public_id.trim().is_empty() || token.trim().is_empty() {
            return Err(CoreError::InsufficientInformation);
        }
        let now = Utc::now();
        Ok(Self {
            id: ChannelId::new(),
            public_id: public_id.to_string(),
            name: public_id.to_string(),
            token: token.to_string(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        })
    }

    /// Total validity predicate; writes reject entities failing it.
    pub fn is_in_valid_state(&self) -> bool {
        !self.public_id.is_empty() && !self.name.is_empty() && !self.token.is_empty()
    }

    /// Fills derivable defaults: an empty name becomes the business key.
    pub fn quick_fix(&mut self) {
        if self.name.is_empty() {
            self.name = self.public_id.clone();
        }
    }
}

impl Paginateable for Channel {
    fn cursor(&self) -> Cursor {
        Cursor { created_at: self.created_at, id: self.id.0 }
    }
}

/// An authenticated publisher identity, independent of channels.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Producer {
    /// Internal id.
    pub id: ProducerId,
    /// Unique business key.
    pub public_id: String,
    /// Human-readable name; defaults to the business key.
    pub name: String,
    /// Shared secret presented on publish.
    pub token: String,
    /// First persisted at.
    pub created_at: DateTime<Utc>,
    /// Last persisted at.
    pub updated_at: DateTime<Utc>,
    /// Soft-delete marker.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Producer {
    /// Builds a producer from its business key and token.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InsufficientInformation`] when either input is
    /// empty.
    pub fn new(public_id: &str, token: &str) -> Result<Self> {
        if public_id.trim().is_empty() || token.trim().is_empty() {
            return Err(CoreError::InsufficientInformation);
        }
        let now = Utc::now();
        Ok(Self {
            id: ProducerId::new(),
            public_id: public_id.to_string(),
            name: public_id.to_string(),
            token: token.to_string(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        })
    }

    /// Total validity predicate.
    pub fn is_in_valid_state(&self) -> bool {
        !self.public_id.is_empty() && !self.name.is_empty() && !self.token.is_empty()
    }

    /// Fills derivable defaults: an empty name becomes the business key.
    pub fn quick_fix(&mut self) {
        if self.name.is_empty() {
            self.name = self.public_id.clone();
        }
    }
}

impl Paginateable for Producer {
    fn cursor(&self) -> Cursor {
        Cursor { created_at: self.created_at, id: self.id.0 }
    }
}

/// A channel subscriber with an HTTP callback URL.
///
/// Holds its owning channel as a relation for lookups; the channel never
/// owns consumers in memory. Rows store the channel's internal id and
/// rehydrate the aggregate on read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Consumer {
    /// Internal id.
    pub id: ConsumerId,
    /// Business key, unique within the owning channel.
    pub public_id: String,
    /// Owning channel (relation + rehydration, never ownership).
    pub channel: Channel,
    /// Human-readable name; defaults to the business key.
    pub name: String,
    /// Shared secret used to sign callback payloads.
    pub token: String,
    /// Absolute callback URL (scheme and host required).
    pub callback_url: String,
    /// Push (broker calls consumer) or the reserved pull mode.
    pub consumer_type: ConsumerType,
    /// First persisted at.
    pub created_at: DateTime<Utc>,
    /// Last persisted at.
    pub updated_at: DateTime<Utc>,
    /// Soft-delete marker.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Consumer {
    /// Builds a consumer subscribed to `channel`.
    ///
    /// The name defaults to the business key. The callback URL must be
    /// absolute; a relative URL like `./` is rejected here, never at the
    /// database.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InsufficientInformation`] for an empty business
    /// key or token, or a non-absolute callback URL.
    pub fn new(channel: &Channel, public_id: &str, token: &str, callback_url: &str) -> Result<Self> {
        if public_id.trim().is_empty() || token.trim().is_empty() {
            return Err(CoreError::InsufficientInformation);
        }
        if !is_absolute_url(callback_url) {
            return Err(CoreError::InsufficientInformation);
        }
        let now = Utc::now();
        Ok(Self {
            id: ConsumerId::new(),
            public_id: public_id.to_string(),
            channel: channel.clone(),
            name: public_id.to_string(),
            token: token.to_string(),
            callback_url: callback_url.to_string(),
            consumer_type: ConsumerType::Push,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        })
    }

    /// Total validity predicate.
    pub fn is_in_valid_state(&self) -> bool {
        !self.public_id.is_empty()
            && !self.name.is_empty()
            && !self.token.is_empty()
            && is_absolute_url(&self.callback_url)
    }

    /// Fills derivable defaults: an empty name becomes the business key.
    pub fn quick_fix(&mut self) {
        if self.name.is_empty() {
            self.name = self.public_id.clone();
        }
    }
}

impl Paginateable for Consumer {
    fn cursor(&self) -> Cursor {
        Cursor { created_at: self.created_at, id: self.id.0 }
    }
}

/// A single published payload, identified within its channel by the
/// producer-supplied `source_message_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Internal id.
    pub id: MessageId,
    /// Producer-supplied idempotency key, unique within the channel.
    ///
    /// The factory assigns a random one; the publish handler overwrites it
    /// when the producer sends its own.
    pub source_message_id: String,
    /// Channel the message was broadcast to.
    pub channel: Channel,
    /// Producer that published the message.
    pub producer: Producer,
    /// Opaque payload body.
    pub payload: String,
    /// MIME type of the payload.
    pub content_type: String,
    /// Dispatch priority, inherited by the fan-out jobs. Defaults to 0.
    pub priority: i32,
    /// Lifecycle status.
    pub status: MessageStatus,
    /// When the broker accepted the publish.
    pub received_at: DateTime<Utc>,
    /// When fan-out marked the message dispatched.
    pub outboxed_at: Option<DateTime<Utc>>,
    /// First persisted at.
    pub created_at: DateTime<Utc>,
    /// Last persisted at.
    pub updated_at: DateTime<Utc>,
}

impl Message {
    /// Builds an `Accepted` message on `channel` from `producer`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InsufficientInformation`] for an empty payload
    /// or content type.
    pub fn new(
        channel: &Channel,
        producer: &Producer,
        payload: &str,
        content_type: &str,
    ) -> Result<Self> {
        if payload.is_empty() || content_type.is_empty() {
            return Err(CoreError::InsufficientInformation);
        }
        let now = Utc::now();
        Ok(Self {
            id: MessageId::new(),
            source_message_id: Uuid::new_v4().to_string(),
            channel: channel.clone(),
            producer: producer.clone(),
            payload: payload.to_string(),
            content_type: content_type.to_string(),
            priority: 0,
            status: MessageStatus::Accepted,
            received_at: now,
            outboxed_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Total validity predicate.
    ///
    /// Requires payload, content type, idempotency key, resolvable channel
    /// and producer keys, and a non-epoch receive timestamp.
    pub fn is_in_valid_state(&self) -> bool {
        !self.payload.is_empty()
            && !self.content_type.is_empty()
            && !self.source_message_id.is_empty()
            && !self.channel.public_id.is_empty()
            && !self.producer.public_id.is_empty()
            && self.received_at != DateTime::<Utc>::UNIX_EPOCH
    }

    /// Fills derivable defaults: a cleared idempotency key gets a fresh
    /// random one, a zeroed receive timestamp becomes now.
    pub fn quick_fix(&mut self) {
        if self.source_message_id.is_empty() {
            self.source_message_id = Uuid::new_v4().to_string();
        }
        if self.received_at == DateTime::<Utc>::UNIX_EPOCH {
            self.received_at = Utc::now();
        }
    }
}

impl Paginateable for Message {
    fn cursor(&self) -> Cursor {
        Cursor { created_at: self.created_at, id: self.id.0 }
    }
}

/// Per-(message, consumer) delivery attempt record carrying the retry
/// state machine. Unique per message and consumer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryJob {
    /// Internal id.
    pub id: JobId,
    /// Message being delivered.
    pub message: Message,
    /// Consumer receiving the callback.
    pub consumer: Consumer,
    /// Lifecycle status.
    pub status: JobStatus,
    /// Failed attempts so far.
    pub retry_attempt_count: i32,
    /// When fan-out created the job.
    pub dispatch_received_at: DateTime<Utc>,
    /// When the status last changed; monotone per job.
    pub status_changed_at: DateTime<Utc>,
    /// Earliest wall-clock time the next attempt may run.
    pub earliest_next_attempt_at: DateTime<Utc>,
    /// Origin address of the publish, when fan-out ran on the request path.
    pub incoming_ip: Option<String>,
    /// Priority inherited from the message.
    pub priority: i32,
    /// First persisted at.
    pub created_at: DateTime<Utc>,
    /// Last persisted at.
    pub updated_at: DateTime<Utc>,
}

impl DeliveryJob {
    /// Builds a `Queued` job delivering `message` to `consumer`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InsufficientInformation`] when either reference
    /// is not in a valid state.
    pub fn new(message: &Message, consumer: &Consumer) -> Result<Self> {
        if !message.is_in_valid_state() || !consumer.is_in_valid_state() {
            return Err(CoreError::InsufficientInformation);
        }
        let now = Utc::now();
        Ok(Self {
            id: JobId::new(),
            message: message.clone(),
            consumer: consumer.clone(),
            status: JobStatus::Queued,
            retry_attempt_count: 0,
            dispatch_received_at: now,
            status_changed_at: now,
            earliest_next_attempt_at: now,
            incoming_ip: None,
            priority: message.priority,
            created_at: now,
            updated_at: now,
        })
    }

    /// Total validity predicate.
    pub fn is_in_valid_state(&self) -> bool {
        self.message.is_in_valid_state()
            && self.consumer.is_in_valid_state()
            && self.retry_attempt_count >= 0
            && self.status_changed_at >= self.dispatch_received_at
    }

    /// Fills derivable defaults: a zeroed next-attempt time becomes the
    /// status-change time.
    pub fn quick_fix(&mut self) {
        if self.earliest_next_attempt_at == DateTime::<Utc>::UNIX_EPOCH {
            self.earliest_next_attempt_at = self.status_changed_at;
        }
    }
}

/// Singleton bootstrap-state row coordinating seed application across
/// broker nodes. Exactly one row exists (`id = 1`).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct App {
    /// Always [`APP_SINGLETON_ID`].
    pub id: i16,
    /// SHA-256 fingerprint of the canonical seed data last applied.
    pub seed_data_hash: String,
    /// Whether the current seed data has been applied.
    pub status: AppStatus,
    /// Last transition time.
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_display_matches_storage_encoding() {
        assert_eq!(MessageStatus::Accepted.to_string(), "accepted");
        assert_eq!(MessageStatus::Dispatched.to_string(), "dispatched");
        assert_eq!(JobStatus::Queued.to_string(), "queued");
        assert_eq!(JobStatus::Inflight.to_string(), "inflight");
        assert_eq!(JobStatus::Delivered.to_string(), "delivered");
        assert_eq!(JobStatus::Dead.to_string(), "dead");
        assert_eq!(AppStatus::NotInitialized.to_string(), "not_initialized");
        assert_eq!(ConsumerType::Push.to_string(), "push");
    }

    #[test]
    fn terminal_job_states() {
        assert!(JobStatus::Delivered.is_terminal());
        assert!(JobStatus::Dead.is_terminal());
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Inflight.is_terminal());
    }

    #[test]
    fn absolute_url_check() {
        assert!(is_absolute_url("http://imytech.net/"));
        assert!(is_absolute_url("https://example.com/hook"));
        assert!(!is_absolute_url("./"));
        assert!(!is_absolute_url("/relative/path"));
        assert!(!is_absolute_url("mailto:nobody@example.com"));
    }
}
