//! Request handlers and HTTP error translation.

use axum::{
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use hookline_core::{Channel, Consumer, CoreError, Cursor, Message, Pagination, Producer};
use serde::{Deserialize, Serialize};

pub mod broadcast;
pub mod channels;
pub mod health;
pub mod producers;

pub use broadcast::broadcast;
pub use channels::{
    delete_channel, delete_consumer, get_channel, get_consumer, list_channel_messages,
    list_channels, list_consumers, put_channel, put_consumer,
};
pub use health::health;
pub use producers::{delete_producer, get_producer, list_producers, put_producer};

/// Result alias for handlers.
pub type ApiResult<T> = Result<T, ApiError>;

/// Handler-level error, translated to a status code and JSON body.
#[derive(Debug)]
pub enum ApiError {
    /// A domain error from the core.
    Core(CoreError),
    /// Missing or mismatched token.
    Unauthorized,
    /// A malformed request outside the domain's error set.
    BadRequest(String),
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        Self::Core(err)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::Core(err) => (status_for(&err), err.to_string()),
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, "invalid or missing token".into()),
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}

/// Maps the core error set onto HTTP status codes.
fn status_for(err: &CoreError) -> StatusCode {
    match err {
        CoreError::InsufficientInformation
        | CoreError::InvalidState
        | CoreError::PaginationDeadlock => StatusCode::BAD_REQUEST,
        CoreError::NotFound => StatusCode::NOT_FOUND,
        CoreError::DuplicateMessage | CoreError::DuplicateJob | CoreError::StaleData => {
            StatusCode::CONFLICT
        },
        CoreError::NoActiveTransaction | CoreError::Database(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        },
    }
}

/// Extracts a required header as a string.
pub(crate) fn require_header<'h>(headers: &'h HeaderMap, name: &str) -> ApiResult<&'h str> {
    headers.get(name).and_then(|value| value.to_str().ok()).ok_or(ApiError::Unauthorized)
}

/// Extracts an optional header as a string.
pub(crate) fn optional_header<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// Cursor query parameters accepted by listing endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    /// Encoded cursor towards newer rows.
    pub previous: Option<String>,
    /// Encoded cursor towards older rows.
    pub next: Option<String>,
}

impl PageQuery {
    /// Decodes into a pagination request.
    pub(crate) fn into_pagination(self) -> ApiResult<Pagination> {
        let decode = |raw: Option<String>| -> ApiResult<Option<Cursor>> {
            match raw {
                None => Ok(None),
                Some(raw) => Cursor::decode(&raw)
                    .map(Some)
                    .ok_or_else(|| ApiError::BadRequest("malformed page cursor".into())),
            }
        };

        Ok(Pagination { previous: decode(self.previous)?, next: decode(self.next)? })
    }
}

/// Outgoing page links.
#[derive(Debug, Serialize)]
pub struct PageLinks {
    /// Cursor towards newer rows, when the page had any.
    pub previous: Option<String>,
    /// Cursor towards older rows, when the page had any.
    pub next: Option<String>,
}

impl From<Pagination> for PageLinks {
    fn from(page: Pagination) -> Self {
        Self {
            previous: page.previous.map(|cursor| cursor.encode()),
            next: page.next.map(|cursor| cursor.encode()),
        }
    }
}

/// Channel representation returned to admins.
#[derive(Debug, Serialize)]
pub struct ChannelRepr {
    /// Business key.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Admin token.
    pub token: String,
    /// Creation time.
    pub created_at: chrono::DateTime<chrono::Utc>,
    /// Last update time.
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<&Channel> for ChannelRepr {
    fn from(channel: &Channel) -> Self {
        Self {
            id: channel.public_id.clone(),
            name: channel.name.clone(),
            token: channel.token.clone(),
            created_at: channel.created_at,
            updated_at: channel.updated_at,
        }
    }
}

/// Producer representation returned to admins.
#[derive(Debug, Serialize)]
pub struct ProducerRepr {
    /// Business key.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Publish token.
    pub token: String,
    /// Creation time.
    pub created_at: chrono::DateTime<chrono::Utc>,
    /// Last update time.
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<&Producer> for ProducerRepr {
    fn from(producer: &Producer) -> Self {
        Self {
            id: producer.public_id.clone(),
            name: producer.name.clone(),
            token: producer.token.clone(),
            created_at: producer.created_at,
            updated_at: producer.updated_at,
        }
    }
}

/// Consumer representation returned to admins.
#[derive(Debug, Serialize)]
pub struct ConsumerRepr {
    /// Business key, unique within the channel.
    pub id: String,
    /// Owning channel's business key.
    pub channel: String,
    /// Display name.
    pub name: String,
    /// Callback signing token.
    pub token: String,
    /// Absolute callback URL.
    pub callback_url: String,
    /// Push or pull.
    pub consumer_type: String,
    /// Creation time.
    pub created_at: chrono::DateTime<chrono::Utc>,
    /// Last update time.
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<&Consumer> for ConsumerRepr {
    fn from(consumer: &Consumer) -> Self {
        Self {
            id: consumer.public_id.clone(),
            channel: consumer.channel.public_id.clone(),
            name: consumer.name.clone(),
            token: consumer.token.clone(),
            callback_url: consumer.callback_url.clone(),
            consumer_type: consumer.consumer_type.to_string(),
            created_at: consumer.created_at,
            updated_at: consumer.updated_at,
        }
    }
}

/// Message representation returned on reads.
#[derive(Debug, Serialize)]
pub struct MessageRepr {
    /// Producer-supplied idempotency key.
    pub id: String,
    /// Publishing producer's business key.
    pub producer: String,
    /// Payload body.
    pub payload: String,
    /// Payload MIME type.
    pub content_type: String,
    /// Dispatch priority.
    pub priority: i32,
    /// Lifecycle status.
    pub status: String,
    /// When the broker accepted the publish.
    pub received_at: chrono::DateTime<chrono::Utc>,
    /// When fan-out completed, if it has.
    pub outboxed_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl From<&Message> for MessageRepr {
    fn from(message: &Message) -> Self {
        Self {
            id: message.source_message_id.clone(),
            producer: message.producer.public_id.clone(),
            payload: message.payload.clone(),
            content_type: message.content_type.clone(),
            priority: message.priority,
            status: message.status.to_string(),
            received_at: message.received_at,
            outboxed_at: message.outboxed_at,
        }
    }
}
