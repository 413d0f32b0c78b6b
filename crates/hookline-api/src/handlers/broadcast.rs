//! Producer publish endpoint.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use hookline_core::{storage::Storage, CoreError, Message};
use serde::Serialize;
use tracing::{debug, info};

use super::{optional_header, require_header, ApiError, ApiResult};

/// Producer identity header.
pub const PRODUCER_ID_HEADER: &str = "X-Hookline-Producer-Id";
/// Producer token header.
pub const PRODUCER_TOKEN_HEADER: &str = "X-Hookline-Producer-Token";
/// Optional producer-supplied idempotency key header.
pub const MESSAGE_ID_HEADER: &str = "X-Hookline-Message-Id";
/// Optional dispatch priority header.
pub const PRIORITY_HEADER: &str = "X-Hookline-Priority";

#[derive(Serialize)]
struct BroadcastResponse {
    message_id: String,
    status: String,
}

/// Accepts a message for fan-out on the channel.
///
/// Authenticated by the producer headers. A replayed idempotency key is
/// translated from the duplicate sentinel into `208 Already Reported`, so
/// producer retries are harmless.
pub async fn broadcast(
    Path(channel_id): Path<String>,
    State(storage): State<Storage>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match accept_message(&storage, &channel_id, &headers, body).await {
        Ok(message) => {
            info!(channel = %channel_id, message_id = %message.source_message_id, "message accepted");
            let body = BroadcastResponse {
                message_id: message.source_message_id,
                status: message.status.to_string(),
            };
            (StatusCode::CREATED, Json(body)).into_response()
        },
        Err(ApiError::Core(CoreError::DuplicateMessage)) => {
            debug!(channel = %channel_id, "duplicate publish treated as success");
            StatusCode::ALREADY_REPORTED.into_response()
        },
        Err(err) => err.into_response(),
    }
}

async fn accept_message(
    storage: &Storage,
    channel_id: &str,
    headers: &HeaderMap,
    body: Bytes,
) -> ApiResult<Message> {
    let producer_id = require_header(headers, PRODUCER_ID_HEADER)?;
    let producer_token = require_header(headers, PRODUCER_TOKEN_HEADER)?;

    let channel = storage.channels.find(channel_id).await?;
    let producer = match storage.producers.find(producer_id).await {
        Ok(producer) => producer,
        // An unknown producer is an authentication failure, not a 404:
        // the channel is the resource here, the producer the credential.
        Err(CoreError::NotFound) => return Err(ApiError::Unauthorized),
        Err(err) => return Err(err.into()),
    };
    if producer.token != producer_token {
        return Err(ApiError::Unauthorized);
    }

    let content_type =
        optional_header(headers, "content-type").unwrap_or("application/octet-stream");
    let payload = String::from_utf8(body.to_vec())
        .map_err(|_| ApiError::BadRequest("payload must be valid UTF-8".into()))?;

    let mut message = Message::new(&channel, &producer, &payload, content_type)?;
    if let Some(message_id) = optional_header(headers, MESSAGE_ID_HEADER) {
        if message_id.is_empty() {
            return Err(ApiError::BadRequest("message id header must not be empty".into()));
        }
        message.source_message_id = message_id.to_string();
    }
    if let Some(priority) = optional_header(headers, PRIORITY_HEADER) {
        message.priority = priority
            .parse()
            .map_err(|_| ApiError::BadRequest("priority header must be an integer".into()))?;
    }

    Ok(storage.messages.create(&message).await?)
}
