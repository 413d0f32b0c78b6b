//! Channel admin endpoints: channel CRUD, consumer CRUD, message listing.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use hookline_core::{storage::Storage, Channel, Consumer};
use serde::{Deserialize, Serialize};

use super::{
    require_header, ApiError, ApiResult, ChannelRepr, ConsumerRepr, MessageRepr, PageLinks,
    PageQuery,
};

/// Channel token header guarding channel-scoped admin reads and writes.
pub const CHANNEL_TOKEN_HEADER: &str = "X-Hookline-Channel-Token";

/// Channel create/update body.
#[derive(Debug, Deserialize)]
pub struct ChannelBody {
    /// Admin token.
    pub token: String,
    /// Optional display name; defaults to the business key.
    #[serde(default)]
    pub name: Option<String>,
}

/// Listing response shape shared by the admin endpoints.
#[derive(Debug, Serialize)]
pub struct ListResponse<T> {
    /// Current page of results.
    pub results: Vec<T>,
    /// Cursors bounding the page.
    pub pages: PageLinks,
}

/// Creates or updates a channel.
pub async fn put_channel(
    Path(channel_id): Path<String>,
    State(storage): State<Storage>,
    Json(body): Json<ChannelBody>,
) -> ApiResult<(StatusCode, Json<ChannelRepr>)> {
    let existed = storage.channels.find(&channel_id).await.is_ok();

    let mut channel = Channel::new(&channel_id, &body.token)?;
    if let Some(name) = body.name {
        channel.name = name;
    }
    channel.quick_fix();

    let stored = storage.channels.store(&channel).await?;
    let status = if existed { StatusCode::OK } else { StatusCode::CREATED };
    Ok((status, Json(ChannelRepr::from(&stored))))
}

/// Fetches one channel.
pub async fn get_channel(
    Path(channel_id): Path<String>,
    State(storage): State<Storage>,
) -> ApiResult<Json<ChannelRepr>> {
    let channel = storage.channels.find(&channel_id).await?;
    Ok(Json(ChannelRepr::from(&channel)))
}

/// Lists channels with cursor pagination.
pub async fn list_channels(
    State(storage): State<Storage>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<ListResponse<ChannelRepr>>> {
    let pagination = query.into_pagination()?;
    let (channels, page) = storage.channels.list(&pagination).await?;
    Ok(Json(ListResponse {
        results: channels.iter().map(ChannelRepr::from).collect(),
        pages: PageLinks::from(page),
    }))
}

/// Consumer create/update body.
#[derive(Debug, Deserialize)]
pub struct ConsumerBody {
    /// Callback signing token.
    pub token: String,
    /// Absolute callback URL.
    pub callback_url: String,
    /// Optional display name; defaults to the business key.
    #[serde(default)]
    pub name: Option<String>,
}

async fn authorized_channel(
    storage: &Storage,
    channel_id: &str,
    headers: &HeaderMap,
) -> ApiResult<Channel> {
    let token = require_header(headers, CHANNEL_TOKEN_HEADER)?;
    let channel = storage.channels.find(channel_id).await?;
    if channel.token != token {
        return Err(ApiError::Unauthorized);
    }
    Ok(channel)
}

/// Creates or updates a consumer on the channel.
///
/// Requires the channel token header.
pub async fn put_consumer(
    Path((channel_id, consumer_id)): Path<(String, String)>,
    State(storage): State<Storage>,
    headers: HeaderMap,
    Json(body): Json<ConsumerBody>,
) -> ApiResult<(StatusCode, Json<ConsumerRepr>)> {
    let channel = authorized_channel(&storage, &channel_id, &headers).await?;
    let existed = storage.consumers.find(&channel_id, &consumer_id).await.is_ok();

    let mut consumer = Consumer::new(&channel, &consumer_id, &body.token, &body.callback_url)?;
    if let Some(name) = body.name {
        consumer.name = name;
    }
    consumer.quick_fix();

    let stored = storage.consumers.store(&consumer).await?;
    let status = if existed { StatusCode::OK } else { StatusCode::CREATED };
    Ok((status, Json(ConsumerRepr::from(&stored))))
}

/// Fetches one consumer.
///
/// Requires the channel token header.
pub async fn get_consumer(
    Path((channel_id, consumer_id)): Path<(String, String)>,
    State(storage): State<Storage>,
    headers: HeaderMap,
) -> ApiResult<Json<ConsumerRepr>> {
    authorized_channel(&storage, &channel_id, &headers).await?;
    let consumer = storage.consumers.find(&channel_id, &consumer_id).await?;
    Ok(Json(ConsumerRepr::from(&consumer)))
}

/// Lists a channel's consumers with cursor pagination.
///
/// Requires the channel token header.
pub async fn list_consumers(
    Path(channel_id): Path<String>,
    State(storage): State<Storage>,
    headers: HeaderMap,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<ListResponse<ConsumerRepr>>> {
    authorized_channel(&storage, &channel_id, &headers).await?;
    let pagination = query.into_pagination()?;
    let (consumers, page) = storage.consumers.list(&channel_id, &pagination).await?;
    Ok(Json(ListResponse {
        results: consumers.iter().map(ConsumerRepr::from).collect(),
        pages: PageLinks::from(page),
    }))
}

/// Soft-deletes a channel.
///
/// Requires the channel token header.
pub async fn delete_channel(
    Path(channel_id): Path<String>,
    State(storage): State<Storage>,
    headers: HeaderMap,
) -> ApiResult<StatusCode> {
    let channel = authorized_channel(&storage, &channel_id, &headers).await?;
    storage.channels.delete(&channel).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Soft-deletes a consumer.
///
/// Requires the channel token header.
pub async fn delete_consumer(
    Path((channel_id, consumer_id)): Path<(String, String)>,
    State(storage): State<Storage>,
    headers: HeaderMap,
) -> ApiResult<StatusCode> {
    authorized_channel(&storage, &channel_id, &headers).await?;
    let consumer = storage.consumers.find(&channel_id, &consumer_id).await?;
    storage.consumers.delete(&consumer).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Lists a channel's messages newest-first with cursor pagination.
///
/// Requires the channel token header. An ill-formed cursor pair surfaces
/// as `400` through the pagination-deadlock error.
pub async fn list_channel_messages(
    Path(channel_id): Path<String>,
    State(storage): State<Storage>,
    headers: HeaderMap,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<ListResponse<MessageRepr>>> {
    authorized_channel(&storage, &channel_id, &headers).await?;
    let pagination = query.into_pagination()?;
    let (messages, page) = storage.messages.list_for_channel(&channel_id, &pagination).await?;
    Ok(Json(ListResponse {
        results: messages.iter().map(MessageRepr::from).collect(),
        pages: PageLinks::from(page),
    }))
}
