//! Producer admin endpoints.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use hookline_core::{storage::Storage, Producer};
use serde::Deserialize;

use super::{
    broadcast::PRODUCER_TOKEN_HEADER, channels::ListResponse, require_header, ApiError, ApiResult,
    PageLinks, PageQuery, ProducerRepr,
};

/// Producer create/update body.
#[derive(Debug, Deserialize)]
pub struct ProducerBody {
    /// Publish token.
    pub token: String,
    /// Optional display name; defaults to the business key.
    #[serde(default)]
    pub name: Option<String>,
}

/// Creates or updates a producer.
pub async fn put_producer(
    Path(producer_id): Path<String>,
    State(storage): State<Storage>,
    Json(body): Json<ProducerBody>,
) -> ApiResult<(StatusCode, Json<ProducerRepr>)> {
    let existed = storage.producers.find(&producer_id).await.is_ok();

    let mut producer = Producer::new(&producer_id, &body.token)?;
    if let Some(name) = body.name {
        producer.name = name;
    }
    producer.quick_fix();

    let stored = storage.producers.store(&producer).await?;
    let status = if existed { StatusCode::OK } else { StatusCode::CREATED };
    Ok((status, Json(ProducerRepr::from(&stored))))
}

/// Fetches one producer.
pub async fn get_producer(
    Path(producer_id): Path<String>,
    State(storage): State<Storage>,
) -> ApiResult<Json<ProducerRepr>> {
    let producer = storage.producers.find(&producer_id).await?;
    Ok(Json(ProducerRepr::from(&producer)))
}

/// Soft-deletes a producer.
///
/// Requires the producer's token header.
pub async fn delete_producer(
    Path(producer_id): Path<String>,
    State(storage): State<Storage>,
    headers: HeaderMap,
) -> ApiResult<StatusCode> {
    let token = require_header(&headers, PRODUCER_TOKEN_HEADER)?;
    let producer = storage.producers.find(&producer_id).await?;
    if producer.token != token {
        return Err(ApiError::Unauthorized);
    }
    storage.producers.delete(&producer).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Lists producers with cursor pagination.
pub async fn list_producers(
    State(storage): State<Storage>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<ListResponse<ProducerRepr>>> {
    let pagination = query.into_pagination()?;
    let (producers, page) = storage.producers.list(&pagination).await?;
    Ok(Json(ListResponse {
        results: producers.iter().map(ProducerRepr::from).collect(),
        pages: PageLinks::from(page),
    }))
}
