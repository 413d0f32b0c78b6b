//! Router construction and server lifecycle.

use std::{net::SocketAddr, time::Duration};

use axum::{
    routing::{get, post, put},
    Router,
};
use hookline_core::storage::Storage;
use tokio_util::sync::CancellationToken;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::info;

use crate::{config::Config, handlers};

/// Builds the router with every route and the middleware stack.
pub fn create_router(storage: Storage, config: &Config) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/channels", get(handlers::list_channels))
        .route(
            "/channel/{channel_id}",
            put(handlers::put_channel).get(handlers::get_channel).delete(handlers::delete_channel),
        )
        .route("/channel/{channel_id}/broadcast", post(handlers::broadcast))
        .route("/channel/{channel_id}/messages", get(handlers::list_channel_messages))
        .route("/channel/{channel_id}/consumers", get(handlers::list_consumers))
        .route(
            "/channel/{channel_id}/consumer/{consumer_id}",
            put(handlers::put_consumer)
                .get(handlers::get_consumer)
                .delete(handlers::delete_consumer),
        )
        .route("/producers", get(handlers::list_producers))
        .route(
            "/producer/{producer_id}",
            put(handlers::put_producer)
                .get(handlers::get_producer)
                .delete(handlers::delete_producer),
        )
        .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout)))
        .layer(TraceLayer::new_for_http())
        .with_state(storage)
}

/// Serves the router until the cancellation token fires.
///
/// # Errors
///
/// Returns an IO error when the listener cannot bind or the server fails.
pub async fn start_server(
    storage: Storage,
    config: &Config,
    addr: SocketAddr,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    let router = create_router(storage, config);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "http server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
}
