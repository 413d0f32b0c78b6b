//! HTTP surface tests driven through the router with a disposable
//! database. Skips when no PostgreSQL is configured.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use hookline_api::{create_router, Config};
use hookline_testing::{fixtures, TestDb};
use serde_json::Value;
use tower::ServiceExt;

async fn router_for(db: &TestDb) -> Router {
    create_router(db.storage(), &Config::default())
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_reports_ok() {
    let Some(db) = TestDb::try_new().await else { return };
    let router = router_for(&db).await;

    let response =
        router.oneshot(Request::get("/health").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn channel_put_then_get() {
    let Some(db) = TestDb::try_new().await else { return };
    let router = router_for(&db).await;
    let channel_id = fixtures::unique_id("orders");

    let response = router
        .clone()
        .oneshot(
            Request::put(format!("/channel/{channel_id}"))
                .header("content-type", "application/json")
                .body(Body::from(r#"{"token": "channel-token", "name": "Orders"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = router
        .oneshot(Request::get(format!("/channel/{channel_id}")).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["id"], channel_id.as_str());
    assert_eq!(body["name"], "Orders");
}

#[tokio::test]
async fn consumer_put_requires_channel_token() {
    let Some(db) = TestDb::try_new().await else { return };
    let storage = db.storage();
    let router = router_for(&db).await;

    let channel = fixtures::stored_channel(&storage, "ch").await.unwrap();
    let uri = format!("/channel/{}/consumer/billing", channel.public_id);
    let body = r#"{"token": "consumer-token", "callback_url": "http://imytech.net/hook"}"#;

    let response = router
        .clone()
        .oneshot(
            Request::put(uri.as_str())
                .header("content-type", "application/json")
                .header("X-Hookline-Channel-Token", "wrong-token")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = router
        .oneshot(
            Request::put(uri.as_str())
                .header("content-type", "application/json")
                .header("X-Hookline-Channel-Token", channel.token.as_str())
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let consumer = storage.consumers.find(&channel.public_id, "billing").await.unwrap();
    assert_eq!(consumer.callback_url, "http://imytech.net/hook");
}

#[tokio::test]
async fn broadcast_accepts_then_reports_duplicates() {
    let Some(db) = TestDb::try_new().await else { return };
    let storage = db.storage();
    let router = router_for(&db).await;

    let channel = fixtures::stored_channel(&storage, "ch").await.unwrap();
    let producer = fixtures::stored_producer(&storage, "p").await.unwrap();
    let uri = format!("/channel/{}/broadcast", channel.public_id);

    let publish = |message_id: &str| {
        Request::post(uri.as_str())
            .header("content-type", "text/plain")
            .header("X-Hookline-Producer-Id", producer.public_id.as_str())
            .header("X-Hookline-Producer-Token", producer.token.as_str())
            .header("X-Hookline-Message-Id", message_id)
            .body(Body::from("some payload"))
            .unwrap()
    };

    let response = router.clone().oneshot(publish("m-1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["message_id"], "m-1");
    assert_eq!(body["status"], "accepted");

    // Producer retry with the same idempotency key.
    let response = router.clone().oneshot(publish("m-1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::ALREADY_REPORTED);

    // Bad credentials are rejected before any row is written.
    let response = router
        .oneshot(
            Request::post(uri.as_str())
                .header("content-type", "text/plain")
                .header("X-Hookline-Producer-Id", producer.public_id.as_str())
                .header("X-Hookline-Producer-Token", "wrong-token")
                .body(Body::from("some payload"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn message_listing_requires_token_and_pages() {
    let Some(db) = TestDb::try_new().await else { return };
    let storage = db.storage();
    let router = router_for(&db).await;

    let channel = fixtures::stored_channel(&storage, "ch").await.unwrap();
    let producer = fixtures::stored_producer(&storage, "p").await.unwrap();
    let message =
        hookline_core::Message::new(&channel, &producer, "some payload", "text/plain").unwrap();
    storage.messages.create(&message).await.unwrap();

    let uri = format!("/channel/{}/messages", channel.public_id);

    let response =
        router.clone().oneshot(Request::get(uri.as_str()).body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = router
        .clone()
        .oneshot(
            Request::get(uri.as_str())
                .header("X-Hookline-Channel-Token", channel.token.as_str())
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["results"].as_array().unwrap().len(), 1);
    assert_eq!(body["results"][0]["id"], message.source_message_id.as_str());
    assert!(body["pages"]["next"].is_string());

    let response = router
        .oneshot(
            Request::get(format!("{uri}?next=not-a-cursor"))
                .header("X-Hookline-Channel-Token", channel.token.as_str())
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
