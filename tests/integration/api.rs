use super::{create_test_app, create_test_app_with_orchestrator, json, plain_conversation};
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::Value;
use tower::ServiceExt;

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn messages_json(len: usize) -> Value {
    serde_json::to_value(plain_conversation(len)).unwrap()
}

// ============================================
// REST API Tests
// ============================================

#[tokio::test]
async fn test_api_health() {
    let (_dir, app) = create_test_app().await;

    let (status, body) = send(&app, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["compression_enabled"], true);
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_api_compress_long_conversation() {
    let (_dir, app) = create_test_app().await;

    let (status, body) = send(
        &app,
        post_json(
            "/api/v1/compression/compress",
            json!({ "messages": messages_json(30), "conversation_id": "api-conv" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["metadata"]["compression_applied"], true);
    assert_eq!(body["metadata"]["strategy_used"], "rolling_window");
    assert_eq!(body["metadata"]["reason"], "message_threshold");
    assert!(body["messages"].as_array().unwrap().len() < 30);
}

#[tokio::test]
async fn test_api_compress_short_conversation_is_unchanged() {
    let (_dir, app) = create_test_app().await;

    let (status, body) = send(
        &app,
        post_json("/api/v1/compression/compress", json!({ "messages": messages_json(3) })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["metadata"]["compression_applied"], false);
    assert_eq!(body["metadata"]["reason"], "no_triggers");
    assert_eq!(body["messages"], messages_json(3));
}

#[tokio::test]
async fn test_api_compress_with_strategy_override() {
    let (_dir, app) = create_test_app().await;

    let (status, body) = send(
        &app,
        post_json(
            "/api/v1/compression/compress",
            json!({ "messages": messages_json(30), "strategy": "intelligent_summary" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["metadata"]["strategy_used"], "intelligent_summary");
    assert_eq!(body["messages"][0]["is_summary"], true);
}

#[tokio::test]
async fn test_api_compress_rejects_missing_messages() {
    let (_dir, app) = create_test_app().await;

    let (status, _) = send(&app, post_json("/api/v1/compression/compress", json!({}))).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_api_recommendations() {
    let (_dir, app) = create_test_app().await;

    let (status, body) = send(
        &app,
        post_json("/api/v1/compression/recommendations", json!({ "messages": messages_json(30) })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["should_compress"], true);
    assert_eq!(body["recommended_strategy"], "rolling_window");
    assert_eq!(body["strategies"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_api_analyze() {
    let (_dir, app) = create_test_app().await;

    let (status, body) = send(
        &app,
        post_json("/api/v1/compression/analyze", json!({ "messages": messages_json(5) })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message_importance"].as_array().unwrap().len(), 5);
    assert_eq!(body["conversation_insights"]["total_messages"], 5);
}

#[tokio::test]
async fn test_api_summarize() {
    let (_dir, app) = create_test_app().await;

    let (status, body) = send(
        &app,
        post_json("/api/v1/compression/summarize", json!({ "messages": messages_json(20) })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["summary"], "the team agreed to ship on friday");
    assert_eq!(body["original_message_count"], 20);
}

#[tokio::test]
async fn test_api_summarize_empty_is_unprocessable() {
    let (_dir, app) = create_test_app().await;

    let (status, body) = send(
        &app,
        post_json("/api/v1/compression/summarize", json!({ "messages": [] })),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], 422);
    assert!(body["error"].as_str().unwrap().contains("no messages"));
}

#[tokio::test]
async fn test_api_status_and_stats() {
    let (_dir, app, orchestrator) = create_test_app_with_orchestrator().await;
    send(
        &app,
        post_json(
            "/api/v1/compression/compress",
            json!({ "messages": messages_json(30), "conversation_id": "stats-conv" }),
        ),
    )
    .await;
    orchestrator.flush_pending_writes().await;

    let (status, body) = send(&app, get("/api/v1/compression/status")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["enabled"], true);
    assert_eq!(body["configuration"]["preserve_recent_messages"], 10);
    assert_eq!(body["statistics"]["total_compressions"], 1);

    let (status, body) = send(
        &app,
        get("/api/v1/compression/stats?conversation_id=stats-conv&days=1"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["conversation_id"], "stats-conv");
    assert_eq!(body["period_days"], 1);
    assert_eq!(body["total_compressions"], 1);
}

#[tokio::test]
async fn test_api_performance_with_strategy() {
    let (_dir, app, orchestrator) = create_test_app_with_orchestrator().await;
    send(
        &app,
        post_json("/api/v1/compression/compress", json!({ "messages": messages_json(30) })),
    )
    .await;
    orchestrator.flush_pending_writes().await;

    let (status, body) = send(
        &app,
        get("/api/v1/compression/performance?strategy=rolling_window"),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["summary"]["period_hours"], 24);
    assert_eq!(body["summary"]["overall"]["total_operations"], 1);
    assert_eq!(body["strategy"]["name"], "rolling_window");
    assert_eq!(body["strategy"]["total_operations"], 1);
}

#[tokio::test]
async fn test_api_alerts_and_optimizations_on_empty_store() {
    let (_dir, app) = create_test_app().await;

    let (status, body) = send(&app, get("/api/v1/compression/alerts")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["period_hours"], 1);
    assert!(body["alerts"].as_array().unwrap().is_empty());

    let (status, body) = send(&app, get("/api/v1/compression/optimizations")).await;
    assert_eq!(status, StatusCode::OK);
    let recommendations = body["recommendations"].as_array().unwrap();
    assert!(recommendations
        .iter()
        .any(|r| r["type"] == "usage_optimization"));
}

#[tokio::test]
async fn test_api_cache_cleanup() {
    let (_dir, app) = create_test_app().await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/compression/cache/cleanup")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["removed_entries"], 0);
}

#[tokio::test]
async fn test_api_openapi_document() {
    let (_dir, app) = create_test_app().await;

    let (status, body) = send(&app, get("/api-docs/openapi.json")).await;

    assert_eq!(status, StatusCode::OK);
    let paths = body["paths"].as_object().unwrap();
    assert!(paths.contains_key("/api/v1/compression/compress"));
    assert!(paths.contains_key("/api/v1/compression/optimizations"));
    assert!(paths.contains_key("/health"));
}

#[tokio::test]
async fn test_api_rejects_out_of_range_windows() {
    let (_dir, app) = create_test_app().await;

    for uri in [
        "/api/v1/compression/performance?hours=9223372036854775807",
        "/api/v1/compression/alerts?hours=9223372036854775807",
        "/api/v1/compression/stats?days=9223372036854775807",
        "/api/v1/compression/performance?hours=0",
        "/api/v1/compression/alerts?hours=-3",
        "/api/v1/compression/stats?days=366",
    ] {
        let (status, body) = send(&app, get(uri)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(body["code"], 400, "{uri}");
    }

    let (status, body) = send(&app, get("/api/v1/compression/performance?hours=8760")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["summary"]["period_hours"], 8760);
}
