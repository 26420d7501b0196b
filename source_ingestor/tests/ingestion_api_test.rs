use std::collections::HashMap;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicU32, Ordering},
};
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
};
use secrecy::SecretString;
use serde_json::json;
use serial_test::serial;
use source_ingestor::{
    models::request_params::FetchParams,
    providers::{
        FetchError, UnavailableError, UpstreamFetcher,
        ingestion_api::{ClientConfig, IngestionApiClient},
    },
};

#[derive(Clone)]
struct FakeUpstream {
    seen: Arc<Mutex<Vec<HashMap<String, String>>>>,
    auth: Arc<Mutex<Vec<Option<String>>>>,
    failures_left: Arc<AtomicU32>,
    fail_status: StatusCode,
    body: Arc<String>,
    health: StatusCode,
}

impl FakeUpstream {
    fn new(body: serde_json::Value) -> Self {
        Self {
            seen: Arc::default(),
            auth: Arc::default(),
            failures_left: Arc::new(AtomicU32::new(0)),
            fail_status: StatusCode::SERVICE_UNAVAILABLE,
            body: Arc::new(body.to_string()),
            health: StatusCode::OK,
        }
    }

    fn failing(mut self, times: u32, status: StatusCode) -> Self {
        self.failures_left = Arc::new(AtomicU32::new(times));
        self.fail_status = status;
        self
    }

    fn raw_body(mut self, body: &str) -> Self {
        self.body = Arc::new(body.to_string());
        self
    }

    fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

async fn source_handler(
    State(up): State<FakeUpstream>,
    headers: HeaderMap,
    Query(q): Query<HashMap<String, String>>,
) -> Response {
    up.seen.lock().unwrap().push(q);
    up.auth.lock().unwrap().push(
        headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    );

    if up.failures_left.load(Ordering::SeqCst) > 0 {
        up.failures_left.fetch_sub(1, Ordering::SeqCst);
        return (up.fail_status, "upstream exploded").into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "application/json")],
        up.body.as_ref().clone(),
    )
        .into_response()
}

async fn health_handler(State(up): State<FakeUpstream>) -> Response {
    (up.health, Json(json!({"status": "ok"}))).into_response()
}

async fn serve(up: FakeUpstream) -> String {
    let app = Router::new()
        .route("/source", get(source_handler))
        .route("/health", get(health_handler))
        .with_state(up);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn client(base_url: &str, max_retries: u32) -> IngestionApiClient {
    let mut cfg = ClientConfig::new(base_url);
    cfg.timeout = Duration::from_secs(5);
    cfg.max_retries = max_retries;
    cfg.retry_base_delay = Duration::from_millis(1);
    IngestionApiClient::new(cfg).expect("client")
}

fn two_items() -> serde_json::Value {
    json!({
        "items": [
            {"id": "t3_abc", "title": "First", "score": 10, "created_at": "2024-06-01T10:00:00Z"},
            {"id": "t3_def", "title": "Second", "author": "ferris", "subreddit": "elsewhere"}
        ],
        "meta": {"count": 2}
    })
}

#[tokio::test]
async fn fetch_decodes_items_and_sends_bounds() {
    let up = FakeUpstream::new(two_items());
    let base = serve(up.clone()).await;

    let items = client(&base, 0)
        .fetch(&FetchParams::new("golang").with_limit(50).with_since(1_717_236_000))
        .await
        .expect("fetch");

    assert_eq!(items.len(), 2);
    assert_eq!(items[0].id.as_deref(), Some("t3_abc"));
    assert_eq!(items[0].score, Some(10));
    assert_eq!(items[1].score, None);
    assert_eq!(items[1].source.as_deref(), Some("elsewhere"));

    let seen = up.seen.lock().unwrap();
    assert_eq!(seen[0].get("name").map(String::as_str), Some("golang"));
    assert_eq!(seen[0].get("limit").map(String::as_str), Some("50"));
    assert_eq!(seen[0].get("since").map(String::as_str), Some("1717236000"));
}

#[tokio::test]
async fn fetch_omits_unbounded_parameters() {
    let up = FakeUpstream::new(json!({"items": []}));
    let base = serve(up.clone()).await;

    let items = client(&base, 0)
        .fetch(&FetchParams::new("rust"))
        .await
        .expect("fetch");
    assert!(items.is_empty());

    let seen = up.seen.lock().unwrap();
    assert!(!seen[0].contains_key("limit"));
    assert!(!seen[0].contains_key("since"));
}

#[tokio::test]
async fn client_error_status_fails_without_retry() {
    let up = FakeUpstream::new(two_items()).failing(5, StatusCode::NOT_FOUND);
    let base = serve(up.clone()).await;

    let err = client(&base, 3)
        .fetch(&FetchParams::new("missing"))
        .await
        .unwrap_err();

    match err {
        FetchError::Status { status, body } => {
            assert_eq!(status, 404);
            assert_eq!(body, "upstream exploded");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(up.calls(), 1);
}

#[tokio::test]
async fn transient_failures_are_retried_until_success() {
    let up = FakeUpstream::new(two_items()).failing(2, StatusCode::SERVICE_UNAVAILABLE);
    let base = serve(up.clone()).await;

    let items = client(&base, 3)
        .fetch(&FetchParams::new("golang"))
        .await
        .expect("eventually succeeds");

    assert_eq!(items.len(), 2);
    assert_eq!(up.calls(), 3);
}

#[tokio::test]
async fn retry_budget_exhaustion_is_reported() {
    let up = FakeUpstream::new(two_items()).failing(10, StatusCode::INTERNAL_SERVER_ERROR);
    let base = serve(up.clone()).await;

    let err = client(&base, 2)
        .fetch(&FetchParams::new("golang"))
        .await
        .unwrap_err();

    assert!(
        matches!(err, FetchError::RetriesExhausted { attempts: 3, .. }),
        "got {err:?}"
    );
    assert_eq!(err.status(), Some(500));
    assert_eq!(up.calls(), 3);
}

#[tokio::test]
async fn malformed_body_is_a_decode_error() {
    let up = FakeUpstream::new(json!({})).raw_body(r#"{"items": [ {"id": "abc""#);
    let base = serve(up.clone()).await;

    let err = client(&base, 3)
        .fetch(&FetchParams::new("golang"))
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::Decode(_)), "got {err:?}");
    assert_eq!(up.calls(), 1, "decode failures are not retried");
}

#[tokio::test]
async fn bearer_token_is_sent() {
    let up = FakeUpstream::new(json!({"items": []}));
    let base = serve(up.clone()).await;

    let mut cfg = ClientConfig::new(&base);
    cfg.api_token = Some(SecretString::new("s3cret".into()));
    let client = IngestionApiClient::new(cfg).expect("client");
    client.fetch(&FetchParams::new("golang")).await.expect("fetch");

    let auth = up.auth.lock().unwrap();
    assert_eq!(auth[0].as_deref(), Some("Bearer s3cret"));
}

#[tokio::test]
async fn health_check_reports_status() {
    let up = FakeUpstream::new(json!({}));
    let base = serve(up).await;
    client(&base, 0).health_check().await.expect("healthy");

    let mut sick = FakeUpstream::new(json!({}));
    sick.health = StatusCode::SERVICE_UNAVAILABLE;
    let base = serve(sick).await;
    let err = client(&base, 0).health_check().await.unwrap_err();
    assert!(matches!(err, UnavailableError::Unhealthy { status: 503 }));
}

#[tokio::test]
async fn health_check_unreachable() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = client(&format!("http://{addr}"), 0)
        .health_check()
        .await
        .unwrap_err();
    assert!(matches!(err, UnavailableError::Unreachable(_)), "got {err:?}");
}

#[tokio::test]
#[serial]
#[ignore]
async fn live_ingestion_api_fetch() {
    // Requires a running ingestion API at INGESTION_API_URL.
    if std::env::var("INGESTION_API_URL").is_err() {
        println!("Skipping live_ingestion_api_fetch: INGESTION_API_URL not set.");
        return;
    }

    let client = IngestionApiClient::from_env().expect("client from env");
    client.health_check().await.expect("upstream healthy");

    let items = client
        .fetch(&FetchParams::new("rust").with_limit(5))
        .await
        .expect("fetch");
    assert!(items.len() <= 5, "limit should cap the batch");
}
