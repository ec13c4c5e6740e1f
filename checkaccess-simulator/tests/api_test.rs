use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use checkaccess_simulator::models::{MockMetrics, TokenResponse};
use checkaccess_simulator::{build_router, AppState, SimulatorConfig};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::util::ServiceExt;

const CHECK_ACCESS_URI: &str =
    "/subscriptions/x/providers/Microsoft.Authorization/checkaccess?api-version=2018-09-01-preview";

fn instant_config(allow_rate: f64, throttle_rate: f64) -> SimulatorConfig {
    SimulatorConfig {
        port: 0,
        min_latency_ms: 0,
        max_latency_ms: 0,
        allow_rate,
        throttle_rate,
        ..Default::default()
    }
}

fn app(config: SimulatorConfig) -> (Router, AppState) {
    let state = AppState::new(config);
    (build_router(state.clone()), state)
}

fn post(uri: &str, body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body.into())
        .unwrap()
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    response.into_body().collect().await.unwrap().to_bytes().to_vec()
}

fn two_actions() -> Value {
    json!({
        "Subject": {"Attributes": {"ObjectId": ["user-1"]}},
        "Actions": [
            {"id": "A", "isDataAction": false},
            {"id": "B", "isDataAction": true}
        ],
        "Resource": {"Id": "/subscriptions/x"}
    })
}

#[tokio::test]
async fn token_endpoint_issues_bearer_token() {
    let (app, state) = app(instant_config(0.9, 0.0));
    let before = chrono::Utc::now().timestamp();

    let response = app.oneshot(post("/authz/token", Body::empty())).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let token: TokenResponse = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(token.token_type, "Bearer");

    let suffix = token.access_token.strip_prefix("mock-pdp-token-").unwrap();
    let parts: Vec<&str> = suffix.split('-').collect();
    assert_eq!(parts.len(), 2);
    assert!(parts
        .iter()
        .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit())));

    assert!(token.expires_on >= before + 3590 && token.expires_on <= before + 3610);
    assert_eq!(state.snapshot().tokens_issued, 1);
}

#[tokio::test]
async fn token_endpoint_rejects_get() {
    let (app, state) = app(instant_config(0.9, 0.0));
    let response = app
        .oneshot(Request::get("/authz/token").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(state.snapshot().tokens_issued, 0);
}

#[tokio::test]
async fn denied_batch_echoes_actions() {
    let (app, state) = app(instant_config(0.0, 0.0));

    let response = app
        .oneshot(post(CHECK_ACCESS_URI, two_actions().to_string()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers["content-type"], "application/json");
    assert_eq!(headers["x-ms-ratelimit-remaining-subscription-reads"], "11999");
    assert_eq!(headers["x-ms-request-id"], "mock-1");

    let body: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(
        body,
        json!([
            {"accessDecision": "Denied", "actionId": "A", "isDataAction": false, "timeToLiveInMs": 300000},
            {"accessDecision": "Denied", "actionId": "B", "isDataAction": true, "timeToLiveInMs": 300000}
        ])
    );

    let metrics = state.snapshot();
    assert_eq!(metrics.denied, 1);
    assert_eq!(metrics.allowed, 0);
    assert_eq!(metrics.total_requests, 1);
}

#[tokio::test]
async fn allowed_batch_counts_as_allowed() {
    let (app, state) = app(instant_config(1.0, 0.0));

    let response = app
        .oneshot(post(CHECK_ACCESS_URI, two_actions().to_string()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert!(body
        .as_array()
        .unwrap()
        .iter()
        .all(|d| d["accessDecision"] == "Allowed"));
    assert_eq!(state.snapshot().allowed, 1);
    assert_eq!(state.snapshot().denied, 0);
}

#[tokio::test]
async fn unknown_path_is_not_found_and_not_counted() {
    let (app, state) = app(instant_config(0.9, 0.0));

    let response = app.oneshot(post("/foo/bar", Body::empty())).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(state.snapshot().total_requests, 0);
}

#[tokio::test]
async fn check_access_rejects_non_post() {
    let (app, state) = app(instant_config(0.9, 0.0));

    let response = app
        .oneshot(Request::get(CHECK_ACCESS_URI).body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(state.snapshot().total_requests, 0);
}

#[tokio::test]
async fn throttled_request_gets_rate_limit_headers() {
    let (app, state) = app(instant_config(0.9, 1.0));

    // the body is never read on the throttle path
    let response = app
        .oneshot(post(CHECK_ACCESS_URI, "not json"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers()["retry-after"], "1");
    assert_eq!(
        response.headers()["x-ms-ratelimit-remaining-subscription-reads"],
        "0"
    );
    let body = body_bytes(response).await;
    assert_eq!(String::from_utf8(body).unwrap().trim_end(), "Too Many Requests");

    let metrics = state.snapshot();
    assert_eq!(metrics.throttled, 1);
    assert_eq!(metrics.total_requests, 1);
    assert_eq!(metrics.allowed + metrics.denied, 0);
}

#[tokio::test]
async fn malformed_body_is_counted_only_in_total() {
    let (app, state) = app(instant_config(0.9, 0.0));

    let response = app
        .oneshot(post(CHECK_ACCESS_URI, "{\"Actions\": ["))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let metrics = state.snapshot();
    assert_eq!(metrics.total_requests, 1);
    assert_eq!(metrics.throttled + metrics.allowed + metrics.denied, 0);
}

#[tokio::test]
async fn counters_stay_consistent_under_concurrency() {
    let (app, state) = app(instant_config(0.5, 0.2));

    let mut tasks = Vec::new();
    for i in 0..200 {
        let app = app.clone();
        let body = if i % 10 == 0 {
            "garbage".to_string()
        } else {
            two_actions().to_string()
        };
        tasks.push(tokio::spawn(async move {
            app.oneshot(post(CHECK_ACCESS_URI, body)).await.unwrap().status()
        }));
    }
    for task in tasks {
        let status = task.await.unwrap();
        assert!(matches!(
            status,
            StatusCode::OK | StatusCode::TOO_MANY_REQUESTS | StatusCode::BAD_REQUEST
        ));
    }

    let m = state.snapshot();
    assert_eq!(m.total_requests, 200);
    assert!(m.total_requests >= m.throttled + m.allowed + m.denied);
}

#[tokio::test]
async fn throttle_frequency_tracks_rate() {
    let (app, state) = app(instant_config(1.0, 0.25));
    let samples = 4000;

    for _ in 0..samples {
        app.clone()
            .oneshot(post(CHECK_ACCESS_URI, two_actions().to_string()))
            .await
            .unwrap();
    }

    let m = state.snapshot();
    let observed = m.throttled as f64 / samples as f64;
    assert!((observed - 0.25).abs() < 0.04, "observed {}", observed);
    assert_eq!(m.throttled + m.allowed, samples);
}

#[tokio::test]
async fn metrics_and_health() {
    let mut config = instant_config(0.29, 0.01);
    config.port = 9090;
    config.max_latency_ms = 5;
    let (app, _) = app(config);

    let response = app
        .clone()
        .oneshot(Request::get("/mock-metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let metrics: MockMetrics = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(metrics.config_port, 9090);
    assert_eq!(metrics.config_min_lat, 0);
    assert_eq!(metrics.config_max_lat, 5);
    assert_eq!(metrics.config_allow, 28);
    assert_eq!(metrics.config_throttle, 1);
    assert_eq!(metrics.total_requests, 0);

    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, b"OK");
}
