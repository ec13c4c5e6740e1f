mod common;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use checkaccess_simulator::SimulatorConfig;
use common::{access_review, body_json, identity, post_json, token_review};
use secrecy::Secret;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower::util::ServiceExt;
use webhook_service::auth::token_file::{TokenFileAuthenticator, TOKEN_FILE};
use webhook_service::auth::{AuthError, Authenticator, UserIdentity};
use webhook_service::authz::azure::{AzureAuthorizer, AzureOptions, DEFAULT_API_VERSION};
use webhook_service::{build_router, AppState};

/// Stands in for GitHub: accepts a single token, counts calls.
struct StubGithub {
    calls: AtomicUsize,
}

#[async_trait]
impl Authenticator for StubGithub {
    fn uid(&self) -> &'static str {
        "github"
    }

    async fn check(&self, _: &CancellationToken, token: &str) -> Result<UserIdentity, AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match token {
            "gh-token" => Ok(identity("octocat", "583231", &["platform"])),
            _ => Err(AuthError::InvalidToken("github rejected the token".to_string())),
        }
    }
}

fn token_file(dir: &std::path::Path) -> Arc<TokenFileAuthenticator> {
    std::fs::write(dir.join(TOKEN_FILE), "static-token,robot,9000,\"ci,deploy\"\n").unwrap();
    Arc::new(TokenFileAuthenticator::load(dir).unwrap())
}

#[tokio::test]
async fn token_review_by_path() {
    let github = Arc::new(StubGithub {
        calls: AtomicUsize::new(0),
    });
    let app = build_router(AppState::builder().authenticator(github.clone()).build());

    let response = app
        .clone()
        .oneshot(post_json("/tokenreviews/GitHub", &token_review("gh-token")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["apiVersion"], "authentication.k8s.io/v1");
    assert_eq!(body["kind"], "TokenReview");
    assert_eq!(body["status"]["authenticated"], true);
    assert_eq!(body["status"]["user"]["username"], "octocat");
    assert_eq!(body["status"]["user"]["uid"], "583231");
    assert_eq!(body["status"]["user"]["groups"][0], "platform");

    let response = app
        .oneshot(post_json("/tokenreviews/github", &token_review("wrong")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["status"]["authenticated"], false);
    assert!(body["status"]["error"].as_str().unwrap().contains("invalid token"));
    assert!(body["status"].get("user").is_none());
    assert_eq!(github.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn token_review_by_header_uses_token_file_first() {
    let tmp = tempfile::tempdir().unwrap();
    let github = Arc::new(StubGithub {
        calls: AtomicUsize::new(0),
    });
    let state = AppState::builder()
        .authenticator(github.clone())
        .token_file(token_file(tmp.path()))
        .build();
    let app = build_router(state);

    let mut request = post_json("/tokenreviews", &token_review("static-token"));
    request
        .headers_mut()
        .insert("x-guard-org", "github".parse().unwrap());
    let response = app.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"]["user"]["username"], "robot");
    assert_eq!(body["status"]["user"]["groups"], serde_json::json!(["ci", "deploy"]));
    assert_eq!(github.calls.load(Ordering::SeqCst), 0);

    let response = app
        .oneshot(post_json("/tokenreviews/token", &token_review("static-token")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn unknown_or_disabled_org_is_a_bad_request() {
    let app = build_router(AppState::builder().build());

    let response = app
        .clone()
        .oneshot(post_json("/tokenreviews/ldap", &token_review("t")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    let error = body["status"]["error"].as_str().unwrap();
    assert!(error.contains("Github/Gitlab/Firebase/Token"), "{}", error);

    let response = app
        .clone()
        .oneshot(post_json("/tokenreviews/gitlab", &token_review("t")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .oneshot(post_json("/tokenreviews", &token_review("t")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn malformed_token_review_is_rejected() {
    let app = build_router(AppState::builder().build());
    let request = Request::post("/tokenreviews/github")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["status"]["authenticated"], false);
}

#[tokio::test]
async fn access_review_for_unknown_org_is_denied_with_200() {
    let app = build_router(AppState::builder().build());

    let response = app
        .clone()
        .oneshot(post_json("/subjectaccessreviews/opa", &access_review(&[("read", false)])))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["kind"], "SubjectAccessReview");
    assert_eq!(body["status"]["allowed"], false);
    assert_eq!(body["status"]["denied"], true);
    assert!(body["status"]["reason"].as_str().unwrap().contains("Azure"));

    let response = app
        .oneshot(post_json("/subjectaccessreviews/azure", &access_review(&[("read", false)])))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body["status"]["reason"].as_str().unwrap().contains("not enabled"));
}

#[tokio::test]
async fn access_review_against_the_simulator() {
    let config = SimulatorConfig {
        port: 0,
        min_latency_ms: 0,
        max_latency_ms: 0,
        allow_rate: 1.0,
        throttle_rate: 0.0,
        ..Default::default()
    };
    let simulator = checkaccess_simulator::Application::build(config).await.unwrap();
    let base = format!("http://127.0.0.1:{}", simulator.port());
    let counters = simulator.state();
    tokio::spawn(simulator.run_until_stopped());

    let azure = AzureAuthorizer::new(
        AzureOptions {
            pdp_endpoint: base.clone(),
            token_url: format!("{}/authz/token", base),
            api_version: DEFAULT_API_VERSION.to_string(),
            client_id: String::new(),
            client_secret: Secret::new(String::new()),
            resource: String::new(),
        },
        reqwest::Client::new(),
    );
    let app = build_router(AppState::builder().authorizer(Arc::new(azure)).build());

    let review = access_review(&[("Microsoft.ContainerService/managedClusters/pods/read", true), ("list", false)]);
    for _ in 0..2 {
        let mut request = post_json("/subjectaccessreviews", &review);
        request
            .headers_mut()
            .insert("x-guard-org", "azure".parse().unwrap());
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["status"]["allowed"], true);
        let decisions = body["status"]["decisions"].as_array().unwrap();
        assert_eq!(decisions.len(), 2);
        assert_eq!(decisions[0]["actionId"], "Microsoft.ContainerService/managedClusters/pods/read");
        assert_eq!(decisions[0]["isDataAction"], true);
        assert_eq!(decisions[1]["actionId"], "list");
    }

    let metrics = counters.snapshot();
    assert_eq!(metrics.tokens_issued, 1);
    assert_eq!(metrics.total_requests, 1);
    assert_eq!(metrics.allowed, 1);
}

#[tokio::test]
async fn health_lists_enabled_providers() {
    let tmp = tempfile::tempdir().unwrap();
    let app = build_router(AppState::builder().token_file(token_file(tmp.path())).build());

    let response = app
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-content-type-options"], "nosniff");
    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["auth_providers"], serde_json::json!(["token"]));

    let response = app
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
