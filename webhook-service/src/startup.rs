//! Provider wiring, router assembly and server lifecycle.

use crate::auth::firebase::{FirebaseAuthenticator, FirebaseRestClient};
use crate::auth::github::GithubAuthenticator;
use crate::auth::gitlab::GitlabAuthenticator;
use crate::auth::token_file::TokenFileAuthenticator;
use crate::auth::{firebase, github, gitlab, token_file};
use crate::authz::azure::AzureAuthorizer;
use crate::authz::{DecisionStore, MemoryStore};
use crate::config::WebhookConfig;
use crate::handlers;
use crate::state::AppState;
use anyhow::Context;
use axum::middleware::from_fn;
use axum::routing::{get, post};
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use metrics_exporter_prometheus::PrometheusHandle;
use secrecy::ExposeSecret;
use service_core::middleware::{
    http_request_span, metrics_middleware, request_id_middleware, security_headers_middleware,
};
use service_core::shutdown::shutdown_signal;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/tokenreviews", post(handlers::token_review_by_header))
        .route("/tokenreviews/:org", post(handlers::token_review))
        .route("/subjectaccessreviews", post(handlers::subject_access_review_by_header))
        .route("/subjectaccessreviews/:org", post(handlers::subject_access_review))
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .with_state(state)
        .layer(from_fn(metrics_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(TraceLayer::new_for_http().make_span_with(http_request_span::<axum::body::Body>))
        .layer(from_fn(request_id_middleware))
}

pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
    config: WebhookConfig,
    store: Arc<MemoryStore>,
    tasks: Vec<JoinHandle<()>>,
}

impl Application {
    /// Construct every enabled provider and bind the listener. Unreadable
    /// credentials or a malformed token file fail here, before serving.
    pub async fn build(config: WebhookConfig, metrics: Option<PrometheusHandle>) -> anyhow::Result<Self> {
        let shutdown = CancellationToken::new();
        let client = reqwest::Client::builder()
            .timeout(config.upstream_timeout)
            .build()
            .context("failed to build HTTP client")?;

        let cache_ttl = config
            .azure
            .as_ref()
            .map(|azure| azure.cache_ttl)
            .unwrap_or(crate::authz::store::DEFAULT_TTL);
        let store = Arc::new(MemoryStore::new(cache_ttl));

        let mut builder = AppState::builder()
            .shutdown(shutdown.clone())
            .decision_store(store.clone() as Arc<dyn DecisionStore>);
        if let Some(handle) = metrics {
            builder = builder.metrics(handle);
        }

        let mut tasks = Vec::new();
        for provider in &config.auth_providers {
            match provider.as_str() {
                github::ORG_TYPE => {
                    builder = builder.authenticator(Arc::new(GithubAuthenticator::new(
                        config.github.org.trim(),
                        &config.github.options,
                        client.clone(),
                    )));
                }
                gitlab::ORG_TYPE => {
                    builder = builder.authenticator(Arc::new(GitlabAuthenticator::new(&config.gitlab, client.clone())));
                }
                firebase::ORG_TYPE => {
                    let path = config
                        .firebase
                        .sa_json_file
                        .as_ref()
                        .map(|p| p.expose_secret().clone())
                        .unwrap_or_default();
                    let rest = FirebaseRestClient::from_service_account_file(Path::new(&path), client.clone())?;
                    tracing::info!(project_id = %rest.project_id(), "Firebase provider ready");
                    builder = builder.authenticator(Arc::new(FirebaseAuthenticator::new(Arc::new(rest))));
                }
                token_file::ORG_TYPE => {
                    let tokens = Arc::new(TokenFileAuthenticator::load(&config.token_auth.dir)?);
                    tasks.push(tokens.spawn_reload_task(config.token_auth.reload_interval, shutdown.clone()));
                    builder = builder.token_file(tokens);
                }
                other => anyhow::bail!("no authenticator registered for `{}`", other),
            }
        }

        if let Some(azure) = &config.azure {
            builder = builder.authorizer(Arc::new(AzureAuthorizer::new(azure.options.clone(), client.clone())));
            tasks.push(spawn_purge_task(store.clone(), cache_ttl, shutdown.clone()));
        }

        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {}", addr))?;
        let port = listener.local_addr()?.port();

        let state = builder.build();
        tracing::info!(
            port,
            auth = %config.auth_providers.join(","),
            authz = %config.authz_providers.join(","),
            tls = config.tls.is_some(),
            "Webhook server starting"
        );

        Ok(Self {
            port,
            listener,
            state,
            config,
            store,
            tasks,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    pub async fn run_until_stopped(self) -> anyhow::Result<()> {
        let shutdown = self.state.shutdown.clone();
        let app = build_router(self.state);

        match &self.config.tls {
            Some(tls) => {
                let tls_config = RustlsConfig::from_pem_file(&tls.cert_file, &tls.key_file)
                    .await
                    .with_context(|| {
                        format!(
                            "failed to load TLS material from `{}` and `{}`",
                            tls.cert_file.display(),
                            tls.key_file.display()
                        )
                    })?;

                let handle = axum_server::Handle::new();
                let graceful = handle.clone();
                let stopping = shutdown.clone();
                tokio::spawn(async move {
                    shutdown_signal().await;
                    stopping.cancel();
                    graceful.graceful_shutdown(Some(REQUEST_TIMEOUT));
                });

                axum_server::from_tcp_rustls(self.listener.into_std()?, tls_config)
                    .handle(handle)
                    .serve(app.into_make_service())
                    .await?;
            }
            None => {
                let stopping = shutdown.clone();
                axum::serve(self.listener, app)
                    .with_graceful_shutdown(async move {
                        shutdown_signal().await;
                        stopping.cancel();
                    })
                    .await?;
            }
        }

        shutdown.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Background task failed");
            }
        }
        self.store.close()?;
        tracing::info!("Webhook server stopped");
        Ok(())
    }
}

fn spawn_purge_task(store: Arc<MemoryStore>, every: Duration, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every.max(Duration::from_secs(1)));
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let purged = store.purge_expired();
                    if purged > 0 {
                        tracing::debug!(purged, "Expired decisions purged");
                    }
                }
            }
        }
    })
}
