//! Router assembly and server lifecycle.

use crate::config::SimulatorConfig;
use crate::handlers;
use crate::state::AppState;
use anyhow::Context;
use axum::middleware::from_fn;
use axum::routing::any;
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use service_core::middleware::{http_request_span, request_id_middleware};
use service_core::shutdown::shutdown_signal;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Every route accepts any method; handlers answer 405 themselves so the
/// body matches the rest of the protocol errors.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/authz/token", any(handlers::issue_token))
        .route("/mock-metrics", any(handlers::mock_metrics))
        .route("/health", any(handlers::health))
        .fallback(handlers::check_access)
        .with_state(state)
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(TraceLayer::new_for_http().make_span_with(http_request_span::<axum::body::Body>))
        .layer(from_fn(request_id_middleware))
}

pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    pub async fn build(config: SimulatorConfig) -> anyhow::Result<Self> {
        let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {}", addr))?;
        let port = listener.local_addr()?.port();

        tracing::info!(
            port,
            min_latency_ms = config.min_latency_ms,
            max_latency_ms = config.max_latency_ms,
            allow_rate = config.allow_rate,
            throttle_rate = config.throttle_rate,
            tls = config.use_tls,
            "Mock Azure server starting"
        );

        Ok(Self {
            port,
            listener,
            state: AppState::new(config),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    pub async fn run_until_stopped(self) -> anyhow::Result<()> {
        let tls = self
            .state
            .config
            .tls_material()
            .map(|(cert, key)| (cert.clone(), key.clone()));
        let app = build_router(self.state);

        match tls {
            Some((cert, key)) => {
                let tls_config = RustlsConfig::from_pem_file(&cert, &key)
                    .await
                    .with_context(|| {
                        format!(
                            "failed to load TLS material from `{}` and `{}`",
                            cert.display(),
                            key.display()
                        )
                    })?;

                let handle = axum_server::Handle::new();
                let shutdown = handle.clone();
                tokio::spawn(async move {
                    shutdown_signal().await;
                    shutdown.graceful_shutdown(Some(REQUEST_TIMEOUT));
                });

                axum_server::from_tcp_rustls(self.listener.into_std()?, tls_config)
                    .handle(handle)
                    .serve(app.into_make_service())
                    .await?;
            }
            None => {
                axum::serve(self.listener, app)
                    .with_graceful_shutdown(shutdown_signal())
                    .await?;
            }
        }

        tracing::info!("Mock Azure server stopped");
        Ok(())
    }
}
