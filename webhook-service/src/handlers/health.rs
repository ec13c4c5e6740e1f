use crate::state::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let mut auth: Vec<&str> = state.authenticators.keys().copied().collect();
    auth.sort_unstable();
    let mut authz: Vec<&str> = state.authorizers.keys().copied().collect();
    authz.sort_unstable();

    Json(json!({
        "status": "healthy",
        "service": "webhook-service",
        "version": env!("CARGO_PKG_VERSION"),
        "auth_providers": auth,
        "authz_providers": authz,
    }))
}

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}
