use axum::extract::State;
use axum::Json;

use crate::models::MockMetrics;
use crate::state::AppState;

pub async fn mock_metrics(State(state): State<AppState>) -> Json<MockMetrics> {
    Json(state.snapshot())
}

pub async fn health() -> &'static str {
    "OK"
}
