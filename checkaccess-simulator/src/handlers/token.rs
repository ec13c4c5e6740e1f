use axum::extract::State;
use axum::http::Method;
use axum::Json;
use chrono::{Duration, Utc};

use super::{request_event, simulate_latency};
use crate::error::SimulatorError;
use crate::models::TokenResponse;
use crate::state::{AppState, Counters};

const TOKEN_MIN_LATENCY_MS: i64 = 10;
const TOKEN_MAX_LATENCY_MS: i64 = 50;

/// `POST /authz/token`: hand out an opaque bearer token valid for an hour.
pub async fn issue_token(
    State(state): State<AppState>,
    method: Method,
) -> Result<Json<TokenResponse>, SimulatorError> {
    if method != Method::POST {
        return Err(SimulatorError::MethodNotAllowed);
    }

    let issued = Counters::bump(&state.counters.tokens_issued);
    simulate_latency(TOKEN_MIN_LATENCY_MS, TOKEN_MAX_LATENCY_MS).await;

    let now = Utc::now();
    let response = TokenResponse {
        token_type: "Bearer".to_string(),
        access_token: format!(
            "mock-pdp-token-{}-{}",
            now.timestamp_nanos_opt().unwrap_or_default(),
            rand::random::<u64>() >> 1
        ),
        expires_on: (now + Duration::hours(1)).timestamp(),
    };

    request_event!(state, total = issued, "[TOKEN] Issued token");
    Ok(Json(response))
}
