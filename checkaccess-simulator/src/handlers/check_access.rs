use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderValue, Method, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;
use rand::Rng;

use super::{request_event, roll, simulate_latency};
use crate::error::SimulatorError;
use crate::models::{
    AccessDecision, Action, AuthorizationDecision, CheckAccessRequest, CHECK_ACCESS_PATH,
    DECISION_TTL_MS, REMAINING_READS_HEADER, REQUEST_ID_HEADER,
};
use crate::state::{AppState, Counters};

const REMAINING_READS: &str = "11999";

/// Batched decision endpoint, mounted as the router fallback so any path
/// containing the CheckAccess suffix is served.
pub async fn check_access(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    body: Bytes,
) -> Result<Response, SimulatorError> {
    if method != Method::POST {
        return Err(SimulatorError::MethodNotAllowed);
    }
    if !uri.path().contains(CHECK_ACCESS_PATH) {
        return Err(SimulatorError::NotFound);
    }

    // numbered before any dice so log order follows roll order
    let request_number = Counters::bump(&state.counters.total);

    simulate_latency(state.config.min_latency_ms, state.config.max_latency_ms).await;

    let throttled = roll(state.config.throttle_rate, &mut rand::thread_rng());
    if throttled {
        Counters::bump(&state.counters.throttled);
        request_event!(state, request_number, "[THROTTLE] Request throttled");
        return Err(SimulatorError::Throttled);
    }

    let request = parse_request(&body)?;
    let (decisions, all_allowed) = decide(
        &request.actions,
        state.config.allow_rate,
        &mut rand::thread_rng(),
    );

    if all_allowed {
        Counters::bump(&state.counters.allowed);
    } else {
        Counters::bump(&state.counters.denied);
    }

    let user = request
        .subject
        .attributes
        .object_id
        .first()
        .map(String::as_str)
        .unwrap_or("");
    request_event!(
        state,
        request_number,
        user,
        actions = decisions.len(),
        allowed = all_allowed,
        "[CHECKACCESS] Request served"
    );

    let request_id = HeaderValue::from_str(&format!("mock-{}", request_number))
        .unwrap_or_else(|_| HeaderValue::from_static("mock"));
    let mut response = Json(decisions).into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    headers.insert(
        REMAINING_READS_HEADER,
        HeaderValue::from_static(REMAINING_READS),
    );
    headers.insert(REQUEST_ID_HEADER, request_id);
    Ok(response)
}

/// Decode the first JSON value of the body; trailing bytes are ignored and a
/// literal `null` is an empty request.
fn parse_request(body: &[u8]) -> Result<CheckAccessRequest, SimulatorError> {
    let mut values =
        serde_json::Deserializer::from_slice(body).into_iter::<Option<CheckAccessRequest>>();
    match values.next() {
        Some(Ok(request)) => Ok(request.unwrap_or_default()),
        Some(Err(e)) => Err(SimulatorError::BadRequest(e.to_string())),
        None => Err(SimulatorError::BadRequest("empty body".to_string())),
    }
}

/// One independent coin per action. The batch counts as allowed only when
/// every action came up Allowed.
pub fn decide<R: Rng + ?Sized>(
    actions: &[Action],
    allow_rate: f64,
    rng: &mut R,
) -> (Vec<AuthorizationDecision>, bool) {
    let mut all_allowed = true;
    let decisions = actions
        .iter()
        .map(|action| {
            let access_decision = if roll(allow_rate, rng) {
                AccessDecision::Allowed
            } else {
                all_allowed = false;
                AccessDecision::Denied
            };
            AuthorizationDecision {
                access_decision,
                action_id: action.id.clone(),
                is_data_action: action.is_data_action,
                time_to_live_in_ms: DECISION_TTL_MS,
            }
        })
        .collect();
    (decisions, all_allowed)
}
