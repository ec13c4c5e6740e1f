use super::org_from_headers;
use crate::auth::{authenticate, UserIdentity};
use crate::state::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

pub const API_VERSION: &str = "authentication.k8s.io/v1";
pub const KIND: &str = "TokenReview";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenReview {
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub spec: TokenReviewSpec,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenReviewSpec {
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenReviewStatus {
    pub authenticated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserIdentity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenReviewResponse {
    pub api_version: String,
    pub kind: String,
    pub status: TokenReviewStatus,
}

fn reply(status: StatusCode, review: TokenReviewStatus) -> Response {
    (
        status,
        Json(TokenReviewResponse {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            status: review,
        }),
    )
        .into_response()
}

fn rejected(status: StatusCode, error: impl Into<String>) -> Response {
    reply(
        status,
        TokenReviewStatus {
            authenticated: false,
            user: None,
            error: Some(error.into()),
        },
    )
}

fn accepted(user: UserIdentity) -> Response {
    reply(
        StatusCode::OK,
        TokenReviewStatus {
            authenticated: true,
            user: Some(user),
            error: None,
        },
    )
}

/// `POST /tokenreviews/{org}`
pub async fn token_review(
    State(state): State<AppState>,
    Path(org): Path<String>,
    body: Result<Json<TokenReview>, JsonRejection>,
) -> Response {
    review(state, &org, body).await
}

/// `POST /tokenreviews` with the organization in the `x-guard-org` header.
pub async fn token_review_by_header(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<TokenReview>, JsonRejection>,
) -> Response {
    review(state, &org_from_headers(&headers), body).await
}

async fn review(state: AppState, org: &str, body: Result<Json<TokenReview>, JsonRejection>) -> Response {
    let review = match body {
        Ok(Json(review)) => review,
        Err(rejection) => return rejected(StatusCode::BAD_REQUEST, rejection.body_text()),
    };

    if !state.auth_orgs.has(org) {
        return rejected(
            StatusCode::BAD_REQUEST,
            format!("unknown organization `{}`, expected one of {}", org, state.auth_orgs),
        );
    }
    let Some(authenticator) = state.authenticator(org) else {
        return rejected(
            StatusCode::BAD_REQUEST,
            format!("authentication provider `{}` is not enabled", org.trim()),
        );
    };

    if let Some(user) = state
        .token_file
        .as_ref()
        .and_then(|tokens| tokens.lookup(&review.spec.token))
    {
        tracing::info!(org = %org.trim(), user = %user.username, "Authenticated from token file");
        return accepted(user);
    }

    let cancel = state.shutdown.child_token();
    let _cancel_on_drop = cancel.clone().drop_guard();

    match authenticate(authenticator.as_ref(), &cancel, &review.spec.token).await {
        Ok(user) => {
            tracing::info!(org = authenticator.uid(), user = %user.username, groups = user.groups.len(), "Authenticated");
            accepted(user)
        }
        Err(e) => {
            tracing::warn!(org = authenticator.uid(), error = %e, "Authentication failed");
            metrics::counter!("authn_failures_total", "org" => authenticator.uid()).increment(1);
            rejected(e.status_code(), e.to_string())
        }
    }
}
