use super::org_from_headers;
use crate::authz::{authorize, AccessReviewStatus, SubjectAccessReviewSpec};
use crate::state::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};

pub const API_VERSION: &str = "authorization.k8s.io/v1";
pub const KIND: &str = "SubjectAccessReview";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectAccessReview {
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub kind: String,
    pub spec: SubjectAccessReviewSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectAccessReviewResponse {
    pub api_version: String,
    pub kind: String,
    pub status: AccessReviewStatus,
}

fn reply(status: AccessReviewStatus) -> Json<SubjectAccessReviewResponse> {
    Json(SubjectAccessReviewResponse {
        api_version: API_VERSION.to_string(),
        kind: KIND.to_string(),
        status,
    })
}

/// `POST /subjectaccessreviews/{org}`
pub async fn subject_access_review(
    State(state): State<AppState>,
    Path(org): Path<String>,
    body: Result<Json<SubjectAccessReview>, JsonRejection>,
) -> Json<SubjectAccessReviewResponse> {
    reply(review(state, &org, body).await)
}

/// `POST /subjectaccessreviews` with the organization in the `x-guard-org` header.
pub async fn subject_access_review_by_header(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<SubjectAccessReview>, JsonRejection>,
) -> Json<SubjectAccessReviewResponse> {
    reply(review(state, &org_from_headers(&headers), body).await)
}

/// Every failure becomes a denial; the orchestrator always receives 200.
async fn review(
    state: AppState,
    org: &str,
    body: Result<Json<SubjectAccessReview>, JsonRejection>,
) -> AccessReviewStatus {
    let review = match body {
        Ok(Json(review)) => review,
        Err(rejection) => return AccessReviewStatus::denied(rejection.body_text()),
    };

    let Some(authorizer) = state.authorizer(org) else {
        let reason = if state.authz_orgs.has(org) {
            format!("authorization provider `{}` is not enabled", org.trim())
        } else {
            format!("unknown organization `{}`, expected one of {}", org, state.authz_orgs)
        };
        tracing::warn!(org = %org.trim(), "{}", reason);
        return AccessReviewStatus::denied(reason);
    };

    let cancel = state.shutdown.child_token();
    let _cancel_on_drop = cancel.clone().drop_guard();

    match authorize(
        authorizer.as_ref(),
        &cancel,
        &review.spec,
        state.decision_store.as_ref(),
    )
    .await
    {
        Ok(status) => {
            tracing::info!(
                org = authorizer.uid(),
                resource = %review.spec.resource.id,
                actions = review.spec.actions.len(),
                allowed = status.allowed,
                "Access reviewed"
            );
            status
        }
        Err(e) => {
            tracing::error!(org = authorizer.uid(), resource = %review.spec.resource.id, error = %e, "Access review failed");
            AccessReviewStatus::denied(e.to_string())
        }
    }
}
