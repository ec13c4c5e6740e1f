//! Authorization: answer batched subject-access-review requests.

pub mod azure;
pub mod store;

use crate::cancel::run_cancellable;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub use store::{DecisionStore, DecisionStoreExt, MemoryStore, StoreError};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SubjectAccessReviewSpec {
    #[serde(default, alias = "subject")]
    pub subject: Subject,
    #[serde(default, alias = "actions")]
    pub actions: Vec<Action>,
    #[serde(default, alias = "resource")]
    pub resource: Resource,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Subject {
    #[serde(default, alias = "attributes")]
    pub attributes: SubjectAttributes,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectAttributes {
    #[serde(rename = "ObjectId", alias = "objectId", default)]
    pub object_id: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Action {
    #[serde(alias = "id")]
    pub id: String,
    #[serde(default, alias = "isDataAction")]
    pub is_data_action: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    #[serde(rename = "Id", alias = "id", default)]
    pub id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessDecision {
    Allowed,
    Denied,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub access_decision: AccessDecision,
    pub action_id: String,
    pub is_data_action: bool,
    #[serde(default)]
    pub time_to_live_in_ms: i64,
}

/// Outcome reported back to the orchestrator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessReviewStatus {
    pub allowed: bool,
    #[serde(default)]
    pub denied: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub decisions: Vec<Decision>,
}

impl AccessReviewStatus {
    /// Allowed iff every decision is Allowed.
    pub fn from_decisions(decisions: Vec<Decision>) -> Self {
        let allowed = !decisions.is_empty()
            && decisions
                .iter()
                .all(|d| d.access_decision == AccessDecision::Allowed);
        Self {
            allowed,
            denied: !allowed,
            reason: String::new(),
            decisions,
        }
    }

    pub fn denied(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            denied: true,
            reason: reason.into(),
            decisions: Vec::new(),
        }
    }
}

impl SubjectAccessReviewSpec {
    pub fn validate(&self) -> Result<(), AuthzError> {
        if self.subject.attributes.object_id.iter().all(|id| id.trim().is_empty()) {
            return Err(AuthzError::BadRequest("subject has no object id".to_string()));
        }
        if self.actions.is_empty() {
            return Err(AuthzError::BadRequest("no actions to check".to_string()));
        }
        if self.actions.iter().any(|a| a.id.trim().is_empty()) {
            return Err(AuthzError::BadRequest("action with empty id".to_string()));
        }
        if self.resource.id.trim().is_empty() {
            return Err(AuthzError::BadRequest("resource id is empty".to_string()));
        }
        Ok(())
    }

    /// Check that `decisions` answers every action, in order.
    pub fn matches(&self, decisions: &[Decision]) -> Result<(), AuthzError> {
        if decisions.len() != self.actions.len() {
            return Err(AuthzError::InvalidResponse(format!(
                "expected {} decisions, got {}",
                self.actions.len(),
                decisions.len()
            )));
        }
        for (i, (action, decision)) in self.actions.iter().zip(decisions).enumerate() {
            if decision.action_id != action.id || decision.is_data_action != action.is_data_action {
                return Err(AuthzError::InvalidResponse(format!(
                    "decision #{} is for `{}` but the request asked about `{}`",
                    i + 1,
                    decision.action_id,
                    action.id
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum AuthzError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("upstream returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("unexpected upstream response: {0}")]
    InvalidResponse(String),

    #[error("authorization canceled")]
    Canceled,

    #[error("decision cache: {0}")]
    Cache(#[from] StoreError),
}

#[async_trait]
pub trait Authorizer: Send + Sync {
    fn uid(&self) -> &'static str;

    async fn check(
        &self,
        cancel: &CancellationToken,
        request: &SubjectAccessReviewSpec,
        store: &dyn DecisionStore,
    ) -> Result<AccessReviewStatus, AuthzError>;
}

/// Validate `request`, then run `authorizer` under `cancel`.
pub async fn authorize(
    authorizer: &dyn Authorizer,
    cancel: &CancellationToken,
    request: &SubjectAccessReviewSpec,
    store: &dyn DecisionStore,
) -> Result<AccessReviewStatus, AuthzError> {
    request.validate()?;
    run_cancellable(cancel, AuthzError::Canceled, authorizer.check(cancel, request, store)).await
}
