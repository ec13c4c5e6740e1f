//! Authentication: map a bearer token to a user identity.

pub mod firebase;
pub mod github;
pub mod gitlab;
pub mod token_file;

use crate::cancel::run_cancellable;
use async_trait::async_trait;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// The identity handed back to the orchestrator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub username: String,
    pub uid: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<String>,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("{provider} is unavailable: {reason}")]
    UpstreamUnavailable {
        provider: &'static str,
        reason: String,
    },

    #[error("user is not a member of organization `{org}`")]
    NotAMember { org: String },

    #[error("authentication canceled")]
    Canceled,

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl AuthError {
    pub fn unavailable(provider: &'static str, err: impl std::fmt::Display) -> Self {
        AuthError::UpstreamUnavailable {
            provider,
            reason: err.to_string(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNAUTHORIZED,
        }
    }
}

#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Organization tag this authenticator serves.
    fn uid(&self) -> &'static str;

    /// Resolve `token` to an identity. `cancel` fires when the caller no
    /// longer needs the answer; long-running checks should stop early.
    async fn check(&self, cancel: &CancellationToken, token: &str) -> Result<UserIdentity, AuthError>;
}

/// Run `authenticator` against `token`, enforcing the contract every
/// provider shares: the token is non-empty and a successful identity names
/// both a user and a uid.
pub async fn authenticate(
    authenticator: &dyn Authenticator,
    cancel: &CancellationToken,
    token: &str,
) -> Result<UserIdentity, AuthError> {
    let token = token.trim();
    if token.is_empty() {
        return Err(AuthError::InvalidToken("token is empty".to_string()));
    }

    let identity = run_cancellable(cancel, AuthError::Canceled, authenticator.check(cancel, token)).await?;

    if identity.username.is_empty() || identity.uid.is_empty() {
        return Err(AuthError::InvalidToken(format!(
            "{} returned an incomplete identity",
            authenticator.uid()
        )));
    }
    Ok(identity)
}
