//! Firebase ID token authentication.
//!
//! The upstream is reached through [`FirebaseAuth`] so tests can swap in a
//! deterministic stub. [`rest::FirebaseRestClient`] is the production
//! implementation.

pub mod rest;

use super::{AuthError, Authenticator, UserIdentity};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub use rest::{FirebaseEndpoints, FirebaseRestClient, ServiceAccount};

pub const ORG_TYPE: &str = "firebase";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifiedToken {
    pub uid: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserRecord {
    pub uid: String,
    pub email: String,
    pub disabled: bool,
}

#[async_trait]
pub trait FirebaseAuth: Send + Sync {
    /// Verify the token signature and claims, and reject revoked sessions.
    async fn verify_id_token_and_check_revoked(&self, id_token: &str) -> Result<VerifiedToken, AuthError>;

    async fn get_user(&self, uid: &str) -> Result<UserRecord, AuthError>;
}

pub struct FirebaseAuthenticator {
    client: Arc<dyn FirebaseAuth>,
}

impl FirebaseAuthenticator {
    pub fn new(client: Arc<dyn FirebaseAuth>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Authenticator for FirebaseAuthenticator {
    fn uid(&self) -> &'static str {
        ORG_TYPE
    }

    async fn check(&self, _cancel: &CancellationToken, token: &str) -> Result<UserIdentity, AuthError> {
        let verified = self.client.verify_id_token_and_check_revoked(token).await?;
        let user = self.client.get_user(&verified.uid).await?;

        Ok(UserIdentity {
            username: user.email,
            uid: verified.uid,
            groups: Vec::new(),
        })
    }
}
