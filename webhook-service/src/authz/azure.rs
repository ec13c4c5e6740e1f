//! Azure RBAC authorizer backed by the CheckAccess data-plane API.

use super::{
    AccessReviewStatus, Authorizer, AuthzError, Decision, DecisionStore, DecisionStoreExt,
    SubjectAccessReviewSpec,
};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Deserializer};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

pub const ORG_TYPE: &str = "azure";
pub const CHECK_ACCESS_PATH: &str = "/providers/Microsoft.Authorization/checkaccess";
pub const DEFAULT_API_VERSION: &str = "2018-09-01-preview";
const REMAINING_READS_HEADER: &str = "x-ms-ratelimit-remaining-subscription-reads";
const REQUEST_ID_HEADER: &str = "x-ms-request-id";
const CACHE_KEY_PREFIX: &str = "azure:";
const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;

#[derive(Debug, Clone)]
pub struct AzureOptions {
    /// CheckAccess endpoint, e.g. `https://westus.authorization.azure.net`.
    pub pdp_endpoint: String,
    pub token_url: String,
    pub api_version: String,
    pub client_id: String,
    pub client_secret: Secret<String>,
    /// Audience requested for the bearer token.
    pub resource: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(deserialize_with = "int_or_string")]
    expires_on: i64,
}

/// Token endpoints disagree on whether `expires_on` is a number or a string.
fn int_or_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Str(String),
    }
    match Raw::deserialize(deserializer)? {
        Raw::Int(n) => Ok(n),
        Raw::Str(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

struct CachedToken {
    token: String,
    expires_on: i64,
}

enum CheckAccessOutcome {
    Decisions(Vec<Decision>),
    /// The upstream refused the request with a 4xx status.
    Rejected(u16),
}

pub struct AzureAuthorizer {
    client: Client,
    options: AzureOptions,
    token: Mutex<Option<CachedToken>>,
}

impl AzureAuthorizer {
    pub fn new(options: AzureOptions, client: Client) -> Self {
        Self {
            client,
            options,
            token: Mutex::new(None),
        }
    }

    async fn bearer_token(&self) -> Result<String, AuthzError> {
        let mut cached = self.token.lock().await;
        let now = chrono::Utc::now().timestamp();
        if let Some(token) = cached
            .as_ref()
            .filter(|t| t.expires_on > now + TOKEN_REFRESH_MARGIN_SECS)
        {
            return Ok(token.token.clone());
        }

        let response = self
            .client
            .post(&self.options.token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.options.client_id.as_str()),
                ("client_secret", self.options.client_secret.expose_secret().as_str()),
                ("resource", self.options.resource.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AuthzError::UpstreamUnavailable(format!("token request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthzError::Upstream {
                status: status.as_u16(),
                body,
            });
        }
        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthzError::InvalidResponse(format!("token response: {}", e)))?;

        tracing::debug!(expires_on = token.expires_on, "Refreshed CheckAccess bearer token");
        *cached = Some(CachedToken {
            token: token.access_token.clone(),
            expires_on: token.expires_on,
        });
        Ok(token.access_token)
    }

    fn check_access_url(&self, resource_id: &str) -> String {
        let resource = resource_id.trim();
        let separator = if resource.starts_with('/') { "" } else { "/" };
        format!(
            "{}{}{}{}?api-version={}",
            self.options.pdp_endpoint.trim_end_matches('/'),
            separator,
            resource.trim_end_matches('/'),
            CHECK_ACCESS_PATH,
            self.options.api_version
        )
    }

    async fn check_access(&self, request: &SubjectAccessReviewSpec) -> Result<CheckAccessOutcome, AuthzError> {
        let token = self.bearer_token().await?;
        let response = self
            .client
            .post(self.check_access_url(&request.resource.id))
            .bearer_auth(token)
            .json(request)
            .send()
            .await
            .map_err(|e| AuthzError::UpstreamUnavailable(format!("checkaccess request failed: {}", e)))?;

        let status = response.status();
        let header = |name: &str| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string()
        };
        tracing::debug!(
            status = status.as_u16(),
            upstream_request_id = %header(REQUEST_ID_HEADER),
            remaining_reads = %header(REMAINING_READS_HEADER),
            "CheckAccess responded"
        );

        if status.is_client_error() {
            return Ok(CheckAccessOutcome::Rejected(status.as_u16()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthzError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let decisions: Vec<Decision> = response
            .json()
            .await
            .map_err(|e| AuthzError::InvalidResponse(e.to_string()))?;
        request.matches(&decisions)?;
        Ok(CheckAccessOutcome::Decisions(decisions))
    }
}

/// Fingerprint of everything that affects the answer: subject ids, ordered
/// actions and the resource.
pub fn cache_key(request: &SubjectAccessReviewSpec) -> String {
    let mut hasher = Sha256::new();
    for id in &request.subject.attributes.object_id {
        hasher.update(id.as_bytes());
        hasher.update([0]);
    }
    hasher.update([1]);
    for action in &request.actions {
        hasher.update(action.id.as_bytes());
        hasher.update([0, action.is_data_action as u8]);
    }
    hasher.update([1]);
    hasher.update(request.resource.id.as_bytes());
    format!("{}{}", CACHE_KEY_PREFIX, hex::encode(hasher.finalize()))
}

#[async_trait]
impl Authorizer for AzureAuthorizer {
    fn uid(&self) -> &'static str {
        ORG_TYPE
    }

    async fn check(
        &self,
        _cancel: &CancellationToken,
        request: &SubjectAccessReviewSpec,
        store: &dyn DecisionStore,
    ) -> Result<AccessReviewStatus, AuthzError> {
        let key = cache_key(request);

        let mut cached = AccessReviewStatus::default();
        match store.get(&key, &mut cached) {
            Ok(true) => {
                metrics::counter!("authz_cache_hits_total").increment(1);
                tracing::debug!(key = %key, allowed = cached.allowed, "Decision cache hit");
                return Ok(cached);
            }
            Ok(false) => metrics::counter!("authz_cache_misses_total").increment(1),
            Err(e) => {
                metrics::counter!("authz_cache_misses_total").increment(1);
                tracing::warn!(key = %key, error = %e, "Decision cache read failed");
            }
        }

        let (status, rejected) = match self.check_access(request).await? {
            CheckAccessOutcome::Decisions(decisions) => (AccessReviewStatus::from_decisions(decisions), false),
            CheckAccessOutcome::Rejected(code) => {
                tracing::warn!(status = code, resource = %request.resource.id, "CheckAccess rejected the request, caching denial");
                (AccessReviewStatus::denied(format!("CheckAccess returned status {}", code)), true)
            }
        };

        match store.set(&key, &status) {
            Ok(()) if rejected => metrics::counter!("authz_errors_cached_total").increment(1),
            Ok(()) => {}
            Err(e) => tracing::warn!(key = %key, error = %e, "Decision cache write failed"),
        }
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::{Action, Resource, Subject, SubjectAttributes};

    fn request(actions: &[(&str, bool)]) -> SubjectAccessReviewSpec {
        SubjectAccessReviewSpec {
            subject: Subject {
                attributes: SubjectAttributes {
                    object_id: vec!["u1".into()],
                },
            },
            actions: actions
                .iter()
                .map(|(id, data)| Action {
                    id: id.to_string(),
                    is_data_action: *data,
                })
                .collect(),
            resource: Resource {
                id: "/subscriptions/s".into(),
            },
        }
    }

    #[test]
    fn cache_key_depends_on_action_order_and_flags() {
        let base = cache_key(&request(&[("a", false), ("b", true)]));
        assert!(base.starts_with(CACHE_KEY_PREFIX));
        assert_eq!(base, cache_key(&request(&[("a", false), ("b", true)])));
        assert_ne!(base, cache_key(&request(&[("b", true), ("a", false)])));
        assert_ne!(base, cache_key(&request(&[("a", true), ("b", true)])));
        assert_ne!(
            cache_key(&request(&[("ab", false)])),
            cache_key(&request(&[("a", false), ("b", false)]))
        );
    }

    #[test]
    fn expires_on_accepts_numbers_and_strings() {
        let a: TokenResponse = serde_json::from_str(r#"{"access_token":"t","expires_on":10}"#).unwrap();
        let b: TokenResponse = serde_json::from_str(r#"{"access_token":"t","expires_on":"10"}"#).unwrap();
        assert_eq!(a.expires_on, b.expires_on);
    }

    #[test]
    fn url_joins_endpoint_and_resource() {
        let authz = AzureAuthorizer::new(
            AzureOptions {
                pdp_endpoint: "https://pdp.example/".into(),
                token_url: String::new(),
                api_version: DEFAULT_API_VERSION.into(),
                client_id: String::new(),
                client_secret: Secret::new(String::new()),
                resource: String::new(),
            },
            Client::new(),
        );
        assert_eq!(
            authz.check_access_url("/subscriptions/s"),
            "https://pdp.example/subscriptions/s/providers/Microsoft.Authorization/checkaccess?api-version=2018-09-01-preview"
        );
    }
}
