//! Firebase Admin REST client: ID token verification against Google's
//! secure-token keys and Identity Toolkit account lookups.

use super::{FirebaseAuth, UserRecord, VerifiedToken};
use crate::auth::AuthError;
use async_trait::async_trait;
use jsonwebtoken::{decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use reqwest::header::CACHE_CONTROL;
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};

pub const JWKS_URL: &str =
    "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";
pub const IDENTITY_TOOLKIT_URL: &str = "https://identitytoolkit.googleapis.com/v1/";
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

const ISSUER_PREFIX: &str = "https://securetoken.google.com/";
const SCOPES: &str =
    "https://www.googleapis.com/auth/cloud-platform https://www.googleapis.com/auth/identitytoolkit";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const DEFAULT_KEYS_TTL: Duration = Duration::from_secs(3600);
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);
const MAX_UID_LEN: usize = 128;

/// The fields of a Google service account key file this client needs.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccount {
    pub project_id: String,
    pub client_email: String,
    pub private_key: Secret<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl ServiceAccount {
    pub fn from_file(path: &Path) -> Result<Self, AuthError> {
        let data = std::fs::read(path).map_err(|e| {
            AuthError::Configuration(format!(
                "failed to read firebase service account file `{}`: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&data)
    }

    pub fn from_json(data: &[u8]) -> Result<Self, AuthError> {
        let account: ServiceAccount = serde_json::from_slice(data).map_err(|e| {
            AuthError::Configuration(format!("malformed firebase service account: {}", e))
        })?;
        if account.project_id.is_empty() || account.client_email.is_empty() {
            return Err(AuthError::Configuration(
                "firebase service account is missing project_id or client_email".to_string(),
            ));
        }
        Ok(account)
    }
}

#[derive(Debug, Clone)]
pub struct FirebaseEndpoints {
    pub jwks_url: String,
    pub identity_toolkit_url: String,
}

impl Default for FirebaseEndpoints {
    fn default() -> Self {
        Self {
            jwks_url: JWKS_URL.to_string(),
            identity_toolkit_url: IDENTITY_TOOLKIT_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct Jwk {
    kid: String,
    n: String,
    e: String,
}

#[derive(Debug, Deserialize)]
struct JwkSet {
    keys: Vec<Jwk>,
}

struct CachedKeys {
    keys: HashMap<String, Jwk>,
    expires_at: Instant,
}

struct CachedToken {
    token: String,
    expires_at: Instant,
}

#[derive(Debug, Deserialize)]
struct IdTokenClaims {
    sub: String,
    #[serde(default)]
    auth_time: i64,
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct OAuthToken {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<AccountInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountInfo {
    local_id: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    disabled: bool,
    valid_since: Option<String>,
}

impl AccountInfo {
    fn valid_since(&self) -> Option<i64> {
        self.valid_since.as_deref().and_then(|s| s.parse().ok())
    }
}

pub struct FirebaseRestClient {
    client: Client,
    account: ServiceAccount,
    endpoints: FirebaseEndpoints,
    signing_key: EncodingKey,
    validation: Validation,
    keys: RwLock<Option<CachedKeys>>,
    access_token: Mutex<Option<CachedToken>>,
}

impl FirebaseRestClient {
    pub fn new(account: ServiceAccount, endpoints: FirebaseEndpoints, client: Client) -> Result<Self, AuthError> {
        let signing_key = EncodingKey::from_rsa_pem(account.private_key.expose_secret().as_bytes())
            .map_err(|e| {
                AuthError::Configuration(format!("invalid firebase service account private key: {}", e))
            })?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[&account.project_id]);
        validation.set_issuer(&[format!("{}{}", ISSUER_PREFIX, account.project_id)]);
        validation.set_required_spec_claims(&["exp", "iat", "aud", "iss", "sub"]);

        Ok(Self {
            client,
            account,
            endpoints,
            signing_key,
            validation,
            keys: RwLock::new(None),
            access_token: Mutex::new(None),
        })
    }

    pub fn from_service_account_file(path: &Path, client: Client) -> Result<Self, AuthError> {
        Self::new(ServiceAccount::from_file(path)?, FirebaseEndpoints::default(), client)
    }

    pub fn project_id(&self) -> &str {
        &self.account.project_id
    }

    /// Keys are fetched only when the cached set has expired; an unknown
    /// `kid` against a fresh set is rejected without another fetch.
    async fn verification_key(&self, kid: &str) -> Result<DecodingKey, AuthError> {
        if let Some(found) = cached_key(self.keys.read().await.as_ref(), kid) {
            return found;
        }

        let mut cached = self.keys.write().await;
        // another request may have refreshed the set while we waited
        if let Some(found) = cached_key(cached.as_ref(), kid) {
            return found;
        }

        let response = self
            .client
            .get(&self.endpoints.jwks_url)
            .send()
            .await
            .map_err(|e| AuthError::unavailable(super::ORG_TYPE, e))?;
        if !response.status().is_success() {
            return Err(AuthError::unavailable(
                super::ORG_TYPE,
                format!("public key fetch returned {}", response.status()),
            ));
        }
        let ttl = response
            .headers()
            .get(CACHE_CONTROL)
            .and_then(|v| v.to_str().ok())
            .and_then(max_age)
            .unwrap_or(DEFAULT_KEYS_TTL);
        let set: JwkSet = response
            .json()
            .await
            .map_err(|e| AuthError::unavailable(super::ORG_TYPE, e))?;

        let keys: HashMap<String, Jwk> = set.keys.into_iter().map(|k| (k.kid.clone(), k)).collect();
        tracing::debug!(keys = keys.len(), ttl_secs = ttl.as_secs(), "Refreshed firebase signing keys");
        let jwk = keys.get(kid).cloned();
        *cached = Some(CachedKeys {
            keys,
            expires_at: Instant::now() + ttl,
        });

        match jwk {
            Some(jwk) => decoding_key(&jwk),
            None => Err(unknown_key(kid)),
        }
    }

    async fn bearer_token(&self) -> Result<String, AuthError> {
        let mut cached = self.access_token.lock().await;
        if let Some(token) = cached
            .as_ref()
            .filter(|t| t.expires_at > Instant::now() + TOKEN_REFRESH_MARGIN)
        {
            return Ok(token.token.clone());
        }

        let iat = chrono::Utc::now().timestamp();
        let claims = AssertionClaims {
            iss: &self.account.client_email,
            scope: SCOPES,
            aud: &self.account.token_uri,
            iat,
            exp: iat + 3600,
        };
        let assertion = encode(&Header::new(Algorithm::RS256), &claims, &self.signing_key)
            .map_err(|e| AuthError::Configuration(format!("failed to sign token request: {}", e)))?;

        let response = self
            .client
            .post(&self.account.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| AuthError::unavailable(super::ORG_TYPE, e))?;
        if !response.status().is_success() {
            return Err(AuthError::unavailable(
                super::ORG_TYPE,
                format!("access token request returned {}", response.status()),
            ));
        }
        let token: OAuthToken = response
            .json()
            .await
            .map_err(|e| AuthError::unavailable(super::ORG_TYPE, e))?;

        *cached = Some(CachedToken {
            token: token.access_token.clone(),
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        });
        Ok(token.access_token)
    }

    async fn lookup(&self, uid: &str) -> Result<AccountInfo, AuthError> {
        let bearer = self.bearer_token().await?;
        let url = format!(
            "{}projects/{}/accounts:lookup",
            self.endpoints.identity_toolkit_url, self.account.project_id
        );
        let response = self
            .client
            .post(url)
            .bearer_auth(bearer)
            .json(&serde_json::json!({ "localId": [uid] }))
            .send()
            .await
            .map_err(|e| AuthError::unavailable(super::ORG_TYPE, e))?;
        if !response.status().is_success() {
            return Err(AuthError::unavailable(
                super::ORG_TYPE,
                format!("account lookup returned {}", response.status()),
            ));
        }
        let found: LookupResponse = response
            .json()
            .await
            .map_err(|e| AuthError::unavailable(super::ORG_TYPE, e))?;

        found
            .users
            .into_iter()
            .find(|user| user.local_id == uid)
            .ok_or_else(|| AuthError::InvalidToken(format!("no user record for uid `{}`", uid)))
    }
}

#[async_trait]
impl FirebaseAuth for FirebaseRestClient {
    async fn verify_id_token_and_check_revoked(&self, id_token: &str) -> Result<VerifiedToken, AuthError> {
        let header = decode_header(id_token)
            .map_err(|e| AuthError::InvalidToken(format!("malformed id token: {}", e)))?;
        if header.alg != Algorithm::RS256 {
            return Err(AuthError::InvalidToken(format!(
                "id token uses unsupported algorithm {:?}",
                header.alg
            )));
        }
        let kid = header
            .kid
            .ok_or_else(|| AuthError::InvalidToken("id token has no key id".to_string()))?;

        let key = self.verification_key(&kid).await?;
        let claims = decode::<IdTokenClaims>(id_token, &key, &self.validation)
            .map_err(|e| AuthError::InvalidToken(format!("id token verification failed: {}", e)))?
            .claims;

        if claims.sub.is_empty() || claims.sub.len() > MAX_UID_LEN {
            return Err(AuthError::InvalidToken("id token has an invalid subject".to_string()));
        }

        let account = self.lookup(&claims.sub).await?;
        if account.disabled {
            return Err(AuthError::InvalidToken("user account is disabled".to_string()));
        }
        if account.valid_since().is_some_and(|since| claims.auth_time < since) {
            return Err(AuthError::InvalidToken("id token has been revoked".to_string()));
        }

        Ok(VerifiedToken { uid: claims.sub })
    }

    async fn get_user(&self, uid: &str) -> Result<UserRecord, AuthError> {
        let account = self.lookup(uid).await?;
        Ok(UserRecord {
            uid: account.local_id,
            email: account.email,
            disabled: account.disabled,
        })
    }
}

/// `None` when the set is missing or expired and must be fetched.
fn cached_key(cached: Option<&CachedKeys>, kid: &str) -> Option<Result<DecodingKey, AuthError>> {
    let cached = cached.filter(|c| c.expires_at > Instant::now())?;
    Some(match cached.keys.get(kid) {
        Some(jwk) => decoding_key(jwk),
        None => Err(unknown_key(kid)),
    })
}

fn unknown_key(kid: &str) -> AuthError {
    AuthError::InvalidToken(format!("id token signed with unknown key `{}`", kid))
}

fn decoding_key(jwk: &Jwk) -> Result<DecodingKey, AuthError> {
    DecodingKey::from_rsa_components(&jwk.n, &jwk.e)
        .map_err(|e| AuthError::unavailable(super::ORG_TYPE, format!("bad signing key `{}`: {}", jwk.kid, e)))
}

fn max_age(cache_control: &str) -> Option<Duration> {
    cache_control
        .split(',')
        .filter_map(|directive| directive.trim().strip_prefix("max-age="))
        .find_map(|secs| secs.parse().ok())
        .map(Duration::from_secs)
}
