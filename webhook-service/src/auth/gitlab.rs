//! GitLab current-user and group lookup.

use super::{AuthError, Authenticator, UserIdentity};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

pub const ORG_TYPE: &str = "gitlab";
pub const DEFAULT_API_URL: &str = "https://gitlab.com/api/v4/";
const PAGE_SIZE: usize = 20;
const TOKEN_HEADER: &str = "PRIVATE-TOKEN";

#[derive(Debug, Clone, Default)]
pub struct GitlabOptions {
    /// Self-hosted API root, e.g. `https://gitlab.example.com/api/v4/`.
    pub base_url: Option<String>,
    /// Report numeric group ids instead of group names.
    pub use_group_id: bool,
}

impl GitlabOptions {
    pub fn api_url(&self) -> String {
        match self.base_url.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            None => DEFAULT_API_URL.to_string(),
            Some(base) if base.ends_with('/') => base.to_string(),
            Some(base) => format!("{}/", base),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GitlabUser {
    id: i64,
    username: String,
}

#[derive(Debug, Deserialize)]
struct Group {
    id: i64,
    name: String,
}

pub struct GitlabAuthenticator {
    client: Client,
    api_url: String,
    use_group_id: bool,
}

impl GitlabAuthenticator {
    pub fn new(options: &GitlabOptions, client: Client) -> Self {
        Self {
            client,
            api_url: options.api_url(),
            use_group_id: options.use_group_id,
        }
    }

    async fn get(&self, path: &str, token: &str) -> Result<reqwest::Response, AuthError> {
        let response = self
            .client
            .get(format!("{}{}", self.api_url, path))
            .header(TOKEN_HEADER, token)
            .send()
            .await
            .map_err(|e| AuthError::unavailable(ORG_TYPE, e))?;

        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(AuthError::InvalidToken("gitlab rejected the token".to_string()))
            }
            status => Err(AuthError::unavailable(
                ORG_TYPE,
                format!("GET {} returned {}", path, status),
            )),
        }
    }

    async fn groups(&self, cancel: &CancellationToken, token: &str) -> Result<Vec<String>, AuthError> {
        let mut names = Vec::new();
        for page in 1.. {
            if cancel.is_cancelled() {
                return Err(AuthError::Canceled);
            }
            let groups: Vec<Group> = self
                .get(&format!("groups?page={}&per_page={}", page, PAGE_SIZE), token)
                .await?
                .json()
                .await
                .map_err(|e| AuthError::unavailable(ORG_TYPE, e))?;

            let count = groups.len();
            names.extend(groups.into_iter().map(|group| {
                if self.use_group_id {
                    group.id.to_string()
                } else {
                    group.name
                }
            }));
            if count < PAGE_SIZE {
                break;
            }
        }
        Ok(names)
    }
}

#[async_trait]
impl Authenticator for GitlabAuthenticator {
    fn uid(&self) -> &'static str {
        ORG_TYPE
    }

    async fn check(&self, cancel: &CancellationToken, token: &str) -> Result<UserIdentity, AuthError> {
        let user: GitlabUser = self
            .get("user", token)
            .await?
            .json()
            .await
            .map_err(|e| AuthError::unavailable(ORG_TYPE, e))?;

        let groups = self.groups(cancel, token).await?;

        Ok(UserIdentity {
            username: user.username,
            uid: user.id.to_string(),
            groups,
        })
    }
}
