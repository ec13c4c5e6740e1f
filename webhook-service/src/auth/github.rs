//! GitHub organization membership and team lookup.

use super::{AuthError, Authenticator, UserIdentity};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

pub const ORG_TYPE: &str = "github";
pub const DEFAULT_API_URL: &str = "https://api.github.com/";
const PAGE_SIZE: usize = 25;
const MEDIA_TYPE: &str = "application/vnd.github.v3+json";
const AGENT: &str = concat!("guard-webhook/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Default)]
pub struct GithubOptions {
    /// GitHub Enterprise host, e.g. `https://github.example.com/`.
    pub base_url: Option<String>,
}

impl GithubOptions {
    /// REST root for the configured host. Enterprise hosts serve the API
    /// under `api/v3/`.
    pub fn api_url(&self) -> String {
        match self.base_url.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            None => DEFAULT_API_URL.to_string(),
            Some(base) => {
                let mut base = base.to_string();
                if !base.ends_with('/') {
                    base.push('/');
                }
                if !base.ends_with("api/v3/") {
                    base.push_str("api/v3/");
                }
                base
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct Membership {
    #[serde(default)]
    state: String,
    user: GithubUser,
}

#[derive(Debug, Deserialize)]
struct GithubUser {
    login: String,
    id: i64,
}

#[derive(Debug, Deserialize)]
struct Team {
    name: String,
    organization: Option<TeamOrg>,
}

#[derive(Debug, Deserialize)]
struct TeamOrg {
    login: String,
}

pub struct GithubAuthenticator {
    client: Client,
    api_url: String,
    org: String,
}

impl GithubAuthenticator {
    pub fn new(org: impl Into<String>, options: &GithubOptions, client: Client) -> Self {
        Self {
            client,
            api_url: options.api_url(),
            org: org.into(),
        }
    }

    async fn get(&self, path: &str, token: &str) -> Result<reqwest::Response, AuthError> {
        self.client
            .get(format!("{}{}", self.api_url, path))
            .bearer_auth(token)
            .header(USER_AGENT, AGENT)
            .header(ACCEPT, MEDIA_TYPE)
            .send()
            .await
            .map_err(|e| AuthError::unavailable(ORG_TYPE, e))
    }

    async fn membership(&self, token: &str) -> Result<GithubUser, AuthError> {
        let response = self
            .get(&format!("user/memberships/orgs/{}", self.org), token)
            .await?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::UNAUTHORIZED => {
                return Err(AuthError::InvalidToken("github rejected the token".to_string()))
            }
            StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => {
                return Err(AuthError::NotAMember {
                    org: self.org.clone(),
                })
            }
            status => {
                return Err(AuthError::unavailable(
                    ORG_TYPE,
                    format!("membership lookup returned {}", status),
                ))
            }
        }

        let membership: Membership = response
            .json()
            .await
            .map_err(|e| AuthError::unavailable(ORG_TYPE, e))?;

        if membership.state.eq_ignore_ascii_case("pending") {
            tracing::debug!(user = %membership.user.login, org = %self.org, "Membership invitation not accepted");
            return Err(AuthError::NotAMember {
                org: self.org.clone(),
            });
        }
        Ok(membership.user)
    }

    async fn teams(&self, cancel: &CancellationToken, token: &str) -> Result<Vec<String>, AuthError> {
        let mut groups = Vec::new();
        for page in 1.. {
            if cancel.is_cancelled() {
                return Err(AuthError::Canceled);
            }
            let response = self
                .get(&format!("user/teams?page={}&per_page={}", page, PAGE_SIZE), token)
                .await?;
            if !response.status().is_success() {
                return Err(AuthError::unavailable(
                    ORG_TYPE,
                    format!("team listing returned {}", response.status()),
                ));
            }
            let teams: Vec<Team> = response
                .json()
                .await
                .map_err(|e| AuthError::unavailable(ORG_TYPE, e))?;

            let count = teams.len();
            groups.extend(
                teams
                    .into_iter()
                    .filter(|team| team.organization.as_ref().is_some_and(|o| o.login == self.org))
                    .map(|team| team.name),
            );
            if count < PAGE_SIZE {
                break;
            }
        }
        Ok(groups)
    }
}

#[async_trait]
impl Authenticator for GithubAuthenticator {
    fn uid(&self) -> &'static str {
        ORG_TYPE
    }

    async fn check(&self, cancel: &CancellationToken, token: &str) -> Result<UserIdentity, AuthError> {
        let user = self.membership(token).await?;
        let groups = self.teams(cancel, token).await?;

        tracing::debug!(user = %user.login, org = %self.org, teams = groups.len(), "GitHub user authenticated");
        Ok(UserIdentity {
            username: user.login,
            uid: user.id.to_string(),
            groups,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enterprise_url_gains_api_suffix_once() {
        let opts = |base: &str| GithubOptions {
            base_url: Some(base.to_string()),
        };
        assert_eq!(GithubOptions::default().api_url(), DEFAULT_API_URL);
        assert_eq!(opts("https://gh.example.com").api_url(), "https://gh.example.com/api/v3/");
        assert_eq!(
            opts("https://gh.example.com/api/v3/").api_url(),
            "https://gh.example.com/api/v3/"
        );
        assert_eq!(opts("  ").api_url(), DEFAULT_API_URL);
    }
}
