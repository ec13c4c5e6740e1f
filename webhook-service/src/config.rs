use crate::auth::github::GithubOptions;
use crate::auth::gitlab::GitlabOptions;
use crate::auth::token_file::DEFAULT_TOKEN_AUTH_DIR;
use crate::authz::azure::{AzureOptions, DEFAULT_API_VERSION};
use crate::authz::store::DEFAULT_TTL;
use crate::orgs::{auth_orgs, authz_orgs};
use secrecy::Secret;
use service_core::config::{self as core_config, get_env_from, split_list};
use service_core::error::AppError;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub common: core_config::Config,
    pub environment: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub auth_providers: Vec<String>,
    pub authz_providers: Vec<String>,
    pub github: GithubConfig,
    pub gitlab: GitlabOptions,
    pub firebase: FirebaseConfig,
    pub token_auth: TokenAuthConfig,
    pub azure: Option<AzureConfig>,
    pub tls: Option<TlsConfig>,
    pub upstream_timeout: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct GithubConfig {
    pub org: String,
    pub options: GithubOptions,
}

#[derive(Debug, Clone, Default)]
pub struct FirebaseConfig {
    /// Path to the service account key file.
    pub sa_json_file: Option<Secret<String>>,
}

#[derive(Debug, Clone)]
pub struct TokenAuthConfig {
    pub dir: PathBuf,
    pub reload_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct AzureConfig {
    pub options: AzureOptions,
    pub cache_ttl: Duration,
}

#[derive(Debug, Clone)]
pub struct TlsConfig {
    pub cert_file: PathBuf,
    pub key_file: PathBuf,
}

impl WebhookConfig {
    pub fn load() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;
        Self::from_lookup(common, |key| std::env::var(key).ok())
    }

    /// Build the configuration from `lookup`, a source of environment-style
    /// variables. In `prod` every setting without a safe default is required.
    pub fn from_lookup<F>(common: core_config::Config, lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = lookup("ENVIRONMENT").unwrap_or_else(|| "dev".to_string());
        let is_prod = environment == "prod";
        let get = |key: &str, default: Option<&str>, required: bool| get_env_from(&lookup, key, default, required);
        let optional = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let auth_providers = split_list(&get("AUTH_PROVIDERS", None, true)?)
            .into_iter()
            .map(|p| p.to_lowercase())
            .collect::<Vec<_>>();
        if auth_providers.is_empty() {
            return Err(config_error("AUTH_PROVIDERS must name at least one provider"));
        }
        auth_orgs()
            .validate_enabled(&auth_providers)
            .map_err(|e| config_error(format!("AUTH_PROVIDERS: {}", e)))?;

        let authz_providers = split_list(&get("AUTHZ_PROVIDERS", Some(""), false)?)
            .into_iter()
            .map(|p| p.to_lowercase())
            .collect::<Vec<_>>();
        authz_orgs()
            .validate_enabled(&authz_providers)
            .map_err(|e| config_error(format!("AUTHZ_PROVIDERS: {}", e)))?;

        let enabled = |name: &str| auth_providers.iter().any(|p| p == name);

        let github = GithubConfig {
            org: get("GITHUB_ORG", Some(""), false)?,
            options: GithubOptions {
                base_url: optional("GITHUB_BASE_URL"),
            },
        };
        if enabled(crate::auth::github::ORG_TYPE) && github.org.trim().is_empty() {
            return Err(config_error("GITHUB_ORG is required when the github provider is enabled"));
        }

        let gitlab = GitlabOptions {
            base_url: optional("GITLAB_BASE_URL"),
            use_group_id: parse_bool("GITLAB_USE_GROUP_ID", &get("GITLAB_USE_GROUP_ID", Some("false"), false)?)?,
        };

        let firebase = FirebaseConfig {
            sa_json_file: optional("FIREBASE_SA_JSON_FILE").map(Secret::new),
        };
        if enabled(crate::auth::firebase::ORG_TYPE) && firebase.sa_json_file.is_none() {
            return Err(config_error(
                "FIREBASE_SA_JSON_FILE is required when the firebase provider is enabled",
            ));
        }

        let token_auth = TokenAuthConfig {
            dir: PathBuf::from(get("TOKEN_AUTH_DIR", Some(DEFAULT_TOKEN_AUTH_DIR), false)?),
            reload_interval: parse_seconds(
                "TOKEN_RELOAD_INTERVAL_SECONDS",
                &get("TOKEN_RELOAD_INTERVAL_SECONDS", Some("10"), false)?,
            )?,
        };

        let azure = if authz_providers
            .iter()
            .any(|p| p == crate::authz::azure::ORG_TYPE)
        {
            let token_url = get("AZURE_TOKEN_URL", None, true)?;
            Some(AzureConfig {
                options: AzureOptions {
                    pdp_endpoint: get("AZURE_PDP_ENDPOINT", None, true)?,
                    resource: get("AZURE_RESOURCE", Some("https://management.azure.com/"), is_prod)?,
                    api_version: get("AZURE_API_VERSION", Some(DEFAULT_API_VERSION), false)?,
                    client_id: get("AZURE_CLIENT_ID", Some(""), is_prod)?,
                    client_secret: Secret::new(get("AZURE_CLIENT_SECRET", Some(""), is_prod)?),
                    token_url,
                },
                cache_ttl: parse_seconds(
                    "AZURE_CACHE_TTL_SECONDS",
                    &get(
                        "AZURE_CACHE_TTL_SECONDS",
                        Some(&DEFAULT_TTL.as_secs().to_string()),
                        false,
                    )?,
                )?,
            })
        } else {
            None
        };

        let tls = match (optional("TLS_CERT_FILE"), optional("TLS_KEY_FILE")) {
            (Some(cert), Some(key)) => Some(TlsConfig {
                cert_file: cert.into(),
                key_file: key.into(),
            }),
            (None, None) if !is_prod => None,
            _ => {
                return Err(config_error(
                    "TLS_CERT_FILE and TLS_KEY_FILE must be set together (and are required in prod)",
                ))
            }
        };

        Ok(Self {
            common,
            log_level: get("LOG_LEVEL", Some("info"), false)?,
            otlp_endpoint: optional("OTLP_ENDPOINT"),
            environment,
            auth_providers,
            authz_providers,
            github,
            gitlab,
            firebase,
            token_auth,
            azure,
            tls,
            upstream_timeout: parse_seconds(
                "UPSTREAM_TIMEOUT_SECONDS",
                &get("UPSTREAM_TIMEOUT_SECONDS", Some("10"), false)?,
            )?,
        })
    }

    pub fn auth_enabled(&self, org: &str) -> bool {
        self.auth_providers.iter().any(|p| p == org)
    }
}

fn config_error(msg: impl Into<String>) -> AppError {
    AppError::ConfigError(anyhow::anyhow!(msg.into()))
}

fn parse_seconds(key: &str, raw: &str) -> Result<Duration, AppError> {
    match raw.trim().parse::<u64>() {
        Ok(0) => Err(config_error(format!("{} must be at least 1", key))),
        Ok(secs) => Ok(Duration::from_secs(secs)),
        Err(e) => Err(config_error(format!("{} must be a positive integer: {}", key, e))),
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, AppError> {
    raw.trim()
        .parse()
        .map_err(|e| config_error(format!("{} must be true or false: {}", key, e)))
}
