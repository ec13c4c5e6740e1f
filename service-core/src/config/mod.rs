use crate::error::AppError;
use config::{Config as Cfg, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    8443
}

impl Config {
    pub fn load() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let config = Cfg::builder()
            .add_source(File::with_name("configuration").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        Ok(config.try_deserialize()?)
    }
}

/// Read an environment variable, falling back to `default`.
///
/// A missing variable with no default is a configuration error when
/// `required` is set; otherwise it resolves to an empty string.
pub fn get_env(key: &str, default: Option<&str>, required: bool) -> Result<String, AppError> {
    get_env_from(&|k| std::env::var(k).ok(), key, default, required)
}

/// [`get_env`] against an arbitrary variable source.
pub fn get_env_from(
    lookup: &dyn Fn(&str) -> Option<String>,
    key: &str,
    default: Option<&str>,
    required: bool,
) -> Result<String, AppError> {
    match lookup(key) {
        Some(val) => Ok(val),
        None => match default {
            Some(d) => Ok(d.to_string()),
            None if required => Err(AppError::ConfigError(anyhow::anyhow!(
                "{} environment variable is required",
                key
            ))),
            None => Ok(String::new()),
        },
    }
}

/// Split a comma separated list, trimming entries and dropping blanks.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
