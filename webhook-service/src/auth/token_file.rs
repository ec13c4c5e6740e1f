//! Static token authentication backed by a CSV file.
//!
//! Each row is `token,username,uid[,"group1,group2"]`. The file is read
//! through a [`Reloader`] so operators can swap it at runtime by touching
//! the `trigger` file next to it.

use super::{AuthError, Authenticator, UserIdentity};
use async_trait::async_trait;
use service_core::reload::{EmbeddedFs, Fsys, Reloader};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const ORG_TYPE: &str = "token";
pub const TOKEN_FILE: &str = "token.csv";
pub const DEFAULT_TOKEN_AUTH_DIR: &str = "/etc/guard/auth";

const MIN_RELOAD_INTERVAL: Duration = Duration::from_millis(100);

static BUNDLE: EmbeddedFs = EmbeddedFs::new(&[(
    TOKEN_FILE,
    include_bytes!("../../assets/token-auth/token.csv"),
)]);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenFileError {
    #[error("line #{0} of token auth file is ill formatted")]
    IllFormatted(usize),
    #[error("line #{0} of token auth file has empty token")]
    EmptyToken(usize),
    #[error("line #{0} of token auth file reuses token")]
    DuplicateToken(usize),
    #[error("line #{0} of token auth file has empty user name")]
    EmptyUsername(usize),
    #[error("line #{0} of token auth file has empty uid")]
    EmptyUid(usize),
}

type TokenMap = HashMap<String, UserIdentity>;

/// Parse the token CSV. Blank lines are skipped; line numbers count records.
pub fn parse_token_file(data: &str) -> Result<TokenMap, TokenFileError> {
    let mut tokens = TokenMap::new();
    let records = data.lines().filter(|line| !line.trim().is_empty());

    for (idx, line) in records.enumerate() {
        let line_no = idx + 1;
        let fields = split_record(line).ok_or(TokenFileError::IllFormatted(line_no))?;
        if fields.len() != 3 && fields.len() != 4 {
            return Err(TokenFileError::IllFormatted(line_no));
        }

        let token = fields[0].trim();
        if token.is_empty() {
            return Err(TokenFileError::EmptyToken(line_no));
        }
        if tokens.contains_key(token) {
            return Err(TokenFileError::DuplicateToken(line_no));
        }
        let username = fields[1].trim();
        if username.is_empty() {
            return Err(TokenFileError::EmptyUsername(line_no));
        }
        let uid = fields[2].trim();
        if uid.is_empty() {
            return Err(TokenFileError::EmptyUid(line_no));
        }
        let groups = fields
            .get(3)
            .map(|raw| service_core::config::split_list(raw))
            .unwrap_or_default();

        tokens.insert(
            token.to_string(),
            UserIdentity {
                username: username.to_string(),
                uid: uid.to_string(),
                groups,
            },
        );
    }
    Ok(tokens)
}

/// Split one CSV record. Fields starting with `"` run to the closing quote,
/// with `""` standing for a literal quote. `None` on a malformed quote.
fn split_record(line: &str) -> Option<Vec<String>> {
    let mut fields = Vec::new();
    let mut chars = line.chars().peekable();

    loop {
        let mut field = String::new();
        if chars.peek() == Some(&'"') {
            chars.next();
            loop {
                match chars.next()? {
                    '"' if chars.peek() == Some(&'"') => {
                        chars.next();
                        field.push('"');
                    }
                    '"' => break,
                    c => field.push(c),
                }
            }
            match chars.next() {
                None => {
                    fields.push(field);
                    return Some(fields);
                }
                Some(',') => fields.push(field),
                Some(_) => return None,
            }
        } else {
            loop {
                match chars.next() {
                    None => {
                        fields.push(field);
                        return Some(fields);
                    }
                    Some(',') => break,
                    Some('"') => return None,
                    Some(c) => field.push(c),
                }
            }
            fields.push(field);
        }
    }
}

pub struct TokenFileAuthenticator {
    tokens: Arc<RwLock<TokenMap>>,
    reloader: Mutex<Reloader>,
}

impl TokenFileAuthenticator {
    /// Build an authenticator reading `token.csv` from `dir`, or from the
    /// baked-in bundle when `dir` does not exist. Nothing is read yet.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let tokens = Arc::new(RwLock::new(TokenMap::new()));
        let target = tokens.clone();
        let reloader = Reloader::new(dir, BUNDLE, move |fsys: &Fsys| {
            let data = fsys.read_to_string(TOKEN_FILE)?;
            let parsed = parse_token_file(&data)?;
            let count = parsed.len();
            *target.write().unwrap_or_else(PoisonError::into_inner) = parsed;
            tracing::info!(tokens = count, embedded = fsys.is_embedded(), "Token auth file loaded");
            Ok(())
        });
        Self {
            tokens,
            reloader: Mutex::new(reloader),
        }
    }

    /// Build and perform the initial load. A malformed file is fatal here.
    pub fn load(dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let authenticator = Self::new(dir);
        authenticator.reload_if_triggered()?;
        Ok(authenticator)
    }

    pub fn reload_if_triggered(&self) -> anyhow::Result<bool> {
        self.reloader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .reload_if_triggered()
    }

    pub fn lookup(&self, token: &str) -> Option<UserIdentity> {
        self.tokens
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(token.trim())
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.tokens.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Poll the trigger file every `interval` until `cancel` fires. A failed
    /// reload keeps the previous table and is retried on the next tick.
    pub fn spawn_reload_task(self: &Arc<Self>, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval.max(MIN_RELOAD_INTERVAL));
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let worker = Arc::clone(&this);
                match tokio::task::spawn_blocking(move || worker.reload_if_triggered()).await {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => tracing::error!(error = %format!("{:#}", e), "Token auth file reload failed"),
                    Err(e) => tracing::error!(error = %e, "Token auth reload task panicked"),
                }
            }
            tracing::debug!("Token auth reload task stopped");
        })
    }
}

#[async_trait]
impl Authenticator for TokenFileAuthenticator {
    fn uid(&self) -> &'static str {
        ORG_TYPE
    }

    async fn check(&self, _cancel: &CancellationToken, token: &str) -> Result<UserIdentity, AuthError> {
        self.lookup(token)
            .ok_or_else(|| AuthError::InvalidToken("Invalid token".to_string()))
    }
}
