use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub type Result<T, E = CertStoreError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum CertStoreError {
    #[error("{0}")]
    Usage(String),

    #[error("`{}` does not exist", path.display())]
    NotFound { path: PathBuf },

    #[error("permission denied on `{}`", path.display())]
    PermissionDenied {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse {what} `{}`: {reason}", path.display())]
    MalformedPem {
        what: &'static str,
        path: PathBuf,
        reason: String,
    },

    #[error("private key `{}` is not a rsa private key", path.display())]
    WrongKeyAlgorithm { path: PathBuf },

    #[error("failed to {op} `{}`", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to generate {what}")]
    Generate {
        what: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl CertStoreError {
    /// Classify an I/O failure on `path` so callers can branch on absence or
    /// access problems without inspecting the source.
    pub(crate) fn io(op: &'static str, path: &Path, source: io::Error) -> Self {
        let path = path.to_path_buf();
        match source.kind() {
            io::ErrorKind::NotFound => CertStoreError::NotFound { path },
            io::ErrorKind::PermissionDenied => CertStoreError::PermissionDenied { path, source },
            _ => CertStoreError::Io { op, path, source },
        }
    }

    pub(crate) fn generate<E>(what: &'static str, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        CertStoreError::Generate {
            what,
            source: Box::new(source),
        }
    }

    pub(crate) fn malformed(what: &'static str, path: &Path, reason: impl ToString) -> Self {
        CertStoreError::MalformedPem {
            what,
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CertStoreError::NotFound { .. })
    }
}
