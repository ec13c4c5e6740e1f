//! PEM-backed certificate authority used to bootstrap mutual TLS between the
//! webhook and its callers.

pub mod error;
pub mod fs;
pub mod host;
pub mod pem;
mod store;

pub use error::{CertStoreError, Result};
pub use fs::{Filesystem, MemFs, OsFs};
pub use pem::Certificate;
pub use store::{AltNames, CertStore, DEFAULT_CA_NAME};

use std::path::PathBuf;

/// `$GUARD_DATA_DIR`, falling back to `~/.guard`.
pub fn default_data_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os("GUARD_DATA_DIR").filter(|d| !d.is_empty()) {
        return PathBuf::from(dir);
    }
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".guard")
}
