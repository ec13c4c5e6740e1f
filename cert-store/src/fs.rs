//! Filesystem seam for the certificate store.
//!
//! [`OsFs`] talks to the real disk and applies the requested Unix permission
//! bits; [`MemFs`] keeps everything in a map so tests never touch the disk.

use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

pub trait Filesystem: Send + Sync {
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Create or truncate `path` with `data`, leaving it with exactly `mode`.
    fn write(&self, path: &Path, data: &[u8], mode: u32) -> io::Result<()>;

    fn exists(&self, path: &Path) -> bool;

    /// Permission bits of `path` (the `0o777` part).
    fn mode(&self, path: &Path) -> io::Result<u32>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OsFs;

impl Filesystem for OsFs {
    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            std::fs::DirBuilder::new()
                .recursive(true)
                .mode(0o755)
                .create(path)
        }
        #[cfg(not(unix))]
        {
            std::fs::create_dir_all(path)
        }
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }

    #[cfg(unix)]
    fn write(&self, path: &Path, data: &[u8], mode: u32) -> io::Result<()> {
        use std::io::Write;
        use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(mode)
            .open(path)?;
        file.write_all(data)?;
        // umask and pre-existing files both bypass the open mode
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
    }

    #[cfg(not(unix))]
    fn write(&self, path: &Path, data: &[u8], _mode: u32) -> io::Result<()> {
        std::fs::write(path, data)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    #[cfg(unix)]
    fn mode(&self, path: &Path) -> io::Result<u32> {
        use std::os::unix::fs::PermissionsExt;
        Ok(std::fs::metadata(path)?.permissions().mode() & 0o777)
    }

    #[cfg(not(unix))]
    fn mode(&self, path: &Path) -> io::Result<u32> {
        let readonly = std::fs::metadata(path)?.permissions().readonly();
        Ok(if readonly { 0o444 } else { 0o644 })
    }
}

#[derive(Debug, Clone)]
struct MemFile {
    data: Vec<u8>,
    mode: u32,
}

/// In-memory filesystem. Directories are tracked only so that writes into a
/// directory that was never created fail the way they would on disk.
#[derive(Debug, Default)]
pub struct MemFs {
    files: RwLock<HashMap<PathBuf, MemFile>>,
    dirs: RwLock<HashSet<PathBuf>>,
}

impl MemFs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn remove(&self, path: &Path) -> io::Result<()> {
        let mut files = self.files.write().map_err(poisoned)?;
        files
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| not_found(path))
    }
}

fn poisoned<T>(_: T) -> io::Error {
    io::Error::other("in-memory filesystem lock poisoned")
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("{}: no such file", path.display()),
    )
}

impl Filesystem for MemFs {
    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        let mut dirs = self.dirs.write().map_err(poisoned)?;
        for ancestor in path.ancestors() {
            dirs.insert(ancestor.to_path_buf());
        }
        Ok(())
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        let files = self.files.read().map_err(poisoned)?;
        files
            .get(path)
            .map(|f| f.data.clone())
            .ok_or_else(|| not_found(path))
    }

    fn write(&self, path: &Path, data: &[u8], mode: u32) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            let dirs = self.dirs.read().map_err(poisoned)?;
            if !parent.as_os_str().is_empty() && !dirs.contains(parent) {
                return Err(not_found(parent));
            }
        }
        let mut files = self.files.write().map_err(poisoned)?;
        files.insert(
            path.to_path_buf(),
            MemFile {
                data: data.to_vec(),
                mode: mode & 0o777,
            },
        );
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        let in_files = self
            .files
            .read()
            .map(|files| files.contains_key(path))
            .unwrap_or(false);
        in_files
            || self
                .dirs
                .read()
                .map(|dirs| dirs.contains(path))
                .unwrap_or(false)
    }

    fn mode(&self, path: &Path) -> io::Result<u32> {
        let files = self.files.read().map_err(poisoned)?;
        files
            .get(path)
            .map(|f| f.mode)
            .ok_or_else(|| not_found(path))
    }
}
