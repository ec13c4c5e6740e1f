//! Trigger-file driven reloading of on-disk assets.
//!
//! A [`Reloader`] serves assets from an override directory when one exists,
//! and from a bundle compiled into the binary otherwise. Writing new content to
//! the `trigger` file inside the directory asks the owner to reload.

use std::io;
use std::path::{Path, PathBuf};

/// Name of the sentinel file whose content change signals a reload.
pub const TRIGGER_FILE: &str = "trigger";

/// Read-only, path-addressable set of files baked into the binary.
#[derive(Debug, Clone, Copy)]
pub struct EmbeddedFs {
    files: &'static [(&'static str, &'static [u8])],
}

impl EmbeddedFs {
    pub const fn new(files: &'static [(&'static str, &'static [u8])]) -> Self {
        Self { files }
    }

    pub fn read(&self, name: &str) -> Option<&'static [u8]> {
        let name = name.trim_start_matches('/');
        self.files
            .iter()
            .find(|(path, _)| *path == name)
            .map(|(_, data)| *data)
    }
}

/// The filesystem a load callback reads from.
#[derive(Debug, Clone)]
pub enum Fsys {
    Dir(PathBuf),
    Embedded(EmbeddedFs),
}

impl Fsys {
    pub fn read(&self, name: &str) -> io::Result<Vec<u8>> {
        match self {
            Fsys::Dir(dir) => std::fs::read(dir.join(name)),
            Fsys::Embedded(bundle) => bundle.read(name).map(<[u8]>::to_vec).ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("`{}` is not part of the embedded bundle", name),
                )
            }),
        }
    }

    pub fn read_to_string(&self, name: &str) -> io::Result<String> {
        let data = self.read(name)?;
        String::from_utf8(data).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    pub fn is_embedded(&self) -> bool {
        matches!(self, Fsys::Embedded(_))
    }
}

type LoadFn = Box<dyn FnMut(&Fsys) -> anyhow::Result<()> + Send>;

pub struct Reloader {
    dir: PathBuf,
    embedded: EmbeddedFs,
    trigger: Option<Vec<u8>>,
    loaded: bool,
    load_fn: LoadFn,
}

impl std::fmt::Debug for Reloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reloader")
            .field("dir", &self.dir)
            .field("loaded", &self.loaded)
            .finish_non_exhaustive()
    }
}

impl Reloader {
    pub fn new<F>(dir: impl Into<PathBuf>, embedded: EmbeddedFs, load_fn: F) -> Self
    where
        F: FnMut(&Fsys) -> anyhow::Result<()> + Send + 'static,
    {
        Self {
            dir: dir.into(),
            embedded,
            trigger: None,
            loaded: false,
            load_fn: Box::new(load_fn),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// The override directory when it exists and is a directory, else the
    /// embedded bundle.
    pub fn fs(&self) -> Fsys {
        if self.dir.is_dir() {
            Fsys::Dir(self.dir.clone())
        } else {
            Fsys::Embedded(self.embedded)
        }
    }

    fn needs_reload(&mut self, fsys: &Fsys) -> bool {
        match fsys.read(TRIGGER_FILE) {
            Ok(data) => {
                let changed = self.trigger.as_deref() != Some(data.as_slice());
                self.trigger = Some(data);
                changed || !self.loaded
            }
            Err(_) => !self.loaded,
        }
    }

    /// Invoke the load callback on the first call and whenever the trigger
    /// file's content differs from the last observed content.
    ///
    /// Returns whether the callback ran. A failed load leaves the previous
    /// trigger content in place so the next call retries.
    pub fn reload_if_triggered(&mut self) -> anyhow::Result<bool> {
        let fsys = self.fs();
        let previous = self.trigger.clone();
        if !self.needs_reload(&fsys) {
            return Ok(false);
        }

        match (self.load_fn)(&fsys) {
            Ok(()) => {
                self.loaded = true;
                tracing::debug!(
                    dir = %self.dir.display(),
                    embedded = fsys.is_embedded(),
                    "Assets reloaded"
                );
                Ok(true)
            }
            Err(e) => {
                self.trigger = previous;
                Err(e.context(format!(
                    "failed to load assets from `{}`",
                    self.dir.display()
                )))
            }
        }
    }
}
