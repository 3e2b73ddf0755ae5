//! Temporary directories removed on every exit path.

use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use tempfile::TempDir;
use tracing::{debug, warn};

static DIR_SEQUENCE: AtomicUsize = AtomicUsize::new(0);

/// A directory under the system temp dir named
/// `<prefix>_<counter>_<millis><random>`, deleted on drop.
#[derive(Debug)]
pub struct ScopedTempDir {
    dir: Option<TempDir>,
}

impl ScopedTempDir {
    /// Create a directory in the system temp dir.
    pub fn new(prefix: &str) -> io::Result<Self> {
        Self::new_in(std::env::temp_dir(), prefix)
    }

    /// Create a directory under `parent`.
    pub fn new_in(parent: impl AsRef<Path>, prefix: &str) -> io::Result<Self> {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let n = DIR_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let dir = tempfile::Builder::new()
            .prefix(&format!("{prefix}_{n}_{millis}"))
            .rand_bytes(4)
            .tempdir_in(parent)?;
        debug!(path = %dir.path().display(), "created temp dir");
        Ok(Self { dir: Some(dir) })
    }

    /// Directory path.
    pub fn path(&self) -> &Path {
        match &self.dir {
            Some(dir) => dir.path(),
            None => Path::new(""),
        }
    }
}

impl Drop for ScopedTempDir {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            let path = dir.path().to_path_buf();
            match dir.close() {
                Ok(()) => debug!(path = %path.display(), "deleted temp dir"),
                Err(err) => warn!(path = %path.display(), error = %err, "cannot delete temp dir"),
            }
        }
    }
}
