//! The active-session pointer: a single atomic filesystem indirection.
//!
//! On unix the pointer is a symlink whose target is `<run_id>.json`;
//! elsewhere it is a one-line file holding the same target. Either way it
//! is replaced by creating the new pointer under a temporary name and
//! renaming it over the well-known name, so a concurrent reader sees the
//! old target or the new one, never a torn write.

use std::io;
use std::path::{Path, PathBuf};

use uuid::Uuid;

/// Well-known pointer name inside the sessions directory.
pub(crate) const ACTIVE_POINTER_NAME: &str = "active";

pub(crate) struct ActivePointer {
    path: PathBuf,
}

impl ActivePointer {
    pub(crate) fn new(sessions_dir: &Path) -> Self {
        Self {
            path: sessions_dir.join(ACTIVE_POINTER_NAME),
        }
    }

    /// The run id the pointer currently names, or `None` when no pointer
    /// exists. A missing pointer is the normal "no active session" state,
    /// never an error.
    pub(crate) fn read(&self) -> io::Result<Option<String>> {
        match self.read_target() {
            Ok(Some(target)) => {
                let run_id = target.strip_suffix(".json").unwrap_or(&target);
                Ok(Some(run_id.to_string()))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Atomically repoint at `<run_id>.json`.
    pub(crate) fn set(&self, run_id: &str) -> io::Result<()> {
        let target = format!("{run_id}.json");
        let tmp = self
            .path
            .with_file_name(format!(".{ACTIVE_POINTER_NAME}.{}", Uuid::new_v4().simple()));

        self.write_pointer(&tmp, &target)?;
        if let Err(e) = std::fs::rename(&tmp, &self.path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(e);
        }
        Ok(())
    }

    /// Remove the pointer; a no-op when it is already gone.
    pub(crate) fn clear(&self) -> io::Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    #[cfg(unix)]
    fn read_target(&self) -> io::Result<Option<String>> {
        match std::fs::read_link(&self.path) {
            Ok(target) => Ok(target
                .file_name()
                .and_then(|name| name.to_str())
                .map(str::to_owned)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    #[cfg(unix)]
    fn write_pointer(&self, tmp: &Path, target: &str) -> io::Result<()> {
        std::os::unix::fs::symlink(target, tmp)
    }

    #[cfg(not(unix))]
    fn read_target(&self) -> io::Result<Option<String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => Ok(Some(contents.trim().to_string())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    #[cfg(not(unix))]
    fn write_pointer(&self, tmp: &Path, target: &str) -> io::Result<()> {
        std::fs::write(tmp, target)
    }
}
