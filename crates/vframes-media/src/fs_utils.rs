//! Filesystem helpers for ephemeral job artifacts.
//!
//! Every file a job creates (downloaded video, frame directory, archive) is
//! wrapped in an [`EphemeralPath`] that deletes it when dropped. Deletion
//! failures are logged and never surfaced.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// Remove a file, logging anything other than "not found".
pub fn remove_file_quietly(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!("Removed {}", path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove file {}: {}", path.display(), e),
    }
}

/// Remove a directory and everything below it, logging anything other than
/// "not found".
pub fn remove_dir_quietly(path: &Path) {
    match fs::remove_dir_all(path) {
        Ok(()) => debug!("Removed directory {}", path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove directory {}: {}", path.display(), e),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EphemeralKind {
    File,
    Dir,
}

/// A path that is removed when the guard is dropped.
#[derive(Debug)]
pub struct EphemeralPath {
    path: PathBuf,
    kind: EphemeralKind,
}

impl EphemeralPath {
    /// Take ownership of an existing file.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: EphemeralKind::File,
        }
    }

    /// Take ownership of an existing directory tree.
    pub fn dir(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: EphemeralKind::Dir,
        }
    }

    /// Create a new empty file named `{prefix}{uuid}{suffix}` inside `parent`.
    pub fn create_file(parent: &Path, prefix: &str, suffix: &str) -> io::Result<Self> {
        fs::create_dir_all(parent)?;
        let path = parent.join(unique_name(prefix, suffix));
        fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)?;
        Ok(Self::file(path))
    }

    /// Create a new directory named `{prefix}{uuid}` inside `parent`,
    /// readable by the owner only where the platform supports it.
    pub fn create_private_dir(parent: &Path, prefix: &str) -> io::Result<Self> {
        fs::create_dir_all(parent)?;
        let path = parent.join(unique_name(prefix, ""));
        private_dir_builder().create(&path)?;
        Ok(Self::dir(path))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the path now instead of at end of scope.
    pub fn cleanup(self) {
        drop(self)
    }
}

impl AsRef<Path> for EphemeralPath {
    fn as_ref(&self) -> &Path {
        &self.path
    }
}

impl Drop for EphemeralPath {
    fn drop(&mut self) {
        match self.kind {
            EphemeralKind::File => remove_file_quietly(&self.path),
            EphemeralKind::Dir => remove_dir_quietly(&self.path),
        }
    }
}

fn unique_name(prefix: &str, suffix: &str) -> String {
    format!("{}{}{}", prefix, Uuid::new_v4().simple(), suffix)
}

#[cfg(unix)]
fn private_dir_builder() -> fs::DirBuilder {
    use std::os::unix::fs::DirBuilderExt;
    let mut builder = fs::DirBuilder::new();
    builder.mode(0o700);
    builder
}

#[cfg(not(unix))]
fn private_dir_builder() -> fs::DirBuilder {
    debug!("Owner-only directory permissions are not supported on this platform");
    fs::DirBuilder::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_remove_missing_paths_is_quiet() {
        let dir = TempDir::new().unwrap();
        remove_file_quietly(&dir.path().join("missing.mp4"));
        remove_dir_quietly(&dir.path().join("missing"));
    }

    #[test]
    fn test_guard_removes_file_on_drop() {
        let dir = TempDir::new().unwrap();
        let path = {
            let file = EphemeralPath::create_file(dir.path(), "video-", ".mp4").unwrap();
            assert!(file.path().is_file());
            let name = file.path().file_name().unwrap().to_string_lossy().into_owned();
            assert!(name.starts_with("video-") && name.ends_with(".mp4"));
            file.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn test_guard_removes_dir_tree() {
        let dir = TempDir::new().unwrap();
        let frames = EphemeralPath::create_private_dir(dir.path(), "frames-").unwrap();
        std::fs::write(frames.path().join("frame-0.png"), b"x").unwrap();
        let path = frames.path().to_path_buf();

        frames.cleanup();
        assert!(!path.exists());
    }

    #[test]
    fn test_names_are_unique() {
        let dir = TempDir::new().unwrap();
        let a = EphemeralPath::create_file(dir.path(), "video-", ".mp4").unwrap();
        let b = EphemeralPath::create_file(dir.path(), "video-", ".mp4").unwrap();
        assert_ne!(a.path(), b.path());
    }

    #[test]
    fn test_creates_missing_parent() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a").join("b");
        let file = EphemeralPath::create_file(&nested, "video-", "").unwrap();
        assert!(file.path().starts_with(&nested));
    }

    #[cfg(unix)]
    #[test]
    fn test_private_dir_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let frames = EphemeralPath::create_private_dir(dir.path(), "frames-").unwrap();
        let mode = std::fs::metadata(frames.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o077, 0);
        assert!(frames.path().is_dir());
    }
}
