//! ZIP packaging of a frame directory.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{MediaError, MediaResult};
use crate::fs_utils::EphemeralPath;

/// Prefix of archives created in the work directory.
pub const ARCHIVE_PREFIX: &str = "frames-";

/// Bundles the files of a directory into a single ZIP archive.
#[derive(Debug, Clone)]
pub struct Packager {
    work_dir: PathBuf,
}

impl Packager {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
        }
    }

    /// Package the regular files directly inside `dir`.
    ///
    /// The archive gets a unique name in the work directory and is removed
    /// again if packaging fails.
    pub async fn package(&self, dir: &Path) -> MediaResult<EphemeralPath> {
        let archive = EphemeralPath::create_file(&self.work_dir, ARCHIVE_PREFIX, ".zip")
            .map_err(|e| MediaError::packaging(dir, e))?;

        let source_dir = dir.to_path_buf();
        let archive_path = archive.path().to_path_buf();
        let result = tokio::task::spawn_blocking(move || zip_directory(&source_dir, &archive_path))
            .await
            .unwrap_or_else(|e| Err(io::Error::other(e)));

        match result {
            Ok(entries) => {
                info!(
                    "Packaged {} files from {} into {}",
                    entries,
                    dir.display(),
                    archive.path().display()
                );
                Ok(archive)
            }
            Err(e) => {
                warn!("Packaging {} failed: {}", dir.display(), e);
                archive.cleanup();
                Err(MediaError::packaging(dir, e))
            }
        }
    }
}

/// Write every regular file directly inside `dir` into a deflated ZIP at
/// `archive_path`, entries named by base name in sorted order.
///
/// Returns the number of entries written.
pub fn zip_directory(dir: &Path, archive_path: &Path) -> io::Result<usize> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();

    let mut zip = ZipWriter::new(BufWriter::new(File::create(archive_path)?));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    for path in &files {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "file without a name"))?;
        debug!("Adding {} to archive", name);

        zip.start_file(name, options)?;
        let mut source = File::open(path)?;
        io::copy(&mut source, &mut zip)?;
    }

    zip.finish()?.flush()?;
    Ok(files.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;

    fn read_archive(path: &Path) -> Vec<(String, Vec<u8>)> {
        let mut archive = zip::ZipArchive::new(File::open(path).unwrap()).unwrap();
        (0..archive.len())
            .map(|i| {
                let mut entry = archive.by_index(i).unwrap();
                let mut data = Vec::new();
                entry.read_to_end(&mut data).unwrap();
                (entry.name().to_string(), data)
            })
            .collect()
    }

    #[tokio::test]
    async fn test_package_flat_directory() {
        let work = TempDir::new().unwrap();
        let frames = TempDir::new().unwrap();
        std::fs::write(frames.path().join("frame-1.png"), b"second").unwrap();
        std::fs::write(frames.path().join("frame-0.png"), b"first").unwrap();
        std::fs::write(frames.path().join("frame-2.png"), vec![7u8; 4096]).unwrap();
        std::fs::create_dir(frames.path().join("nested")).unwrap();
        std::fs::write(frames.path().join("nested").join("skip.png"), b"no").unwrap();

        let archive = Packager::new(work.path()).package(frames.path()).await.unwrap();

        let name = archive.path().file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with(ARCHIVE_PREFIX) && name.ends_with(".zip"));
        assert_eq!(archive.path().parent().unwrap(), work.path());

        let entries = read_archive(archive.path());
        assert_eq!(
            entries,
            vec![
                ("frame-0.png".to_string(), b"first".to_vec()),
                ("frame-1.png".to_string(), b"second".to_vec()),
                ("frame-2.png".to_string(), vec![7u8; 4096]),
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_directory_gives_empty_archive() {
        let work = TempDir::new().unwrap();
        let frames = TempDir::new().unwrap();

        let archive = Packager::new(work.path()).package(frames.path()).await.unwrap();
        assert!(read_archive(archive.path()).is_empty());
    }

    #[tokio::test]
    async fn test_missing_directory_leaves_no_archive() {
        let work = TempDir::new().unwrap();
        let missing = work.path().join("gone");

        let err = Packager::new(work.path()).package(&missing).await.unwrap_err();

        assert!(matches!(err, MediaError::Packaging { .. }));
        assert_eq!(std::fs::read_dir(work.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_archive_removed_when_guard_dropped() {
        let work = TempDir::new().unwrap();
        let frames = TempDir::new().unwrap();
        std::fs::write(frames.path().join("frame-0.png"), b"x").unwrap();

        let path = {
            let archive = Packager::new(work.path()).package(frames.path()).await.unwrap();
            archive.path().to_path_buf()
        };
        assert!(!path.exists());
    }
}
