//! Frame extraction.
//!
//! Pulls frames from a decode session one at a time and writes each as a PNG
//! into a fresh owner-only directory. On any failure the source video and
//! the partial frame directory are removed before the error is returned.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

use crate::decoder::{DecodeSession, Frame, FrameDecoder};
use crate::error::{MediaError, MediaResult};
use crate::fs_utils::{remove_file_quietly, EphemeralPath};

/// Prefix of frame directories created in the work directory.
pub const FRAMES_DIR_PREFIX: &str = "frames-";

/// File name of the frame at `index` (0-based).
pub fn frame_file_name(index: u64) -> String {
    format!("frame-{}.png", index)
}

/// Extracts all frames of a video into a directory of PNG files.
#[derive(Clone)]
pub struct FrameExtractor {
    decoder: Arc<dyn FrameDecoder>,
    work_dir: PathBuf,
}

impl FrameExtractor {
    pub fn new(decoder: Arc<dyn FrameDecoder>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            decoder,
            work_dir: work_dir.into(),
        }
    }

    /// Extract every frame of `video_file`.
    ///
    /// Returns the guard of the frame directory, holding `frame-0.png` to
    /// `frame-(N-1).png`. Fails with [`MediaError::VideoOpen`],
    /// [`MediaError::FrameRead`] or [`MediaError::NoFramesExtracted`]; in
    /// every failure case `video_file` has been deleted.
    pub async fn extract(&self, video_file: &Path) -> MediaResult<EphemeralPath> {
        info!("Extracting frames from {}", video_file.display());

        let frames_dir = match EphemeralPath::create_private_dir(&self.work_dir, FRAMES_DIR_PREFIX) {
            Ok(dir) => dir,
            Err(e) => {
                remove_file_quietly(video_file);
                return Err(MediaError::Io(e));
            }
        };

        match self.extract_into(video_file, frames_dir.path()).await {
            Ok(count) => {
                info!(
                    "Extracted {} frames from {} into {}",
                    count,
                    video_file.display(),
                    frames_dir.path().display()
                );
                Ok(frames_dir)
            }
            Err(e) => {
                warn!("Frame extraction failed for {}: {}", video_file.display(), e);
                frames_dir.cleanup();
                remove_file_quietly(video_file);
                Err(e)
            }
        }
    }

    async fn extract_into(&self, video_file: &Path, frames_dir: &Path) -> MediaResult<u64> {
        let mut session = self
            .decoder
            .open(video_file)
            .await
            .map_err(|source| MediaError::video_open(video_file, source))?;
        debug!("Opened decode session for {}", video_file.display());

        let result = write_frames(session.as_mut(), frames_dir).await;
        session.close().await;

        let written = result?;
        if written == 0 {
            return Err(MediaError::NoFramesExtracted(video_file.to_path_buf()));
        }
        Ok(written)
    }
}

async fn write_frames(session: &mut dyn DecodeSession, frames_dir: &Path) -> MediaResult<u64> {
    let mut written: u64 = 0;

    loop {
        let frame = match session.next_frame().await {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(source) => {
                return Err(MediaError::FrameRead {
                    frames_written: written,
                    source,
                })
            }
        };

        let path = frames_dir.join(frame_file_name(written));
        match write_png(frame, path.clone()).await {
            Ok(()) => {
                trace!("Wrote {}", path.display());
                written += 1;
            }
            Err(reason) => warn!("Skipping frame {}: {}", path.display(), reason),
        }
    }

    Ok(written)
}

async fn write_png(frame: Frame, path: PathBuf) -> Result<(), String> {
    tokio::task::spawn_blocking(move || {
        let (width, height, len) = (frame.width, frame.height, frame.data.len());
        let image = frame.into_rgb_image().ok_or_else(|| {
            format!("{} bytes do not form a {}x{} RGB frame", len, width, height)
        })?;
        image
            .save_with_format(&path, image::ImageFormat::Png)
            .map_err(|e| e.to_string())
    })
    .await
    .map_err(|e| format!("frame writer task failed: {}", e))?
}
