//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Result type for decoder operations.
pub type DecodeResult<T> = Result<T, DecodeError>;

/// Errors raised by a frame decoder.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    #[error("FFprobe command failed: {message}")]
    FfprobeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("FFmpeg decode failed: {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("Invalid video file: {0}")]
    InvalidVideo(String),

    #[error("Truncated frame: expected {expected} bytes, got {actual}")]
    TruncatedFrame { expected: usize, actual: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl DecodeError {
    /// Create an FFmpeg failure error.
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    /// Create an invalid video error.
    pub fn invalid_video(message: impl Into<String>) -> Self {
        Self::InvalidVideo(message.into())
    }
}

/// Errors that can occur while turning a video into a frame archive.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Failed to open video {}: {source}", .path.display())]
    VideoOpen {
        path: PathBuf,
        #[source]
        source: DecodeError,
    },

    #[error("Frame read failed after {frames_written} frames: {source}")]
    FrameRead {
        frames_written: u64,
        #[source]
        source: DecodeError,
    },

    #[error("No frames extracted from {}", .0.display())]
    NoFramesExtracted(PathBuf),

    #[error("Failed to package {}: {source}", .dir.display())]
    Packaging {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MediaError {
    /// Create a video open error.
    pub fn video_open(path: impl Into<PathBuf>, source: DecodeError) -> Self {
        Self::VideoOpen {
            path: path.into(),
            source,
        }
    }

    /// Create a packaging error.
    pub fn packaging(dir: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Packaging {
            dir: dir.into(),
            source,
        }
    }
}
