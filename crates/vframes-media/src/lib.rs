//! Frame extraction and packaging on top of FFmpeg.
//!
//! This crate provides:
//! - An opaque decoder capability (`FrameDecoder` / `DecodeSession`)
//! - An FFmpeg-backed decoder reading raw RGB frames from a pipe
//! - Frame extraction into an owner-only directory of PNG stills
//! - ZIP packaging of a flat directory
//! - Best-effort cleanup of ephemeral files and directories

pub mod decoder;
pub mod error;
pub mod extractor;
pub mod ffmpeg;
pub mod fs_utils;
pub mod packager;
pub mod probe;

pub use decoder::{DecodeSession, Frame, FrameDecoder};
pub use error::{DecodeError, DecodeResult, MediaError, MediaResult};
pub use extractor::{frame_file_name, FrameExtractor};
pub use ffmpeg::FfmpegDecoder;
pub use fs_utils::{remove_dir_quietly, remove_file_quietly, EphemeralPath};
pub use packager::{zip_directory, Packager};
pub use probe::{probe_video, VideoInfo};
