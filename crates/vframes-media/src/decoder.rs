//! Decoder capability used by the frame extractor.
//!
//! A decoder opens a video file and yields its frames in presentation order.
//! The extractor only depends on these traits, so tests can drive it with a
//! scripted decoder and production wires in [`crate::FfmpegDecoder`].

use async_trait::async_trait;
use std::path::Path;

use crate::error::DecodeResult;

/// A decoded frame as packed RGB24 (`width * height * 3` bytes, row-major).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl Frame {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            data,
        }
    }

    /// Convert into an image buffer. `None` when the buffer does not match
    /// the dimensions.
    pub fn into_rgb_image(self) -> Option<image::RgbImage> {
        image::RgbImage::from_raw(self.width, self.height, self.data)
    }
}

/// Opens videos for decoding.
#[async_trait]
pub trait FrameDecoder: Send + Sync {
    /// Open a video. Fails when the file is not a decodable video.
    async fn open(&self, video_path: &Path) -> DecodeResult<Box<dyn DecodeSession>>;
}

/// An open decoding session over one video.
#[async_trait]
pub trait DecodeSession: Send {
    /// Next frame, or `None` at end of stream.
    async fn next_frame(&mut self) -> DecodeResult<Option<Frame>>;

    /// Release the session. Safe to call more than once.
    async fn close(&mut self);
}
