//! Video processing pipeline.
//!
//! download → extract frames → package → upload, with every ephemeral file
//! owned by a guard so that nothing is left in the work directory whichever
//! step fails.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, info};

use vframes_media::{EphemeralPath, FrameDecoder, FrameExtractor, Packager};
use vframes_models::{OutputKeyRule, VideoJob};
use vframes_storage::BlobStore;

use crate::error::WorkerResult;
use crate::metrics;

/// Content type of uploaded archives.
pub const ARCHIVE_CONTENT_TYPE: &str = "application/zip";

/// Prefix of downloaded source videos in the work directory.
const VIDEO_PREFIX: &str = "video-";

/// Longest source extension kept on the local copy.
const MAX_SUFFIX_LEN: usize = 10;

/// Runs one job to completion and returns the key of the uploaded archive.
#[async_trait]
pub trait VideoProcessing: Send + Sync {
    async fn process_video(&self, job: &VideoJob) -> WorkerResult<String>;
}

/// Production pipeline over a blob store and a frame decoder.
pub struct VideoProcessor {
    store: Arc<dyn BlobStore>,
    extractor: FrameExtractor,
    packager: Packager,
    output_rule: OutputKeyRule,
    work_dir: PathBuf,
}

impl VideoProcessor {
    pub fn new(
        store: Arc<dyn BlobStore>,
        decoder: Arc<dyn FrameDecoder>,
        output_rule: OutputKeyRule,
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        let work_dir = work_dir.into();
        Self {
            store,
            extractor: FrameExtractor::new(decoder, work_dir.clone()),
            packager: Packager::new(work_dir.clone()),
            output_rule,
            work_dir,
        }
    }
}

#[async_trait]
impl VideoProcessing for VideoProcessor {
    async fn process_video(&self, job: &VideoJob) -> WorkerResult<String> {
        let output_key = self.output_rule.derive(&job.input_path)?;
        info!(
            user_id = %job.user_id,
            video = %job.video_name,
            "Processing {} -> {}",
            job.input_path,
            output_key
        );

        let video = EphemeralPath::create_file(
            &self.work_dir,
            VIDEO_PREFIX,
            &source_suffix(&job.input_path),
        )?;

        let started = Instant::now();
        self.store.download_to_file(&job.input_path, video.path()).await?;
        metrics::record_download_duration(started.elapsed().as_secs_f64());
        debug!("Downloaded {} in {:?}", job.input_path, started.elapsed());

        let frames = self.extractor.extract(video.path()).await?;
        let archive = self.packager.package(frames.path()).await?;
        frames.cleanup();
        video.cleanup();

        let started = Instant::now();
        self.store
            .upload_file(archive.path(), &output_key, ARCHIVE_CONTENT_TYPE)
            .await?;
        metrics::record_upload_duration(started.elapsed().as_secs_f64());

        info!("Uploaded archive for {} to {}", job.video_name, output_key);
        Ok(output_key)
    }
}

/// Extension of the key's file name as a local file suffix (".mp4"), or
/// empty when absent or unusual.
fn source_suffix(key: &str) -> String {
    let file_name = key.rsplit('/').next().unwrap_or_default();
    match file_name.rfind('.') {
        Some(idx) if idx > 0 => {
            let ext = &file_name[idx + 1..];
            if !ext.is_empty()
                && ext.len() <= MAX_SUFFIX_LEN
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
            {
                format!(".{}", ext)
            } else {
                String::new()
            }
        }
        _ => String::new(),
    }
}
