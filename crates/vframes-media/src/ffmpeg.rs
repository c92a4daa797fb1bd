//! FFmpeg-backed frame decoder.
//!
//! Frames are read from FFmpeg's stdout as raw RGB24, one fixed-size record
//! per frame. Dimensions come from ffprobe before the decoder is spawned.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::decoder::{DecodeSession, Frame, FrameDecoder};
use crate::error::{DecodeError, DecodeResult};
use crate::probe::probe_video;

/// Number of FFmpeg stderr lines kept for error reports.
const STDERR_TAIL_LINES: usize = 20;

/// Decoder that shells out to `ffmpeg` and `ffprobe`.
#[derive(Debug, Clone, Default)]
pub struct FfmpegDecoder;

impl FfmpegDecoder {
    pub fn new() -> Self {
        Self
    }

    /// Check both binaries are on PATH.
    pub fn check_available() -> DecodeResult<()> {
        which::which("ffmpeg").map_err(|_| DecodeError::FfmpegNotFound)?;
        which::which("ffprobe").map_err(|_| DecodeError::FfprobeNotFound)?;
        Ok(())
    }
}

#[async_trait]
impl FrameDecoder for FfmpegDecoder {
    async fn open(&self, video_path: &Path) -> DecodeResult<Box<dyn DecodeSession>> {
        which::which("ffmpeg").map_err(|_| DecodeError::FfmpegNotFound)?;

        let info = probe_video(video_path).await?;
        if info.width == 0 || info.height == 0 {
            return Err(DecodeError::invalid_video(format!(
                "Video stream has no dimensions ({}x{})",
                info.width, info.height
            )));
        }

        debug!(
            "Decoding {} ({}x{} {} @ {:.2} fps)",
            video_path.display(),
            info.width,
            info.height,
            info.codec,
            info.fps
        );

        let mut child = Command::new("ffmpeg")
            .args(decode_args(video_path))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DecodeError::ffmpeg_failed(format!("Failed to spawn FFmpeg: {}", e), None, None))?;

        let stdout = child.stdout.take().ok_or_else(|| {
            DecodeError::ffmpeg_failed("Failed to capture FFmpeg stdout", None, None)
        })?;
        let stderr_task = child.stderr.take().map(|stderr| {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
                while let Ok(Some(line)) = lines.next_line().await {
                    if tail.len() == STDERR_TAIL_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                }
                Vec::from(tail).join("\n")
            })
        });

        Ok(Box::new(FfmpegSession {
            child,
            stdout: BufReader::new(stdout),
            stderr_task,
            width: info.width,
            height: info.height,
            frame_len: info.rgb_frame_len(),
            finished: false,
        }))
    }
}

/// Arguments for decoding `video_path` to raw RGB24 on stdout.
///
/// Output geometry must match what ffprobe reported for the first video
/// stream: that stream is mapped explicitly and display-matrix rotation is
/// not applied.
fn decode_args(video_path: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = [
        "-hide_banner",
        "-loglevel",
        "error",
        "-nostdin",
        "-noautorotate",
        "-i",
    ]
    .iter()
    .map(OsString::from)
    .collect();
    args.push(video_path.as_os_str().to_os_string());
    args.extend(
        ["-map", "0:v:0", "-an", "-f", "rawvideo", "-pix_fmt", "rgb24", "-"]
            .iter()
            .map(OsString::from),
    );
    args
}

struct FfmpegSession {
    child: Child,
    stdout: BufReader<ChildStdout>,
    stderr_task: Option<JoinHandle<String>>,
    width: u32,
    height: u32,
    frame_len: usize,
    finished: bool,
}

impl FfmpegSession {
    async fn stderr_tail(&mut self) -> Option<String> {
        let task = self.stderr_task.take()?;
        match task.await {
            Ok(tail) if !tail.trim().is_empty() => Some(tail),
            _ => None,
        }
    }
}

#[async_trait]
impl DecodeSession for FfmpegSession {
    async fn next_frame(&mut self) -> DecodeResult<Option<Frame>> {
        if self.finished {
            return Ok(None);
        }

        let mut data = vec![0u8; self.frame_len];
        let filled = read_full(&mut self.stdout, &mut data).await?;
        if filled == self.frame_len {
            return Ok(Some(Frame::new(self.width, self.height, data)));
        }

        self.finished = true;
        let status = self.child.wait().await?;
        let stderr = self.stderr_tail().await;

        if !status.success() {
            return Err(DecodeError::ffmpeg_failed(
                "FFmpeg exited with non-zero status",
                stderr,
                status.code(),
            ));
        }
        if filled > 0 {
            return Err(DecodeError::TruncatedFrame {
                expected: self.frame_len,
                actual: filled,
            });
        }
        Ok(None)
    }

    async fn close(&mut self) {
        if !self.finished {
            self.finished = true;
            if let Err(e) = self.child.kill().await {
                warn!("Failed to stop FFmpeg decoder: {}", e);
            }
        }
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
    }
}

/// Fill `buf` from `reader`, stopping early only at end of stream.
/// Returns the number of bytes read.
async fn read_full<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
