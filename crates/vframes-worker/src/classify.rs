//! Failure classification.
//!
//! A failed job is either transient (leave the message for redelivery) or
//! permanent (acknowledge and drop it). The decision is made over the whole
//! cause chain: the first link whose kind carries a class decides, otherwise
//! I/O links and well-known message markers mean transient, otherwise the
//! failure is permanent.

use std::error::Error;
use std::io;

use vframes_media::{DecodeError, MediaError};
use vframes_models::ModelError;
use vframes_queue::QueueError;
use vframes_storage::StorageError;

use crate::error::WorkerError;

/// Markers matched case-insensitively against every link's message.
const TRANSIENT_MARKERS: &[&str] = &["timeout", "timed out", "throttl", "temporar"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureClass {
    /// Retrying may succeed
    Transient,
    /// Retrying will fail the same way
    Permanent,
}

/// Kind of one link in an error chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CauseTag {
    VideoOpen,
    FrameRead,
    NoFramesExtracted,
    Packaging,
    StorageNotFound,
    StorageConfig,
    StorageTimeout,
    StorageThrottled,
    StorageTransport,
    StorageService,
    StorageIo,
    QueueRedis,
    InvalidJob,
    WorkerConfig,
    Io,
    Timeout,
    /// Wraps another error without adding a kind of its own
    Wrapper,
    Other,
}

impl CauseTag {
    /// Class carried by this kind, if any.
    pub fn explicit_class(&self) -> Option<FailureClass> {
        use CauseTag::*;
        match self {
            VideoOpen | FrameRead | NoFramesExtracted | Packaging | StorageNotFound
            | StorageConfig | InvalidJob | WorkerConfig => Some(FailureClass::Permanent),
            StorageTimeout | StorageThrottled | StorageTransport | StorageIo | QueueRedis => {
                Some(FailureClass::Transient)
            }
            StorageService | Io | Timeout | Wrapper | Other => None,
        }
    }

    fn hints_transient(&self) -> bool {
        matches!(self, CauseTag::Io | CauseTag::Timeout)
    }
}

/// One link of an error chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cause {
    pub tag: CauseTag,
    pub message: String,
}

impl Cause {
    pub fn new(tag: CauseTag, message: impl Into<String>) -> Self {
        Self {
            tag,
            message: message.into(),
        }
    }

    /// Walk `err` and its sources, tagging every link.
    pub fn chain(err: &(dyn Error + 'static)) -> Vec<Cause> {
        let mut causes = Vec::new();
        let mut current = Some(err);
        while let Some(link) = current {
            causes.push(Cause::new(tag_of(link), link.to_string()));
            current = link.source();
        }
        causes
    }
}

/// Classify a cause chain, outermost link first.
pub fn classify_chain(causes: &[Cause]) -> FailureClass {
    if let Some(class) = causes.iter().find_map(|c| c.tag.explicit_class()) {
        return class;
    }

    let transient = causes.iter().any(|c| {
        if c.tag.hints_transient() {
            return true;
        }
        let message = c.message.to_lowercase();
        TRANSIENT_MARKERS.iter().any(|m| message.contains(m))
    });

    if transient {
        FailureClass::Transient
    } else {
        FailureClass::Permanent
    }
}

/// Classify an error and everything below it.
pub fn classify(err: &(dyn Error + 'static)) -> FailureClass {
    classify_chain(&Cause::chain(err))
}

fn tag_of(err: &(dyn Error + 'static)) -> CauseTag {
    if let Some(e) = err.downcast_ref::<WorkerError>() {
        return match e {
            WorkerError::InvalidJob(_) => CauseTag::InvalidJob,
            WorkerError::Config(_) => CauseTag::WorkerConfig,
            WorkerError::Io(e) => io_tag(e),
            WorkerError::Storage(_) | WorkerError::Media(_) | WorkerError::Queue(_) => {
                CauseTag::Wrapper
            }
        };
    }
    if let Some(e) = err.downcast_ref::<MediaError>() {
        return match e {
            MediaError::VideoOpen { .. } => CauseTag::VideoOpen,
            MediaError::FrameRead { .. } => CauseTag::FrameRead,
            MediaError::NoFramesExtracted(_) => CauseTag::NoFramesExtracted,
            MediaError::Packaging { .. } => CauseTag::Packaging,
            MediaError::Io(e) => io_tag(e),
        };
    }
    if let Some(e) = err.downcast_ref::<StorageError>() {
        return match e {
            StorageError::NotFound(_) => CauseTag::StorageNotFound,
            StorageError::Config(_) => CauseTag::StorageConfig,
            StorageError::Timeout(_) => CauseTag::StorageTimeout,
            StorageError::Throttled { .. } => CauseTag::StorageThrottled,
            StorageError::Transport(_) => CauseTag::StorageTransport,
            StorageError::Service { .. } => CauseTag::StorageService,
            StorageError::Io(_) => CauseTag::StorageIo,
        };
    }
    if let Some(e) = err.downcast_ref::<QueueError>() {
        return match e {
            QueueError::Redis(_) => CauseTag::QueueRedis,
            QueueError::Json(_) => CauseTag::Other,
        };
    }
    if let Some(e) = err.downcast_ref::<DecodeError>() {
        return match e {
            DecodeError::Io(e) => io_tag(e),
            _ => CauseTag::Other,
        };
    }
    if err.downcast_ref::<ModelError>().is_some() {
        return CauseTag::InvalidJob;
    }
    if let Some(e) = err.downcast_ref::<io::Error>() {
        return io_tag(e);
    }
    CauseTag::Other
}

fn io_tag(err: &io::Error) -> CauseTag {
    if err.kind() == io::ErrorKind::TimedOut {
        CauseTag::Timeout
    } else {
        CauseTag::Io
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cause(tag: CauseTag, message: &str) -> Cause {
        Cause::new(tag, message)
    }

    #[test]
    fn test_first_explicit_class_decides() {
        let chain = [
            cause(CauseTag::Wrapper, "Media error"),
            cause(CauseTag::Packaging, "Failed to package"),
            cause(CauseTag::Io, "disk full"),
        ];
        assert_eq!(classify_chain(&chain), FailureClass::Permanent);

        let chain = [
            cause(CauseTag::StorageThrottled, "slow down"),
            cause(CauseTag::NoFramesExtracted, "no frames"),
        ];
        assert_eq!(classify_chain(&chain), FailureClass::Transient);
    }

    #[test]
    fn test_io_links_are_transient() {
        let chain = [cause(CauseTag::Wrapper, "IO error"), cause(CauseTag::Io, "broken pipe")];
        assert_eq!(classify_chain(&chain), FailureClass::Transient);
        assert_eq!(
            classify_chain(&[cause(CauseTag::Timeout, "deadline")]),
            FailureClass::Transient
        );
    }

    #[test]
    fn test_message_markers_case_insensitive() {
        for message in [
            "Connection TIMEOUT",
            "request Timed Out",
            "Throttled by provider",
            "Service Temporarily unavailable",
        ] {
            let chain = [cause(CauseTag::StorageService, message)];
            assert_eq!(classify_chain(&chain), FailureClass::Transient, "{message}");
        }
    }

    #[test]
    fn test_unknown_defaults_to_permanent() {
        assert_eq!(
            classify_chain(&[cause(CauseTag::Other, "access denied")]),
            FailureClass::Permanent
        );
        assert_eq!(classify_chain(&[]), FailureClass::Permanent);
    }

    #[test]
    fn test_chain_from_worker_errors() {
        let err = WorkerError::from(StorageError::timeout("entrada/22/v.mp4"));
        let causes = Cause::chain(&err);
        assert_eq!(causes.len(), 2);
        assert_eq!(causes[0].tag, CauseTag::Wrapper);
        assert_eq!(causes[1].tag, CauseTag::StorageTimeout);
        assert_eq!(classify(&err), FailureClass::Transient);

        let err = WorkerError::from(StorageError::not_found("entrada/22/v.mp4"));
        assert_eq!(classify(&err), FailureClass::Permanent);

        let err = WorkerError::from(ModelError::invalid_key(""));
        assert_eq!(classify(&err), FailureClass::Permanent);
    }

    #[test]
    fn test_packaging_beats_io_fallback() {
        let err = WorkerError::from(MediaError::packaging(
            "/tmp/frames",
            io::Error::new(io::ErrorKind::Other, "disk full"),
        ));
        let causes = Cause::chain(&err);
        assert_eq!(causes.last().map(|c| c.tag), Some(CauseTag::Io));
        assert_eq!(classify_chain(&causes), FailureClass::Permanent);
    }

    #[test]
    fn test_media_failures_are_permanent() {
        let err = WorkerError::from(MediaError::video_open(
            "/tmp/v.mp4",
            DecodeError::Io(io::Error::new(io::ErrorKind::TimedOut, "probe timed out")),
        ));
        assert_eq!(classify(&err), FailureClass::Permanent);

        let err = WorkerError::from(MediaError::FrameRead {
            frames_written: 3,
            source: DecodeError::ffmpeg_failed("exit 1", None, Some(1)),
        });
        assert_eq!(classify(&err), FailureClass::Permanent);
    }

    #[test]
    fn test_local_io_failure_is_transient() {
        let err = WorkerError::from(MediaError::Io(io::Error::new(
            io::ErrorKind::PermissionDenied,
            "work dir",
        )));
        assert_eq!(classify(&err), FailureClass::Transient);

        let err = WorkerError::from(io::Error::new(io::ErrorKind::Other, "no space left"));
        assert_eq!(classify(&err), FailureClass::Transient);
    }

    #[test]
    fn test_service_error_uses_markers() {
        let err = WorkerError::from(StorageError::Service {
            code: "AccessDenied".to_string(),
            message: "Access Denied".to_string(),
        });
        assert_eq!(classify(&err), FailureClass::Permanent);

        let err = WorkerError::from(StorageError::Service {
            code: "Unknown".to_string(),
            message: "backend temporarily unavailable".to_string(),
        });
        assert_eq!(classify(&err), FailureClass::Transient);
    }
}
