//! Output key derivation.
//!
//! The archive for `entrada/22/video_ok.mp4` is stored at
//! `saida/22/video_ok.zip`: the first directory segment equal to the input
//! segment is swapped for the output segment and the file extension is
//! replaced by the archive extension.

use crate::error::{ModelError, ModelResult};

pub const DEFAULT_INPUT_SEGMENT: &str = "entrada";
pub const DEFAULT_OUTPUT_SEGMENT: &str = "saida";
pub const DEFAULT_ARCHIVE_EXTENSION: &str = "zip";

/// Rule mapping a source object key to its archive key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputKeyRule {
    /// Directory segment that marks inputs
    pub input_segment: String,
    /// Directory segment that replaces it
    pub output_segment: String,
    /// Extension of the produced archive, without the dot
    pub archive_extension: String,
}

impl Default for OutputKeyRule {
    fn default() -> Self {
        Self {
            input_segment: DEFAULT_INPUT_SEGMENT.to_string(),
            output_segment: DEFAULT_OUTPUT_SEGMENT.to_string(),
            archive_extension: DEFAULT_ARCHIVE_EXTENSION.to_string(),
        }
    }
}

impl OutputKeyRule {
    pub fn new(
        input_segment: impl Into<String>,
        output_segment: impl Into<String>,
        archive_extension: impl Into<String>,
    ) -> Self {
        Self {
            input_segment: input_segment.into(),
            output_segment: output_segment.into(),
            archive_extension: archive_extension.into(),
        }
    }

    /// Derive the archive key for a source key.
    ///
    /// Keys without the input segment keep their directories and only get
    /// the extension replaced.
    pub fn derive(&self, input_key: &str) -> ModelResult<String> {
        let mut segments: Vec<&str> = input_key.split('/').collect();
        let file_name = match segments.pop() {
            Some(name) if !name.trim().is_empty() => name,
            _ => return Err(ModelError::invalid_key(input_key)),
        };

        if let Some(segment) = segments.iter_mut().find(|s| **s == self.input_segment) {
            *segment = self.output_segment.as_str();
        }

        let stem = match file_name.rfind('.') {
            Some(idx) if idx > 0 => &file_name[..idx],
            _ => file_name,
        };

        let mut key = segments.join("/");
        if !segments.is_empty() {
            key.push('/');
        }
        key.push_str(stem);
        key.push('.');
        key.push_str(&self.archive_extension);
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn derive(key: &str) -> ModelResult<String> {
        OutputKeyRule::default().derive(key)
    }

    #[test]
    fn test_derive_output_key() {
        assert_eq!(derive("entrada/22/video_ok.mp4").unwrap(), "saida/22/video_ok.zip");
        assert_eq!(derive("/entrada/video_teste.mp4").unwrap(), "/saida/video_teste.zip");
    }

    #[test]
    fn test_only_first_segment_replaced() {
        assert_eq!(
            derive("entrada/entrada/clip.mp4").unwrap(),
            "saida/entrada/clip.zip"
        );
    }

    #[test]
    fn test_segment_match_is_exact() {
        assert_eq!(derive("entradas/22/a.mp4").unwrap(), "entradas/22/a.zip");
        assert_eq!(derive("uploads/entrada.mp4").unwrap(), "uploads/entrada.zip");
    }

    #[test]
    fn test_extension_handling() {
        assert_eq!(derive("entrada/a.b.mov").unwrap(), "saida/a.b.zip");
        assert_eq!(derive("entrada/clip").unwrap(), "saida/clip.zip");
        assert_eq!(derive("entrada/.hidden").unwrap(), "saida/.hidden.zip");
        assert_eq!(derive("video.mp4").unwrap(), "video.zip");
    }

    #[test]
    fn test_invalid_keys() {
        assert!(matches!(derive(""), Err(ModelError::InvalidKey(_))));
        assert!(matches!(derive("entrada/22/"), Err(ModelError::InvalidKey(_))));
    }

    #[test]
    fn test_custom_rule() {
        let rule = OutputKeyRule::new("in", "out", "tar");
        assert_eq!(rule.derive("bucket/in/v.mkv").unwrap(), "bucket/out/v.tar");
    }
}
