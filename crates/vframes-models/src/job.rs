//! Inbound job message and its validated form.

use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{ModelError, ModelResult};

/// Job message as received from the queue.
///
/// Every field is optional on the wire so that a missing field surfaces as a
/// validation failure rather than a parse failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoJobMessage {
    /// Owner of the video
    #[serde(rename = "idUsuario", default)]
    pub user_id: Option<String>,
    /// Display name of the video
    #[serde(rename = "nomeVideo", default)]
    pub video_name: Option<String>,
    /// Object key of the source video
    #[serde(rename = "caminhoVideo", default)]
    pub input_path: Option<String>,
    /// When the upload was registered (pass-through)
    #[serde(
        rename = "dataCriacao",
        default,
        deserialize_with = "lenient_datetime",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<NaiveDateTime>,
    /// Address to notify (pass-through)
    #[serde(rename = "email", default)]
    pub notify_email: Option<String>,
}

impl VideoJobMessage {
    pub fn new(
        user_id: impl Into<String>,
        video_name: impl Into<String>,
        input_path: impl Into<String>,
    ) -> Self {
        Self {
            user_id: Some(user_id.into()),
            video_name: Some(video_name.into()),
            input_path: Some(input_path.into()),
            created_at: None,
            notify_email: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.notify_email = Some(email.into());
        self
    }

    /// Check the required fields and produce a [`VideoJob`].
    pub fn validate(&self) -> ModelResult<VideoJob> {
        Ok(VideoJob {
            user_id: required(&self.user_id, "idUsuario")?,
            video_name: required(&self.video_name, "nomeVideo")?,
            input_path: required(&self.input_path, "caminhoVideo")?,
            created_at: self.created_at,
            notify_email: self.notify_email.clone(),
        })
    }
}

/// A job message whose required fields are known to be non-blank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoJob {
    pub user_id: String,
    pub video_name: String,
    pub input_path: String,
    pub created_at: Option<NaiveDateTime>,
    pub notify_email: Option<String>,
}

fn required(value: &Option<String>, field: &'static str) -> ModelResult<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v.clone()),
        _ => Err(ModelError::MissingField(field)),
    }
}

/// Accepts a zone-less local timestamp or RFC 3339. Anything else is
/// treated as absent.
fn lenient_datetime<'de, D>(deserializer: D) -> Result<Option<NaiveDateTime>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    let Some(serde_json::Value::String(s)) = raw else {
        return Ok(None);
    };

    if let Ok(naive) = s.parse::<NaiveDateTime>() {
        return Ok(Some(naive));
    }
    Ok(DateTime::parse_from_rfc3339(&s)
        .ok()
        .map(|dt| dt.naive_utc()))
}
