//! Outcome notification published once a job attempt completes.

use serde::{Deserialize, Serialize};

use crate::job::VideoJob;

/// Description sent with a successful outcome. Downstream consumers match on it.
pub const PROCESSED_DESCRIPTION: &str = "Video processado com successo.";

/// Outcome status carried in `situacao`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotificationStatus {
    #[serde(rename = "ARQUIVO_PROCESSADO")]
    Processed,
    #[serde(rename = "ERRO_PROCESSAMENTO")]
    Failed,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Processed => "ARQUIVO_PROCESSADO",
            NotificationStatus::Failed => "ERRO_PROCESSAMENTO",
        }
    }
}

/// Notification payload. Field names are a stable contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeNotification {
    #[serde(rename = "idUsuario")]
    pub user_id: String,
    #[serde(rename = "nomeVideo")]
    pub video_name: String,
    #[serde(rename = "caminhoSaida")]
    pub output_path: String,
    #[serde(rename = "situacao")]
    pub status: NotificationStatus,
    #[serde(rename = "descricao")]
    pub description: String,
    #[serde(rename = "email")]
    pub notify_email: Option<String>,
}

impl OutcomeNotification {
    /// Build the success notification for a processed job.
    pub fn processed(job: &VideoJob, output_path: impl Into<String>) -> Self {
        Self {
            user_id: job.user_id.clone(),
            video_name: job.video_name.clone(),
            output_path: output_path.into(),
            status: NotificationStatus::Processed,
            description: PROCESSED_DESCRIPTION.to_string(),
            notify_email: job.notify_email.clone(),
        }
    }
}
