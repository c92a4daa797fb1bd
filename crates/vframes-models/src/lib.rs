//! Shared data models for the frame archiving worker.
//!
//! This crate provides Serde-serializable types for:
//! - Inbound job messages and their validation
//! - Outbound outcome notifications
//! - Output key derivation for produced archives

pub mod error;
pub mod job;
pub mod notification;
pub mod output_key;

pub use error::{ModelError, ModelResult};
pub use job::{VideoJob, VideoJobMessage};
pub use notification::{NotificationStatus, OutcomeNotification};
pub use output_key::OutputKeyRule;
