//! Model error types.

use thiserror::Error;

pub type ModelResult<T> = Result<T, ModelError>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("Missing or blank required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid object key: {0}")]
    InvalidKey(String),
}

impl ModelError {
    pub fn invalid_key(key: impl Into<String>) -> Self {
        Self::InvalidKey(key.into())
    }
}
