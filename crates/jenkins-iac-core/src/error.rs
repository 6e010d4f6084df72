//! Error types for template composition.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("duplicate logical id: {0}")]
    DuplicateLogicalId(String),

    #[error("invalid template: {0}")]
    InvalidTemplate(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
