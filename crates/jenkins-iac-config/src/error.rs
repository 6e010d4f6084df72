//! Context resolution errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    /// The key still holds the reserved placeholder the operator was supposed
    /// to replace.
    #[error("{0} cannot be the default UPDATEME value")]
    NotUpdated(String),

    /// The key is absent, null, or an empty string.
    #[error("{0} cannot be null or empty")]
    Missing(String),

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("context parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    /// The context key this error names, if any.
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::NotUpdated(key) | Self::Missing(key) => Some(key),
            Self::InvalidValue { field, .. } => Some(field),
            _ => None,
        }
    }
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
