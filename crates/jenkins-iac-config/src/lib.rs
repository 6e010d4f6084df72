//! Deployment context resolution and validation.
//!
//! This crate handles:
//! - The externally supplied key/value context and its presence/placeholder rules
//! - The validated `DeployConfig` record every composer receives
//! - The two-variant certificate mode

pub mod context;
pub mod deploy;
pub mod error;

pub use context::Context;
pub use deploy::{CertMode, DeployConfig};
pub use error::{ConfigError, ConfigResult};
