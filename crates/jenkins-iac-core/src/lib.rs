//! Core template model and shared types for jenkins-iac.
//!
//! This crate contains:
//! - The CloudFormation template document model (resources, parameters, outputs)
//! - ARN formatting scoped to an explicit deployment environment
//! - IAM policy document and role composition
//! - The CodeBuild buildspec document model

pub mod arn;
pub mod buildspec;
pub mod environment;
pub mod error;
pub mod iam;
pub mod template;

pub use environment::Environment;
pub use error::{Error, Result};
pub use template::{Output, Parameter, Resource, Template};
