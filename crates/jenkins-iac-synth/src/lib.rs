//! Stack composers for the Jenkins controller/agent deployment.
//!
//! Each composer assembles one declarative template from the validated
//! deployment configuration:
//! - [`registry`] — the container registries the artifacts are pushed to
//! - [`infra`] — network, cluster, storage, permissions and the controller service
//! - [`pipeline`] — the source -> build -> deploy delivery pipeline
//! - [`buildspec`] — the per-artifact build recipes the pipeline's build
//!   projects execute
//!
//! Composition is synchronous and run-to-completion; composers only produce
//! documents, provisioning belongs to the external API.

pub mod buildspec;
pub mod certificate;
pub mod infra;
pub mod network;
pub mod pipeline;
pub mod registry;

pub use infra::compose_infra;
pub use pipeline::compose_pipeline;
pub use registry::compose_registry;
