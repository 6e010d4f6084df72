//! CLI command implementations.

mod synth;

pub use synth::synth;

use anyhow::{Context as _, Result};
use clap::ValueEnum;

use jenkins_iac_config::{Context, DeployConfig};
use jenkins_iac_synth::buildspec;

/// Load the context file and resolve the full deployment configuration.
/// Fails on the first unresolvable key so nothing downstream runs with a
/// placeholder value.
pub(crate) fn load_config(path: &str) -> Result<DeployConfig> {
    let context =
        Context::from_file(path).with_context(|| format!("reading deployment context {path}"))?;
    DeployConfig::from_context(&context)
        .with_context(|| format!("resolving deployment context {path}"))
}

pub fn validate(path: &str) -> Result<()> {
    match load_config(path) {
        Ok(config) => {
            println!("Context is valid: {}", config.domain_name());
            Ok(())
        }
        Err(e) => {
            eprintln!("Context error: {e:#}");
            std::process::exit(1);
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Artifact {
    Controller,
    Agent,
}

pub fn buildspec(artifact: Artifact, context: &str) -> Result<()> {
    let config = load_config(context)?;
    let spec = match artifact {
        Artifact::Controller => buildspec::build_spec(
            "controller",
            &config.controller_image_tag_parameter,
            &config.private_root_ca_secret,
        ),
        Artifact::Agent => buildspec::build_spec(
            "agent",
            &config.agent_image_tag_parameter,
            &config.private_root_ca_secret,
        ),
    };
    println!("{}", spec.to_json()?);
    Ok(())
}
