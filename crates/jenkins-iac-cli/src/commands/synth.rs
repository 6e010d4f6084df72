use std::fs;
use std::path::Path;

use anyhow::{Context as _, Result};
use tracing::info;

use jenkins_iac_core::{Environment, Template};
use jenkins_iac_synth::{compose_infra, compose_pipeline, compose_registry};

/// Compose all three stacks and write one template file per stack under
/// `out`. The context is resolved up front, so a bad context produces no
/// output at all.
pub fn synth(context: &str, out: &str, stack_name: &str, env: &Environment) -> Result<()> {
    let config = super::load_config(context)?;

    let stacks: Vec<(String, Template)> = vec![
        (
            format!("{stack_name}-registry"),
            compose_registry(stack_name, &config)?,
        ),
        (stack_name.to_string(), compose_infra(stack_name, &config, env)?),
        (
            format!("{stack_name}-pipeline"),
            compose_pipeline(stack_name, &config, env)?,
        ),
    ];

    let out = Path::new(out);
    fs::create_dir_all(out).with_context(|| format!("creating output directory {}", out.display()))?;

    for (name, template) in stacks {
        let path = out.join(format!("{name}.template.json"));
        fs::write(&path, template.to_json()?)
            .with_context(|| format!("writing {}", path.display()))?;
        info!(
            stack = %name,
            resources = template.resource_count(),
            parameters = template.parameter_count(),
            path = %path.display(),
            "template written"
        );
    }

    Ok(())
}
