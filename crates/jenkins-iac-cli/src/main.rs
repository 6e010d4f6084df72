//! Jenkins deployment synthesizer CLI.

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use jenkins_iac_core::Environment;

mod commands;

#[derive(Parser)]
#[command(name = "jenkins-iac")]
#[command(about = "Synthesize the Jenkins on ECS deployment templates", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Synthesize the registry, infrastructure and pipeline templates
    Synth {
        /// Path to the deployment context file
        #[arg(long, default_value = "context.json")]
        context: String,
        /// Directory the templates are written to
        #[arg(long, default_value = "out")]
        out: String,
        /// Name of the deployment, used as the stack name prefix
        #[arg(long, default_value = "jenkins-iac-dev")]
        stack_name: String,
        #[command(flatten)]
        target: Target,
    },
    /// Validate the deployment context
    Validate {
        /// Path to the deployment context file
        #[arg(long, default_value = "context.json")]
        context: String,
    },
    /// Print a generated image build recipe
    Buildspec {
        /// Which artifact's recipe to print
        artifact: commands::Artifact,
        /// Path to the deployment context file
        #[arg(long, default_value = "context.json")]
        context: String,
    },
}

/// The account and region the templates are synthesized for.
#[derive(clap::Args)]
struct Target {
    /// Target account id
    #[arg(long, env = "AWS_ACCOUNT_ID")]
    account: String,

    /// Target region
    #[arg(long, env = "AWS_REGION")]
    region: String,

    /// Target partition
    #[arg(long, env = "AWS_PARTITION", default_value = "aws")]
    partition: String,
}

impl Target {
    fn environment(&self) -> Environment {
        Environment::new(&self.account, &self.region).with_partition(&self.partition)
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Synth {
            context,
            out,
            stack_name,
            target,
        } => {
            commands::synth(&context, &out, &stack_name, &target.environment())?;
        }
        Commands::Validate { context } => {
            commands::validate(&context)?;
        }
        Commands::Buildspec { artifact, context } => {
            commands::buildspec(artifact, &context)?;
        }
    }

    Ok(())
}
