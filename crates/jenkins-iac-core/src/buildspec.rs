//! CodeBuild buildspec document model.
//!
//! A [`BuildSpec`] is the phase-ordered recipe an external build executor
//! runs to produce one container artifact. This crate only models the
//! document; command semantics (including which failures the executor
//! tolerates) belong to the executor.

use serde::Serialize;
use serde_json::{Value, json};
use std::collections::BTreeMap;

const BUILDSPEC_VERSION: &str = "0.2";

/// A structured, phase-ordered build recipe.
#[derive(Debug, Clone, Serialize)]
pub struct BuildSpec {
    pub version: &'static str,
    pub env: BuildEnv,
    pub phases: Phases,
}

impl BuildSpec {
    pub fn new(env: BuildEnv, phases: Phases) -> Self {
        Self {
            version: BUILDSPEC_VERSION,
            env,
            phases,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Plain variables injected into every phase.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildEnv {
    pub variables: BTreeMap<String, String>,
}

impl BuildEnv {
    pub fn variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }
}

/// The four build phases. Field order is serialization order, which fixes
/// install -> pre_build -> build -> post_build by construction.
#[derive(Debug, Clone, Serialize)]
pub struct Phases {
    pub install: Phase,
    pub pre_build: Phase,
    pub build: Phase,
    pub post_build: Phase,
}

impl Phases {
    /// The phases paired with their names, in execution order.
    pub fn in_order(&self) -> [(&'static str, &Phase); 4] {
        [
            ("install", &self.install),
            ("pre_build", &self.pre_build),
            ("build", &self.build),
            ("post_build", &self.post_build),
        ]
    }
}

/// An ordered list of shell-invocable commands.
#[derive(Debug, Clone, Serialize)]
pub struct Phase {
    pub commands: Vec<String>,
}

impl Phase {
    pub fn commands<I, S>(commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            commands: commands.into_iter().map(Into::into).collect(),
        }
    }
}

/// One variable of a build project's execution context: either a literal
/// value or a reference into the external secret store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildEnvironmentVariable {
    Plain { name: String, value: String },
    SecretsManager { name: String, secret_ref: String },
}

impl BuildEnvironmentVariable {
    pub fn plain(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Plain {
            name: name.into(),
            value: value.into(),
        }
    }

    /// `secret_ref` is `<secret name>:<json key>`.
    pub fn secret(name: impl Into<String>, secret_ref: impl Into<String>) -> Self {
        Self::SecretsManager {
            name: name.into(),
            secret_ref: secret_ref.into(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Plain { name, .. } | Self::SecretsManager { name, .. } => name,
        }
    }

    /// The CodeBuild project `EnvironmentVariables` entry shape.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Plain { name, value } => json!({
                "Name": name,
                "Type": "PLAINTEXT",
                "Value": value,
            }),
            Self::SecretsManager { name, secret_ref } => json!({
                "Name": name,
                "Type": "SECRETS_MANAGER",
                "Value": secret_ref,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> BuildSpec {
        BuildSpec::new(
            BuildEnv::default().variable("IMAGE_TAG", "latest"),
            Phases {
                install: Phase::commands(["echo install"]),
                pre_build: Phase::commands(["echo pre_build"]),
                build: Phase::commands(["echo build"]),
                post_build: Phase::commands(["echo post_build"]),
            },
        )
    }

    #[test]
    fn test_phase_order_is_fixed() {
        let names: Vec<&str> = sample().phases.in_order().iter().map(|(n, _)| *n).collect();
        assert_eq!(names, ["install", "pre_build", "build", "post_build"]);
    }

    #[test]
    fn test_serialized_document_shape() {
        let doc: Value = serde_json::from_str(&sample().to_json().unwrap()).unwrap();
        assert_eq!(doc["version"], "0.2");
        assert_eq!(doc["env"]["variables"]["IMAGE_TAG"], "latest");
        assert_eq!(doc["phases"]["pre_build"]["commands"][0], "echo pre_build");

        // Serialized key order must follow execution order.
        let text = sample().to_json().unwrap();
        let install = text.find("\"install\"").unwrap();
        let pre_build = text.find("\"pre_build\"").unwrap();
        let build = text.find("\"build\"").unwrap();
        let post_build = text.find("\"post_build\"").unwrap();
        assert!(install < pre_build && pre_build < build && build < post_build);
    }

    #[test]
    fn test_environment_variable_shapes() {
        let plain = BuildEnvironmentVariable::plain("IMAGE_REPO_NAME", "jenkins-controller");
        assert_eq!(plain.to_value()["Type"], "PLAINTEXT");

        let secret =
            BuildEnvironmentVariable::secret("DOCKER_USER_NAME", "dockerhub_credentials:username");
        let value = secret.to_value();
        assert_eq!(value["Type"], "SECRETS_MANAGER");
        assert_eq!(value["Value"], "dockerhub_credentials:username");
    }
}
