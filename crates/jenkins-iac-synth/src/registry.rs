//! Container registry stack: one repository per artifact.

use serde_json::json;
use tracing::debug;

use jenkins_iac_config::DeployConfig;
use jenkins_iac_core::{Resource, Result, Template};

/// Expire untagged images after one day, then cap history at ten images.
fn lifecycle_policy_text() -> String {
    json!({
        "rules": [
            {
                "rulePriority": 1,
                "selection": {
                    "tagStatus": "untagged",
                    "countType": "sinceImagePushed",
                    "countNumber": 1,
                    "countUnit": "days",
                },
                "action": { "type": "expire" },
            },
            {
                "rulePriority": 2,
                "selection": {
                    "tagStatus": "any",
                    "countType": "imageCountMoreThan",
                    "countNumber": 10,
                },
                "action": { "type": "expire" },
            },
        ],
    })
    .to_string()
}

fn repository(name: &str) -> Resource {
    Resource::new(
        "AWS::ECR::Repository",
        json!({
            "RepositoryName": name,
            "ImageScanningConfiguration": { "ScanOnPush": true },
            "LifecyclePolicy": { "LifecyclePolicyText": lifecycle_policy_text() },
        }),
    )
    .delete_on_removal()
}

/// Compose the registry stack: controller and agent repositories with
/// scan-on-push and the shared lifecycle rules.
pub fn compose_registry(stack_name: &str, config: &DeployConfig) -> Result<Template> {
    let mut template = Template::new(format!(
        "Container registries for the {stack_name} Jenkins deployment"
    ));
    template.add_resource("ControllerRepository", repository(&config.controller_name))?;
    template.add_resource("AgentRepository", repository(&config.agent_name))?;
    debug!(stack = stack_name, resources = template.resource_count(), "registry stack composed");
    Ok(template)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config() -> DeployConfig {
        crate::infra::tests::test_config()
    }

    #[test]
    fn test_two_repositories_with_scan_on_push() {
        let template = compose_registry("jenkins-iac-dev", &config()).unwrap();
        assert_eq!(template.resource_count_of("AWS::ECR::Repository"), 2);
        assert!(template.has_resource_properties(
            "AWS::ECR::Repository",
            &json!({
                "RepositoryName": "jenkins-controller",
                "ImageScanningConfiguration": { "ScanOnPush": true },
            })
        ));
        assert!(template.has_resource_properties(
            "AWS::ECR::Repository",
            &json!({ "RepositoryName": "jenkins-agent" })
        ));
    }

    #[test]
    fn test_lifecycle_rules() {
        let text = lifecycle_policy_text();
        let rules: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(rules["rules"][0]["rulePriority"], 1);
        assert_eq!(rules["rules"][0]["selection"]["tagStatus"], "untagged");
        assert_eq!(rules["rules"][1]["selection"]["countNumber"], 10);
    }

    #[test]
    fn test_repositories_deleted_with_the_stack() {
        let template = compose_registry("jenkins-iac-dev", &config()).unwrap();
        let (_, repo) = template.resources_of_type("AWS::ECR::Repository")[0];
        assert!(matches!(
            repo.deletion_policy,
            Some(jenkins_iac_core::template::DeletionPolicy::Delete)
        ));
    }
}
