//! ARN formatting scoped to a deployment environment.
//!
//! Permission statements name concrete resources wherever the target API
//! allows scoping; these helpers keep the partition/region/account plumbing
//! in one place.

use serde_json::Value;

use crate::environment::Environment;
use crate::template::join;

pub fn log_group(env: &Environment, name: &str) -> String {
    format!(
        "arn:{}:logs:{}:{}:log-group:{}",
        env.partition, env.region, env.account, name
    )
}

pub fn ecr_repository(env: &Environment, name: &str) -> String {
    format!(
        "arn:{}:ecr:{}:{}:repository/{}",
        env.partition, env.region, env.account, name
    )
}

pub fn secret(env: &Environment, name: &str) -> String {
    format!(
        "arn:{}:secretsmanager:{}:{}:secret:{}",
        env.partition, env.region, env.account, name
    )
}

/// Parameter names already begin with a slash, so none is inserted.
pub fn ssm_parameter(env: &Environment, name: &str) -> String {
    format!(
        "arn:{}:ssm:{}:{}:parameter{}",
        env.partition, env.region, env.account, name
    )
}

pub fn ecs_cluster(env: &Environment, name: &str) -> String {
    format!(
        "arn:{}:ecs:{}:{}:cluster/{}",
        env.partition, env.region, env.account, name
    )
}

pub fn ecs_task_definition(env: &Environment, family: &str) -> String {
    format!(
        "arn:{}:ecs:{}:{}:task-definition/{}",
        env.partition, env.region, env.account, family
    )
}

pub fn ecs_task(env: &Environment, pattern: &str) -> String {
    format!(
        "arn:{}:ecs:{}:{}:task/{}",
        env.partition, env.region, env.account, pattern
    )
}

/// Role ARN in this environment's account.
pub fn iam_role(env: &Environment, name: &str) -> String {
    iam_role_in_account(env, &env.account, name)
}

/// Role ARN in another account of the same partition; `account` may itself be
/// a template expression when the account id is resolved at deploy time.
pub fn iam_role_in_account(env: &Environment, account: &str, name: &str) -> String {
    format!("arn:{}:iam::{}:role/{}", env.partition, account, name)
}

/// File-system ARN where the id is only known at deploy time (a `Ref`).
pub fn efs_file_system(env: &Environment, file_system_id: Value) -> Value {
    join(
        "",
        vec![
            Value::String(format!(
                "arn:{}:elasticfilesystem:{}:{}:file-system/",
                env.partition, env.region, env.account
            )),
            file_system_id,
        ],
    )
}

/// Managed policy ARNs live in the provider-owned "aws" account namespace.
pub fn managed_policy(env: &Environment, name: &str) -> String {
    format!("arn:{}:iam::aws:policy/{}", env.partition, name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::r#ref;

    fn env() -> Environment {
        Environment::new("123456789012", "eu-west-1")
    }

    #[test]
    fn test_scoped_arns() {
        assert_eq!(
            ecr_repository(&env(), "jenkins*"),
            "arn:aws:ecr:eu-west-1:123456789012:repository/jenkins*"
        );
        assert_eq!(
            ssm_parameter(&env(), "/dev/jenkins/controller/docker/image/tag"),
            "arn:aws:ssm:eu-west-1:123456789012:parameter/dev/jenkins/controller/docker/image/tag"
        );
        assert_eq!(
            iam_role_in_account(&env(), "999999999999", "jenkins-deployment-role"),
            "arn:aws:iam::999999999999:role/jenkins-deployment-role"
        );
        assert_eq!(
            managed_policy(&env(), "service-role/AmazonECSTaskExecutionRolePolicy"),
            "arn:aws:iam::aws:policy/service-role/AmazonECSTaskExecutionRolePolicy"
        );
    }

    #[test]
    fn test_file_system_arn_joins_deploy_time_id() {
        let arn = efs_file_system(&env(), r#ref("FileSystem"));
        let parts = &arn["Fn::Join"][1];
        assert_eq!(
            parts[0],
            "arn:aws:elasticfilesystem:eu-west-1:123456789012:file-system/"
        );
        assert_eq!(parts[1]["Ref"], "FileSystem");
    }
}
