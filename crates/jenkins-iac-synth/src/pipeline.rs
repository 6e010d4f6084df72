//! Delivery pipeline stack: source repository, version pointers, and the
//! source -> synth -> image build -> deploy pipeline.

use serde_json::{Value, json};
use tracing::debug;

use jenkins_iac_config::DeployConfig;
use jenkins_iac_core::iam::{PolicyDocument, PolicyStatement, RoleSpec};
use jenkins_iac_core::template::{get_att, r#ref};
use jenkins_iac_core::{Environment, Output, Resource, Result, Template, arn};

use crate::buildspec::{self, DOCKERHUB_CREDENTIALS_SECRET};

const BUILD_IMAGE: &str = "aws/codebuild/standard:7.0";
const COMPUTE_TYPE: &str = "BUILD_GENERAL1_MEDIUM";

/// Compose the delivery pipeline template for one deployment.
pub fn compose_pipeline(
    stack_name: &str,
    config: &DeployConfig,
    env: &Environment,
) -> Result<Template> {
    let mut template = Template::new(format!("Jenkins delivery pipeline ({stack_name})"));

    template.add_resource(
        "Repository",
        Resource::new(
            "AWS::CodeCommit::Repository",
            json!({
                "RepositoryName": stack_name,
                "RepositoryDescription": "Jenkins infrastructure and image sources",
            }),
        ),
    )?;

    // Version pointers the image builds advance and the infrastructure stack
    // reads back. Seeded with `latest` so the first deploy resolves.
    for (logical_id, name) in [
        ("ControllerImageTagParameter", &config.controller_image_tag_parameter),
        ("AgentImageTagParameter", &config.agent_image_tag_parameter),
    ] {
        template.add_resource(
            logical_id,
            Resource::new(
                "AWS::SSM::Parameter",
                json!({ "Name": name, "Type": "String", "Value": "latest" }),
            ),
        )?;
    }

    template.add_resource(
        "ArtifactBucket",
        Resource::new(
            "AWS::S3::Bucket",
            json!({
                "BucketEncryption": {
                    "ServerSideEncryptionConfiguration": [{
                        "ServerSideEncryptionByDefault": { "SSEAlgorithm": "aws:kms" },
                    }],
                },
                "PublicAccessBlockConfiguration": {
                    "BlockPublicAcls": true,
                    "BlockPublicPolicy": true,
                    "IgnorePublicAcls": true,
                    "RestrictPublicBuckets": true,
                },
            }),
        ),
    )?;

    compose_roles(&mut template, config, env)?;
    compose_projects(&mut template, config, env)?;
    compose_pipeline_resource(&mut template, stack_name)?;

    template.add_output(
        "CodeCommitRepositoryUrl",
        Output::new(get_att("Repository", "CloneUrlHttp"))
            .description("HTTP clone URL of the source repository"),
    )?;

    debug!(
        stack = stack_name,
        resources = template.resource_count(),
        "pipeline stack composed"
    );
    Ok(template)
}

fn artifact_statements() -> [PolicyStatement; 2] {
    [
        PolicyStatement::allow()
            .actions(["logs:CreateLogGroup", "logs:CreateLogStream", "logs:PutLogEvents"])
            .any_resource(),
        PolicyStatement::allow()
            .actions(["s3:GetObject", "s3:GetObjectVersion", "s3:PutObject"])
            .resources([get_att("ArtifactBucket", "Arn"), artifact_objects()]),
    ]
}

fn artifact_objects() -> Value {
    json!({ "Fn::Join": ["", [{ "Fn::GetAtt": ["ArtifactBucket", "Arn"] }, "/*"]] })
}

fn compose_roles(template: &mut Template, config: &DeployConfig, env: &Environment) -> Result<()> {
    template.add_resource(
        "SynthRole",
        RoleSpec::assumed_by("codebuild.amazonaws.com")
            .description("Synthesizes deployment templates from source")
            .inline_policy("artifacts", PolicyDocument::new(artifact_statements()))
            .into_resource(),
    )?;

    let version_parameters = [
        arn::ssm_parameter(env, &config.controller_image_tag_parameter),
        arn::ssm_parameter(env, &config.agent_image_tag_parameter),
    ];
    template.add_resource(
        "BuildRole",
        RoleSpec::assumed_by("codebuild.amazonaws.com")
            .description("Builds and pushes the controller and agent images")
            .inline_policy("artifacts", PolicyDocument::new(artifact_statements()))
            .inline_policy(
                "image-build",
                PolicyDocument::new([
                    PolicyStatement::allow()
                        .actions(["ssm:GetParameter", "ssm:PutParameter"])
                        .resources(version_parameters),
                    PolicyStatement::allow()
                        .actions(["secretsmanager:GetSecretValue"])
                        .resources([
                            arn::secret(env, DOCKERHUB_CREDENTIALS_SECRET),
                            arn::secret(env, &config.private_root_ca_secret),
                        ]),
                    PolicyStatement::allow()
                        .actions(["ecr:GetAuthorizationToken"])
                        .any_resource(),
                    PolicyStatement::allow()
                        .actions([
                            "ecr:BatchCheckLayerAvailability",
                            "ecr:GetDownloadUrlForLayer",
                            "ecr:BatchGetImage",
                            "ecr:InitiateLayerUpload",
                            "ecr:UploadLayerPart",
                            "ecr:CompleteLayerUpload",
                            "ecr:PutImage",
                        ])
                        .resources([arn::ecr_repository(env, "jenkins*")]),
                ]),
            )
            .into_resource(),
    )?;

    template.add_resource(
        "DeployRole",
        RoleSpec::assumed_by("cloudformation.amazonaws.com")
            .description("Provisions the infrastructure stack on deploy")
            .managed_policy(arn::managed_policy(env, "AdministratorAccess"))
            .into_resource(),
    )?;

    template.add_resource(
        "PipelineRole",
        RoleSpec::assumed_by("codepipeline.amazonaws.com")
            .inline_policy(
                "pipeline",
                PolicyDocument::new([
                    PolicyStatement::allow()
                        .actions(["s3:GetObject", "s3:GetObjectVersion", "s3:PutObject", "s3:GetBucketVersioning"])
                        .resources([get_att("ArtifactBucket", "Arn"), artifact_objects()]),
                    PolicyStatement::allow()
                        .actions([
                            "codecommit:GetBranch",
                            "codecommit:GetCommit",
                            "codecommit:UploadArchive",
                            "codecommit:GetUploadArchiveStatus",
                        ])
                        .resources([get_att("Repository", "Arn")]),
                    PolicyStatement::allow()
                        .actions(["codebuild:StartBuild", "codebuild:BatchGetBuilds"])
                        .resources([
                            get_att("SynthProject", "Arn"),
                            get_att("ControllerBuildProject", "Arn"),
                            get_att("AgentBuildProject", "Arn"),
                        ]),
                    PolicyStatement::allow()
                        .actions([
                            "cloudformation:CreateStack",
                            "cloudformation:UpdateStack",
                            "cloudformation:DescribeStacks",
                        ])
                        .any_resource(),
                    PolicyStatement::allow()
                        .actions(["iam:PassRole"])
                        .resources([get_att("DeployRole", "Arn")]),
                ]),
            )
            .into_resource(),
    )
}

/// Recipe for the synth step: build the tool and run it against the checked
/// in context, exporting the template directory as the stage artifact.
fn synth_build_spec() -> Value {
    json!({
        "version": "0.2",
        "phases": {
            "install": {
                "commands": ["rustup default stable"],
            },
            "build": {
                "commands": [
                    "cargo build --release --locked",
                    "./target/release/jenkins-iac synth --context context.json --out out",
                ],
            },
        },
        "artifacts": {
            "base-directory": "out",
            "files": ["**/*"],
        },
    })
}

fn compose_projects(
    template: &mut Template,
    config: &DeployConfig,
    env: &Environment,
) -> Result<()> {
    template.add_resource(
        "SynthProject",
        Resource::new(
            "AWS::CodeBuild::Project",
            json!({
                "ServiceRole": get_att("SynthRole", "Arn"),
                "Artifacts": { "Type": "CODEPIPELINE" },
                "Environment": {
                    "Type": "LINUX_CONTAINER",
                    "ComputeType": COMPUTE_TYPE,
                    "Image": BUILD_IMAGE,
                },
                "Source": {
                    "Type": "CODEPIPELINE",
                    "BuildSpec": synth_build_spec().to_string(),
                },
            }),
        ),
    )?;

    for (logical_id, artifact_dir, repo_name, tag_parameter) in [
        (
            "ControllerBuildProject",
            "controller",
            &config.controller_name,
            &config.controller_image_tag_parameter,
        ),
        (
            "AgentBuildProject",
            "agent",
            &config.agent_name,
            &config.agent_image_tag_parameter,
        ),
    ] {
        let spec = buildspec::build_spec(artifact_dir, tag_parameter, &config.private_root_ca_secret);
        let variables: Vec<Value> = buildspec::build_environment(repo_name, env)
            .iter()
            .map(|variable| variable.to_value())
            .collect();

        template.add_resource(
            logical_id,
            Resource::new(
                "AWS::CodeBuild::Project",
                json!({
                    "ServiceRole": get_att("BuildRole", "Arn"),
                    "Artifacts": { "Type": "CODEPIPELINE" },
                    "Environment": {
                        "Type": "LINUX_CONTAINER",
                        "ComputeType": COMPUTE_TYPE,
                        "Image": BUILD_IMAGE,
                        // Image builds drive a container runtime inside the job.
                        "PrivilegedMode": true,
                        "EnvironmentVariables": variables,
                    },
                    "Cache": {
                        "Type": "LOCAL",
                        "Modes": ["LOCAL_DOCKER_LAYER_CACHE"],
                    },
                    "Source": {
                        "Type": "CODEPIPELINE",
                        "BuildSpec": spec.to_json()?,
                    },
                }),
            ),
        )?;
    }
    Ok(())
}

fn compose_pipeline_resource(template: &mut Template, stack_name: &str) -> Result<()> {
    let codebuild_action = |name: &str, project: &str, input: &str, output: Option<&str>| {
        let mut action = json!({
            "Name": name,
            "ActionTypeId": {
                "Category": "Build",
                "Owner": "AWS",
                "Provider": "CodeBuild",
                "Version": "1",
            },
            "Configuration": { "ProjectName": r#ref(project) },
            "InputArtifacts": [{ "Name": input }],
        });
        if let Some(output) = output {
            action["OutputArtifacts"] = json!([{ "Name": output }]);
        }
        action
    };

    template.add_resource(
        "Pipeline",
        Resource::new(
            "AWS::CodePipeline::Pipeline",
            json!({
                "Name": format!("{stack_name}-pipeline"),
                "RoleArn": get_att("PipelineRole", "Arn"),
                "ArtifactStore": { "Type": "S3", "Location": r#ref("ArtifactBucket") },
                "Stages": [
                    {
                        "Name": "Source",
                        "Actions": [{
                            "Name": "Source",
                            "ActionTypeId": {
                                "Category": "Source",
                                "Owner": "AWS",
                                "Provider": "CodeCommit",
                                "Version": "1",
                            },
                            "Configuration": {
                                "RepositoryName": get_att("Repository", "Name"),
                                "BranchName": "main",
                            },
                            "OutputArtifacts": [{ "Name": "SourceOutput" }],
                        }],
                    },
                    {
                        "Name": "Synth",
                        "Actions": [codebuild_action(
                            "Synth", "SynthProject", "SourceOutput", Some("SynthOutput"),
                        )],
                    },
                    {
                        "Name": "BuildImages",
                        "Actions": [
                            codebuild_action(
                                "BuildControllerImage", "ControllerBuildProject",
                                "SourceOutput", None,
                            ),
                            codebuild_action(
                                "BuildAgentImage", "AgentBuildProject",
                                "SourceOutput", None,
                            ),
                        ],
                    },
                    {
                        "Name": "Deploy",
                        "Actions": [{
                            "Name": "Deploy",
                            "ActionTypeId": {
                                "Category": "Deploy",
                                "Owner": "AWS",
                                "Provider": "CloudFormation",
                                "Version": "1",
                            },
                            "Configuration": {
                                "ActionMode": "CREATE_UPDATE",
                                "StackName": stack_name,
                                "TemplatePath": format!("SynthOutput::{stack_name}.template.json"),
                                "Capabilities": "CAPABILITY_NAMED_IAM",
                                "RoleArn": get_att("DeployRole", "Arn"),
                            },
                            "InputArtifacts": [{ "Name": "SynthOutput" }],
                        }],
                    },
                ],
            }),
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::tests::{test_config, test_env};
    use serde_json::json;

    fn pipeline() -> Template {
        compose_pipeline("jenkins-iac-dev", &test_config(), &test_env()).unwrap()
    }

    #[test]
    fn test_resource_counts() {
        let template = pipeline();
        assert_eq!(template.resource_count_of("AWS::CodeCommit::Repository"), 1);
        assert_eq!(template.resource_count_of("AWS::SSM::Parameter"), 2);
        assert_eq!(template.resource_count_of("AWS::CodePipeline::Pipeline"), 1);
        assert_eq!(template.resource_count_of("AWS::CodeBuild::Project"), 3);
        assert!(template.output("CodeCommitRepositoryUrl").is_some());
    }

    #[test]
    fn test_version_pointers_seeded_with_latest() {
        let template = pipeline();
        for name in [
            "/dev/jenkins/controller/docker/image/tag",
            "/dev/jenkins/agent/docker/image/tag",
        ] {
            assert!(template.has_resource_properties(
                "AWS::SSM::Parameter",
                &json!({ "Name": name, "Type": "String", "Value": "latest" })
            ));
        }
    }

    #[test]
    fn test_image_builds_are_privileged_with_layer_cache() {
        let template = pipeline();
        for logical_id in ["ControllerBuildProject", "AgentBuildProject"] {
            let project = template.resource(logical_id).unwrap();
            assert_eq!(project.properties["Environment"]["PrivilegedMode"], true);
            assert_eq!(
                project.properties["Cache"],
                json!({ "Type": "LOCAL", "Modes": ["LOCAL_DOCKER_LAYER_CACHE"] })
            );
            let spec = project.properties["Source"]["BuildSpec"].as_str().unwrap();
            assert_eq!(spec.matches("|| true").count(), 1);
        }
    }

    #[test]
    fn test_build_role_scoping() {
        let template = pipeline();
        let role = template.resource("BuildRole").unwrap();
        let policies = role.properties["Policies"].as_array().unwrap();
        let image_build = policies
            .iter()
            .find(|p| p["PolicyName"] == "image-build")
            .unwrap();
        let statements = image_build["PolicyDocument"]["Statement"].as_array().unwrap();

        assert_eq!(
            statements[0]["Resource"][0],
            "arn:aws:ssm:eu-west-1:123456789012:parameter/dev/jenkins/controller/docker/image/tag"
        );
        assert_eq!(statements[1]["Action"][0], "secretsmanager:GetSecretValue");
        assert_eq!(statements[2]["Resource"][0], "*");
        assert_eq!(
            statements[3]["Resource"][0],
            "arn:aws:ecr:eu-west-1:123456789012:repository/jenkins*"
        );
    }

    #[test]
    fn test_pipeline_stage_order() {
        let template = pipeline();
        let resource = template.resource("Pipeline").unwrap();
        let stages = resource.properties["Stages"].as_array().unwrap();
        let names: Vec<&str> = stages.iter().map(|s| s["Name"].as_str().unwrap()).collect();
        assert_eq!(names, ["Source", "Synth", "BuildImages", "Deploy"]);
        assert_eq!(stages[2]["Actions"].as_array().unwrap().len(), 2);
        assert_eq!(
            stages[3]["Actions"][0]["Configuration"]["TemplatePath"],
            "SynthOutput::jenkins-iac-dev.template.json"
        );
    }
}
