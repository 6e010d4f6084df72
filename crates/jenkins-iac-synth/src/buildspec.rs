//! Per-artifact build recipe generation.
//!
//! The generator only emits the recipe; execution, and the rule that any
//! failing command aborts the build, belong to the external build executor.
//! The single deliberate exception is the opportunistic cache pull, which is
//! suffixed `|| true` so a missing previous image never fails a build.

use jenkins_iac_core::Environment;
use jenkins_iac_core::buildspec::{
    BuildEnv, BuildEnvironmentVariable, BuildSpec, Phase, Phases,
};

/// Secret holding the public-registry credentials injected into builds.
pub const DOCKERHUB_CREDENTIALS_SECRET: &str = "dockerhub_credentials";

/// Build recipe for one artifact.
///
/// `artifact_dir` is the artifact's subdirectory in the source tree,
/// `image_tag_parameter` the parameter-store name of its version pointer, and
/// `root_ca_secret` the secret holding the root trust bundle passed to the
/// image build.
pub fn build_spec(artifact_dir: &str, image_tag_parameter: &str, root_ca_secret: &str) -> BuildSpec {
    let install = Phase::commands([
        "echo running install commands...".to_string(),
        "COMMIT_HASH=$(echo $CODEBUILD_RESOLVED_SOURCE_VERSION | cut -c 1-8)".to_string(),
        "IMAGE_TAG=${COMMIT_HASH:=latest}".to_string(),
        format!(
            "CURRENT_IMAGE_DIGEST=$(aws ssm get-parameter --name {image_tag_parameter} \
             --query \"Parameter.Value\" --output text --region $AWS_DEFAULT_REGION)"
        ),
        format!(
            "PRIVATE_ROOT_CA=$(aws secretsmanager get-secret-value --secret-id {root_ca_secret} \
             --query \"SecretString\" --output text --region $AWS_DEFAULT_REGION)"
        ),
    ]);

    let pre_build = Phase::commands([
        "echo Logging in to Amazon ECR...",
        "echo $DOCKER_USER_PASSWORD | docker login -u $DOCKER_USER_NAME --password-stdin",
        "aws ecr get-login-password --region $AWS_DEFAULT_REGION | docker login --username AWS \
         --password-stdin $AWS_ACCOUNT_ID.dkr.ecr.$AWS_DEFAULT_REGION.amazonaws.com",
    ]);

    let build = Phase::commands([
        "echo Build started on `date`".to_string(),
        format!("cd {artifact_dir}"),
        // Cache reuse is best-effort; the first build has nothing to pull.
        "docker pull $AWS_ACCOUNT_ID.dkr.ecr.$AWS_DEFAULT_REGION.amazonaws.com/$IMAGE_REPO_NAME:$CURRENT_IMAGE_DIGEST || true".to_string(),
        "docker build --build-arg PRIVATE_ROOT_CA=$PRIVATE_ROOT_CA --cache-from $AWS_ACCOUNT_ID.dkr.ecr.$AWS_DEFAULT_REGION.amazonaws.com/$IMAGE_REPO_NAME:$CURRENT_IMAGE_DIGEST -t $IMAGE_REPO_NAME:$IMAGE_TAG .".to_string(),
        "docker tag $IMAGE_REPO_NAME:$IMAGE_TAG $AWS_ACCOUNT_ID.dkr.ecr.$AWS_DEFAULT_REGION.amazonaws.com/$IMAGE_REPO_NAME:$IMAGE_TAG".to_string(),
    ]);

    let post_build = Phase::commands([
        "echo Running post build steps...".to_string(),
        "docker push $AWS_ACCOUNT_ID.dkr.ecr.$AWS_DEFAULT_REGION.amazonaws.com/$IMAGE_REPO_NAME:$IMAGE_TAG".to_string(),
        "NEW_IMAGE_DIGEST=$(echo $(docker inspect $AWS_ACCOUNT_ID.dkr.ecr.$AWS_DEFAULT_REGION.amazonaws.com/$IMAGE_REPO_NAME:$IMAGE_TAG) | jq '.[].RepoDigests' | jq '.[]' | cut -d ':' -f 2 | cut -c 1-12)".to_string(),
        "if [ $NEW_IMAGE_DIGEST = $CURRENT_IMAGE_DIGEST ] ; then echo No docker image changes; fi;".to_string(),
        format!(
            "if [ $NEW_IMAGE_DIGEST != $CURRENT_IMAGE_DIGEST ] ; then \
             docker tag $IMAGE_REPO_NAME:$IMAGE_TAG $AWS_ACCOUNT_ID.dkr.ecr.$AWS_DEFAULT_REGION.amazonaws.com/$IMAGE_REPO_NAME:$NEW_IMAGE_DIGEST; \
             docker push $AWS_ACCOUNT_ID.dkr.ecr.$AWS_DEFAULT_REGION.amazonaws.com/$IMAGE_REPO_NAME:$NEW_IMAGE_DIGEST; \
             aws ssm put-parameter --name {image_tag_parameter} --type String --value $NEW_IMAGE_DIGEST --overwrite; fi;"
        ),
    ]);

    BuildSpec::new(
        BuildEnv::default().variable("IMAGE_TAG", "latest"),
        Phases {
            install,
            pre_build,
            build,
            post_build,
        },
    )
}

/// The execution-context variable table for one artifact's build project.
pub fn build_environment(repo_name: &str, env: &Environment) -> Vec<BuildEnvironmentVariable> {
    vec![
        BuildEnvironmentVariable::plain("AWS_ACCOUNT_ID", &env.account),
        BuildEnvironmentVariable::plain("AWS_DEFAULT_REGION", &env.region),
        BuildEnvironmentVariable::plain("IMAGE_REPO_NAME", repo_name),
        BuildEnvironmentVariable::plain("IMAGE_TAG", "latest"),
        BuildEnvironmentVariable::secret(
            "DOCKER_USER_NAME",
            format!("{DOCKERHUB_CREDENTIALS_SECRET}:username"),
        ),
        BuildEnvironmentVariable::secret(
            "DOCKER_USER_PASSWORD",
            format!("{DOCKERHUB_CREDENTIALS_SECRET}:password"),
        ),
    ]
}
