//! Infrastructure stack: network, cluster, storage, permissions and the
//! load-balanced controller service.
//!
//! Composition runs in explicit dependency order: external lookups first,
//! then network and DNS, then the certificate strategy, then platform
//! resources, and finally the service wiring that references all of them.

use serde_json::{Value, json};
use tracing::debug;

use jenkins_iac_config::DeployConfig;
use jenkins_iac_core::iam::{PolicyDocument, PolicyStatement, RoleSpec};
use jenkins_iac_core::template::{get_att, join, r#ref, sub};
use jenkins_iac_core::{Environment, Parameter, Resource, Result, Template, arn};

use crate::certificate::CertificateStrategy;
use crate::network::{self, Network};

/// Role name assumed for deployments, in this account and in workload accounts.
pub const DEPLOYMENT_ROLE: &str = "jenkins-deployment-role";

const CONTAINER_PORT: u16 = 8080;
const NFS_PORT: u16 = 2049;

/// Compose the full infrastructure template for one deployment.
pub fn compose_infra(
    stack_name: &str,
    config: &DeployConfig,
    env: &Environment,
) -> Result<Template> {
    let mut composer = InfraComposer {
        stack_name,
        config,
        env,
        template: Template::new(format!(
            "Jenkins application controller and agent on ECS Fargate ({stack_name})"
        )),
    };

    composer.lookups()?;
    let network = network::compose_network(&mut composer.template, stack_name)?;
    composer.hosted_zone(&network)?;
    let certificate_arn = CertificateStrategy::from_config(config).apply(&mut composer.template)?;
    composer.cluster(&network)?;
    composer.security_groups(&network)?;
    composer.storage(&network)?;
    composer.roles()?;
    composer.log_groups()?;
    composer.service(&network, certificate_arn)?;

    debug!(
        stack = stack_name,
        resources = composer.template.resource_count(),
        cert_mode = %config.cert_mode,
        "infrastructure stack composed"
    );
    Ok(composer.template)
}

struct InfraComposer<'a> {
    stack_name: &'a str,
    config: &'a DeployConfig,
    env: &'a Environment,
    template: Template,
}

impl InfraComposer<'_> {
    fn cluster_name(&self) -> String {
        format!("{}-ecs-cluster", self.stack_name)
    }

    fn namespace_name(&self) -> String {
        format!("{}-private", self.stack_name)
    }

    fn controller_log_group_name(&self) -> String {
        format!(
            "/aws/ecs/{}/service/{}",
            self.cluster_name(),
            self.config.controller_name
        )
    }

    fn agent_log_group_name(&self) -> String {
        format!(
            "/aws/ecs/{}/service/{}",
            self.cluster_name(),
            self.config.agent_name
        )
    }

    /// Values owned by other systems, resolved from the external parameter
    /// store at deploy time.
    fn lookups(&mut self) -> Result<()> {
        self.template.add_parameter(
            "ControllerImageTag",
            Parameter::ssm_string(&self.config.controller_image_tag_parameter)
                .description("Currently deployed controller image version"),
        )?;
        self.template.add_parameter(
            "AgentImageTag",
            Parameter::ssm_string(&self.config.agent_image_tag_parameter)
                .description("Currently deployed agent image version"),
        )?;
        self.template.add_parameter(
            "WorkloadAccountId",
            Parameter::ssm_string(&self.config.workload_account_id_parameter)
                .description("Account deployments are promoted into"),
        )?;
        Ok(())
    }

    fn hosted_zone(&mut self, network: &Network) -> Result<()> {
        self.template.add_resource(
            "HostedZone",
            Resource::new(
                "AWS::Route53::HostedZone",
                json!({
                    "Name": self.config.hosted_zone_name,
                    "VPCs": [{
                        "VPCId": r#ref(network.vpc),
                        "VPCRegion": self.env.region,
                    }],
                }),
            ),
        )
    }

    fn cluster(&mut self, network: &Network) -> Result<()> {
        self.template.add_resource(
            "Cluster",
            Resource::new(
                "AWS::ECS::Cluster",
                json!({
                    "ClusterName": self.cluster_name(),
                    "ClusterSettings": [{ "Name": "containerInsights", "Value": "enabled" }],
                }),
            ),
        )?;
        self.template.add_resource(
            "CloudMapNamespace",
            Resource::new(
                "AWS::ServiceDiscovery::PrivateDnsNamespace",
                json!({
                    "Name": self.namespace_name(),
                    "Vpc": r#ref(network.vpc),
                }),
            ),
        )
    }

    fn security_groups(&mut self, network: &Network) -> Result<()> {
        self.template.add_resource(
            "AlbSecurityGroup",
            Resource::new(
                "AWS::EC2::SecurityGroup",
                json!({
                    "GroupName": format!("{}-alb-sg", self.stack_name),
                    "GroupDescription": "Jenkins Load Balancer Security Group",
                    "VpcId": r#ref(network.vpc),
                    "SecurityGroupIngress": [
                        {
                            "IpProtocol": "tcp", "FromPort": 80, "ToPort": 80,
                            "CidrIp": network::VPC_CIDR,
                            "Description": "allow HTTP from inside the network",
                        },
                        {
                            "IpProtocol": "tcp", "FromPort": 443, "ToPort": 443,
                            "CidrIp": network::VPC_CIDR,
                            "Description": "allow HTTPS from inside the network",
                        },
                    ],
                }),
            ),
        )?;

        self.template.add_resource(
            "ControllerSecurityGroup",
            Resource::new(
                "AWS::EC2::SecurityGroup",
                json!({
                    "GroupName": format!("{}-controller-sg", self.stack_name),
                    "GroupDescription": "Jenkins Controller Service Security Group",
                    "VpcId": r#ref(network.vpc),
                    "SecurityGroupEgress": [
                        { "IpProtocol": "-1", "CidrIp": "0.0.0.0/0", "Description": "allow all outbound" },
                    ],
                }),
            ),
        )?;

        self.template.add_resource(
            "EfsSecurityGroup",
            Resource::new(
                "AWS::EC2::SecurityGroup",
                json!({
                    "GroupName": format!("{}-efs-sg", self.stack_name),
                    "GroupDescription": "Jenkins EFS Security Group",
                    "VpcId": r#ref(network.vpc),
                }),
            ),
        )?;

        self.template.add_resource(
            "AgentSecurityGroup",
            Resource::new(
                "AWS::EC2::SecurityGroup",
                json!({
                    "GroupName": format!("{}-agent-sg", self.stack_name),
                    "GroupDescription": "Jenkins Agent Security Group",
                    "VpcId": r#ref(network.vpc),
                    "SecurityGroupEgress": [{
                        "IpProtocol": "tcp", "FromPort": 443, "ToPort": 443,
                        "CidrIp": "0.0.0.0/0",
                        "Description": "allow outbound traffic on port 443 from Jenkins Agent",
                    }],
                }),
            ),
        )?;

        // Cross-group rules live in standalone resources so groups can
        // reference each other without a dependency cycle.
        self.template.add_resource(
            "AlbToControllerEgress",
            Resource::new(
                "AWS::EC2::SecurityGroupEgress",
                json!({
                    "GroupId": get_att("AlbSecurityGroup", "GroupId"),
                    "DestinationSecurityGroupId": get_att("ControllerSecurityGroup", "GroupId"),
                    "IpProtocol": "tcp", "FromPort": CONTAINER_PORT, "ToPort": CONTAINER_PORT,
                    "Description": "forward to the controller container port",
                }),
            ),
        )?;
        self.template.add_resource(
            "ControllerFromAlbIngress",
            Resource::new(
                "AWS::EC2::SecurityGroupIngress",
                json!({
                    "GroupId": get_att("ControllerSecurityGroup", "GroupId"),
                    "SourceSecurityGroupId": get_att("AlbSecurityGroup", "GroupId"),
                    "IpProtocol": "tcp", "FromPort": CONTAINER_PORT, "ToPort": CONTAINER_PORT,
                    "Description": "allow traffic from the load balancer",
                }),
            ),
        )?;
        self.template.add_resource(
            "ControllerFromAgentIngress",
            Resource::new(
                "AWS::EC2::SecurityGroupIngress",
                json!({
                    "GroupId": get_att("ControllerSecurityGroup", "GroupId"),
                    "SourceSecurityGroupId": get_att("AgentSecurityGroup", "GroupId"),
                    "IpProtocol": "tcp",
                    "FromPort": self.config.jnlp_port, "ToPort": self.config.jnlp_port,
                    "Description": format!(
                        "allow traffic on port {} from the Jenkins Agent",
                        self.config.jnlp_port
                    ),
                }),
            ),
        )?;
        self.template.add_resource(
            "EfsFromControllerIngress",
            Resource::new(
                "AWS::EC2::SecurityGroupIngress",
                json!({
                    "GroupId": get_att("EfsSecurityGroup", "GroupId"),
                    "SourceSecurityGroupId": get_att("ControllerSecurityGroup", "GroupId"),
                    "IpProtocol": "tcp", "FromPort": NFS_PORT, "ToPort": NFS_PORT,
                    "Description": "allow traffic on port 2049 from Jenkins Controller to EFS",
                }),
            ),
        )?;
        self.template.add_resource(
            "EfsToControllerEgress",
            Resource::new(
                "AWS::EC2::SecurityGroupEgress",
                json!({
                    "GroupId": get_att("EfsSecurityGroup", "GroupId"),
                    "DestinationSecurityGroupId": get_att("ControllerSecurityGroup", "GroupId"),
                    "IpProtocol": "tcp", "FromPort": NFS_PORT, "ToPort": NFS_PORT,
                    "Description": "allow traffic to port 2049 from EFS to Jenkins Controller",
                }),
            ),
        )?;
        Ok(())
    }

    fn storage(&mut self, network: &Network) -> Result<()> {
        self.template.add_resource(
            "FileSystem",
            Resource::new(
                "AWS::EFS::FileSystem",
                json!({
                    "Encrypted": true,
                    "PerformanceMode": "generalPurpose",
                    "BackupPolicy": { "Status": "ENABLED" },
                    "FileSystemTags": [
                        { "Key": "Name", "Value": format!("{}-efs", self.stack_name) },
                    ],
                }),
            )
            .delete_on_removal(),
        )?;

        for (index, subnet) in network.app_subnets.iter().enumerate() {
            self.template.add_resource(
                format!("MountTarget{}", index + 1),
                Resource::new(
                    "AWS::EFS::MountTarget",
                    json!({
                        "FileSystemId": r#ref("FileSystem"),
                        "SubnetId": r#ref(subnet),
                        "SecurityGroups": [get_att("EfsSecurityGroup", "GroupId")],
                    }),
                ),
            )?;
        }

        self.template.add_resource(
            "AccessPoint",
            Resource::new(
                "AWS::EFS::AccessPoint",
                json!({
                    "FileSystemId": r#ref("FileSystem"),
                    "PosixUser": { "Uid": "1000", "Gid": "1000" },
                    "RootDirectory": {
                        "CreationInfo": {
                            "OwnerUid": "1000",
                            "OwnerGid": "1000",
                            "Permissions": "755",
                        },
                        "Path": "/jenkins",
                    },
                }),
            ),
        )
    }

    fn roles(&mut self) -> Result<()> {
        let env = self.env;
        let execution_policy = arn::managed_policy(
            env,
            "service-role/AmazonECSTaskExecutionRolePolicy",
        );

        self.template.add_resource(
            "AgentExecutionRole",
            RoleSpec::assumed_by("ecs-tasks.amazonaws.com")
                .role_name(format!("{}-agent-execution-role", self.stack_name))
                .managed_policy(&execution_policy)
                .into_resource(),
        )?;

        self.template.add_resource(
            "AgentTaskRole",
            RoleSpec::assumed_by("ecs-tasks.amazonaws.com")
                .role_name(format!("{}-agent-task-role", self.stack_name))
                .inline_policy(
                    "create-loggroup",
                    PolicyDocument::new([PolicyStatement::allow()
                        .actions(["logs:CreateLogGroup", "logs:PutLogEvents", "logs:TagResource"])
                        .resources([arn::log_group(env, "*")])]),
                )
                .into_resource(),
        )?;

        self.template.add_resource(
            "ControllerExecutionRole",
            RoleSpec::assumed_by("ecs-tasks.amazonaws.com")
                .role_name(format!("{}-controller-execution-role", self.stack_name))
                .managed_policy(&execution_policy)
                .into_resource(),
        )?;

        let cluster_arn = arn::ecs_cluster(env, &self.cluster_name());
        self.template.add_resource(
            "ControllerTaskRole",
            RoleSpec::assumed_by("ecs-tasks.amazonaws.com")
                .role_name(format!("{}-controller-task-role", self.stack_name))
                .managed_policy(&execution_policy)
                .inline_policy(
                    "secrets-role",
                    PolicyDocument::new([PolicyStatement::allow()
                        .actions(["secretsmanager:GetSecretValue"])
                        .resources([arn::secret(env, "jenkins_secret")])]),
                )
                .inline_policy(
                    "ecr-role",
                    PolicyDocument::new([
                        PolicyStatement::allow()
                            .actions(["ecr:GetAuthorizationToken"])
                            .any_resource(),
                        PolicyStatement::allow()
                            .actions([
                                "ecr:BatchCheckLayerAvailability",
                                "ecr:GetDownloadUrlForLayer",
                                "ecr:GetRepositoryPolicy",
                                "ecr:DescribeRepositories",
                                "ecr:ListImages",
                                "ecr:DescribeImages",
                                "ecr:BatchGetImage",
                                "ecr:GetLifecyclePolicy",
                                "ecr:GetLifecyclePolicyPreview",
                                "ecr:ListTagsForResource",
                                "ecr:DescribeImageScanFindings",
                            ])
                            .resources([arn::ecr_repository(env, "jenkins*")]),
                    ]),
                )
                .inline_policy(
                    "create-loggroup",
                    PolicyDocument::new([PolicyStatement::allow()
                        .actions(["logs:CreateLogGroup", "logs:PutLogEvents", "logs:TagResource"])
                        .resources([arn::log_group(env, "*")])]),
                )
                .inline_policy(
                    "efs-access",
                    PolicyDocument::new([PolicyStatement::allow()
                        .actions([
                            "elasticfilesystem:ClientRootAccess",
                            "elasticfilesystem:ClientMount",
                            "elasticfilesystem:ClientWrite",
                            "elasticfilesystem:DescribeMountTargets",
                        ])
                        .resources([arn::efs_file_system(env, r#ref("FileSystem"))])]),
                )
                .inline_policy(
                    "ssm-access",
                    PolicyDocument::new([PolicyStatement::allow()
                        .actions([
                            "ssmmessages:CreateControlChannel",
                            "ssmmessages:CreateDataChannel",
                            "ssmmessages:OpenControlChannel",
                            "ssmmessages:OpenDataChannel",
                        ])
                        .any_resource()]),
                )
                .inline_policy(
                    "launch-agent",
                    PolicyDocument::new([
                        PolicyStatement::allow()
                            .actions([
                                "ecs:RegisterTaskDefinition",
                                "ecs:ListClusters",
                                "ecs:DescribeContainerInstances",
                                "ecs:ListTaskDefinitions",
                                "ecs:DescribeTaskDefinition",
                                "ecs:DeregisterTaskDefinition",
                            ])
                            .any_resource(),
                        PolicyStatement::allow()
                            .actions(["ecs:ListContainerInstances", "ecs:DescribeClusters"])
                            .resources([cluster_arn.clone()]),
                        PolicyStatement::allow()
                            .actions(["ecs:RunTask"])
                            .resources([arn::ecs_task_definition(env, "*")])
                            .condition("ArnEquals", "ecs:cluster", cluster_arn.clone()),
                        PolicyStatement::allow()
                            .actions(["ecs:DescribeTasks", "ecs:StopTask"])
                            .resources([arn::ecs_task(env, "*")])
                            .condition("ArnEquals", "ecs:cluster", cluster_arn),
                        PolicyStatement::allow()
                            .actions(["iam:PassRole"])
                            .resources([
                                get_att("AgentTaskRole", "Arn"),
                                get_att("AgentExecutionRole", "Arn"),
                            ]),
                    ]),
                )
                .inline_policy(
                    "assume-role",
                    PolicyDocument::new([PolicyStatement::allow()
                        .actions(["sts:AssumeRole"])
                        .resources([
                            Value::String(arn::iam_role(env, DEPLOYMENT_ROLE)),
                            sub(format!(
                                "arn:{}:iam::${{WorkloadAccountId}}:role/{DEPLOYMENT_ROLE}",
                                env.partition
                            )),
                        ])]),
                )
                .into_resource(),
        )
    }

    fn log_groups(&mut self) -> Result<()> {
        for (logical_id, name) in [
            ("ControllerLogGroup", self.controller_log_group_name()),
            ("AgentLogGroup", self.agent_log_group_name()),
        ] {
            self.template.add_resource(
                logical_id,
                Resource::new(
                    "AWS::Logs::LogGroup",
                    json!({ "LogGroupName": name, "RetentionInDays": 30 }),
                )
                .delete_on_removal(),
            )?;
        }
        Ok(())
    }

    /// The Jenkins controller container environment: everything it needs to
    /// launch agents as sibling tasks and to deploy cross-account.
    fn container_environment(&self, network: &Network) -> Value {
        let config = self.config;
        let env = self.env;
        let private_subnet_ids = join(
            ",",
            network
                .alb_subnets
                .iter()
                .chain(&network.app_subnets)
                .map(|subnet| r#ref(subnet))
                .collect(),
        );

        let pairs: Vec<(&str, Value)> = vec![
            ("ECS_CLUSTER", get_att("Cluster", "Arn")),
            ("AWS_REGION", json!(env.region)),
            ("JENKINS_URL", json!(config.base_url())),
            (
                "JENKINS_CONTROLLER_PRIVATE_TUNNEL_URL",
                json!(format!(
                    "controller.{}:{}",
                    self.namespace_name(),
                    config.jnlp_port
                )),
            ),
            ("PRIVATE_SUBNET_IDS", private_subnet_ids),
            (
                "AGENT_ECR_IMAGE_URL",
                sub(format!(
                    "{}/{}:${{AgentImageTag}}",
                    env.registry_host(),
                    config.agent_name
                )),
            ),
            ("AGENT_SECURITY_GROUP_ID", get_att("AgentSecurityGroup", "GroupId")),
            ("AGENT_TASK_ROLE_ARN", get_att("AgentTaskRole", "Arn")),
            ("AGENT_EXECUTION_ROLE_ARN", get_att("AgentExecutionRole", "Arn")),
            ("LOG_GROUP", json!(self.agent_log_group_name())),
            ("LOG_STREAM_PREFIX", json!(config.agent_name)),
            ("DEFAULT_ACCOUNT", json!(env.account)),
            (
                "DEFAULT_ACCOUNT_JENKINS_ROLE",
                json!(arn::iam_role(env, DEPLOYMENT_ROLE)),
            ),
            ("TEAM1_APP1_DEV_WORKLOAD_ACCOUNT", r#ref("WorkloadAccountId")),
            (
                "TEAM1_APP1_DEV_WORKLOAD_JENKINS_ROLE",
                sub(format!(
                    "arn:{}:iam::${{WorkloadAccountId}}:role/{DEPLOYMENT_ROLE}",
                    env.partition
                )),
            ),
        ];

        Value::Array(
            pairs
                .into_iter()
                .map(|(name, value)| json!({ "Name": name, "Value": value }))
                .collect(),
        )
    }

    fn service(&mut self, network: &Network, certificate_arn: Value) -> Result<()> {
        let config = self.config;
        let env = self.env;

        self.template.add_resource(
            "LoadBalancer",
            Resource::new(
                "AWS::ElasticLoadBalancingV2::LoadBalancer",
                json!({
                    "Name": self.stack_name,
                    "Type": "application",
                    "Scheme": "internal",
                    "Subnets": network.alb_subnets.iter().map(|s| r#ref(s)).collect::<Vec<_>>(),
                    "SecurityGroups": [get_att("AlbSecurityGroup", "GroupId")],
                    "LoadBalancerAttributes": [
                        { "Key": "deletion_protection.enabled", "Value": "false" },
                    ],
                }),
            ),
        )?;

        self.template.add_resource(
            "TargetGroup",
            Resource::new(
                "AWS::ElasticLoadBalancingV2::TargetGroup",
                json!({
                    "VpcId": r#ref(network.vpc),
                    "Port": 80,
                    "Protocol": "HTTP",
                    "TargetType": "ip",
                    "HealthCheckPath": "/login",
                    "HealthCheckPort": CONTAINER_PORT.to_string(),
                    "TargetGroupAttributes": [
                        { "Key": "stickiness.enabled", "Value": "false" },
                    ],
                }),
            ),
        )?;

        self.template.add_resource(
            "HttpListener",
            Resource::new(
                "AWS::ElasticLoadBalancingV2::Listener",
                json!({
                    "LoadBalancerArn": r#ref("LoadBalancer"),
                    "Port": 80,
                    "Protocol": "HTTP",
                    "DefaultActions": [{
                        "Type": "redirect",
                        "RedirectConfig": {
                            "Protocol": "HTTPS",
                            "Port": "443",
                            "StatusCode": "HTTP_301",
                        },
                    }],
                }),
            ),
        )?;

        self.template.add_resource(
            "HttpsListener",
            Resource::new(
                "AWS::ElasticLoadBalancingV2::Listener",
                json!({
                    "LoadBalancerArn": r#ref("LoadBalancer"),
                    "Port": 443,
                    "Protocol": "HTTPS",
                    "SslPolicy": "ELBSecurityPolicy-TLS-1-2-Ext-2018-06",
                    "Certificates": [{ "CertificateArn": certificate_arn }],
                    "DefaultActions": [{
                        "Type": "forward",
                        "TargetGroupArn": r#ref("TargetGroup"),
                    }],
                }),
            ),
        )?;

        let admin_secret_arn = arn::secret(env, &config.admin_credential_secret);
        self.template.add_resource(
            "TaskDefinition",
            Resource::new(
                "AWS::ECS::TaskDefinition",
                json!({
                    "Family": config.controller_name,
                    "Cpu": "2048",
                    "Memory": "4096",
                    "NetworkMode": "awsvpc",
                    "RequiresCompatibilities": ["FARGATE"],
                    "ExecutionRoleArn": get_att("ControllerExecutionRole", "Arn"),
                    "TaskRoleArn": get_att("ControllerTaskRole", "Arn"),
                    "Volumes": [{
                        "Name": "jenkins-volume",
                        "EFSVolumeConfiguration": {
                            "FilesystemId": r#ref("FileSystem"),
                            "TransitEncryption": "ENABLED",
                            "AuthorizationConfig": {
                                "AccessPointId": r#ref("AccessPoint"),
                                "IAM": "ENABLED",
                            },
                        },
                    }],
                    "ContainerDefinitions": [{
                        "Name": config.controller_name,
                        "Image": sub(format!(
                            "{}/{}:${{ControllerImageTag}}",
                            env.registry_host(),
                            config.controller_name
                        )),
                        "Essential": true,
                        "PortMappings": [
                            { "ContainerPort": CONTAINER_PORT, "Protocol": "tcp" },
                            {
                                "ContainerPort": config.jnlp_port,
                                "HostPort": config.jnlp_port,
                                "Protocol": "tcp",
                            },
                        ],
                        "Environment": self.container_environment(network),
                        "Secrets": [
                            {
                                "Name": "JENKINS_USERNAME",
                                "ValueFrom": format!("{admin_secret_arn}:username::"),
                            },
                            {
                                "Name": "JENKINS_PASSWORD",
                                "ValueFrom": format!("{admin_secret_arn}:password::"),
                            },
                        ],
                        "LogConfiguration": {
                            "LogDriver": "awslogs",
                            "Options": {
                                "awslogs-group": self.controller_log_group_name(),
                                "awslogs-region": env.region,
                                "awslogs-stream-prefix": config.controller_name,
                            },
                        },
                        "MountPoints": [{
                            "ContainerPath": "/var/jenkins_home",
                            "SourceVolume": "jenkins-volume",
                            "ReadOnly": false,
                        }],
                    }],
                }),
            ),
        )?;

        self.template.add_resource(
            "DiscoveryService",
            Resource::new(
                "AWS::ServiceDiscovery::Service",
                json!({
                    "Name": "controller",
                    "NamespaceId": r#ref("CloudMapNamespace"),
                    "DnsConfig": {
                        "NamespaceId": r#ref("CloudMapNamespace"),
                        "DnsRecords": [{ "Type": "A", "TTL": 60 }],
                    },
                    "HealthCheckCustomConfig": { "FailureThreshold": 1 },
                }),
            ),
        )?;

        self.template.add_resource(
            "Service",
            Resource::new(
                "AWS::ECS::Service",
                json!({
                    "ServiceName": format!("{}-service", config.controller_name),
                    "Cluster": r#ref("Cluster"),
                    "LaunchType": "FARGATE",
                    "DesiredCount": 1,
                    "EnableExecuteCommand": true,
                    "HealthCheckGracePeriodSeconds": 300,
                    "TaskDefinition": r#ref("TaskDefinition"),
                    "NetworkConfiguration": {
                        "AwsvpcConfiguration": {
                            "AssignPublicIp": "DISABLED",
                            "Subnets": network.app_subnets.iter().map(|s| r#ref(s)).collect::<Vec<_>>(),
                            "SecurityGroups": [get_att("ControllerSecurityGroup", "GroupId")],
                        },
                    },
                    "LoadBalancers": [{
                        "ContainerName": config.controller_name,
                        "ContainerPort": CONTAINER_PORT,
                        "TargetGroupArn": r#ref("TargetGroup"),
                    }],
                    "ServiceRegistries": [{
                        "RegistryArn": get_att("DiscoveryService", "Arn"),
                        "Port": config.jnlp_port,
                    }],
                }),
            )
            .depends_on("HttpListener")
            .depends_on("HttpsListener"),
        )?;

        self.template.add_resource(
            "DnsRecord",
            Resource::new(
                "AWS::Route53::RecordSet",
                json!({
                    "HostedZoneId": r#ref("HostedZone"),
                    "Name": format!("{}.", config.domain_name()),
                    "Type": "A",
                    "AliasTarget": {
                        "DNSName": get_att("LoadBalancer", "DNSName"),
                        "HostedZoneId": get_att("LoadBalancer", "CanonicalHostedZoneID"),
                    },
                }),
            ),
        )
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use jenkins_iac_config::CertMode;
    use serde_json::json;

    pub(crate) fn test_config() -> DeployConfig {
        DeployConfig {
            jnlp_port: 50000,
            hosted_zone_name: "example.com".to_string(),
            domain_name_prefix: "jenkins-test".to_string(),
            controller_name: "jenkins-controller".to_string(),
            controller_image_tag_parameter: "/dev/jenkins/controller/docker/image/tag".to_string(),
            agent_name: "jenkins-agent".to_string(),
            agent_image_tag_parameter: "/dev/jenkins/agent/docker/image/tag".to_string(),
            admin_credential_secret: "/dev/jenkins/admin/credentials".to_string(),
            workload_account_id_parameter: "/dev/team1/workload1/AWSAccountID".to_string(),
            pca_certificate_arn_parameter: "/dev/jenkins/acmpca/certificateAuthorityArn"
                .to_string(),
            self_signed_certificate_arn_parameter: "/dev/jenkins/acm/selfSignedCertificateArn"
                .to_string(),
            private_root_ca_secret: "/dev/jenkins/rootCA".to_string(),
            cert_mode: CertMode::SelfSigned,
        }
    }

    pub(crate) fn test_env() -> Environment {
        Environment::new("123456789012", "eu-west-1")
    }

    fn infra() -> Template {
        compose_infra("jenkins-iac-dev", &test_config(), &test_env()).unwrap()
    }

    #[test]
    fn test_network_and_platform_counts() {
        let template = infra();
        assert_eq!(template.resource_count_of("AWS::EC2::VPC"), 1);
        assert_eq!(template.resource_count_of("AWS::EC2::Subnet"), 6);
        assert_eq!(template.resource_count_of("AWS::ECS::Cluster"), 1);
        assert_eq!(template.resource_count_of("AWS::EC2::SecurityGroup"), 4);
        assert_eq!(template.resource_count_of("AWS::Logs::LogGroup"), 2);
        assert_eq!(template.resource_count_of("AWS::IAM::Role"), 4);
    }

    #[test]
    fn test_security_rules_only_between_declared_pairs() {
        let template = infra();
        // agent -> controller on the JNLP port
        assert!(template.has_resource_properties(
            "AWS::EC2::SecurityGroupIngress",
            &json!({
                "GroupId": { "Fn::GetAtt": ["ControllerSecurityGroup", "GroupId"] },
                "SourceSecurityGroupId": { "Fn::GetAtt": ["AgentSecurityGroup", "GroupId"] },
                "FromPort": 50000,
                "ToPort": 50000,
            })
        ));
        // controller <-> file system on NFS
        assert!(template.has_resource_properties(
            "AWS::EC2::SecurityGroupIngress",
            &json!({
                "GroupId": { "Fn::GetAtt": ["EfsSecurityGroup", "GroupId"] },
                "FromPort": 2049,
            })
        ));
        assert!(template.has_resource_properties(
            "AWS::EC2::SecurityGroupEgress",
            &json!({
                "GroupId": { "Fn::GetAtt": ["EfsSecurityGroup", "GroupId"] },
                "DestinationSecurityGroupId": {
                    "Fn::GetAtt": ["ControllerSecurityGroup", "GroupId"],
                },
                "ToPort": 2049,
            })
        ));
        // agent egress restricted to 443
        assert!(template.has_resource_properties(
            "AWS::EC2::SecurityGroup",
            &json!({
                "GroupName": "jenkins-iac-dev-agent-sg",
                "SecurityGroupEgress": [{
                    "IpProtocol": "tcp", "FromPort": 443, "ToPort": 443,
                    "CidrIp": "0.0.0.0/0",
                    "Description": "allow outbound traffic on port 443 from Jenkins Agent",
                }],
            })
        ));
    }

    #[test]
    fn test_self_signed_mode_issues_no_certificate() {
        let template = infra();
        assert_eq!(
            template.resource_count_of("AWS::CertificateManager::Certificate"),
            0
        );
        assert!(template.parameter("SelfSignedCertificateArn").is_some());
    }

    #[test]
    fn test_acm_pca_mode_issues_exactly_one_certificate() {
        let config = DeployConfig {
            cert_mode: CertMode::AcmPca,
            ..test_config()
        };
        let template = compose_infra("jenkins-iac-dev", &config, &test_env()).unwrap();
        assert_eq!(
            template.resource_count_of("AWS::CertificateManager::Certificate"),
            1
        );
        assert!(template.has_resource_properties(
            "AWS::CertificateManager::Certificate",
            &json!({ "DomainName": "jenkins-test.example.com" })
        ));
    }

    #[test]
    fn test_service_wiring() {
        let template = infra();
        assert_eq!(template.resource_count_of("AWS::ECS::Service"), 1);
        assert!(template.has_resource_properties(
            "AWS::ECS::Service",
            &json!({
                "ServiceName": "jenkins-controller-service",
                "DesiredCount": 1,
                "HealthCheckGracePeriodSeconds": 300,
            })
        ));
        assert!(template.has_resource_properties(
            "AWS::ElasticLoadBalancingV2::TargetGroup",
            &json!({ "HealthCheckPath": "/login", "HealthCheckPort": "8080" })
        ));
        assert_eq!(
            template.resource_count_of("AWS::ElasticLoadBalancingV2::Listener"),
            2
        );
        assert!(template.has_resource_properties(
            "AWS::ElasticLoadBalancingV2::Listener",
            &json!({
                "Port": 443,
                "Protocol": "HTTPS",
                "SslPolicy": "ELBSecurityPolicy-TLS-1-2-Ext-2018-06",
            })
        ));
        assert!(template.has_resource_properties(
            "AWS::ElasticLoadBalancingV2::Listener",
            &json!({
                "Port": 80,
                "DefaultActions": [{
                    "Type": "redirect",
                    "RedirectConfig": { "Protocol": "HTTPS", "Port": "443", "StatusCode": "HTTP_301" },
                }],
            })
        ));
        assert!(template.has_resource_properties(
            "AWS::ElasticLoadBalancingV2::LoadBalancer",
            &json!({ "Scheme": "internal", "Name": "jenkins-iac-dev" })
        ));
    }

    #[test]
    fn test_dns_and_discovery() {
        let template = infra();
        assert_eq!(template.resource_count_of("AWS::Route53::RecordSet"), 1);
        assert!(template.has_resource_properties(
            "AWS::Route53::RecordSet",
            &json!({ "Name": "jenkins-test.example.com.", "Type": "A" })
        ));
        assert_eq!(
            template.resource_count_of("AWS::ServiceDiscovery::PrivateDnsNamespace"),
            1
        );
        assert!(template.has_resource_properties(
            "AWS::ServiceDiscovery::PrivateDnsNamespace",
            &json!({ "Name": "jenkins-iac-dev-private" })
        ));
        assert!(template.has_resource_properties(
            "AWS::ServiceDiscovery::Service",
            &json!({ "Name": "controller", "HealthCheckCustomConfig": { "FailureThreshold": 1 } })
        ));
    }

    #[test]
    fn test_storage() {
        let template = infra();
        assert_eq!(template.resource_count_of("AWS::EFS::FileSystem"), 1);
        assert!(template.has_resource_properties(
            "AWS::EFS::FileSystem",
            &json!({
                "Encrypted": true,
                "PerformanceMode": "generalPurpose",
                "BackupPolicy": { "Status": "ENABLED" },
            })
        ));
        assert_eq!(template.resource_count_of("AWS::EFS::AccessPoint"), 1);
        assert!(template.has_resource_properties(
            "AWS::EFS::AccessPoint",
            &json!({
                "PosixUser": { "Uid": "1000", "Gid": "1000" },
                "RootDirectory": {
                    "CreationInfo": { "OwnerUid": "1000", "OwnerGid": "1000", "Permissions": "755" },
                    "Path": "/jenkins",
                },
            })
        ));
        // The controller home survives container restarts via the EFS volume.
        assert!(template.has_resource_properties(
            "AWS::ECS::TaskDefinition",
            &json!({
                "Volumes": [{
                    "Name": "jenkins-volume",
                    "EFSVolumeConfiguration": {
                        "FilesystemId": { "Ref": "FileSystem" },
                        "TransitEncryption": "ENABLED",
                        "AuthorizationConfig": { "AccessPointId": { "Ref": "AccessPoint" }, "IAM": "ENABLED" },
                    },
                }],
            })
        ));
    }

    #[test]
    fn test_controller_task_role_scoping() {
        let template = infra();
        let (_, role) = template
            .resources_of_type("AWS::IAM::Role")
            .into_iter()
            .find(|(id, _)| *id == "ControllerTaskRole")
            .unwrap();
        let policies = role.properties["Policies"].as_array().unwrap();
        let names: Vec<&str> = policies
            .iter()
            .map(|p| p["PolicyName"].as_str().unwrap())
            .collect();
        assert_eq!(
            names,
            [
                "secrets-role",
                "ecr-role",
                "create-loggroup",
                "efs-access",
                "ssm-access",
                "launch-agent",
                "assume-role",
            ]
        );

        let ecr = &policies[1]["PolicyDocument"]["Statement"];
        assert_eq!(ecr[0]["Resource"][0], "*");
        assert_eq!(
            ecr[1]["Resource"][0],
            "arn:aws:ecr:eu-west-1:123456789012:repository/jenkins*"
        );

        let launch = &policies[5]["PolicyDocument"]["Statement"];
        assert_eq!(
            launch[2]["Condition"]["ArnEquals"]["ecs:cluster"],
            "arn:aws:ecs:eu-west-1:123456789012:cluster/jenkins-iac-dev-ecs-cluster"
        );
    }
}
