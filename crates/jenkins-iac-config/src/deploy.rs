//! The validated deployment configuration record.
//!
//! `DeployConfig` is resolved exactly once from the [`Context`] at the entry
//! point and passed by reference into every composer. Composers never reach
//! back into the raw key/value store.

use derive_more::Display;
use tracing::debug;

use crate::context::Context;
use crate::error::{ConfigError, ConfigResult};

/// Recognized context keys. Names are the contract with the deployment
/// context files and cannot change without migrating those files.
pub mod keys {
    pub const JNLP_PORT: &str = "ctxJnlpPort";
    pub const HOSTED_ZONE_NAME: &str = "ctxHostedZoneName";
    pub const DOMAIN_NAME_PREFIX: &str = "ctxJenkinsDomainNamePrefix";
    pub const CONTROLLER_NAME: &str = "ctxJenkinsControllerName";
    pub const CONTROLLER_IMAGE_TAG_PARAMETER: &str = "ctxJenkinsControllerImageTagParameterName";
    pub const AGENT_NAME: &str = "ctxJenkinsAgentName";
    pub const AGENT_IMAGE_TAG_PARAMETER: &str = "ctxJenkinsAgentImageTagParameterName";
    pub const ADMIN_CREDENTIAL_SECRET: &str = "ctxJenkinsAdminCredentialSecretName";
    pub const WORKLOAD_ACCOUNT_ID_PARAMETER: &str = "ctxDevTeam1Workload1AWSAccountIdParameterName";
    pub const PCA_CERTIFICATE_ARN_PARAMETER: &str = "ctxACMPCACertificateArnParameterName";
    pub const SELF_SIGNED_CERTIFICATE_ARN_PARAMETER: &str =
        "ctxACMSelfSignedCertificateArnParameterName";
    pub const PRIVATE_ROOT_CA_SECRET: &str = "ctxJenkinsPrivateRootCAParameterName";
    pub const CERT_MODE: &str = "ctxACMCertMode";

    pub const ALL: [&str; 13] = [
        JNLP_PORT,
        HOSTED_ZONE_NAME,
        DOMAIN_NAME_PREFIX,
        CONTROLLER_NAME,
        CONTROLLER_IMAGE_TAG_PARAMETER,
        AGENT_NAME,
        AGENT_IMAGE_TAG_PARAMETER,
        ADMIN_CREDENTIAL_SECRET,
        WORKLOAD_ACCOUNT_ID_PARAMETER,
        PCA_CERTIFICATE_ARN_PARAMETER,
        SELF_SIGNED_CERTIFICATE_ARN_PARAMETER,
        PRIVATE_ROOT_CA_SECRET,
        CERT_MODE,
    ];
}

/// Which of the two trust-issuance paths is active. There is no third state:
/// an unrecognized mode tag fails configuration resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum CertMode {
    /// Adopt an existing certificate whose ARN is kept in the parameter store.
    #[display("self-signed")]
    SelfSigned,
    /// Issue a new certificate under a private certificate authority.
    #[display("acm-pca")]
    AcmPca,
}

impl CertMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "self-signed" => Some(Self::SelfSigned),
            "acm-pca" => Some(Self::AcmPca),
            _ => None,
        }
    }
}

/// Every deployment parameter, resolved and validated.
#[derive(Debug, Clone)]
pub struct DeployConfig {
    /// Inbound port the agents use to reach the controller.
    pub jnlp_port: u16,
    /// Private DNS zone the controller is published under.
    pub hosted_zone_name: String,
    /// Host label prepended to the zone name.
    pub domain_name_prefix: String,
    /// Controller artifact (repository and container) name.
    pub controller_name: String,
    /// Parameter-store name of the controller version pointer.
    pub controller_image_tag_parameter: String,
    /// Agent artifact name.
    pub agent_name: String,
    /// Parameter-store name of the agent version pointer.
    pub agent_image_tag_parameter: String,
    /// Secret holding the controller admin username/password.
    pub admin_credential_secret: String,
    /// Parameter-store name of the workload account id used for
    /// cross-account deployments.
    pub workload_account_id_parameter: String,
    /// Parameter-store name of the private CA ARN.
    pub pca_certificate_arn_parameter: String,
    /// Parameter-store name of the pre-provisioned self-signed certificate ARN.
    pub self_signed_certificate_arn_parameter: String,
    /// Secret holding the root trust bundle baked into image builds.
    pub private_root_ca_secret: String,
    /// Selected trust-issuance path.
    pub cert_mode: CertMode,
}

impl DeployConfig {
    /// Resolve and validate the full configuration. Fails on the first
    /// offending key; no partially resolved configuration is ever returned.
    pub fn from_context(ctx: &Context) -> ConfigResult<Self> {
        let cert_mode_value = ctx.resolve_string(keys::CERT_MODE)?;
        let cert_mode =
            CertMode::parse(&cert_mode_value).ok_or_else(|| ConfigError::InvalidValue {
                field: keys::CERT_MODE.to_string(),
                message: format!(
                    "expected \"self-signed\" or \"acm-pca\", got \"{cert_mode_value}\""
                ),
            })?;

        let config = Self {
            jnlp_port: ctx.resolve_u16(keys::JNLP_PORT)?,
            hosted_zone_name: ctx.resolve_string(keys::HOSTED_ZONE_NAME)?,
            domain_name_prefix: ctx.resolve_string(keys::DOMAIN_NAME_PREFIX)?,
            controller_name: ctx.resolve_string(keys::CONTROLLER_NAME)?,
            controller_image_tag_parameter: ctx
                .resolve_string(keys::CONTROLLER_IMAGE_TAG_PARAMETER)?,
            agent_name: ctx.resolve_string(keys::AGENT_NAME)?,
            agent_image_tag_parameter: ctx.resolve_string(keys::AGENT_IMAGE_TAG_PARAMETER)?,
            admin_credential_secret: ctx.resolve_string(keys::ADMIN_CREDENTIAL_SECRET)?,
            workload_account_id_parameter: ctx
                .resolve_string(keys::WORKLOAD_ACCOUNT_ID_PARAMETER)?,
            pca_certificate_arn_parameter: ctx
                .resolve_string(keys::PCA_CERTIFICATE_ARN_PARAMETER)?,
            self_signed_certificate_arn_parameter: ctx
                .resolve_string(keys::SELF_SIGNED_CERTIFICATE_ARN_PARAMETER)?,
            private_root_ca_secret: ctx.resolve_string(keys::PRIVATE_ROOT_CA_SECRET)?,
            cert_mode,
        };
        debug!(
            domain = %config.domain_name(),
            cert_mode = %config.cert_mode,
            "deployment configuration resolved"
        );
        Ok(config)
    }

    /// `{prefix}.{zone}`
    pub fn domain_name(&self) -> String {
        format!("{}.{}", self.domain_name_prefix, self.hosted_zone_name)
    }

    /// `https://{prefix}.{zone}`
    pub fn base_url(&self) -> String {
        format!("https://{}", self.domain_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    pub fn full_context() -> Vec<(String, Value)> {
        vec![
            (keys::JNLP_PORT.to_string(), json!(50000)),
            (keys::HOSTED_ZONE_NAME.to_string(), json!("example.com")),
            (keys::DOMAIN_NAME_PREFIX.to_string(), json!("jenkins-test")),
            (keys::CONTROLLER_NAME.to_string(), json!("jenkins-controller")),
            (
                keys::CONTROLLER_IMAGE_TAG_PARAMETER.to_string(),
                json!("/dev/jenkins/controller/docker/image/tag"),
            ),
            (keys::AGENT_NAME.to_string(), json!("jenkins-agent")),
            (
                keys::AGENT_IMAGE_TAG_PARAMETER.to_string(),
                json!("/dev/jenkins/agent/docker/image/tag"),
            ),
            (
                keys::ADMIN_CREDENTIAL_SECRET.to_string(),
                json!("/dev/jenkins/admin/credentials"),
            ),
            (
                keys::WORKLOAD_ACCOUNT_ID_PARAMETER.to_string(),
                json!("/dev/team1/workload1/AWSAccountID"),
            ),
            (
                keys::PCA_CERTIFICATE_ARN_PARAMETER.to_string(),
                json!("/dev/jenkins/acmpca/certificateAuthorityArn"),
            ),
            (
                keys::SELF_SIGNED_CERTIFICATE_ARN_PARAMETER.to_string(),
                json!("/dev/jenkins/acm/selfSignedCertificateArn"),
            ),
            (keys::PRIVATE_ROOT_CA_SECRET.to_string(), json!("/dev/jenkins/rootCA")),
            (keys::CERT_MODE.to_string(), json!("self-signed")),
        ]
    }

    #[test]
    fn test_full_context_resolves() {
        let ctx: Context = full_context().into_iter().collect();
        let config = DeployConfig::from_context(&ctx).unwrap();
        assert_eq!(config.jnlp_port, 50000);
        assert_eq!(config.cert_mode, CertMode::SelfSigned);
        assert_eq!(config.domain_name(), "jenkins-test.example.com");
        assert_eq!(config.base_url(), "https://jenkins-test.example.com");
    }

    #[test]
    fn test_each_key_missing_fails_naming_the_key() {
        for missing in keys::ALL {
            let ctx: Context = full_context()
                .into_iter()
                .filter(|(key, _)| key != missing)
                .collect();
            let err = DeployConfig::from_context(&ctx).unwrap_err();
            assert!(
                matches!(&err, ConfigError::Missing(key) if key == missing),
                "expected Missing({missing}), got {err}"
            );
        }
    }

    #[test]
    fn test_each_key_placeholder_fails_naming_the_key() {
        for stale in keys::ALL {
            let ctx: Context = full_context()
                .into_iter()
                .map(|(key, value)| {
                    if key == stale {
                        (key, json!("UPDATEME"))
                    } else {
                        (key, value)
                    }
                })
                .collect();
            let err = DeployConfig::from_context(&ctx).unwrap_err();
            assert!(
                matches!(&err, ConfigError::NotUpdated(key) if key == stale),
                "expected NotUpdated({stale}), got {err}"
            );
        }
    }

    #[test]
    fn test_unrecognized_cert_mode_is_a_validation_error() {
        let ctx: Context = full_context()
            .into_iter()
            .map(|(key, value)| {
                if key == keys::CERT_MODE {
                    (key, json!("letsencrypt"))
                } else {
                    (key, value)
                }
            })
            .collect();
        let err = DeployConfig::from_context(&ctx).unwrap_err();
        assert!(matches!(
            &err,
            ConfigError::InvalidValue { field, .. } if field == keys::CERT_MODE
        ));
    }

    #[test]
    fn test_cert_mode_literals() {
        assert_eq!(CertMode::parse("self-signed"), Some(CertMode::SelfSigned));
        assert_eq!(CertMode::parse("acm-pca"), Some(CertMode::AcmPca));
        assert_eq!(CertMode::parse("SELF-SIGNED"), None);
        assert_eq!(CertMode::SelfSigned.to_string(), "self-signed");
        assert_eq!(CertMode::AcmPca.to_string(), "acm-pca");
    }
}
