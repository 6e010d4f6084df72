//! Certificate strategy: exactly one of two trust-issuance paths.

use serde_json::{Value, json};

use jenkins_iac_config::{CertMode, DeployConfig};
use jenkins_iac_core::template::r#ref;
use jenkins_iac_core::{Parameter, Resource, Result, Template};

const SELF_SIGNED_PARAMETER_ID: &str = "SelfSignedCertificateArn";
const PCA_AUTHORITY_PARAMETER_ID: &str = "CertificateAuthorityArn";
const CERTIFICATE_ID: &str = "Certificate";

/// The selected trust-issuance path, carrying exactly the data its branch
/// needs. Selected once from the configuration; there is no runtime
/// switching and no third state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertificateStrategy {
    /// Adopt a pre-provisioned certificate as-is; its ARN is looked up from
    /// the external parameter store. No issuance happens.
    SelfSigned { arn_parameter: String },
    /// Issue a new certificate for the domain under the private CA whose ARN
    /// is looked up from the external parameter store.
    PrivateCa {
        authority_arn_parameter: String,
        domain_name: String,
    },
}

impl CertificateStrategy {
    pub fn from_config(config: &DeployConfig) -> Self {
        match config.cert_mode {
            CertMode::SelfSigned => Self::SelfSigned {
                arn_parameter: config.self_signed_certificate_arn_parameter.clone(),
            },
            CertMode::AcmPca => Self::PrivateCa {
                authority_arn_parameter: config.pca_certificate_arn_parameter.clone(),
                domain_name: config.domain_name(),
            },
        }
    }

    /// Add the branch's lookup parameter (and, for the CA branch, the issued
    /// certificate) to the template. Returns the certificate ARN expression
    /// the TLS listener consumes.
    pub fn apply(&self, template: &mut Template) -> Result<Value> {
        match self {
            Self::SelfSigned { arn_parameter } => {
                template.add_parameter(
                    SELF_SIGNED_PARAMETER_ID,
                    Parameter::ssm_string(arn_parameter)
                        .description("ARN of the pre-provisioned self-signed certificate"),
                )?;
                Ok(r#ref(SELF_SIGNED_PARAMETER_ID))
            }
            Self::PrivateCa {
                authority_arn_parameter,
                domain_name,
            } => {
                template.add_parameter(
                    PCA_AUTHORITY_PARAMETER_ID,
                    Parameter::ssm_string(authority_arn_parameter)
                        .description("ARN of the private certificate authority"),
                )?;
                template.add_resource(
                    CERTIFICATE_ID,
                    Resource::new(
                        "AWS::CertificateManager::Certificate",
                        json!({
                            "DomainName": domain_name,
                            "CertificateAuthorityArn": r#ref(PCA_AUTHORITY_PARAMETER_ID),
                        }),
                    ),
                )?;
                Ok(r#ref(CERTIFICATE_ID))
            }
        }
    }
}
