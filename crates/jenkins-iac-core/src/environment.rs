//! The deployment target identity.

use serde::{Deserialize, Serialize};

/// The account, region and partition a template is composed for.
///
/// Resolved once at the entry point and passed by reference into every
/// composer, so a template never depends on where the tool happens to run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    /// Twelve-digit account identifier.
    pub account: String,
    /// Region code (e.g. "eu-west-1").
    pub region: String,
    /// Partition, almost always "aws".
    pub partition: String,
}

impl Environment {
    /// Create an environment in the default "aws" partition.
    pub fn new(account: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            region: region.into(),
            partition: "aws".to_string(),
        }
    }

    pub fn with_partition(mut self, partition: impl Into<String>) -> Self {
        self.partition = partition.into();
        self
    }

    /// Hostname of the private container registry in this environment.
    pub fn registry_host(&self) -> String {
        format!("{}.dkr.ecr.{}.amazonaws.com", self.account, self.region)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_host() {
        let env = Environment::new("123456789012", "eu-west-1");
        assert_eq!(env.registry_host(), "123456789012.dkr.ecr.eu-west-1.amazonaws.com");
        assert_eq!(env.partition, "aws");
    }
}
