//! IAM policy document and role composition.

use serde_json::{Value, json};

use crate::template::Resource;

const POLICY_VERSION: &str = "2012-10-17";

/// One statement of a policy document, built up fluently:
///
/// ```
/// use jenkins_iac_core::iam::PolicyStatement;
///
/// let statement = PolicyStatement::allow()
///     .actions(["logs:CreateLogGroup", "logs:PutLogEvents"])
///     .resources(["arn:aws:logs:eu-west-1:123456789012:log-group/*"]);
/// assert_eq!(statement.to_value()["Effect"], "Allow");
/// ```
#[derive(Debug, Clone)]
pub struct PolicyStatement {
    effect: &'static str,
    actions: Vec<String>,
    resources: Vec<Value>,
    condition: Option<Value>,
}

impl PolicyStatement {
    pub fn allow() -> Self {
        Self {
            effect: "Allow",
            actions: Vec::new(),
            resources: Vec::new(),
            condition: None,
        }
    }

    pub fn actions<I, S>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.actions.extend(actions.into_iter().map(Into::into));
        self
    }

    pub fn resources<I, V>(mut self, resources: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.resources.extend(resources.into_iter().map(Into::into));
        self
    }

    /// Some actions cannot be scoped to a resource at all.
    pub fn any_resource(mut self) -> Self {
        self.resources.push(Value::String("*".to_string()));
        self
    }

    /// Attach a condition, e.g. `ArnEquals` on `ecs:cluster`.
    pub fn condition(mut self, operator: &str, key: &str, value: impl Into<Value>) -> Self {
        self.condition = Some(json!({ operator: { key: value.into() } }));
        self
    }

    pub fn to_value(&self) -> Value {
        let mut statement = json!({
            "Effect": self.effect,
            "Action": self.actions,
            "Resource": self.resources,
        });
        if let Some(condition) = &self.condition {
            statement["Condition"] = condition.clone();
        }
        statement
    }
}

/// An inline policy document: a named, ordered list of statements.
#[derive(Debug, Clone)]
pub struct PolicyDocument {
    statements: Vec<PolicyStatement>,
}

impl PolicyDocument {
    pub fn new(statements: impl IntoIterator<Item = PolicyStatement>) -> Self {
        Self {
            statements: statements.into_iter().collect(),
        }
    }

    pub fn to_value(&self) -> Value {
        json!({
            "Version": POLICY_VERSION,
            "Statement": self.statements.iter().map(PolicyStatement::to_value).collect::<Vec<_>>(),
        })
    }
}

/// Assembles an `AWS::IAM::Role` resource from its parts.
#[derive(Debug, Clone)]
pub struct RoleSpec {
    role_name: Option<String>,
    description: Option<String>,
    service_principal: String,
    managed_policy_arns: Vec<String>,
    inline_policies: Vec<(String, PolicyDocument)>,
}

impl RoleSpec {
    /// A role assumable by the given service principal
    /// (e.g. "ecs-tasks.amazonaws.com").
    pub fn assumed_by(service_principal: impl Into<String>) -> Self {
        Self {
            role_name: None,
            description: None,
            service_principal: service_principal.into(),
            managed_policy_arns: Vec::new(),
            inline_policies: Vec::new(),
        }
    }

    pub fn role_name(mut self, name: impl Into<String>) -> Self {
        self.role_name = Some(name.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn managed_policy(mut self, arn: impl Into<String>) -> Self {
        self.managed_policy_arns.push(arn.into());
        self
    }

    pub fn inline_policy(mut self, name: impl Into<String>, document: PolicyDocument) -> Self {
        self.inline_policies.push((name.into(), document));
        self
    }

    pub fn into_resource(self) -> Resource {
        let mut properties = json!({
            "AssumeRolePolicyDocument": {
                "Version": POLICY_VERSION,
                "Statement": [{
                    "Effect": "Allow",
                    "Principal": { "Service": self.service_principal },
                    "Action": "sts:AssumeRole",
                }],
            },
        });
        if let Some(name) = self.role_name {
            properties["RoleName"] = Value::String(name);
        }
        if let Some(description) = self.description {
            properties["Description"] = Value::String(description);
        }
        if !self.managed_policy_arns.is_empty() {
            properties["ManagedPolicyArns"] = json!(self.managed_policy_arns);
        }
        if !self.inline_policies.is_empty() {
            properties["Policies"] = Value::Array(
                self.inline_policies
                    .into_iter()
                    .map(|(name, document)| {
                        json!({ "PolicyName": name, "PolicyDocument": document.to_value() })
                    })
                    .collect(),
            );
        }
        Resource::new("AWS::IAM::Role", properties)
    }
}
