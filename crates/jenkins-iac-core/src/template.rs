//! CloudFormation template document model.
//!
//! A [`Template`] is the declarative resource graph one composition pass
//! produces. Maps are `BTreeMap`s so repeated synthesis of the same
//! configuration serializes byte-identically; the provisioning API orders
//! resources by dependency, not by document position.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::{Error, Result};

const FORMAT_VERSION: &str = "2010-09-09";

/// A declarative resource template consumed by the provisioning API.
#[derive(Debug, Clone, Serialize)]
pub struct Template {
    #[serde(rename = "AWSTemplateFormatVersion")]
    format_version: &'static str,
    #[serde(rename = "Description", skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(rename = "Parameters", skip_serializing_if = "BTreeMap::is_empty")]
    parameters: BTreeMap<String, Parameter>,
    #[serde(rename = "Resources")]
    resources: BTreeMap<String, Resource>,
    #[serde(rename = "Outputs", skip_serializing_if = "BTreeMap::is_empty")]
    outputs: BTreeMap<String, Output>,
}

impl Template {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            description: Some(description.into()),
            parameters: BTreeMap::new(),
            resources: BTreeMap::new(),
            outputs: BTreeMap::new(),
        }
    }

    /// Add a resource under a unique logical id.
    pub fn add_resource(&mut self, logical_id: impl Into<String>, resource: Resource) -> Result<()> {
        let logical_id = logical_id.into();
        if self.resources.contains_key(&logical_id) {
            return Err(Error::DuplicateLogicalId(logical_id));
        }
        self.resources.insert(logical_id, resource);
        Ok(())
    }

    /// Add an input parameter under a unique logical id.
    pub fn add_parameter(&mut self, logical_id: impl Into<String>, parameter: Parameter) -> Result<()> {
        let logical_id = logical_id.into();
        if self.parameters.contains_key(&logical_id) {
            return Err(Error::DuplicateLogicalId(logical_id));
        }
        self.parameters.insert(logical_id, parameter);
        Ok(())
    }

    pub fn add_output(&mut self, name: impl Into<String>, output: Output) -> Result<()> {
        let name = name.into();
        if self.outputs.contains_key(&name) {
            return Err(Error::DuplicateLogicalId(name));
        }
        self.outputs.insert(name, output);
        Ok(())
    }

    pub fn resource(&self, logical_id: &str) -> Option<&Resource> {
        self.resources.get(logical_id)
    }

    pub fn output(&self, name: &str) -> Option<&Output> {
        self.outputs.get(name)
    }

    pub fn parameter(&self, logical_id: &str) -> Option<&Parameter> {
        self.parameters.get(logical_id)
    }

    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    pub fn parameter_count(&self) -> usize {
        self.parameters.len()
    }

    /// Number of resources of the given provider type.
    pub fn resource_count_of(&self, resource_type: &str) -> usize {
        self.resources_of_type(resource_type).len()
    }

    /// All resources of the given provider type, with their logical ids.
    pub fn resources_of_type(&self, resource_type: &str) -> Vec<(&str, &Resource)> {
        self.resources
            .iter()
            .filter(|(_, r)| r.resource_type == resource_type)
            .map(|(id, r)| (id.as_str(), r))
            .collect()
    }

    /// Whether some resource of the given type carries at least the given
    /// properties. Objects match key-by-key recursively, arrays element-wise
    /// with equal length, scalars by equality.
    pub fn has_resource_properties(&self, resource_type: &str, subset: &Value) -> bool {
        self.resources_of_type(resource_type)
            .iter()
            .any(|(_, r)| value_contains(&r.properties, subset))
    }

    /// Serialize the template as a pretty-printed JSON document.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Recursive subset match used by [`Template::has_resource_properties`].
fn value_contains(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Object(actual), Value::Object(expected)) => expected
            .iter()
            .all(|(key, value)| actual.get(key).is_some_and(|a| value_contains(a, value))),
        (Value::Array(actual), Value::Array(expected)) => {
            actual.len() == expected.len()
                && actual.iter().zip(expected).all(|(a, e)| value_contains(a, e))
        }
        (actual, expected) => actual == expected,
    }
}

/// One provider resource in the template.
#[derive(Debug, Clone, Serialize)]
pub struct Resource {
    #[serde(rename = "Type")]
    pub resource_type: String,
    #[serde(rename = "Properties")]
    pub properties: Value,
    #[serde(rename = "DependsOn", skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(rename = "DeletionPolicy", skip_serializing_if = "Option::is_none")]
    pub deletion_policy: Option<DeletionPolicy>,
}

impl Resource {
    pub fn new(resource_type: impl Into<String>, properties: Value) -> Self {
        Self {
            resource_type: resource_type.into(),
            properties,
            depends_on: Vec::new(),
            deletion_policy: None,
        }
    }

    pub fn depends_on(mut self, logical_id: impl Into<String>) -> Self {
        self.depends_on.push(logical_id.into());
        self
    }

    /// Delete the resource together with the stack.
    pub fn delete_on_removal(mut self) -> Self {
        self.deletion_policy = Some(DeletionPolicy::Delete);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeletionPolicy {
    Delete,
    Retain,
}

/// A template input parameter.
#[derive(Debug, Clone, Serialize)]
pub struct Parameter {
    #[serde(rename = "Type")]
    pub parameter_type: String,
    #[serde(rename = "Default", skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(rename = "Description", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Parameter {
    /// A value resolved from the external parameter store at deploy time.
    /// This is how "look up an existing parameter" is expressed in a
    /// self-contained template.
    pub fn ssm_string(parameter_name: impl Into<String>) -> Self {
        Self {
            parameter_type: "AWS::SSM::Parameter::Value<String>".to_string(),
            default: Some(Value::String(parameter_name.into())),
            description: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// A named output value of the template.
#[derive(Debug, Clone, Serialize)]
pub struct Output {
    #[serde(rename = "Value")]
    pub value: Value,
    #[serde(rename = "Description", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Output {
    pub fn new(value: Value) -> Self {
        Self { value, description: None }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// `{"Ref": logical_id}`
pub fn r#ref(logical_id: &str) -> Value {
    serde_json::json!({ "Ref": logical_id })
}

/// `{"Fn::GetAtt": [logical_id, attribute]}`
pub fn get_att(logical_id: &str, attribute: &str) -> Value {
    serde_json::json!({ "Fn::GetAtt": [logical_id, attribute] })
}

/// `{"Fn::Join": [separator, parts]}`
pub fn join(separator: &str, parts: Vec<Value>) -> Value {
    serde_json::json!({ "Fn::Join": [separator, parts] })
}

/// `{"Fn::Sub": text}`
pub fn sub(text: impl Into<String>) -> Value {
    serde_json::json!({ "Fn::Sub": text.into() })
}

/// `{"Fn::Select": [index, {"Fn::GetAZs": ""}]}`
pub fn availability_zone(index: usize) -> Value {
    serde_json::json!({ "Fn::Select": [index, { "Fn::GetAZs": "" }] })
}
