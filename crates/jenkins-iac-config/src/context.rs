//! The externally supplied configuration context.

use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{ConfigError, ConfigResult};

/// The reserved sentinel shipped in context templates; any key still holding
/// it fails resolution.
pub const PLACEHOLDER: &str = "UPDATEME";

/// A read-only key/value store supplied by the calling environment at
/// invocation time. Values keep whatever primitive type the environment
/// supplied (string or number).
#[derive(Debug, Clone, Default)]
pub struct Context {
    values: BTreeMap<String, Value>,
}

impl Context {
    /// Build a context from a parsed JSON object.
    pub fn from_value(value: Value) -> ConfigResult<Self> {
        match value {
            Value::Object(map) => Ok(Self {
                values: map.into_iter().collect(),
            }),
            other => Err(ConfigError::InvalidValue {
                field: "context".to_string(),
                message: format!("expected a JSON object, got {other}"),
            }),
        }
    }

    /// Read a context from a JSON file on disk.
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_value(serde_json::from_str(&text)?)
    }

    /// Resolve a named configuration value.
    ///
    /// Failure conditions, in order: the value still holds the reserved
    /// placeholder; the value is absent, null, or an empty string. Pure
    /// lookup, no caching.
    pub fn resolve(&self, key: &str) -> ConfigResult<&Value> {
        match self.values.get(key) {
            Some(Value::String(s)) if s == PLACEHOLDER => {
                Err(ConfigError::NotUpdated(key.to_string()))
            }
            None | Some(Value::Null) => Err(ConfigError::Missing(key.to_string())),
            Some(Value::String(s)) if s.is_empty() => Err(ConfigError::Missing(key.to_string())),
            Some(value) => Ok(value),
        }
    }

    pub fn resolve_string(&self, key: &str) -> ConfigResult<String> {
        match self.resolve(key)? {
            Value::String(s) => Ok(s.clone()),
            other => Err(ConfigError::InvalidValue {
                field: key.to_string(),
                message: format!("expected a string, got {other}"),
            }),
        }
    }

    pub fn resolve_u16(&self, key: &str) -> ConfigResult<u16> {
        let value = self.resolve(key)?;
        let parsed = match value {
            Value::Number(n) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
            Value::String(s) => s.parse().ok(),
            _ => None,
        };
        parsed.ok_or_else(|| ConfigError::InvalidValue {
            field: key.to_string(),
            message: format!("expected a port number, got {value}"),
        })
    }
}

impl FromIterator<(String, Value)> for Context {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context() -> Context {
        Context::from_value(json!({
            "ctxJnlpPort": 50000,
            "ctxHostedZoneName": "example.com",
            "ctxJenkinsAgentName": "UPDATEME",
            "ctxJenkinsControllerName": "",
            "ctxACMCertMode": null,
        }))
        .unwrap()
    }

    #[test]
    fn test_resolve_present_values() {
        let ctx = context();
        assert_eq!(ctx.resolve_string("ctxHostedZoneName").unwrap(), "example.com");
        assert_eq!(ctx.resolve_u16("ctxJnlpPort").unwrap(), 50000);
    }

    #[test]
    fn test_placeholder_fails_as_not_updated() {
        let err = context().resolve("ctxJenkinsAgentName").unwrap_err();
        assert!(matches!(err, ConfigError::NotUpdated(key) if key == "ctxJenkinsAgentName"));
    }

    #[test]
    fn test_empty_null_and_absent_fail_as_missing() {
        let ctx = context();
        for key in ["ctxJenkinsControllerName", "ctxACMCertMode", "ctxNoSuchKey"] {
            let err = ctx.resolve(key).unwrap_err();
            assert!(matches!(err, ConfigError::Missing(k) if k == key), "key {key}");
        }
    }

    #[test]
    fn test_port_from_numeric_string() {
        let ctx: Context = [("port".to_string(), json!("50000"))].into_iter().collect();
        assert_eq!(ctx.resolve_u16("port").unwrap(), 50000);
    }

    #[test]
    fn test_port_out_of_range_is_invalid() {
        let ctx: Context = [("port".to_string(), json!(70000))].into_iter().collect();
        let err = ctx.resolve_u16("port").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { field, .. } if field == "port"));
    }

    #[test]
    fn test_non_object_context_rejected() {
        assert!(Context::from_value(json!(["not", "an", "object"])).is_err());
    }
}
