//! The tool descriptor and argument validation
//!
//! One tool is exposed. Its descriptor is built once from configuration and
//! shared read-only; call arguments are checked against the descriptor's own
//! parameter schema before anything else runs.

use super::protocol::ProtocolError;
use crate::config::Config;
use crate::search::ContentKind;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// Name of the query parameter
pub const PARAM_QUERY: &str = "query";
/// Name of the result-count parameter
pub const PARAM_NUM_RESULTS: &str = "num_results";
/// Name of the content-kind filter parameter
pub const PARAM_FILTER: &str = "filter";

/// JSON type of a parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    /// JSON string
    String,
    /// JSON integer
    Integer,
}

/// Schema for one parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    /// JSON type
    #[serde(rename = "type")]
    pub param_type: ParamType,
    /// Human description
    pub description: String,
    /// Value used when the caller omits the parameter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Inclusive lower bound for integers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<i64>,
    /// Inclusive upper bound for integers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<i64>,
    /// Allowed values for strings
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<String>>,
}

/// Parameter schema in JSON Schema object form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSchema {
    /// Always `object`
    #[serde(rename = "type")]
    pub schema_type: String,
    /// Parameters by name
    pub properties: BTreeMap<String, ParameterSpec>,
    /// Names of required parameters
    pub required: Vec<String>,
}

/// Metadata describing the exposed tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    /// Tool name
    pub name: String,
    /// Human description
    pub description: String,
    /// Parameter schema
    pub input_schema: InputSchema,
}

/// Validated `call_tool` arguments
#[derive(Debug, Clone, PartialEq)]
pub struct SearchArgs {
    /// Trimmed, non-empty query
    pub query: String,
    /// Requested result count, within the schema bounds
    pub num_results: usize,
    /// Optional content-kind restriction
    pub filter: Option<ContentKind>,
}

impl ToolDescriptor {
    /// Build the search tool descriptor
    pub fn search(
        name: impl Into<String>,
        description: impl Into<String>,
        default_results: u32,
        max_results: u32,
    ) -> Self {
        let mut properties = BTreeMap::new();
        properties.insert(
            PARAM_QUERY.to_string(),
            ParameterSpec {
                param_type: ParamType::String,
                description: "Search query".to_string(),
                default: None,
                minimum: None,
                maximum: None,
                allowed: None,
            },
        );
        properties.insert(
            PARAM_NUM_RESULTS.to_string(),
            ParameterSpec {
                param_type: ParamType::Integer,
                description: format!("Number of results to return (default: {})", default_results),
                default: Some(json!(default_results)),
                minimum: Some(1),
                maximum: Some(i64::from(max_results)),
                allowed: None,
            },
        );
        properties.insert(
            PARAM_FILTER.to_string(),
            ParameterSpec {
                param_type: ParamType::String,
                description: "Restrict results to code examples or prose".to_string(),
                default: None,
                minimum: None,
                maximum: None,
                allowed: Some(vec![
                    ContentKind::Code.as_str().to_string(),
                    ContentKind::Text.as_str().to_string(),
                ]),
            },
        );

        Self {
            name: name.into(),
            description: description.into(),
            input_schema: InputSchema {
                schema_type: "object".to_string(),
                properties,
                required: vec![PARAM_QUERY.to_string()],
            },
        }
    }

    /// Build the descriptor described by configuration
    pub fn from_config(config: &Config) -> Self {
        Self::search(
            config.tool.name.clone(),
            config.tool.description.clone(),
            config.search.default_results,
            config.search.max_results,
        )
    }

    /// Validate `call_tool` params: tool name, then arguments.
    ///
    /// Accepts `name`/`arguments` as well as the older `tool`/`args` keys.
    pub fn validate_call(&self, params: &Value) -> Result<SearchArgs, ProtocolError> {
        let params = match params {
            Value::Object(map) => map,
            Value::Null => return Err(ProtocolError::invalid_arguments("Missing params")),
            _ => return Err(ProtocolError::invalid_arguments("Params must be an object")),
        };

        let name = params
            .get("name")
            .or_else(|| params.get("tool"))
            .and_then(Value::as_str)
            .ok_or_else(|| ProtocolError::invalid_arguments("Missing tool name"))?;

        if name != self.name {
            return Err(ProtocolError::invalid_arguments(format!("Unknown tool: {}", name)));
        }

        let empty = Value::Object(Map::new());
        let arguments = params
            .get("arguments")
            .or_else(|| params.get("args"))
            .unwrap_or(&empty);

        self.validate_arguments(arguments)
    }

    /// Validate tool arguments against the parameter schema
    pub fn validate_arguments(&self, arguments: &Value) -> Result<SearchArgs, ProtocolError> {
        let arguments = match arguments {
            Value::Object(map) => map.clone(),
            Value::Null => Map::new(),
            _ => return Err(ProtocolError::invalid_arguments("Arguments must be an object")),
        };

        let present = |key: &str| arguments.get(key).filter(|v| !v.is_null());

        for key in &self.input_schema.required {
            if present(key).is_none() {
                return Err(ProtocolError::invalid_arguments(format!(
                    "Missing required argument: {}",
                    key
                )));
            }
        }

        for (key, spec) in &self.input_schema.properties {
            if let Some(value) = present(key) {
                check_value(key, spec, value)?;
            }
        }

        let query = present(PARAM_QUERY)
            .and_then(Value::as_str)
            .map(str::trim)
            .unwrap_or_default();
        if query.is_empty() {
            return Err(ProtocolError::invalid_arguments("query must not be empty"));
        }

        let num_results = present(PARAM_NUM_RESULTS)
            .or_else(|| self.param(PARAM_NUM_RESULTS).and_then(|s| s.default.as_ref()))
            .and_then(Value::as_u64)
            .ok_or_else(|| ProtocolError::internal("num_results has no usable default"))?;

        let filter = match present(PARAM_FILTER).and_then(Value::as_str) {
            None | Some("") => None,
            Some(kind) => Some(
                kind.parse::<ContentKind>()
                    .map_err(|e| ProtocolError::invalid_arguments(e.to_string()))?,
            ),
        };

        Ok(SearchArgs {
            query: query.to_string(),
            num_results: num_results as usize,
            filter,
        })
    }

    fn param(&self, key: &str) -> Option<&ParameterSpec> {
        self.input_schema.properties.get(key)
    }
}

fn check_value(key: &str, spec: &ParameterSpec, value: &Value) -> Result<(), ProtocolError> {
    match spec.param_type {
        ParamType::String => {
            let s = value.as_str().ok_or_else(|| {
                ProtocolError::invalid_arguments(format!("{} must be a string", key))
            })?;
            if let Some(allowed) = &spec.allowed {
                // empty string means "not set" for optional enumerations
                if !s.is_empty() && !allowed.iter().any(|a| a == s) {
                    return Err(ProtocolError::invalid_arguments(format!(
                        "{} must be one of {}, got {:?}",
                        key,
                        allowed.join(", "),
                        s
                    )));
                }
            }
        }
        ParamType::Integer => {
            let n = value.as_i64().ok_or_else(|| {
                ProtocolError::invalid_arguments(format!("{} must be an integer", key))
            })?;
            if let Some(min) = spec.minimum {
                if n < min {
                    return Err(ProtocolError::invalid_arguments(format!(
                        "{} must be at least {}, got {}",
                        key, min, n
                    )));
                }
            }
            if let Some(max) = spec.maximum {
                if n > max {
                    return Err(ProtocolError::invalid_arguments(format!(
                        "{} must be at most {}, got {}",
                        key, max, n
                    )));
                }
            }
        }
    }
    Ok(())
}
