use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// One named property of a tool's parameter schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterProperty {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Schema keywords without a dedicated field (enum, items, format, ...).
    /// Passed through opaquely unless the target provider rejects them.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ParameterProperty {
    pub fn new<K: Into<String>, D: Into<String>>(kind: K, description: D) -> Self {
        Self {
            kind: Some(kind.into()),
            description: Some(description.into()),
            extra: Map::new(),
        }
    }
}

/// The parameters schema of a tool: a type, named properties and the required list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolParameters {
    #[serde(rename = "type", default = "default_parameters_type")]
    pub kind: String,
    #[serde(default)]
    pub properties: BTreeMap<String, ParameterProperty>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_parameters_type() -> String {
    "object".to_string()
}

impl Default for ToolParameters {
    fn default() -> Self {
        Self {
            kind: default_parameters_type(),
            properties: BTreeMap::new(),
            required: Vec::new(),
            extra: Map::new(),
        }
    }
}

impl ToolParameters {
    pub fn with_property<N: Into<String>>(
        mut self,
        name: N,
        property: ParameterProperty,
        required: bool,
    ) -> Self {
        let name = name.into();
        if required {
            self.required.push(name.clone());
        }
        self.properties.insert(name, property);
        self
    }

    /// The schema as a JSON value, extra keywords included.
    pub fn to_json_schema(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| Value::Object(Map::new()))
    }
}

/// A tool that can be used by a model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tool {
    /// The name of the tool
    pub name: String,
    /// A description of what the tool does
    #[serde(default)]
    pub description: String,
    /// Parameters that the tool accepts
    #[serde(default)]
    pub parameters: ToolParameters,
}

impl Tool {
    /// Create a new tool with the given name and description
    pub fn new<N, D>(name: N, description: D, parameters: ToolParameters) -> Self
    where
        N: Into<String>,
        D: Into<String>,
    {
        Tool {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}
