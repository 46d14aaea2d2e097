//! Declared parameter schemas for tools.
//!
//! A [`ParameterSchema`] is the JSON-Schema object a provider sees for a
//! tool's arguments. It is built explicitly rather than reflected from a
//! function signature.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ToolError;

/// JSON-Schema description of a single parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertySchema {
    /// JSON type name (`string`, `number`, `integer`, `boolean`, `array`, `object`).
    #[serde(rename = "type")]
    pub kind: String,
    /// What the parameter means.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Allowed values, if constrained.
    #[serde(default, rename = "enum", skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<Value>>,
    /// Element schema for arrays.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<PropertySchema>>,
}

impl PropertySchema {
    /// Create a property of the given JSON type.
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            description: None,
            allowed: None,
            items: None,
        }
    }

    /// A string property.
    #[must_use]
    pub fn string(description: impl Into<String>) -> Self {
        Self::new("string").describe(description)
    }

    /// A floating point property.
    #[must_use]
    pub fn number(description: impl Into<String>) -> Self {
        Self::new("number").describe(description)
    }

    /// An integer property.
    #[must_use]
    pub fn integer(description: impl Into<String>) -> Self {
        Self::new("integer").describe(description)
    }

    /// A boolean property.
    #[must_use]
    pub fn boolean(description: impl Into<String>) -> Self {
        Self::new("boolean").describe(description)
    }

    /// An array property whose elements follow `items`.
    #[must_use]
    pub fn array(description: impl Into<String>, items: Self) -> Self {
        Self {
            items: Some(Box::new(items)),
            ..Self::new("array").describe(description)
        }
    }

    /// Set the description.
    #[must_use]
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Restrict the property to a fixed set of values.
    #[must_use]
    pub fn one_of<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.allowed = Some(values.into_iter().map(Into::into).collect());
        self
    }
}

/// JSON-Schema object describing a tool's arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSchema {
    /// Always `object` for tool parameters.
    #[serde(rename = "type")]
    pub kind: String,
    /// Declared parameters keyed by name.
    #[serde(default)]
    pub properties: BTreeMap<String, PropertySchema>,
    /// Names of parameters that must be present.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
}

impl Default for ParameterSchema {
    fn default() -> Self {
        Self::object()
    }
}

impl ParameterSchema {
    /// An empty object schema.
    #[must_use]
    pub fn object() -> Self {
        Self {
            kind: "object".to_owned(),
            properties: BTreeMap::new(),
            required: Vec::new(),
        }
    }

    /// Declare an optional parameter.
    #[must_use]
    pub fn property(mut self, name: impl Into<String>, schema: PropertySchema) -> Self {
        self.properties.insert(name.into(), schema);
        self
    }

    /// Declare a required parameter.
    #[must_use]
    pub fn required_property(mut self, name: impl Into<String>, schema: PropertySchema) -> Self {
        let name = name.into();
        if !self.required.contains(&name) {
            self.required.push(name.clone());
        }
        self.properties.insert(name, schema);
        self
    }

    /// Check that the schema is well formed.
    ///
    /// # Errors
    ///
    /// Fails when the type is not `object` or a required name is not a
    /// declared property.
    pub fn validate(&self) -> Result<(), ToolError> {
        if self.kind != "object" {
            return Err(ToolError::invalid_definition(format!(
                "parameter schema must be an object, got '{}'",
                self.kind
            )));
        }
        if let Some(missing) = self
            .required
            .iter()
            .find(|name| !self.properties.contains_key(*name))
        {
            return Err(ToolError::invalid_definition(format!(
                "required parameter '{missing}' is not declared"
            )));
        }
        Ok(())
    }

    /// Check that `args` supplies every required parameter.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::InvalidArguments`] naming the first missing parameter.
    pub fn check_arguments(&self, args: &Map<String, Value>) -> Result<(), ToolError> {
        match self.required.iter().find(|name| !args.contains_key(*name)) {
            Some(missing) => Err(ToolError::invalid_args(format!(
                "missing required parameter '{missing}'"
            ))),
            None => Ok(()),
        }
    }

    /// Render as a JSON value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| Value::Object(Map::new()))
    }
}
