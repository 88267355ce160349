//! JSON input parsing with shallow schema conformance

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use warden_core::{Error, Result};

/// Expected JSON type of a top-level key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JsonType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
    Null,
    Any,
}

impl JsonType {
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            JsonType::String => value.is_string(),
            JsonType::Number => value.is_number(),
            JsonType::Integer => value.is_i64() || value.is_u64(),
            JsonType::Boolean => value.is_boolean(),
            JsonType::Array => value.is_array(),
            JsonType::Object => value.is_object(),
            JsonType::Null => value.is_null(),
            JsonType::Any => true,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JsonType::String => "string",
            JsonType::Number => "number",
            JsonType::Integer => "integer",
            JsonType::Boolean => "boolean",
            JsonType::Array => "array",
            JsonType::Object => "object",
            JsonType::Null => "null",
            JsonType::Any => "any",
        }
    }
}

/// Shallow key → type schema for JSON objects
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JsonSchema {
    pub fields: BTreeMap<String, JsonType>,
    pub required: BTreeSet<String>,
}

impl JsonSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare the type of a key
    pub fn field(mut self, name: impl Into<String>, kind: JsonType) -> Self {
        self.fields.insert(name.into(), kind);
        self
    }

    /// Declare a key that must be present
    pub fn required(mut self, name: impl Into<String>) -> Self {
        self.required.insert(name.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        for name in &self.required {
            if !self.fields.contains_key(name) {
                return Err(Error::Configuration(format!(
                    "required JSON key '{}' has no declared type",
                    name
                )));
            }
        }
        Ok(())
    }

    /// Every problem with `object`, empty when it conforms
    pub fn violations(&self, object: &Map<String, Value>) -> Vec<String> {
        let mut problems = Vec::new();

        for name in &self.required {
            if !object.contains_key(name) {
                problems.push(format!("missing required key '{}'", name));
            }
        }

        for (name, kind) in &self.fields {
            if let Some(value) = object.get(name) {
                if !kind.matches(value) {
                    problems.push(format!("key '{}' is not of type {}", name, kind.as_str()));
                }
            }
        }

        problems
    }
}

/// Parse a JSON object, checking it against an optional schema
pub fn parse_json(input: &str, schema: Option<&JsonSchema>) -> Result<Map<String, Value>> {
    let value: Value = serde_json::from_str(input)
        .map_err(|e| Error::Sanitization(format!("malformed JSON: {}", e)))?;

    let Value::Object(object) = value else {
        return Err(Error::Sanitization("JSON input is not an object".into()));
    };

    if let Some(schema) = schema {
        let problems = schema.violations(&object);
        if !problems.is_empty() {
            return Err(Error::Sanitization(problems.join("; ")));
        }
    }

    Ok(object)
}

/// Like [`parse_json`], but yields `null` instead of an error
pub fn sanitize_json(input: &str, schema: Option<&JsonSchema>) -> Value {
    match parse_json(input, schema) {
        Ok(object) => Value::Object(object),
        Err(e) => {
            tracing::debug!(error = %e, "Discarded JSON input");
            Value::Null
        }
    }
}
