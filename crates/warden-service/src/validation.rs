//! Per-field request validation
//!
//! Rules come from configuration and are compiled once; patterns that do
//! not compile are reported when the schema is built, never per request.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::LazyLock;
use warden_core::{Error, Result};
use warden_sanitize::{UrlOptions, sanitize_url};

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email pattern")
});

/// Expected shape of a field value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    #[default]
    String,
    Email,
    Url,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

/// Declarative rule for one field
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldValidation {
    pub kind: FieldKind,
    pub required: bool,
    /// Minimum length in characters (strings) or items (arrays)
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    /// Regular expression a string value must match
    pub pattern: Option<String>,
    /// Closed set of accepted string values
    pub one_of: Option<Vec<String>>,
}

impl FieldValidation {
    pub fn new(kind: FieldKind) -> Self {
        Self {
            kind,
            ..Default::default()
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn length(mut self, min: usize, max: usize) -> Self {
        self.min_length = Some(min);
        self.max_length = Some(max);
        self
    }

    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    pub fn one_of(mut self, values: &[&str]) -> Self {
        self.one_of = Some(values.iter().map(|v| v.to_string()).collect());
        self
    }

    /// Every problem with this rule, without compiling it
    pub fn problems(&self, field: &str) -> Vec<String> {
        let mut problems = Vec::new();
        if let (Some(min), Some(max)) = (self.min_length, self.max_length) {
            if min > max {
                problems.push(format!("field '{}': min_length {} exceeds max_length {}", field, min, max));
            }
        }
        if let Some(pattern) = &self.pattern {
            if let Err(e) = Regex::new(pattern) {
                problems.push(format!("field '{}': invalid pattern: {}", field, e));
            }
        }
        if self.one_of.as_ref().is_some_and(|v| v.is_empty()) {
            problems.push(format!("field '{}': one_of must not be empty", field));
        }
        problems
    }
}

#[derive(Debug, Clone)]
struct CompiledField {
    name: String,
    rule: FieldValidation,
    pattern: Option<Regex>,
}

impl CompiledField {
    fn reasons(&self, value: Option<&Value>) -> Vec<String> {
        let value = match value {
            None | Some(Value::Null) => {
                return if self.rule.required {
                    vec!["is required".to_string()]
                } else {
                    Vec::new()
                };
            }
            Some(value) => value,
        };

        let mut reasons = Vec::new();
        let kind_ok = match self.rule.kind {
            FieldKind::String => value.is_string(),
            FieldKind::Email => value.as_str().is_some_and(|s| EMAIL.is_match(s)),
            FieldKind::Url => value
                .as_str()
                .is_some_and(|s| !sanitize_url(s, &UrlOptions::default()).is_empty()),
            FieldKind::Integer => value.is_i64() || value.is_u64(),
            FieldKind::Number => value.is_number(),
            FieldKind::Boolean => value.is_boolean(),
            FieldKind::Array => value.is_array(),
            FieldKind::Object => value.is_object(),
        };
        if !kind_ok {
            reasons.push(format!("must be a valid {}", kind_name(self.rule.kind)));
            return reasons;
        }

        let length = match value {
            Value::String(s) => Some(s.chars().count()),
            Value::Array(items) => Some(items.len()),
            _ => None,
        };
        if let Some(length) = length {
            if let Some(min) = self.rule.min_length.filter(|min| length < *min) {
                reasons.push(format!("must be at least {} long", min));
            }
            if let Some(max) = self.rule.max_length.filter(|max| length > *max) {
                reasons.push(format!("must be at most {} long", max));
            }
        }

        if let Some(s) = value.as_str() {
            if let Some(pattern) = &self.pattern {
                if !pattern.is_match(s) {
                    reasons.push("has an invalid format".to_string());
                }
            }
            if let Some(allowed) = &self.rule.one_of {
                if !allowed.iter().any(|a| a == s) {
                    reasons.push(format!("must be one of: {}", allowed.join(", ")));
                }
            }
        }

        reasons
    }
}

fn kind_name(kind: FieldKind) -> &'static str {
    match kind {
        FieldKind::String => "string",
        FieldKind::Email => "email address",
        FieldKind::Url => "URL",
        FieldKind::Integer => "integer",
        FieldKind::Number => "number",
        FieldKind::Boolean => "boolean",
        FieldKind::Array => "array",
        FieldKind::Object => "object",
    }
}

/// Compiled rules for one endpoint
#[derive(Debug, Clone, Default)]
pub struct ValidationSchema {
    fields: Vec<CompiledField>,
}

impl ValidationSchema {
    /// Compile every rule; all problems are reported together
    pub fn compile(rules: &BTreeMap<String, FieldValidation>) -> Result<Self> {
        let problems: Vec<String> = rules
            .iter()
            .flat_map(|(name, rule)| rule.problems(name))
            .collect();
        if !problems.is_empty() {
            return Err(Error::Configuration(problems.join("; ")));
        }

        let mut fields = Vec::with_capacity(rules.len());
        for (name, rule) in rules {
            let pattern = match &rule.pattern {
                Some(p) => Some(Regex::new(p).map_err(|e| Error::Configuration(e.to_string()))?),
                None => None,
            };
            fields.push(CompiledField {
                name: name.clone(),
                rule: rule.clone(),
                pattern,
            });
        }
        Ok(Self { fields })
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Every failing field with its reasons, in field-name order
    pub fn violations(&self, record: &Map<String, Value>) -> Vec<(String, Vec<String>)> {
        self.fields
            .iter()
            .filter_map(|field| {
                let reasons = field.reasons(record.get(&field.name));
                (!reasons.is_empty()).then(|| (field.name.clone(), reasons))
            })
            .collect()
    }

    /// First failing field as [`Error::ValidationFailed`]
    pub fn validate(&self, record: &Map<String, Value>) -> Result<()> {
        match self.violations(record).into_iter().next() {
            Some((field, reasons)) => Err(Error::ValidationFailed { field, reasons }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> ValidationSchema {
        let mut rules = BTreeMap::new();
        rules.insert("email".to_string(), FieldValidation::new(FieldKind::Email).required());
        rules.insert(
            "title".to_string(),
            FieldValidation::new(FieldKind::String).required().length(3, 10),
        );
        rules.insert(
            "priority".to_string(),
            FieldValidation::new(FieldKind::String).one_of(&["low", "high"]),
        );
        rules.insert(
            "code".to_string(),
            FieldValidation::new(FieldKind::String).pattern(r"^[A-Z]{3}-\d+$"),
        );
        ValidationSchema::compile(&rules).unwrap()
    }

    fn record(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_valid_record() {
        let body = record(json!({"email": "a@b.co", "title": "Printer", "priority": "low", "code": "ABC-12"}));
        assert!(schema().validate(&body).is_ok());
    }

    #[test]
    fn test_violations() {
        let body = record(json!({"email": "nope", "title": "ab", "priority": "urgent", "code": "abc"}));
        let violations = schema().violations(&body);
        let fields: Vec<&str> = violations.iter().map(|(f, _)| f.as_str()).collect();
        assert_eq!(fields, vec!["code", "email", "priority", "title"]);

        let err = schema().validate(&body).unwrap_err();
        assert!(matches!(err, Error::ValidationFailed { ref field, .. } if field == "code"));
        assert_eq!(err.status_code(), 422);
    }

    #[test]
    fn test_required_and_optional() {
        let body = record(json!({"title": null}));
        let violations = schema().violations(&body);
        assert_eq!(violations.len(), 2);
        assert!(violations.iter().all(|(_, reasons)| reasons == &vec!["is required".to_string()]));
    }

    #[test]
    fn test_kinds() {
        let mut rules = BTreeMap::new();
        rules.insert("n".to_string(), FieldValidation::new(FieldKind::Integer));
        rules.insert("site".to_string(), FieldValidation::new(FieldKind::Url));
        let schema = ValidationSchema::compile(&rules).unwrap();

        assert!(schema.validate(&record(json!({"n": 3, "site": "https://example.com"}))).is_ok());
        assert!(schema.validate(&record(json!({"n": 1.5}))).is_err());
        assert!(schema.validate(&record(json!({"site": "javascript:alert(1)"}))).is_err());
    }

    #[test]
    fn test_compile_reports_every_problem() {
        let mut rules = BTreeMap::new();
        rules.insert("a".to_string(), FieldValidation::new(FieldKind::String).pattern("("));
        rules.insert("b".to_string(), FieldValidation::new(FieldKind::String).length(5, 1));
        let err = ValidationSchema::compile(&rules).unwrap_err().to_string();
        assert!(err.contains("field 'a'"));
        assert!(err.contains("field 'b'"));
    }
}
