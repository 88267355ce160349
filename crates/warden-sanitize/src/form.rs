//! Per-field sanitization of form records
//!
//! Field rules are a closed enum checked when the [`FormSchema`] is built,
//! so a misconfigured field is caught at startup instead of on the first
//! request that carries it.

use crate::html::{HtmlPolicy, sanitize_html};
use crate::json::{JsonSchema, sanitize_json};
use crate::text::{
    TextOptions, UrlOptions, sanitize_email, sanitize_filename, sanitize_sql, sanitize_text,
    sanitize_url,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use warden_core::{Error, Result, SanitizationContext};

/// Longest field name kept in a sanitized record
const MAX_FIELD_NAME_LENGTH: usize = 256;

/// How a single field is sanitized
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldRule {
    Text(TextOptions),
    Html(HtmlPolicy),
    Email,
    Url(UrlOptions),
    Filename,
    Json {
        #[serde(default)]
        schema: Option<JsonSchema>,
    },
    Sql,
}

impl Default for FieldRule {
    fn default() -> Self {
        FieldRule::Text(TextOptions::default())
    }
}

impl FieldRule {
    /// Rule with default options for a context
    pub fn for_context(context: SanitizationContext) -> Self {
        match context {
            SanitizationContext::Html => FieldRule::Html(HtmlPolicy::default()),
            SanitizationContext::Text => FieldRule::Text(TextOptions::default()),
            SanitizationContext::Email => FieldRule::Email,
            SanitizationContext::Url => FieldRule::Url(UrlOptions::default()),
            SanitizationContext::Filename => FieldRule::Filename,
            SanitizationContext::Json => FieldRule::Json { schema: None },
            SanitizationContext::Sql => FieldRule::Sql,
        }
    }

    pub fn context(&self) -> SanitizationContext {
        match self {
            FieldRule::Text(_) => SanitizationContext::Text,
            FieldRule::Html(_) => SanitizationContext::Html,
            FieldRule::Email => SanitizationContext::Email,
            FieldRule::Url(_) => SanitizationContext::Url,
            FieldRule::Filename => SanitizationContext::Filename,
            FieldRule::Json { .. } => SanitizationContext::Json,
            FieldRule::Sql => SanitizationContext::Sql,
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            FieldRule::Text(options) => options.validate(),
            FieldRule::Html(policy) => policy.validate(),
            FieldRule::Url(options) => options.validate(),
            FieldRule::Json {
                schema: Some(schema),
            } => schema.validate(),
            _ => Ok(()),
        }
    }

    /// Sanitize one string under this rule
    pub fn apply_str(&self, input: &str) -> Value {
        match self {
            FieldRule::Text(options) => Value::String(sanitize_text(input, options)),
            FieldRule::Html(policy) => Value::String(sanitize_html(input, policy)),
            FieldRule::Email => Value::String(sanitize_email(input)),
            FieldRule::Url(options) => Value::String(sanitize_url(input, options)),
            FieldRule::Filename => Value::String(sanitize_filename(input)),
            FieldRule::Json { schema } => sanitize_json(input, schema.as_ref()),
            FieldRule::Sql => Value::String(sanitize_sql(input)),
        }
    }

    /// Sanitize a JSON value under this rule. Strings are cleaned, arrays and
    /// objects are walked, other scalars pass through.
    pub fn apply(&self, value: &Value) -> Value {
        match value {
            Value::String(s) => self.apply_str(s),
            Value::Array(items) => Value::Array(items.iter().map(|v| self.apply(v)).collect()),
            Value::Object(object) => match self {
                FieldRule::Json { schema } => {
                    let conforms = schema
                        .as_ref()
                        .is_none_or(|schema| schema.violations(object).is_empty());
                    if conforms {
                        Value::Object(object.clone())
                    } else {
                        Value::Null
                    }
                }
                _ => {
                    let mut cleaned = Map::new();
                    for (key, nested) in object {
                        if let Some(key) = clean_field_name(key) {
                            cleaned.insert(key, self.apply(nested));
                        }
                    }
                    Value::Object(cleaned)
                }
            },
            other => other.clone(),
        }
    }
}

fn clean_field_name(name: &str) -> Option<String> {
    let cleaned = sanitize_text(name, &TextOptions::single_line(MAX_FIELD_NAME_LENGTH));
    (!cleaned.is_empty()).then_some(cleaned)
}

/// Field name → rule table; unlisted fields use the default rule (`text`)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormSchema {
    fields: BTreeMap<String, FieldRule>,
    default_rule: FieldRule,
}

impl FormSchema {
    pub fn builder() -> FormSchemaBuilder {
        FormSchemaBuilder::default()
    }

    /// Build from an already-keyed table (configuration files)
    pub fn from_rules(rules: BTreeMap<String, FieldRule>) -> Result<Self> {
        rules
            .into_iter()
            .fold(Self::builder(), |builder, (name, rule)| builder.field(name, rule))
            .build()
    }

    pub fn rule_for(&self, field: &str) -> &FieldRule {
        self.fields.get(field).unwrap_or(&self.default_rule)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &FieldRule)> {
        self.fields.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Builder for [`FormSchema`]
#[derive(Debug, Default)]
pub struct FormSchemaBuilder {
    fields: Vec<(String, FieldRule)>,
    default_rule: Option<FieldRule>,
}

impl FormSchemaBuilder {
    pub fn field(mut self, name: impl Into<String>, rule: FieldRule) -> Self {
        self.fields.push((name.into(), rule));
        self
    }

    pub fn default_rule(mut self, rule: FieldRule) -> Self {
        self.default_rule = Some(rule);
        self
    }

    /// Validate every rule and produce the schema
    pub fn build(self) -> Result<FormSchema> {
        let mut fields = BTreeMap::new();

        for (name, rule) in self.fields {
            if name.trim().is_empty() {
                return Err(Error::Configuration("form field name is empty".into()));
            }
            rule.validate().map_err(|e| {
                Error::Configuration(format!("field '{}': {}", name, e))
            })?;
            if fields.insert(name.clone(), rule).is_some() {
                return Err(Error::Configuration(format!(
                    "form field '{}' declared twice",
                    name
                )));
            }
        }

        let default_rule = self.default_rule.unwrap_or_default();
        default_rule.validate()?;

        Ok(FormSchema {
            fields,
            default_rule,
        })
    }
}

/// Sanitize every field of a record according to its declared rule
pub fn sanitize_form_data(record: &Map<String, Value>, schema: &FormSchema) -> Map<String, Value> {
    let mut out = Map::new();
    for (name, value) in record {
        let Some(key) = clean_field_name(name) else {
            continue;
        };
        out.insert(key, schema.rule_for(name).apply(value));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::json::JsonType;
    use serde_json::json;

    fn ticket_form() -> FormSchema {
        FormSchema::builder()
            .field("title", FieldRule::Text(TextOptions::single_line(200)))
            .field("description", FieldRule::Html(HtmlPolicy::default()))
            .field("reporter_email", FieldRule::Email)
            .field("link", FieldRule::Url(UrlOptions::default()))
            .field(
                "metadata",
                FieldRule::Json {
                    schema: Some(JsonSchema::new().field("source", JsonType::String)),
                },
            )
            .build()
            .unwrap()
    }

    #[test]
    fn test_sanitize_form_data() {
        let record = json!({
            "title": "  Login\nbroken\u{0}  ",
            "description": "<p>Steps <script>x()</script></p>",
            "reporter_email": " Bob@Example.COM ",
            "link": "javascript:alert(1)",
            "metadata": "{\"source\": \"web\"}",
            "notes": "free text\u{7}",
            "count": 3,
        });
        let Value::Object(record) = record else { unreachable!() };

        let out = sanitize_form_data(&record, &ticket_form());
        assert_eq!(out["title"], "Login broken");
        assert_eq!(out["description"], "<p>Steps </p>");
        assert_eq!(out["reporter_email"], "bob@example.com");
        assert_eq!(out["link"], "");
        assert_eq!(out["metadata"], json!({"source": "web"}));
        assert_eq!(out["notes"], "free text");
        assert_eq!(out["count"], 3);
    }

    #[test]
    fn test_nested_values_use_field_rule() {
        let schema = FormSchema::builder()
            .field("emails", FieldRule::Email)
            .build()
            .unwrap();
        let Value::Object(record) = json!({
            "emails": ["A@B.CO", " c@d.co "],
            "profile": {"name": "x\u{0}y"},
        }) else {
            unreachable!()
        };

        let out = sanitize_form_data(&record, &schema);
        assert_eq!(out["emails"], json!(["a@b.co", "c@d.co"]));
        assert_eq!(out["profile"], json!({"name": "xy"}));
    }

    #[test]
    fn test_json_object_checked_against_schema() {
        let rule = FieldRule::Json {
            schema: Some(JsonSchema::new().field("n", JsonType::Number)),
        };
        assert_eq!(rule.apply(&json!({"n": 1})), json!({"n": 1}));
        assert_eq!(rule.apply(&json!({"n": "one"})), Value::Null);
        assert_eq!(rule.apply(&json!("{bad")), Value::Null);
    }

    #[test]
    fn test_schema_rejects_misconfiguration() {
        let duplicate = FormSchema::builder()
            .field("a", FieldRule::Email)
            .field("a", FieldRule::Sql)
            .build();
        assert!(duplicate.is_err());

        let bad_url = FormSchema::builder()
            .field(
                "site",
                FieldRule::Url(UrlOptions {
                    allowed_schemes: vec![],
                }),
            )
            .build();
        assert!(matches!(bad_url, Err(Error::Configuration(_))));

        let bad_text = FormSchema::builder()
            .default_rule(FieldRule::Text(TextOptions {
                max_length: 0,
                ..TextOptions::default()
            }))
            .build();
        assert!(bad_text.is_err());

        assert!(FormSchema::builder().field(" ", FieldRule::Email).build().is_err());
    }

    #[test]
    fn test_rules_from_json() {
        let rules: BTreeMap<String, FieldRule> = serde_json::from_str(
            r#"{
                "body": {"type": "html", "allowed_tags": ["b"]},
                "name": {"type": "text", "max_length": 4},
                "contact": {"type": "email"},
                "payload": {"type": "json"}
            }"#,
        )
        .unwrap();
        let schema = FormSchema::from_rules(rules).unwrap();

        assert_eq!(schema.rule_for("contact"), &FieldRule::Email);
        assert_eq!(schema.rule_for("unknown").context(), SanitizationContext::Text);
        assert_eq!(schema.rule_for("name").apply_str("abcdef"), json!("abcd"));
        assert_eq!(schema.rule_for("body").apply_str("<b>x</b><i>y</i>"), json!("<b>x</b>y"));
    }
}
