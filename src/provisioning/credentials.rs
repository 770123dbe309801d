/// Validation of user-submitted credential fields against a service's form schema

use crate::store::types::{CredentialSchema, FieldKind};
use serde::Serialize;
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;

/// Per-field error messages, keyed by field name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(pub BTreeMap<String, String>);

impl FieldErrors {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    fn add(&mut self, field: &str, message: &str) {
        self.0.insert(field.to_string(), message.to_string());
    }
}

const REQUIRED: &str = "This field is required.";

/// Check submitted values against the schema and normalize them
///
/// Returns only the fields the schema knows about. Every field is checked so
/// all problems are reported at once.
pub fn validate_credentials(
    schema: &CredentialSchema,
    submitted: &Map<String, Value>,
) -> Result<Map<String, Value>, FieldErrors> {
    let mut cleaned = Map::new();
    let mut errors = FieldErrors::default();

    for (name, field) in schema {
        let value = submitted.get(name).filter(|v| !is_blank(v));

        let Some(value) = value else {
            if field.required {
                errors.add(name, REQUIRED);
            }
            continue;
        };

        match clean_value(field.kind, value) {
            Ok(Value::Bool(false)) if field.required && field.kind == FieldKind::Checkbox => {
                errors.add(name, REQUIRED);
            }
            Ok(cleaned_value) => {
                cleaned.insert(name.clone(), cleaned_value);
            }
            Err(message) => errors.add(name, message),
        }
    }

    if errors.is_empty() {
        Ok(cleaned)
    } else {
        Err(errors)
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn clean_value(kind: FieldKind, value: &Value) -> Result<Value, &'static str> {
    match kind {
        FieldKind::Number => match value {
            Value::Number(_) => Ok(value.clone()),
            Value::String(s) => parse_number(s.trim()).ok_or("Enter a number."),
            _ => Err("Enter a number."),
        },
        FieldKind::Checkbox => match value {
            Value::Bool(_) => Ok(value.clone()),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "on" | "1" | "yes" => Ok(Value::Bool(true)),
                "false" | "off" | "0" | "no" => Ok(Value::Bool(false)),
                _ => Err("Enter true or false."),
            },
            _ => Err("Enter true or false."),
        },
        FieldKind::Email => {
            let text = value.as_str().map(str::trim).ok_or("Enter a valid email address.")?;
            match text.split_once('@') {
                Some((local, domain)) if !local.is_empty() && !domain.is_empty() && !domain.contains('@') => {
                    Ok(Value::String(text.to_string()))
                }
                _ => Err("Enter a valid email address."),
            }
        }
        FieldKind::Url => {
            let text = value.as_str().map(str::trim).ok_or("Enter a valid URL.")?;
            match url::Url::parse(text) {
                Ok(parsed) if parsed.has_host() => Ok(Value::String(text.to_string())),
                _ => Err("Enter a valid URL."),
            }
        }
        FieldKind::Text | FieldKind::Password | FieldKind::Textarea | FieldKind::Other => match value {
            Value::String(_) => Ok(value.clone()),
            Value::Number(n) => Ok(Value::String(n.to_string())),
            Value::Bool(b) => Ok(Value::String(b.to_string())),
            _ => Err("Enter a text value."),
        },
    }
}

fn parse_number(text: &str) -> Option<Value> {
    if let Ok(int) = text.parse::<i64>() {
        return Some(Value::Number(int.into()));
    }
    text.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
}
