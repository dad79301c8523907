use serde_json::{Map, Value};

use crate::{
    error::{ValidationError, Violation},
    schema::{ObjectSchema, Schema, StringFormat, dashboard_schema},
};

pub(crate) const ENV_PREFIX: &str = "$ENV:";

/// Checks `document` against `schema`, reporting every violation rather than the first.
pub fn validate(document: &Value, schema: &Schema) -> Result<(), ValidationError> {
    let mut violations = Vec::new();
    check(document, schema, "", &mut violations);

    if violations.is_empty() {
        Ok(())
    } else {
        log::debug!("document failed validation with {} violation(s)", violations.len());
        Err(ValidationError { violations })
    }
}

pub fn validate_dashboard(document: &Value) -> Result<(), ValidationError> {
    validate(document, &dashboard_schema())
}

fn check(value: &Value, schema: &Schema, path: &str, violations: &mut Vec<Violation>) {
    match (schema, value) {
        (Schema::String { allowed, format }, Value::String(text)) => {
            if let Some(allowed) = allowed {
                if !allowed.iter().any(|candidate| *candidate == text.as_str()) {
                    violations.push(Violation::new(
                        path,
                        format!("'{text}' is not one of: {}", allowed.join(", ")),
                    ));
                }
                return;
            }
            check_format(text, *format, path, violations);
        }
        (Schema::Number { minimum }, Value::Number(number)) => {
            if let (Some(minimum), Some(actual)) = (minimum, number.as_f64())
                && actual < *minimum
            {
                violations.push(Violation::new(
                    path,
                    format!("must be at least {minimum}, found {actual}"),
                ));
            }
        }
        (Schema::Boolean, Value::Bool(_)) => {}
        (Schema::Array { items, min_items }, Value::Array(elements)) => {
            if elements.len() < *min_items {
                violations.push(Violation::new(
                    path,
                    format!("expected at least {min_items} item(s), found {}", elements.len()),
                ));
            }
            for (index, element) in elements.iter().enumerate() {
                check(element, items, &format!("{path}/{index}"), violations);
            }
        }
        (Schema::Object(object), Value::Object(fields)) => {
            check_object(fields, object, path, violations);
        }
        (schema, value) => violations.push(Violation::new(
            path,
            format!("expected {}, found {}", schema.type_name(), json_type(value)),
        )),
    }
}

fn check_object(
    fields: &Map<String, Value>,
    schema: &ObjectSchema,
    path: &str,
    violations: &mut Vec<Violation>,
) {
    for property in &schema.properties {
        match fields.get(property.name) {
            Some(value) => check(
                value,
                &property.schema,
                &format!("{path}/{}", property.name),
                violations,
            ),
            None if property.required => violations.push(Violation::new(
                path,
                format!("missing required field '{}'", property.name),
            )),
            None => {}
        }
    }

    for rule in &schema.required_when {
        if fields.get(rule.field).and_then(Value::as_str) != Some(rule.equals) {
            continue;
        }
        for name in &rule.require {
            if !fields.contains_key(*name) {
                violations.push(Violation::new(
                    path,
                    format!(
                        "field '{name}' is required when {} is '{}'",
                        rule.field, rule.equals
                    ),
                ));
            }
        }
    }

    if !schema.allow_unknown {
        for name in fields.keys() {
            if schema.property(name).is_none() {
                violations.push(Violation::new(
                    format!("{path}/{name}"),
                    format!("unknown field '{name}'"),
                ));
            }
        }
    }
}

fn check_format(text: &str, format: StringFormat, path: &str, violations: &mut Vec<Violation>) {
    match format {
        StringFormat::Any => {}
        StringFormat::NonEmpty => {
            if text.trim().is_empty() {
                violations.push(Violation::new(path, "must not be empty"));
            }
        }
        StringFormat::UrlOrEnv => {
            let is_url = text.starts_with("https://") || text.starts_with("http://");
            if !is_url && !text.starts_with(ENV_PREFIX) {
                violations.push(Violation::new(
                    path,
                    format!("'{text}' must be an http(s) URL or an {ENV_PREFIX}NAME reference"),
                ));
            }
        }
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
