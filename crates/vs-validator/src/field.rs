//! Structural comparison of a request against its endpoint spec

use http::HeaderMap;
use serde_json::{Map, Value};
use tracing::debug;
use vs_core::{Location, Mismatch, ValidationResult, ABSENT, MISSING};
use vs_spec::{EndpointSpec, Expected, Schema};

/// Value of a header, matching the name ASCII-case-insensitively
///
/// Non-UTF-8 values are reported as absent.
pub fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.as_str().eq_ignore_ascii_case(name))
        .and_then(|(_, v)| v.to_str().ok())
}

/// Exact field-by-field validator
///
/// Every declared key must be present with the exact literal value, or any
/// value when declared a wildcard. All mismatches are collected. Auth fields
/// are skipped here and checked by [`crate::AuthResolver`].
pub struct FieldValidator;

impl FieldValidator {
    pub fn validate(spec: &EndpointSpec, headers: &HeaderMap, body: &Value) -> ValidationResult {
        let mut result = ValidationResult::new();

        compare_headers(spec, headers, &mut result);

        let schema = match spec.select_operation(body) {
            Ok(op) => &op.body,
            Err(mismatch) => {
                result.push(mismatch);
                &spec.body
            }
        };
        compare_body(spec, schema, body, &mut result);

        if !result.ok() {
            debug!(
                endpoint = %spec.name,
                mismatches = result.mismatches.len(),
                "Request did not match spec"
            );
        }
        result
    }
}

fn compare_headers(spec: &EndpointSpec, headers: &HeaderMap, result: &mut ValidationResult) {
    for (name, expected) in &spec.headers {
        if spec.auth_field(Location::Header, name).is_some() {
            continue;
        }

        let Some(actual) = header_value(headers, name) else {
            result.push(Mismatch::header(name, expected.describe(), MISSING));
            continue;
        };

        let matches = match expected {
            Expected::Wildcard(_) => true,
            Expected::Literal(Value::String(s)) => s == actual,
            Expected::Literal(other) => other.to_string() == actual,
            Expected::Object(_) => false,
        };
        if !matches {
            result.push(Mismatch::header(
                name,
                expected.describe(),
                Value::String(actual.to_string()).to_string(),
            ));
        }
    }
}

fn compare_body(spec: &EndpointSpec, schema: &Schema, body: &Value, result: &mut ValidationResult) {
    match body {
        Value::Object(map) => compare_object(spec, "", schema, map, result),
        Value::Null if schema.is_empty() => {}
        other => result.push(Mismatch::body("(body)", "object", other.to_string())),
    }
}

fn compare_object(
    spec: &EndpointSpec,
    path: &str,
    schema: &Schema,
    actual: &Map<String, Value>,
    result: &mut ValidationResult,
) {
    let top_level = path.is_empty();

    for (key, expected) in &schema.fields {
        if top_level && spec.auth_field(Location::Body, key).is_some() {
            continue;
        }

        let field_path = join(path, key);
        let Some(value) = actual.get(key) else {
            result.push(Mismatch::body(field_path, expected.describe(), MISSING));
            continue;
        };

        match expected {
            Expected::Wildcard(_) => {}
            Expected::Literal(literal) => {
                if literal != value {
                    result.push(Mismatch::body(field_path, literal.to_string(), value.to_string()));
                }
            }
            Expected::Object(nested) => match value {
                Value::Object(map) => compare_object(spec, &field_path, nested, map, result),
                other => result.push(Mismatch::body(field_path, "object", other.to_string())),
            },
        }
    }

    if schema.strict {
        for (key, value) in actual {
            if !schema.fields.contains_key(key) {
                result.push(Mismatch::body(join(path, key), ABSENT, value.to_string()));
            }
        }
    }
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", path, key)
    }
}
