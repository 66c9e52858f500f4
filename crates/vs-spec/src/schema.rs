//! Declared field expectations
//!
//! A spec value is either a literal compared exactly, a wildcard written as
//! the string `"{name}"` (presence only), or a nested object validated
//! recursively.

use indexmap::IndexMap;
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;
use vs_core::ANY;

static WILDCARD: OnceLock<Regex> = OnceLock::new();

fn wildcard_re() -> &'static Regex {
    WILDCARD.get_or_init(|| Regex::new(r"^\{(\w+)\}$").expect("valid wildcard pattern"))
}

/// The wildcard name if `s` is written `"{name}"`
pub fn wildcard_name(s: &str) -> Option<&str> {
    wildcard_re()
        .captures(s)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// What a declared field must look like
#[derive(Debug, Clone, PartialEq)]
pub enum Expected {
    Literal(Value),
    Wildcard(String),
    Object(Schema),
}

impl Expected {
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::String(s) => match wildcard_name(s) {
                Some(name) => Expected::Wildcard(name.to_string()),
                None => Expected::Literal(value.clone()),
            },
            Value::Object(map) => Expected::Object(Schema::from_map(map, false)),
            other => Expected::Literal(other.clone()),
        }
    }

    /// Rendering used in mismatch reports
    pub fn describe(&self) -> String {
        match self {
            Expected::Literal(v) => v.to_string(),
            Expected::Wildcard(_) => ANY.to_string(),
            Expected::Object(_) => "object".to_string(),
        }
    }

    /// A value that satisfies this expectation, with wildcards filled from `fill`
    pub fn example(&self, fill: &dyn Fn(&str) -> Value) -> Value {
        match self {
            Expected::Literal(v) => v.clone(),
            Expected::Wildcard(name) => fill(name),
            Expected::Object(schema) => schema.example(fill),
        }
    }
}

/// An ordered set of declared body fields
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    pub fields: IndexMap<String, Expected>,
    /// Reject undeclared keys at this level and below
    pub strict: bool,
}

impl Schema {
    pub fn from_map(map: &Map<String, Value>, strict: bool) -> Self {
        let fields = map
            .iter()
            .map(|(k, v)| {
                let expected = match Expected::from_value(v) {
                    Expected::Object(mut nested) => {
                        nested.set_strict(strict);
                        Expected::Object(nested)
                    }
                    other => other,
                };
                (k.clone(), expected)
            })
            .collect();
        Self { fields, strict }
    }

    fn set_strict(&mut self, strict: bool) {
        self.strict = strict;
        for expected in self.fields.values_mut() {
            if let Expected::Object(nested) = expected {
                nested.set_strict(strict);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Dotted path of the first wildcard with the given name, depth-first
    pub fn find_wildcard(&self, name: &str) -> Option<String> {
        for (key, expected) in &self.fields {
            match expected {
                Expected::Wildcard(n) if n == name => return Some(key.clone()),
                Expected::Object(nested) => {
                    if let Some(path) = nested.find_wildcard(name) {
                        return Some(format!("{}.{}", key, path));
                    }
                }
                _ => {}
            }
        }
        None
    }

    /// A conforming body, with wildcards filled from `fill`
    pub fn example(&self, fill: &dyn Fn(&str) -> Value) -> Value {
        let map: Map<String, Value> = self
            .fields
            .iter()
            .map(|(k, e)| (k.clone(), e.example(fill)))
            .collect();
        Value::Object(map)
    }
}

/// Look up a dotted path such as `payload.data.level`
pub fn value_at<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |v, key| v.get(key))
}

/// Write `new` at a dotted path, creating intermediate objects
pub fn set_at(value: &mut Value, path: &str, new: Value) {
    let mut current = value;
    let mut keys = path.split('.').peekable();
    while let Some(key) = keys.next() {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        let Value::Object(map) = current else {
            return;
        };
        if keys.peek().is_none() {
            map.insert(key.to_string(), new);
            return;
        }
        current = map
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
}

/// Deep-merge `overlay` into `base`; objects merge key by key, anything else replaces
pub fn merge(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, overlay) => *base = overlay.clone(),
    }
}
