//! Endpoint specifications
//!
//! An endpoint entry in YAML looks like:
//!
//! ```yaml
//! outlet_15a_toggle:
//!   method: PUT
//!   url: /15a/v1/device/devicestatus
//!   models: [ESW15-USA]
//!   headers:
//!     tk: "{tk}"
//!     accountId: "{accountId}"
//!   json_object:
//!     uuid: "{uuid}"
//!     status: "{status}"
//!   action: set_switch
//!   args:
//!     enabled: "{status}"
//!   response: {}
//! ```
//!
//! Bypass-style endpoints multiplex several operations over one URL. They
//! name a `discriminator` body path and an `operations` table whose entries
//! carry their own `json_object` overlay, action, args and response.

use indexmap::IndexMap;
use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::OnceLock;
use vs_core::{Action, Location, Mismatch, MISSING};

use crate::error::{SpecError, SpecResult};
use crate::schema::{merge, set_at, value_at, wildcard_name, Expected, Schema};

/// Which session value an auth field carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthKind {
    Token,
    AccountId,
}

/// An auth field exactly as the endpoint declares it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthField {
    pub kind: AuthKind,
    pub location: Location,
    /// Declared name; body names are compared with this exact casing
    pub name: String,
}

impl AuthField {
    /// Classify a declared key; the vendor uses `tk`/`accountID` in some
    /// places and `token`/`accountId` in others
    fn recognize(name: &str, location: Location) -> Option<Self> {
        let kind = match name {
            "tk" | "token" => AuthKind::Token,
            "accountID" | "accountId" => AuthKind::AccountId,
            _ => return None,
        };
        Some(Self {
            kind,
            location,
            name: name.to_string(),
        })
    }
}

/// Where the target device's identifier lives in a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceLocator {
    /// Index into the slash-separated path segments
    Url(usize),
    /// Dotted body path
    Body(String),
}

impl DeviceLocator {
    pub fn extract(&self, path: &str, body: &Value) -> Option<String> {
        match self {
            DeviceLocator::Url(index) => segments(path).nth(*index).map(str::to_string),
            DeviceLocator::Body(body_path) => match value_at(body, body_path)? {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            },
        }
    }
}

/// Where a mutation argument comes from
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    /// `"{payload.data.level}"` - read from the request body
    Body(String),
    Literal(Value),
}

static ARG_PATH: OnceLock<Regex> = OnceLock::new();

impl Arg {
    fn from_value(value: &Value) -> Self {
        let re = ARG_PATH.get_or_init(|| Regex::new(r"^\{([\w.]+)\}$").expect("valid arg pattern"));
        match value.as_str().and_then(|s| re.captures(s)) {
            Some(caps) => Arg::Body(caps[1].to_string()),
            None => Arg::Literal(value.clone()),
        }
    }

    /// Resolve against a request body; `None` when the body lacks the path
    pub fn resolve(&self, body: &Value) -> Option<Value> {
        match self {
            Arg::Body(path) => value_at(body, path).cloned(),
            Arg::Literal(v) => Some(v.clone()),
        }
    }
}

/// One operation an endpoint performs
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub name: String,
    /// Full body schema (endpoint base merged with the operation overlay)
    pub body: Schema,
    pub action: Action,
    pub args: IndexMap<String, Arg>,
    /// Response template, rendered by the synthesizer
    pub response: Value,
    /// Restricts the operation to these models; empty means any
    pub models: Vec<String>,
}

impl Operation {
    /// Resolve every declared arg against the request body
    pub fn resolve_args(&self, body: &Value) -> Map<String, Value> {
        self.args
            .iter()
            .filter_map(|(name, arg)| arg.resolve(body).map(|v| (name.clone(), v)))
            .collect()
    }

    pub fn allows_model(&self, model: &str) -> bool {
        self.models.is_empty() || self.models.iter().any(|m| m == model)
    }
}

/// A declared endpoint; immutable after load
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointSpec {
    pub name: String,
    pub method: String,
    pub url_pattern: String,
    pub headers: IndexMap<String, Expected>,
    /// Base body schema shared by all operations
    pub body: Schema,
    pub auth: Vec<AuthField>,
    pub device_locator: Option<DeviceLocator>,
    pub models: Vec<String>,
    pub discriminator: Option<String>,
    pub operations: IndexMap<String, Operation>,
}

impl EndpointSpec {
    /// Pick the operation a request targets.
    ///
    /// Single-operation endpoints always succeed; bypass endpoints read the
    /// discriminator, and a missing or unknown value is a body mismatch at
    /// the discriminator path.
    pub fn select_operation(&self, body: &Value) -> Result<&Operation, Mismatch> {
        let Some(path) = &self.discriminator else {
            return self
                .operations
                .first()
                .map(|(_, op)| op)
                .ok_or_else(|| Mismatch::body("", "an operation", MISSING));
        };

        let expected = || {
            self.operations
                .keys()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join("|")
        };

        match value_at(body, path) {
            Some(Value::String(name)) => self
                .operations
                .get(name)
                .ok_or_else(|| Mismatch::body(path.clone(), expected(), Value::String(name.clone()).to_string())),
            Some(other) => Err(Mismatch::body(path.clone(), expected(), other.to_string())),
            None => Err(Mismatch::body(path.clone(), expected(), MISSING)),
        }
    }

    pub fn allows_model(&self, model: &str) -> bool {
        self.models.is_empty() || self.models.iter().any(|m| m == model)
    }

    /// Auth field declared at a location under an exact name
    pub fn auth_field(&self, location: Location, name: &str) -> Option<&AuthField> {
        self.auth
            .iter()
            .find(|f| f.location == location && f.name == name)
    }

    pub fn is_strict(&self) -> bool {
        self.body.strict
    }

    /// Parse one YAML/JSON entry
    pub fn from_entry(name: &str, entry: &Value) -> SpecResult<Self> {
        let raw: RawEndpoint = serde_json::from_value(entry.clone())
            .map_err(|e| SpecError::invalid(name, e.to_string()))?;
        raw.build(name)
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawOperation {
    #[serde(default)]
    json_object: Option<Value>,
    #[serde(default)]
    models: Vec<String>,
    #[serde(default)]
    action: Action,
    #[serde(default)]
    args: IndexMap<String, Value>,
    #[serde(default)]
    response: Value,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawEndpoint {
    method: String,
    url: String,
    #[serde(default)]
    headers: IndexMap<String, Value>,
    #[serde(default)]
    json_object: Option<Value>,
    #[serde(default)]
    models: Vec<String>,
    #[serde(default)]
    strict: bool,
    #[serde(default)]
    action: Option<Action>,
    #[serde(default)]
    args: IndexMap<String, Value>,
    #[serde(default)]
    response: Value,
    #[serde(default)]
    discriminator: Option<String>,
    #[serde(default)]
    operations: IndexMap<String, RawOperation>,
}

impl RawEndpoint {
    fn build(self, name: &str) -> SpecResult<EndpointSpec> {
        let method = self.method.to_ascii_uppercase();
        if !matches!(method.as_str(), "GET" | "POST" | "PUT" | "DELETE" | "PATCH") {
            return Err(SpecError::invalid(name, format!("unsupported method {}", self.method)));
        }
        if !self.url.starts_with('/') {
            return Err(SpecError::invalid(name, "url must start with '/'"));
        }

        let base_body = match self.json_object {
            None | Some(Value::Null) => Value::Object(Map::new()),
            Some(v @ Value::Object(_)) => v,
            Some(_) => return Err(SpecError::invalid(name, "json_object must be a mapping")),
        };

        let headers: IndexMap<String, Expected> = self
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), Expected::from_value(&header_literal(v))))
            .collect();

        let body = schema_of(&base_body, self.strict);

        let mut auth: Vec<AuthField> = headers
            .keys()
            .filter_map(|k| AuthField::recognize(k, Location::Header))
            .collect();
        auth.extend(
            body.fields
                .keys()
                .filter_map(|k| AuthField::recognize(k, Location::Body)),
        );

        let device_locator = locate_device(&self.url, &body);

        let operations = match &self.discriminator {
            None => {
                if !self.operations.is_empty() {
                    return Err(SpecError::invalid(name, "operations require a discriminator"));
                }
                let op = Operation {
                    name: name.to_string(),
                    body: body.clone(),
                    action: self.action.unwrap_or_default(),
                    args: parse_args(&self.args),
                    response: self.response,
                    models: Vec::new(),
                };
                IndexMap::from([(name.to_string(), op)])
            }
            Some(path) => {
                if self.operations.is_empty() {
                    return Err(SpecError::invalid(name, "discriminator without operations"));
                }
                if self.action.is_some() || !self.args.is_empty() || !self.response.is_null() {
                    return Err(SpecError::invalid(
                        name,
                        "action, args and response belong to operations when a discriminator is set",
                    ));
                }
                let mut ops = IndexMap::new();
                for (op_name, raw_op) in self.operations {
                    let mut merged = base_body.clone();
                    if let Some(overlay) = &raw_op.json_object {
                        if !overlay.is_object() {
                            return Err(SpecError::invalid(
                                name,
                                format!("operation {} json_object must be a mapping", op_name),
                            ));
                        }
                        merge(&mut merged, overlay);
                    }
                    set_at(&mut merged, path, Value::String(op_name.clone()));
                    let op = Operation {
                        name: op_name.clone(),
                        body: schema_of(&merged, self.strict),
                        action: raw_op.action,
                        args: parse_args(&raw_op.args),
                        response: raw_op.response,
                        models: raw_op.models,
                    };
                    ops.insert(op_name, op);
                }
                ops
            }
        };

        Ok(EndpointSpec {
            name: name.to_string(),
            method,
            url_pattern: self.url,
            headers,
            body,
            auth,
            device_locator,
            models: self.models,
            discriminator: self.discriminator,
            operations,
        })
    }
}

fn schema_of(body: &Value, strict: bool) -> Schema {
    match body {
        Value::Object(map) => Schema::from_map(map, strict),
        _ => Schema::default(),
    }
}

fn parse_args(raw: &IndexMap<String, Value>) -> IndexMap<String, Arg> {
    raw.iter()
        .map(|(k, v)| (k.clone(), Arg::from_value(v)))
        .collect()
}

/// Header values travel as text, so YAML scalars compare as their string form
fn header_literal(value: &Value) -> Value {
    match value {
        Value::String(_) => value.clone(),
        Value::Number(n) => Value::String(n.to_string()),
        Value::Bool(b) => Value::String(b.to_string()),
        other => Value::String(other.to_string()),
    }
}

/// A `{uuid}`/`{cid}` URL segment wins over a body field; uuid before cid
fn locate_device(url: &str, body: &Schema) -> Option<DeviceLocator> {
    for id in ["uuid", "cid"] {
        if let Some(index) = segments(url).position(|s| wildcard_name(s) == Some(id)) {
            return Some(DeviceLocator::Url(index));
        }
    }
    for id in ["uuid", "cid"] {
        if let Some(path) = body.find_wildcard(id) {
            return Some(DeviceLocator::Body(path));
        }
    }
    None
}

/// Non-empty path segments
pub(crate) fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}
