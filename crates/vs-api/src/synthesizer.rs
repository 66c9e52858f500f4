//! Response synthesis
//!
//! Renders an operation's response template against device identity and
//! current attributes, then wraps it in the envelope shape the client
//! expects for the device's category.

use regex::Regex;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tracing::debug;
use vs_core::{Attributes, Category, DeviceRecord, ResponseEnvelope};
use vs_spec::Operation;

/// Where the rendered payload sits inside `result`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// `result: {...}`
    Flat,
    /// `result: {code: 0, msg: null, result: {...}}`
    Nested,
}

/// Response-shape lookup by category and model
pub trait ShapeRules: Send + Sync {
    fn shape(&self, category: Category, model: &str) -> Shape;
}

/// The vendor's shapes: bypass-era devices nest their payload, everything
/// else is flat. The 131 purifier predates bypass and stays flat; the Valceno
/// bulb is a bypass device in a flat category.
#[derive(Debug, Clone)]
pub struct VendorShapes {
    by_category: HashMap<Category, Shape>,
    by_model: HashMap<(Category, String), Shape>,
}

impl Default for VendorShapes {
    fn default() -> Self {
        let by_category = HashMap::from([
            (Category::Outlet, Shape::Flat),
            (Category::Switch, Shape::Flat),
            (Category::Bulb, Shape::Flat),
            (Category::Fan, Shape::Nested),
        ]);
        let by_model = HashMap::from([
            ((Category::Fan, "LV-PUR131S".to_string()), Shape::Flat),
            ((Category::Bulb, "XYD0001".to_string()), Shape::Nested),
        ]);
        Self {
            by_category,
            by_model,
        }
    }
}

impl VendorShapes {
    /// Override the shape for one model
    pub fn with_model(mut self, category: Category, model: impl Into<String>, shape: Shape) -> Self {
        self.by_model.insert((category, model.into()), shape);
        self
    }
}

impl ShapeRules for VendorShapes {
    fn shape(&self, category: Category, model: &str) -> Shape {
        self.by_model
            .get(&(category, model.to_string()))
            .or_else(|| self.by_category.get(&category))
            .copied()
            .unwrap_or(Shape::Flat)
    }
}

static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();

fn placeholder_re() -> &'static Regex {
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"^\{(\w+)(?::(\w+))?\}$").expect("valid placeholder pattern")
    })
}

/// Values a template can reference
#[derive(Debug, Default, Clone, Copy)]
pub struct RenderContext<'a> {
    pub device: Option<&'a DeviceRecord>,
    pub attributes: Option<&'a Attributes>,
    pub extra: Option<&'a Map<String, Value>>,
}

impl<'a> RenderContext<'a> {
    fn lookup(&self, name: &str) -> Option<Value> {
        self.attributes
            .and_then(|a| a.get(name).cloned())
            .or_else(|| self.device.and_then(|d| d.identity(name)))
            .or_else(|| self.extra.and_then(|e| e.get(name).cloned()))
    }
}

/// Render a template.
///
/// Strings written `"{name}"` or `"{name:onoff}"` are substituted. Other
/// scalars under a key naming a tracked attribute take its current value.
/// Everything else is copied as a static default.
pub fn render(template: &Value, ctx: &RenderContext<'_>) -> Value {
    match template {
        Value::Object(map) => {
            let rendered: Map<String, Value> = map
                .iter()
                .map(|(key, value)| {
                    let tracked = match value {
                        Value::Object(_) | Value::Array(_) => None,
                        Value::String(s) if placeholder_re().is_match(s) => None,
                        _ => ctx.attributes.and_then(|a| a.get(key)),
                    };
                    let value = match tracked {
                        Some(current) => current.clone(),
                        None => render(value, ctx),
                    };
                    (key.clone(), value)
                })
                .collect();
            Value::Object(rendered)
        }
        Value::Array(items) => Value::Array(items.iter().map(|v| render(v, ctx)).collect()),
        Value::String(s) => match placeholder_re().captures(s) {
            Some(caps) => {
                let name = &caps[1];
                let value = ctx.lookup(name).unwrap_or_else(|| {
                    debug!(placeholder = %name, "Unresolved template placeholder");
                    Value::Null
                });
                match caps.get(2).map(|m| m.as_str()) {
                    Some(format) => apply_format(format, value),
                    None => value,
                }
            }
            None => template.clone(),
        },
        other => other.clone(),
    }
}

fn apply_format(format: &str, value: Value) -> Value {
    match (format, &value) {
        ("onoff", Value::Bool(true)) => json!("on"),
        ("onoff", Value::Bool(false)) => json!("off"),
        _ => value,
    }
}

/// Builds success envelopes from operation templates
#[derive(Clone)]
pub struct ResponseSynthesizer {
    rules: Arc<dyn ShapeRules>,
}

impl Default for ResponseSynthesizer {
    fn default() -> Self {
        Self::new(Arc::new(VendorShapes::default()))
    }
}

impl ResponseSynthesizer {
    pub fn new(rules: Arc<dyn ShapeRules>) -> Self {
        Self { rules }
    }

    /// Envelope for a device-scoped operation
    pub fn build(
        &self,
        operation: &Operation,
        device: &DeviceRecord,
        attributes: &Attributes,
    ) -> ResponseEnvelope {
        let ctx = RenderContext {
            device: Some(device),
            attributes: Some(attributes),
            extra: None,
        };
        let payload = render(&operation.response, &ctx);

        let result = match self.rules.shape(device.category, &device.model) {
            Shape::Flat => payload,
            Shape::Nested => json!({"code": 0, "msg": null, "result": payload}),
        };
        ResponseEnvelope::success(result)
    }

    /// Envelope for an operation with no target device
    pub fn build_static(&self, operation: &Operation, extra: &Map<String, Value>) -> ResponseEnvelope {
        let ctx = RenderContext {
            extra: Some(extra),
            ..Default::default()
        };
        ResponseEnvelope::success(render(&operation.response, &ctx))
    }

    /// Envelope for the device list.
    ///
    /// The template's `list` holds one item template, rendered once per
    /// device; `{total}` resolves to the device count.
    pub fn build_device_list(&self, operation: &Operation, devices: &[DeviceRecord]) -> ResponseEnvelope {
        let item = operation
            .response
            .get("list")
            .and_then(Value::as_array)
            .and_then(|items| items.first())
            .cloned()
            .unwrap_or(Value::Null);

        let list: Vec<Value> = devices
            .iter()
            .map(|device| {
                render(
                    &item,
                    &RenderContext {
                        device: Some(device),
                        attributes: Some(&device.attributes),
                        extra: None,
                    },
                )
            })
            .collect();

        let mut extra = Map::new();
        extra.insert("total".to_string(), json!(devices.len()));
        let mut result = render(
            &operation.response,
            &RenderContext {
                extra: Some(&extra),
                ..Default::default()
            },
        );
        if let Value::Object(map) = &mut result {
            map.insert("list".to_string(), Value::Array(list));
        }
        ResponseEnvelope::success(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use vs_core::Action;
    use vs_spec::Schema;

    fn operation(response: Value) -> Operation {
        Operation {
            name: "op".to_string(),
            body: Schema::default(),
            action: Action::Status,
            args: IndexMap::new(),
            response,
            models: Vec::new(),
        }
    }

    fn device(model: &str, category: Category) -> DeviceRecord {
        DeviceRecord {
            uuid: format!("{}-uuid", model),
            cid: format!("{}-cid", model),
            model: model.to_string(),
            config_module: "Module".to_string(),
            name: format!("Mock {}", model),
            category,
            attributes: Attributes::new(),
        }
    }

    fn attrs(value: Value) -> Attributes {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_shapes() {
        let rules = VendorShapes::default();
        assert_eq!(rules.shape(Category::Outlet, "ESW15-USA"), Shape::Flat);
        assert_eq!(rules.shape(Category::Fan, "Core200S"), Shape::Nested);
        assert_eq!(rules.shape(Category::Fan, "LV-PUR131S"), Shape::Flat);

        assert_eq!(rules.shape(Category::Bulb, "ESL100"), Shape::Flat);
        assert_eq!(rules.shape(Category::Bulb, "XYD0001"), Shape::Nested);

        let custom = VendorShapes::default().with_model(Category::Outlet, "ESO15-TB", Shape::Nested);
        assert_eq!(custom.shape(Category::Outlet, "ESO15-TB"), Shape::Nested);
        assert_eq!(custom.shape(Category::Outlet, "ESW15-USA"), Shape::Flat);
    }

    #[test]
    fn test_placeholders_and_formats() {
        let device = device("ESW15-USA", Category::Outlet);
        let attributes = attrs(json!({"enabled": true}));
        let ctx = RenderContext {
            device: Some(&device),
            attributes: Some(&attributes),
            extra: None,
        };

        let out = render(
            &json!({"deviceStatus": "{enabled:onoff}", "uuid": "{uuid}", "power": "0:0", "missing": "{nope}"}),
            &ctx,
        );
        assert_eq!(
            out,
            json!({"deviceStatus": "on", "uuid": "ESW15-USA-uuid", "power": "0:0", "missing": null})
        );
    }

    #[test]
    fn test_attribute_keys_override_static_defaults() {
        let attributes = attrs(json!({"level": 3, "mode": "sleep"}));
        let ctx = RenderContext {
            attributes: Some(&attributes),
            ..Default::default()
        };
        let out = render(&json!({"level": 1, "mode": "manual", "filter_life": 80}), &ctx);
        assert_eq!(out, json!({"level": 3, "mode": "sleep", "filter_life": 80}));
    }

    #[test]
    fn test_fan_response_is_nested() {
        let synth = ResponseSynthesizer::default();
        let fan = device("Core200S", Category::Fan);
        let envelope = synth.build(
            &operation(json!({"enabled": false, "level": 1})),
            &fan,
            &attrs(json!({"enabled": true, "level": 2})),
        );
        assert_eq!(envelope.code, 0);
        assert_eq!(
            envelope.result,
            Some(json!({"code": 0, "msg": null, "result": {"enabled": true, "level": 2}}))
        );
    }

    #[test]
    fn test_legacy_fan_is_flat() {
        let synth = ResponseSynthesizer::default();
        let fan = device("LV-PUR131S", Category::Fan);
        let envelope = synth.build(&operation(json!({"level": 1})), &fan, &attrs(json!({"level": 2})));
        assert_eq!(envelope.result, Some(json!({"level": 2})));
    }

    #[test]
    fn test_device_list() {
        let synth = ResponseSynthesizer::default();
        let mut outlet = device("ESW15-USA", Category::Outlet);
        outlet.attributes = attrs(json!({"enabled": false}));
        let bulb = device("ESL100", Category::Bulb);

        let op = operation(json!({
            "total": "{total}",
            "pageSize": 100,
            "list": [{"uuid": "{uuid}", "deviceType": "{deviceType}", "deviceStatus": "{enabled:onoff}"}]
        }));
        let envelope = synth.build_device_list(&op, &[outlet, bulb]);
        let result = envelope.result.unwrap();

        assert_eq!(result["total"], json!(2));
        assert_eq!(result["pageSize"], json!(100));
        let list = result["list"].as_array().unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0]["deviceStatus"], json!("off"));
        assert_eq!(list[1]["deviceType"], json!("ESL100"));
    }

    #[test]
    fn test_static_template() {
        let synth = ResponseSynthesizer::default();
        let mut extra = Map::new();
        extra.insert("token".to_string(), json!("tok"));
        let envelope = synth.build_static(&operation(json!({"token": "{token}", "x": 1})), &extra);
        assert_eq!(envelope.result, Some(json!({"token": "tok", "x": 1})));
    }
}
