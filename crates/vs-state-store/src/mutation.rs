//! Typed state changes and their argument parsing

use serde_json::{json, Map, Value};
use std::fmt;
use vs_core::{Action, Attributes, Category, EngineError};

/// Attribute keys tracked per device
pub mod attr {
    pub const ENABLED: &str = "enabled";
    pub const MODE: &str = "mode";
    pub const LEVEL: &str = "level";
    pub const HUMIDITY: &str = "humidity";
    pub const DISPLAY: &str = "display";
    pub const AUTOMATIC_STOP: &str = "automatic_stop";
    pub const BRIGHTNESS: &str = "brightness";
    pub const CHILD_LOCK: &str = "child_lock";
    pub const NIGHT_LIGHT: &str = "night_light";
}

const MODE_MANUAL: &str = "manual";

const MODES: [&str; 5] = ["auto", MODE_MANUAL, "sleep", "turbo", "pet"];
const NIGHT_LIGHT_MODES: [&str; 4] = ["on", "off", "auto", "dim"];
const HUMIDITY_RANGE: (i64, i64) = (30, 80);
const BRIGHTNESS_RANGE: (i64, i64) = (0, 100);

/// Wall dimmers classify as outlets but also dim
const DIMMER_PREFIX: &str = "ESWD";

fn is_dimmer(model: &str) -> bool {
    model.starts_with(DIMMER_PREFIX)
}

/// A single change to a device's attributes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    SetSwitch(bool),
    /// `level` is required when `mode` is manual
    SetMode { mode: String, level: Option<i64> },
    SetLevel(i64),
    SetHumidity(i64),
    SetDisplay(bool),
    SetAutomaticStop(bool),
    SetBrightness(i64),
    SetChildLock(bool),
    SetNightLight(String),
}

impl Mutation {
    /// Build a mutation from an action and its resolved arguments.
    ///
    /// Rejects missing or ill-typed arguments and manual mode without a
    /// level, so nothing invalid reaches the store.
    pub fn parse(action: Action, args: &Map<String, Value>) -> Result<Self, EngineError> {
        let mutation = match action {
            Action::SetSwitch => Mutation::SetSwitch(bool_arg(args, attr::ENABLED)?),
            Action::SetMode => {
                let mode = str_arg(args, attr::MODE)?;
                if !MODES.contains(&mode.as_str()) {
                    return Err(invalid(format!("unsupported mode '{}'", mode)));
                }
                let level = match args.get(attr::LEVEL) {
                    None | Some(Value::Null) => None,
                    Some(_) => Some(level_arg(args)?),
                };
                if mode == MODE_MANUAL && level.is_none() {
                    return Err(invalid("mode manual requires a level"));
                }
                Mutation::SetMode { mode, level }
            }
            Action::SetLevel => Mutation::SetLevel(level_arg(args)?),
            Action::SetHumidity => {
                Mutation::SetHumidity(int_in(args, attr::HUMIDITY, HUMIDITY_RANGE)?)
            }
            Action::SetDisplay => Mutation::SetDisplay(bool_arg(args, attr::DISPLAY)?),
            Action::SetAutomaticStop => {
                Mutation::SetAutomaticStop(bool_arg(args, attr::AUTOMATIC_STOP)?)
            }
            Action::SetBrightness => {
                Mutation::SetBrightness(brightness_arg(args)?)
            }
            Action::SetChildLock => Mutation::SetChildLock(bool_arg(args, attr::CHILD_LOCK)?),
            Action::SetNightLight => {
                let mode = str_arg(args, attr::NIGHT_LIGHT)?;
                if !NIGHT_LIGHT_MODES.contains(&mode.as_str()) {
                    return Err(invalid(format!("unsupported night light mode '{}'", mode)));
                }
                Mutation::SetNightLight(mode)
            }
            Action::Login | Action::Devices | Action::Status => {
                return Err(invalid(format!("{} does not change device state", action)))
            }
        };
        Ok(mutation)
    }

    /// Whether the mutation is meaningful for a category
    pub fn applies_to(&self, category: Category) -> bool {
        use Category::*;
        match self {
            Mutation::SetSwitch(_) => true,
            Mutation::SetMode { .. }
            | Mutation::SetLevel(_)
            | Mutation::SetHumidity(_)
            | Mutation::SetDisplay(_)
            | Mutation::SetAutomaticStop(_)
            | Mutation::SetChildLock(_) => category == Fan,
            Mutation::SetBrightness(_) => matches!(category, Bulb | Switch),
            Mutation::SetNightLight(_) => matches!(category, Outlet | Fan),
        }
    }

    /// Category applicability widened by per-model extras
    pub fn applies_to_device(&self, category: Category, model: &str) -> bool {
        self.applies_to(category) || (matches!(self, Mutation::SetBrightness(_)) && is_dimmer(model))
    }

    /// Write the change into an attribute map
    pub fn apply_to(&self, attributes: &mut Attributes) {
        let mut set = |key: &str, value: Value| {
            attributes.insert(key.to_string(), value);
        };
        match self {
            Mutation::SetSwitch(on) => set(attr::ENABLED, json!(on)),
            Mutation::SetMode { mode, level } => {
                set(attr::MODE, json!(mode));
                if let Some(level) = level {
                    set(attr::LEVEL, json!(level));
                }
            }
            Mutation::SetLevel(level) => set(attr::LEVEL, json!(level)),
            Mutation::SetHumidity(h) => set(attr::HUMIDITY, json!(h)),
            Mutation::SetDisplay(on) => set(attr::DISPLAY, json!(on)),
            Mutation::SetAutomaticStop(on) => set(attr::AUTOMATIC_STOP, json!(on)),
            Mutation::SetBrightness(b) => set(attr::BRIGHTNESS, json!(b)),
            Mutation::SetChildLock(on) => set(attr::CHILD_LOCK, json!(on)),
            Mutation::SetNightLight(mode) => set(attr::NIGHT_LIGHT, json!(mode)),
        }
    }
}

impl fmt::Display for Mutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mutation::SetSwitch(on) => write!(f, "set_switch({})", on),
            Mutation::SetMode { mode, level: Some(l) } => write!(f, "set_mode({}, {})", mode, l),
            Mutation::SetMode { mode, level: None } => write!(f, "set_mode({})", mode),
            Mutation::SetLevel(l) => write!(f, "set_level({})", l),
            Mutation::SetHumidity(h) => write!(f, "set_humidity({})", h),
            Mutation::SetDisplay(on) => write!(f, "set_display({})", on),
            Mutation::SetAutomaticStop(on) => write!(f, "set_automatic_stop({})", on),
            Mutation::SetBrightness(b) => write!(f, "set_brightness({})", b),
            Mutation::SetChildLock(on) => write!(f, "set_child_lock({})", on),
            Mutation::SetNightLight(m) => write!(f, "set_night_light({})", m),
        }
    }
}

/// Attributes a freshly listed device starts with
fn defaults(category: Category) -> Attributes {
    let value = match category {
        Category::Outlet => json!({
            attr::ENABLED: false,
            attr::NIGHT_LIGHT: "off",
        }),
        Category::Switch => json!({
            attr::ENABLED: false,
        }),
        Category::Bulb => json!({
            attr::ENABLED: false,
            attr::BRIGHTNESS: 100,
        }),
        Category::Fan => json!({
            attr::ENABLED: true,
            attr::MODE: MODE_MANUAL,
            attr::LEVEL: 1,
            attr::DISPLAY: true,
            attr::AUTOMATIC_STOP: true,
            attr::HUMIDITY: 50,
            attr::CHILD_LOCK: false,
            attr::NIGHT_LIGHT: "off",
        }),
    };
    match value {
        Value::Object(map) => map,
        _ => Attributes::new(),
    }
}

/// Category defaults plus whatever a model tracks beyond its category
pub fn device_defaults(category: Category, model: &str) -> Attributes {
    let mut attributes = defaults(category);
    if is_dimmer(model) {
        attributes.insert(attr::BRIGHTNESS.to_string(), json!(BRIGHTNESS_RANGE.1));
    }
    attributes
}

fn invalid(reason: impl Into<String>) -> EngineError {
    EngineError::InvalidStateTransition(reason.into())
}

fn missing(name: &str) -> EngineError {
    invalid(format!("missing argument '{}'", name))
}

/// Booleans arrive as JSON bools, `"on"`/`"off"` strings or 0/1
fn bool_arg(args: &Map<String, Value>, name: &str) -> Result<bool, EngineError> {
    match args.get(name).ok_or_else(|| missing(name))? {
        Value::Bool(b) => Ok(*b),
        Value::String(s) if s == "on" => Ok(true),
        Value::String(s) if s == "off" => Ok(false),
        Value::Number(n) if n.as_i64() == Some(1) => Ok(true),
        Value::Number(n) if n.as_i64() == Some(0) => Ok(false),
        other => Err(invalid(format!("'{}' must be on/off, got {}", name, other))),
    }
}

fn str_arg(args: &Map<String, Value>, name: &str) -> Result<String, EngineError> {
    match args.get(name).ok_or_else(|| missing(name))? {
        Value::String(s) if !s.is_empty() => Ok(s.clone()),
        other => Err(invalid(format!("'{}' must be a non-empty string, got {}", name, other))),
    }
}

fn int_arg(args: &Map<String, Value>, name: &str) -> Result<i64, EngineError> {
    let value = args.get(name).ok_or_else(|| missing(name))?;
    value
        .as_i64()
        .ok_or_else(|| invalid(format!("'{}' must be an integer, got {}", name, value)))
}

fn int_in(args: &Map<String, Value>, name: &str, range: (i64, i64)) -> Result<i64, EngineError> {
    in_range(name, int_arg(args, name)?, range)
}

fn in_range(name: &str, n: i64, (lo, hi): (i64, i64)) -> Result<i64, EngineError> {
    if n < lo || n > hi {
        return Err(invalid(format!("'{}' must be within {}..={}, got {}", name, lo, hi, n)));
    }
    Ok(n)
}

/// Bulb and dimmer clients send brightness as a numeric string
fn brightness_arg(args: &Map<String, Value>) -> Result<i64, EngineError> {
    let n = match args.get(attr::BRIGHTNESS) {
        Some(Value::String(s)) => s
            .trim()
            .parse()
            .map_err(|_| invalid(format!("'{}' must be an integer, got {:?}", attr::BRIGHTNESS, s)))?,
        _ => int_arg(args, attr::BRIGHTNESS)?,
    };
    in_range(attr::BRIGHTNESS, n, BRIGHTNESS_RANGE)
}

fn level_arg(args: &Map<String, Value>) -> Result<i64, EngineError> {
    let level = int_arg(args, attr::LEVEL)?;
    if level < 1 {
        return Err(invalid(format!("level must be at least 1, got {}", level)));
    }
    Ok(level)
}
