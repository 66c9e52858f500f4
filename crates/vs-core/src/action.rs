//! What an endpoint operation does once a request is accepted

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Operation kind declared by an endpoint spec
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Check credentials and open the session
    Login,
    /// Render the device inventory
    Devices,
    /// Read-only; render the template against current state
    #[default]
    Status,
    SetSwitch,
    SetMode,
    SetLevel,
    SetHumidity,
    SetDisplay,
    SetAutomaticStop,
    SetBrightness,
    SetChildLock,
    SetNightLight,
}

impl Action {
    pub const ALL: [Action; 12] = [
        Action::Login,
        Action::Devices,
        Action::Status,
        Action::SetSwitch,
        Action::SetMode,
        Action::SetLevel,
        Action::SetHumidity,
        Action::SetDisplay,
        Action::SetAutomaticStop,
        Action::SetBrightness,
        Action::SetChildLock,
        Action::SetNightLight,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Login => "login",
            Action::Devices => "devices",
            Action::Status => "status",
            Action::SetSwitch => "set_switch",
            Action::SetMode => "set_mode",
            Action::SetLevel => "set_level",
            Action::SetHumidity => "set_humidity",
            Action::SetDisplay => "set_display",
            Action::SetAutomaticStop => "set_automatic_stop",
            Action::SetBrightness => "set_brightness",
            Action::SetChildLock => "set_child_lock",
            Action::SetNightLight => "set_night_light",
        }
    }

    /// Whether the action changes device state
    pub fn is_mutation(&self) -> bool {
        !matches!(self, Action::Login | Action::Devices | Action::Status)
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| format!("unknown action: {}", s))
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
