//! Device categories and the model-prefix router

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error type for models the router does not recognize
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CategoryError {
    #[error("unknown device model: {0}")]
    UnknownModel(String),

    #[error("unknown device category: {0}")]
    UnknownCategory(String),
}

/// Fixed device classes governing default attributes and response shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Outlet,
    Switch,
    Bulb,
    Fan,
}

impl Category {
    /// All categories, in router table order
    pub const ALL: [Category; 4] = [
        Category::Outlet,
        Category::Switch,
        Category::Bulb,
        Category::Fan,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Outlet => "outlet",
            Category::Switch => "switch",
            Category::Bulb => "bulb",
            Category::Fan => "fan",
        }
    }
}

impl FromStr for Category {
    type Err = CategoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "outlet" => Ok(Category::Outlet),
            "switch" => Ok(Category::Switch),
            "bulb" => Ok(Category::Bulb),
            "fan" => Ok(Category::Fan),
            other => Err(CategoryError::UnknownCategory(other.to_string())),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the classification table
#[derive(Debug, Clone, Copy)]
enum Rule {
    Exact(&'static str),
    Prefix(&'static str),
}

impl Rule {
    fn matches(&self, model: &str) -> bool {
        match self {
            Rule::Exact(literal) => model == *literal,
            Rule::Prefix(prefix) => model.starts_with(prefix),
        }
    }
}

/// Classification rules, most specific first.
///
/// The legacy 7A outlet reports a switch-like model name, so its literal must
/// be checked before any prefix rule. `ESWL` (in-wall switch) must precede the
/// broader `ESW` outlet prefix.
const RULES: &[(Rule, Category)] = &[
    (Rule::Exact("wifi-switch-1.3"), Category::Outlet),
    (Rule::Prefix("ESWL"), Category::Switch),
    (Rule::Prefix("ESW"), Category::Outlet),
    (Rule::Prefix("ESO"), Category::Outlet),
    (Rule::Prefix("ESL"), Category::Bulb),
    (Rule::Prefix("XYD"), Category::Bulb),
    (Rule::Prefix("LV-"), Category::Fan),
    (Rule::Prefix("Core"), Category::Fan),
    (Rule::Prefix("Classic"), Category::Fan),
    (Rule::Prefix("Dual"), Category::Fan),
    (Rule::Prefix("LUH-"), Category::Fan),
    (Rule::Prefix("LEH-"), Category::Fan),
    (Rule::Prefix("LAP-"), Category::Fan),
    (Rule::Prefix("LTF-"), Category::Fan),
    (Rule::Prefix("OASISMIST"), Category::Fan),
    (Rule::Prefix("Vital"), Category::Fan),
];

/// Classify a device model string into its category
///
/// Pure function of the model string. Models matching no rule are rejected
/// rather than guessed.
pub fn classify(model: &str) -> Result<Category, CategoryError> {
    RULES
        .iter()
        .find(|(rule, _)| rule.matches(model))
        .map(|(_, category)| *category)
        .ok_or_else(|| CategoryError::UnknownModel(model.to_string()))
}
