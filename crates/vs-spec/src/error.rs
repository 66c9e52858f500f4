//! Errors raised while loading endpoint specs

use thiserror::Error;

pub type SpecResult<T> = Result<T, SpecError>;

/// Load-time spec errors; any of these aborts startup
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SpecError {
    #[error("endpoint definitions must be a mapping of name to entry")]
    NotMapping,

    #[error("endpoint '{name}': {reason}")]
    InvalidEntry { name: String, reason: String },

    #[error("duplicate endpoint {method} {url} (declared by '{first}' and '{second}')")]
    Duplicate {
        method: String,
        url: String,
        first: String,
        second: String,
    },
}

impl SpecError {
    pub(crate) fn invalid(name: &str, reason: impl Into<String>) -> Self {
        SpecError::InvalidEntry {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}
