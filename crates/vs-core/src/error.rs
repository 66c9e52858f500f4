//! Validation results and the request-path error taxonomy

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::codes;

/// Where a mismatched field lives in the request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Location {
    Header,
    Body,
}

/// A single field that did not match its declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mismatch {
    pub location: Location,
    /// Dotted path, e.g. `payload.data.level` or the header name
    pub field_path: String,
    pub expected: String,
    pub actual: String,
}

/// Marker used in `actual` when a declared field is absent
pub const MISSING: &str = "(missing)";
/// Marker used in `expected` when an undeclared field is forbidden
pub const ABSENT: &str = "(absent)";
/// Marker used in `expected` for wildcard fields
pub const ANY: &str = "(any)";

impl Mismatch {
    pub fn header(name: impl Into<String>, expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self {
            location: Location::Header,
            field_path: name.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn body(path: impl Into<String>, expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self {
            location: Location::Body,
            field_path: path.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.location {
            Location::Header => "header ",
            Location::Body => "",
        };
        write!(
            f,
            "{}{}: expected {}, got {}",
            prefix, self.field_path, self.expected, self.actual
        )
    }
}

/// Outcome of structural validation; all mismatches are collected
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub mismatches: Vec<Mismatch>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ok(&self) -> bool {
        self.mismatches.is_empty()
    }

    pub fn push(&mut self, mismatch: Mismatch) {
        self.mismatches.push(mismatch);
    }

    /// Whether any mismatch names the given field path
    pub fn names(&self, field_path: &str) -> bool {
        self.mismatches.iter().any(|m| m.field_path == field_path)
    }

    /// Convert into the request-path error, if validation failed.
    ///
    /// Header problems take precedence for the error kind; the full list is
    /// carried either way.
    pub fn into_error(self) -> Option<EngineError> {
        if self.ok() {
            return None;
        }
        if self
            .mismatches
            .iter()
            .any(|m| m.location == Location::Header)
        {
            Some(EngineError::HeaderMismatch(self.mismatches))
        } else {
            Some(EngineError::BodyFieldMismatch(self.mismatches))
        }
    }
}

fn describe(mismatches: &[Mismatch]) -> String {
    mismatches
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Every way a request can fail; none of these are fatal to the process
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("no endpoint declared for {method} {path}")]
    SpecNotFound { method: String, path: String },

    #[error("header mismatch: {}", describe(.0))]
    HeaderMismatch(Vec<Mismatch>),

    #[error("illegal argument: {}", describe(.0))]
    BodyFieldMismatch(Vec<Mismatch>),

    #[error("missing required auth field: {field}")]
    AuthMissing { field: String },

    #[error("invalid {field}: {reason}")]
    AuthMismatch { field: String, reason: String },

    #[error("device not found: {0}")]
    UnknownDevice(String),

    #[error("invalid state transition: {0}")]
    InvalidStateTransition(String),

    #[error("the account does not exist")]
    InvalidCredentials,
}

impl EngineError {
    /// The literal envelope code the client library expects for this failure
    pub fn code(&self) -> i64 {
        match self {
            EngineError::SpecNotFound { .. } => codes::SPEC_NOT_FOUND,
            EngineError::HeaderMismatch(_) => codes::HEADER_MISMATCH,
            EngineError::BodyFieldMismatch(_) => codes::ILLEGAL_ARGUMENT,
            EngineError::AuthMissing { .. } => codes::AUTH_MISSING,
            EngineError::AuthMismatch { .. } => codes::INVALID_TOKEN,
            EngineError::UnknownDevice(_) => codes::DEVICE_NOT_FOUND,
            EngineError::InvalidStateTransition(_) => codes::INVALID_STATE,
            EngineError::InvalidCredentials => codes::ACCOUNT_NOT_FOUND,
        }
    }

    /// Mismatch list carried by validation failures
    pub fn mismatches(&self) -> &[Mismatch] {
        match self {
            EngineError::HeaderMismatch(m) | EngineError::BodyFieldMismatch(m) => m,
            _ => &[],
        }
    }
}
