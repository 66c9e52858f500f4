//! Core types for the VeSync mock
//!
//! This crate provides the fundamental types shared by the mock's crates:
//! operation kinds, device categories and the model router, device records,
//! the login session, the response envelope and the request-path errors.

mod action;
mod category;
mod device;
mod envelope;
mod error;
mod session;

pub use action::Action;
pub use category::{classify, Category, CategoryError};
pub use device::{Attributes, DeviceRecord};
pub use envelope::{ResponseEnvelope, SUCCESS_MSG};
pub use error::{EngineError, Location, Mismatch, ValidationResult, ABSENT, ANY, MISSING};
pub use session::Session;

/// Envelope codes, one per failure kind
///
/// Values the client library special-cases are the vendor's own; the rest
/// only need to be nonzero and distinct.
pub mod codes {
    pub const SUCCESS: i64 = 0;
    pub const SPEC_NOT_FOUND: i64 = -11000404;
    pub const HEADER_MISMATCH: i64 = -11000021;
    /// Vendor "illegal argument"
    pub const ILLEGAL_ARGUMENT: i64 = -11000022;
    pub const INVALID_STATE: i64 = -11000023;
    pub const AUTH_MISSING: i64 = -11300010;
    /// Vendor "invalid token"
    pub const INVALID_TOKEN: i64 = -11300011;
    pub const DEVICE_NOT_FOUND: i64 = -11300030;
    /// Vendor "the account does not exist"
    pub const ACCOUNT_NOT_FOUND: i64 = -11202022;
}
