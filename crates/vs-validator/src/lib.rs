//! Request validation for the VeSync mock
//!
//! [`FieldValidator`] compares headers and body against an endpoint spec and
//! reports every mismatch. [`AuthResolver`] then checks the declared auth
//! fields against the active session.

mod auth;
mod field;

pub use auth::AuthResolver;
pub use field::{header_value, FieldValidator};
