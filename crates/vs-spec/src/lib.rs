//! Endpoint specifications for the VeSync mock
//!
//! Specs are pure data loaded from YAML at startup. Each one declares the
//! headers and body an endpoint expects, which auth fields it carries, how
//! the target device is found, and what each of its operations does.

mod endpoint;
mod error;
mod registry;
mod schema;

pub use endpoint::{Arg, AuthField, AuthKind, DeviceLocator, EndpointSpec, Operation};
pub use error::{SpecError, SpecResult};
pub use registry::SpecRegistry;
pub use schema::{merge, set_at, value_at, wildcard_name, Expected, Schema};
