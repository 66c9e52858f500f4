//! Mutable state for the VeSync mock
//!
//! This crate provides the DeviceStateStore, which tracks the attributes of
//! every listed device, the typed mutations control endpoints apply to it,
//! and the SessionStore holding the active login.

mod mutation;
mod session;
mod store;

pub use mutation::{attr, device_defaults, Mutation};
pub use session::SessionStore;
pub use store::{DeviceStateStore, SharedDeviceStateStore};
