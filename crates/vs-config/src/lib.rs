//! YAML configuration loading for the VeSync mock
//!
//! This crate loads `mock.yaml` with support for these custom tags:
//!
//! - `!include path` - Include another YAML file
//! - `!include_dir_named dir` - Include all YAML files as a mapping
//! - `!include_dir_merge_named dir` - Merge mappings from all YAML files
//! - `!secret key` - Substitute from secrets.yaml
//! - `!env_var VAR [default]` - Environment variable substitution
//!
//! # Example
//!
//! ```ignore
//! use vs_config::MockConfig;
//!
//! let config = MockConfig::load("config/mock.yaml")?;
//! let devices = config.device_records()?;
//! ```

mod error;
mod loader;
mod mock_config;
mod secrets;

pub use error::{ConfigError, ConfigResult};
pub use loader::{load_yaml, load_yaml_string, YamlLoader};
pub use mock_config::{AccountConfig, DeviceConfig, MockConfig, ServerConfig, DEFAULT_BIND};
pub use secrets::Secrets;

// Re-export serde_yaml::Value for convenience
pub use serde_yaml::Value;
