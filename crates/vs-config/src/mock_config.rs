//! Top-level mock configuration
//!
//! Parses `mock.yaml`: the listen address, the single test account, the
//! device inventory served by the device list, and the raw endpoint
//! definitions handed to the spec registry.

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::HashSet;
use std::path::Path;
use tracing::info;
use uuid::Uuid;
use vs_core::{classify, Attributes, DeviceRecord};

use crate::error::{ConfigError, ConfigResult};
use crate::loader::load_yaml;

/// Default listen address
pub const DEFAULT_BIND: &str = "127.0.0.1:8000";

/// HTTP listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}

/// The one account the mock accepts logins for
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    pub email: String,

    /// Lowercase hex MD5 of the password, as the client sends it
    pub password_hash: String,

    pub account_id: String,

    #[serde(default = "default_nickname")]
    pub nickname: String,

    #[serde(default = "default_country_code")]
    pub country_code: String,
}

fn default_nickname() -> String {
    "Mock User".to_string()
}

fn default_country_code() -> String {
    "US".to_string()
}

/// One inventory entry as written in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub model: String,

    /// Defaults to the MD5 of the model read as a UUID
    #[serde(default)]
    pub uuid: Option<String>,

    /// Defaults to the uuid
    #[serde(default)]
    pub cid: Option<String>,

    #[serde(default)]
    pub name: Option<String>,

    /// Client-side module name; defaults to the model
    #[serde(default)]
    pub config_module: Option<String>,

    /// Initial attributes layered over the category defaults
    #[serde(default)]
    pub attributes: Attributes,
}

impl DeviceConfig {
    /// Deterministic uuid for a model: the raw MD5 digest of the model
    /// name, without version bits, so recorded fixtures keep their ids
    pub fn derived_uuid(model: &str) -> String {
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&Md5::digest(model.as_bytes()));
        Uuid::from_bytes(bytes).to_string()
    }

    /// Build the device record, classifying the model
    pub fn to_record(&self) -> ConfigResult<DeviceRecord> {
        let category = classify(&self.model).map_err(|e| ConfigError::InvalidValue {
            key: format!("devices.{}", self.model),
            reason: e.to_string(),
        })?;

        let uuid = self
            .uuid
            .clone()
            .unwrap_or_else(|| Self::derived_uuid(&self.model));

        Ok(DeviceRecord {
            cid: self.cid.clone().unwrap_or_else(|| uuid.clone()),
            uuid,
            model: self.model.clone(),
            config_module: self
                .config_module
                .clone()
                .unwrap_or_else(|| self.model.clone()),
            name: self
                .name
                .clone()
                .unwrap_or_else(|| format!("Mock {}", self.model)),
            category,
            attributes: self.attributes.clone(),
        })
    }
}

/// Parsed `mock.yaml`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MockConfig {
    #[serde(default)]
    pub server: ServerConfig,

    pub account: AccountConfig,

    #[serde(default)]
    pub devices: Vec<DeviceConfig>,

    /// Raw endpoint definitions, parsed by the spec registry
    #[serde(default)]
    pub endpoints: Value,
}

impl MockConfig {
    /// Load and validate a config file; include paths resolve against its directory
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let config_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let file = path.file_name().ok_or_else(|| ConfigError::InvalidIncludePath {
            path: path.display().to_string(),
            reason: "config path has no file name".to_string(),
        })?;

        let yaml = load_yaml(config_dir, file)?;
        let config = Self::from_yaml(yaml)?;

        info!(
            "Loaded config from {:?}: {} devices",
            path,
            config.devices.len()
        );
        Ok(config)
    }

    /// Parse and validate an already tag-processed YAML document
    pub fn from_yaml(yaml: Value) -> ConfigResult<Self> {
        if !yaml.is_mapping() {
            return Err(ConfigError::InvalidValue {
                key: "root".to_string(),
                reason: "configuration must be a mapping".to_string(),
            });
        }

        let config: MockConfig =
            serde_yaml::from_value(yaml).map_err(|e| ConfigError::InvalidValue {
                key: "root".to_string(),
                reason: e.to_string(),
            })?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.account.email.is_empty() || self.account.password_hash.is_empty() {
            return Err(ConfigError::ValidationFailed {
                message: "account email and password_hash must be set".to_string(),
            });
        }

        let mut seen = HashSet::new();
        for record in self.device_records()? {
            if !seen.insert(record.uuid.clone()) {
                return Err(ConfigError::ValidationFailed {
                    message: format!("duplicate device uuid {}", record.uuid),
                });
            }
        }

        Ok(())
    }

    /// Records for the whole inventory, in declaration order
    pub fn device_records(&self) -> ConfigResult<Vec<DeviceRecord>> {
        self.devices.iter().map(DeviceConfig::to_record).collect()
    }
}
