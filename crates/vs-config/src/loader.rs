//! YAML loader with custom tag support
//!
//! Supported tags:
//! - `!include path` - Include another YAML file
//! - `!include_dir_named dir` - Include all YAML files as a mapping keyed by filename
//! - `!include_dir_merge_named dir` - Merge mappings from all YAML files
//! - `!secret key` - Substitute from secrets.yaml
//! - `!env_var VAR [default]` - Environment variable substitution

use crate::error::{ConfigError, ConfigResult};
use crate::secrets::Secrets;
use serde_yaml::Value;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// YAML loader resolving tags relative to a config directory
pub struct YamlLoader {
    /// Base directory for resolving relative paths
    config_dir: PathBuf,
    secrets: Secrets,
    /// Files currently being loaded, for cycle detection
    include_stack: HashSet<PathBuf>,
}

impl YamlLoader {
    /// Create a new YAML loader for the given config directory
    pub fn new(config_dir: impl Into<PathBuf>) -> ConfigResult<Self> {
        let config_dir = config_dir.into();
        let secrets = Secrets::load(&config_dir)?;

        Ok(Self {
            config_dir,
            secrets,
            include_stack: HashSet::new(),
        })
    }

    /// Create a loader with pre-loaded secrets
    pub fn with_secrets(config_dir: impl Into<PathBuf>, secrets: Secrets) -> Self {
        Self {
            config_dir: config_dir.into(),
            secrets,
            include_stack: HashSet::new(),
        }
    }

    /// Load and process a YAML file
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> ConfigResult<Value> {
        let path = self.resolve_path(path.as_ref());
        debug!("Loading YAML file: {:?}", path);

        if self.include_stack.contains(&path) {
            return Err(ConfigError::CircularInclude { path });
        }

        let content = fs::read_to_string(&path).map_err(|e| ConfigError::ReadFile {
            path: path.clone(),
            source: e,
        })?;

        self.include_stack.insert(path.clone());
        let result = self.load_string(&content, &path);
        self.include_stack.remove(&path);

        result
    }

    /// Load and process YAML from a string
    pub fn load_string(&mut self, content: &str, source_path: &Path) -> ConfigResult<Value> {
        let parse_error = |e| ConfigError::ParseYaml {
            path: source_path.to_path_buf(),
            source: e,
        };
        let mut value: Value = serde_yaml::from_str(content).map_err(parse_error)?;
        // `<<: *anchor` lets an entry reuse another under a second method
        value.apply_merge().map_err(parse_error)?;

        self.process_value(value, source_path)
    }

    fn process_value(&mut self, value: Value, source_path: &Path) -> ConfigResult<Value> {
        match value {
            Value::Tagged(tagged) => self.process_tagged(*tagged, source_path),
            Value::Mapping(map) => {
                let mut result = serde_yaml::Mapping::new();
                for (k, v) in map {
                    let processed_key = self.process_value(k, source_path)?;
                    let processed_value = self.process_value(v, source_path)?;
                    result.insert(processed_key, processed_value);
                }
                Ok(Value::Mapping(result))
            }
            Value::Sequence(seq) => {
                let result: ConfigResult<Vec<Value>> = seq
                    .into_iter()
                    .map(|v| self.process_value(v, source_path))
                    .collect();
                Ok(Value::Sequence(result?))
            }
            _ => Ok(value),
        }
    }

    fn process_tagged(
        &mut self,
        tagged: serde_yaml::value::TaggedValue,
        source_path: &Path,
    ) -> ConfigResult<Value> {
        let tag = tagged.tag.to_string();
        let value = tagged.value;

        trace!("Processing tag '{}' with value {:?}", tag, value);

        match tag.as_str() {
            "!include" => {
                let include_path = self.value_to_path(&value, source_path)?;
                debug!("Including file: {:?}", include_path);
                self.load_file(&include_path)
            }
            "!include_dir_named" => self.process_include_dir_named(value, source_path),
            "!include_dir_merge_named" => self.process_include_dir_merge_named(value, source_path),
            "!secret" => self.process_secret(value),
            "!env_var" => self.process_env_var(value),
            other => Err(ConfigError::InvalidValue {
                key: other.to_string(),
                reason: "unsupported YAML tag".to_string(),
            }),
        }
    }

    /// `!include_dir_named` - one entry per file, keyed by file stem
    fn process_include_dir_named(
        &mut self,
        value: Value,
        source_path: &Path,
    ) -> ConfigResult<Value> {
        let dir_path = self.value_to_path(&value, source_path)?;
        debug!("Including directory as named mapping: {:?}", dir_path);

        let mut result = serde_yaml::Mapping::new();
        for file in self.get_yaml_files(&dir_path)? {
            let name = file
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string();
            let content = self.load_file(&file)?;
            result.insert(Value::String(name), content);
        }

        Ok(Value::Mapping(result))
    }

    /// `!include_dir_merge_named` - union of the top-level mappings of every file.
    ///
    /// A key defined by two files is an error: endpoint names must be unique
    /// across the whole spec directory.
    fn process_include_dir_merge_named(
        &mut self,
        value: Value,
        source_path: &Path,
    ) -> ConfigResult<Value> {
        let dir_path = self.value_to_path(&value, source_path)?;
        debug!("Including directory as merged mapping: {:?}", dir_path);

        let mut result = serde_yaml::Mapping::new();
        for file in self.get_yaml_files(&dir_path)? {
            match self.load_file(&file)? {
                Value::Mapping(map) => {
                    for (k, v) in map {
                        if result.contains_key(&k) {
                            return Err(ConfigError::DuplicateKey {
                                key: yaml_key(&k),
                                path: file,
                            });
                        }
                        result.insert(k, v);
                    }
                }
                Value::Null => {}
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: file.display().to_string(),
                        reason: "merged file must contain a mapping".to_string(),
                    })
                }
            }
        }

        Ok(Value::Mapping(result))
    }

    fn process_secret(&self, value: Value) -> ConfigResult<Value> {
        let Value::String(key) = value else {
            return Err(ConfigError::InvalidValue {
                key: "!secret".to_string(),
                reason: "secret key must be a string".to_string(),
            });
        };

        let secret_value = self.secrets.get(&key)?;
        debug!("Substituted secret: {}", key);
        Ok(Value::String(secret_value.to_string()))
    }

    /// `!env_var NAME` or `!env_var NAME fallback`
    fn process_env_var(&self, value: Value) -> ConfigResult<Value> {
        let Value::String(spec) = value else {
            return Err(ConfigError::InvalidValue {
                key: "!env_var".to_string(),
                reason: "environment variable name must be a string".to_string(),
            });
        };

        let (var_name, fallback) = match spec.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, Some(rest.trim())),
            None => (spec.as_str(), None),
        };

        match (std::env::var(var_name), fallback) {
            (Ok(env_value), _) => {
                debug!("Substituted env var: {}", var_name);
                Ok(Value::String(env_value))
            }
            (Err(_), Some(fallback)) => {
                debug!("Env var {} not set, using fallback", var_name);
                Ok(Value::String(fallback.to_string()))
            }
            (Err(_), None) => Err(ConfigError::EnvVarNotFound {
                var: var_name.to_string(),
            }),
        }
    }

    /// Convert a YAML value to a path, resolving relative to the source file
    fn value_to_path(&self, value: &Value, source_path: &Path) -> ConfigResult<PathBuf> {
        let Value::String(path_str) = value else {
            return Err(ConfigError::InvalidIncludePath {
                path: format!("{:?}", value),
                reason: "path must be a string".to_string(),
            });
        };

        let base_dir = source_path.parent().unwrap_or(&self.config_dir);
        let resolved = if Path::new(path_str).is_absolute() {
            PathBuf::from(path_str)
        } else {
            base_dir.join(path_str)
        };

        Ok(resolved)
    }

    fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.config_dir.join(path)
        }
    }

    /// All YAML files in a directory, sorted by name
    fn get_yaml_files(&self, dir: &Path) -> ConfigResult<Vec<PathBuf>> {
        if !dir.is_dir() {
            return Err(ConfigError::DirectoryNotFound {
                path: dir.to_path_buf(),
            });
        }

        let mut files: Vec<PathBuf> = fs::read_dir(dir)
            .map_err(|e| ConfigError::ReadFile {
                path: dir.to_path_buf(),
                source: e,
            })?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
            .filter(|path| path.file_name().map(|n| n != "secrets.yaml").unwrap_or(true))
            .collect();

        files.sort();
        Ok(files)
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }
}

fn yaml_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => format!("{:?}", other),
    }
}

/// Load a YAML file with full tag processing
pub fn load_yaml(config_dir: impl Into<PathBuf>, file: impl AsRef<Path>) -> ConfigResult<Value> {
    let mut loader = YamlLoader::new(config_dir)?;
    loader.load_file(file)
}

/// Load a YAML string with tag processing
pub fn load_yaml_string(
    config_dir: impl Into<PathBuf>,
    content: &str,
    source_name: &str,
) -> ConfigResult<Value> {
    let mut loader = YamlLoader::new(config_dir)?;
    loader.load_string(content, Path::new(source_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_file(dir: &Path, name: &str, content: &str) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        let mut file = fs::File::create(path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
    }

    fn get<'a>(value: &'a Value, key: &str) -> &'a Value {
        value
            .as_mapping()
            .unwrap()
            .get(&Value::String(key.to_string()))
            .unwrap()
    }

    #[test]
    fn test_load_simple_yaml() {
        let dir = TempDir::new().unwrap();
        write_file(
            dir.path(),
            "mock.yaml",
            "server:\n  bind: 127.0.0.1:8000\ndevices:\n  - model: Core200S\n",
        );

        let value = load_yaml(dir.path(), "mock.yaml").unwrap();
        assert!(value.is_mapping());
        assert_eq!(get(get(&value, "server"), "bind").as_str(), Some("127.0.0.1:8000"));
    }

    #[test]
    fn test_include() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "account.yaml", "email: test@example.com\n");
        write_file(dir.path(), "mock.yaml", "account: !include account.yaml\n");

        let value = load_yaml(dir.path(), "mock.yaml").unwrap();
        assert_eq!(
            get(get(&value, "account"), "email").as_str(),
            Some("test@example.com")
        );
    }

    #[test]
    fn test_secret() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "secrets.yaml", "password_hash: abc123\n");
        write_file(dir.path(), "mock.yaml", "password: !secret password_hash\n");

        let value = load_yaml(dir.path(), "mock.yaml").unwrap();
        assert_eq!(get(&value, "password").as_str(), Some("abc123"));
    }

    #[test]
    fn test_missing_secret() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "secrets.yaml", "existing: value\n");
        write_file(dir.path(), "mock.yaml", "password: !secret nonexistent\n");

        let result = load_yaml(dir.path(), "mock.yaml");
        assert!(matches!(result, Err(ConfigError::SecretNotFound { .. })));
    }

    #[test]
    fn test_env_var() {
        let dir = TempDir::new().unwrap();
        std::env::set_var("TEST_VS_CONFIG_VAR", "env_value");
        write_file(dir.path(), "mock.yaml", "from_env: !env_var TEST_VS_CONFIG_VAR\n");

        let value = load_yaml(dir.path(), "mock.yaml").unwrap();
        assert_eq!(get(&value, "from_env").as_str(), Some("env_value"));

        std::env::remove_var("TEST_VS_CONFIG_VAR");
    }

    #[test]
    fn test_env_var_fallback() {
        let dir = TempDir::new().unwrap();
        write_file(
            dir.path(),
            "mock.yaml",
            "bind: !env_var TEST_VS_UNSET_BIND 0.0.0.0:8000\n",
        );

        let value = load_yaml(dir.path(), "mock.yaml").unwrap();
        assert_eq!(get(&value, "bind").as_str(), Some("0.0.0.0:8000"));
    }

    #[test]
    fn test_env_var_missing_without_fallback() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "mock.yaml", "bind: !env_var TEST_VS_UNSET_VAR\n");

        let result = load_yaml(dir.path(), "mock.yaml");
        assert!(matches!(result, Err(ConfigError::EnvVarNotFound { .. })));
    }

    #[test]
    fn test_include_dir_named() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "api/outlets.yaml", "a: 1\n");
        write_file(dir.path(), "api/fans.yaml", "b: 2\n");
        write_file(dir.path(), "mock.yaml", "groups: !include_dir_named api\n");

        let value = load_yaml(dir.path(), "mock.yaml").unwrap();
        let groups = get(&value, "groups").as_mapping().unwrap();
        assert!(groups.contains_key(&Value::String("outlets".to_string())));
        assert!(groups.contains_key(&Value::String("fans".to_string())));
    }

    #[test]
    fn test_include_dir_merge_named() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "api/outlets.yaml", "outlet_detail:\n  method: POST\n");
        write_file(dir.path(), "api/fans.yaml", "fan_bypass:\n  method: POST\n");
        write_file(dir.path(), "mock.yaml", "endpoints: !include_dir_merge_named api\n");

        let value = load_yaml(dir.path(), "mock.yaml").unwrap();
        let endpoints = get(&value, "endpoints").as_mapping().unwrap();
        assert_eq!(endpoints.len(), 2);
    }

    #[test]
    fn test_include_dir_merge_named_rejects_duplicates() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "api/a.yaml", "login:\n  method: POST\n");
        write_file(dir.path(), "api/b.yaml", "login:\n  method: PUT\n");
        write_file(dir.path(), "mock.yaml", "endpoints: !include_dir_merge_named api\n");

        let result = load_yaml(dir.path(), "mock.yaml");
        assert!(matches!(result, Err(ConfigError::DuplicateKey { ref key, .. }) if key == "login"));
    }

    #[test]
    fn test_merge_key_reuses_entry() {
        let dir = TempDir::new().unwrap();
        write_file(
            dir.path(),
            "api/bulbs.yaml",
            "bulb_toggle: &bulb_toggle\n  method: PUT\n  url: /SmartBulb/v1/device/devicestatus\n\
             bulb_toggle_post:\n  <<: *bulb_toggle\n  method: POST\n",
        );
        write_file(dir.path(), "mock.yaml", "endpoints: !include_dir_merge_named api\n");

        let value = load_yaml(dir.path(), "mock.yaml").unwrap();
        let post = get(get(&value, "endpoints"), "bulb_toggle_post");
        assert_eq!(get(post, "method").as_str(), Some("POST"));
        assert_eq!(get(post, "url").as_str(), Some("/SmartBulb/v1/device/devicestatus"));
        assert!(post.as_mapping().unwrap().get("<<").is_none());
    }

    #[test]
    fn test_missing_directory() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "mock.yaml", "endpoints: !include_dir_merge_named nope\n");

        let result = load_yaml(dir.path(), "mock.yaml");
        assert!(matches!(result, Err(ConfigError::DirectoryNotFound { .. })));
    }

    #[test]
    fn test_circular_include_detection() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "a.yaml", "include_b: !include b.yaml\n");
        write_file(dir.path(), "b.yaml", "include_a: !include a.yaml\n");

        let result = load_yaml(dir.path(), "a.yaml");
        assert!(matches!(result, Err(ConfigError::CircularInclude { .. })));
    }

    #[test]
    fn test_unknown_tag_rejected() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "mock.yaml", "x: !include_dir_list api\n");

        let result = load_yaml(dir.path(), "mock.yaml");
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }
}
