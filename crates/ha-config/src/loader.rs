//! YAML configuration loader with custom tag support
//!
//! Supported tags:
//! - `!include path` - Include another YAML file (relative to the including file)
//! - `!secret key` - Substitute from secrets.yaml
//! - `!env_var VAR [default]` - Environment variable substitution

use crate::error::{ConfigError, ConfigResult};
use crate::secrets::Secrets;
use serde_yaml::Value;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// YAML loader with support for Home Assistant custom tags
pub struct YamlLoader {
    /// Base directory for resolving relative paths
    config_dir: PathBuf,
    /// Secrets store
    secrets: Secrets,
    /// Files currently being loaded, for circular include detection
    include_stack: HashSet<PathBuf>,
}

impl YamlLoader {
    /// Create a new YAML loader for the given config directory
    pub fn new(config_dir: impl Into<PathBuf>) -> ConfigResult<Self> {
        let config_dir = config_dir.into();
        let secrets = Secrets::load(&config_dir)?;
        Ok(Self::with_secrets(config_dir, secrets))
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
        // An empty file is an empty configuration, not an error
        if content.trim().is_empty() {
            return Ok(Value::Mapping(serde_yaml::Mapping::new()));
        }

        let value: Value = serde_yaml::from_str(content).map_err(|e| ConfigError::ParseYaml {
            path: source_path.to_path_buf(),
            source: e,
        })?;

        self.process_value(value, source_path)
    }

    fn process_value(&mut self, value: Value, source_path: &Path) -> ConfigResult<Value> {
        match value {
            Value::Tagged(tagged) => self.process_tagged(*tagged, source_path),
            Value::Mapping(map) => {
                let mut result = serde_yaml::Mapping::new();
                for (k, v) in map {
                    let processed = self.process_value(v, source_path)?;
                    result.insert(k, processed);
                }
                Ok(Value::Mapping(result))
            }
            Value::Sequence(seq) => seq
                .into_iter()
                .map(|v| self.process_value(v, source_path))
                .collect::<ConfigResult<Vec<Value>>>()
                .map(Value::Sequence),
            _ => Ok(value),
        }
    }

    fn process_tagged(
        &mut self,
        tagged: serde_yaml::value::TaggedValue,
        source_path: &Path,
    ) -> ConfigResult<Value> {
        let tag = tagged.tag.to_string();
        trace!("Processing tag '{}' with value {:?}", tag, tagged.value);

        match tag.as_str() {
            "!include" => {
                let include_path = self.value_to_path(&tagged.value, source_path)?;
                debug!("Including file: {:?}", include_path);
                self.load_file(&include_path)
            }
            "!secret" => self.process_secret(tagged.value),
            "!env_var" => self.process_env_var(tagged.value),
            _ => {
                // Unknown tags are kept; only their contents are processed
                let processed = self.process_value(tagged.value, source_path)?;
                Ok(Value::Tagged(Box::new(serde_yaml::value::TaggedValue {
                    tag: tagged.tag,
                    value: processed,
                })))
            }
        }
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

    fn process_env_var(&self, value: Value) -> ConfigResult<Value> {
        let Value::String(spec) = value else {
            return Err(ConfigError::InvalidValue {
                key: "!env_var".to_string(),
                reason: "environment variable name must be a string".to_string(),
            });
        };

        let (var_name, default) = match spec.trim().split_once(char::is_whitespace) {
            Some((name, default)) => (name.to_string(), Some(default.trim().to_string())),
            None => (spec.trim().to_string(), None),
        };

        match std::env::var(&var_name) {
            Ok(env_value) => {
                debug!("Substituted env var: {}", var_name);
                Ok(Value::String(env_value))
            }
            Err(_) => default
                .map(Value::String)
                .ok_or(ConfigError::EnvVarNotFound { var: var_name }),
        }
    }

    /// Resolve an include target relative to the including file
    fn value_to_path(&self, value: &Value, source_path: &Path) -> ConfigResult<PathBuf> {
        let Value::String(path_str) = value else {
            return Err(ConfigError::InvalidIncludePath {
                path: format!("{:?}", value),
                reason: "path must be a string".to_string(),
            });
        };

        let base_dir = source_path.parent().unwrap_or(&self.config_dir);
        Ok(if Path::new(path_str).is_absolute() {
            PathBuf::from(path_str)
        } else {
            base_dir.join(path_str)
        })
    }

    fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.config_dir.join(path)
        }
    }

    /// Get the config directory
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }
}

/// Load a YAML file with full tag processing
pub fn load_yaml(config_dir: impl Into<PathBuf>, file: impl AsRef<Path>) -> ConfigResult<Value> {
    let mut loader = YamlLoader::new(config_dir)?;
    loader.load_file(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_file(dir: &Path, name: &str, content: &str) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    fn lookup<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
        value.as_mapping()?.get(key)
    }

    #[test]
    fn test_secret_in_integration_section() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "secrets.yaml", "openai_key: sk-abc\n");
        write_file(
            dir.path(),
            "configuration.yaml",
            "ai_automation_creator:\n  openai_api_key: !secret openai_key\n",
        );

        let value = load_yaml(dir.path(), "configuration.yaml").unwrap();
        let section = lookup(&value, "ai_automation_creator").unwrap();
        assert_eq!(
            lookup(section, "openai_api_key"),
            Some(&Value::String("sk-abc".to_string()))
        );
    }

    #[test]
    fn test_include_relative_to_including_file() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "packages/ai.yaml", "model: gpt-4o-mini\n");
        write_file(
            dir.path(),
            "configuration.yaml",
            "ai_automation_creator: !include packages/ai.yaml\n",
        );

        let value = load_yaml(dir.path(), "configuration.yaml").unwrap();
        let section = lookup(&value, "ai_automation_creator").unwrap();
        assert_eq!(
            lookup(section, "model"),
            Some(&Value::String("gpt-4o-mini".to_string()))
        );
    }

    #[test]
    fn test_env_var_with_default() {
        let dir = TempDir::new().unwrap();
        std::env::set_var("HA_CONFIG_TEST_MODEL", "gpt-4o");
        write_file(
            dir.path(),
            "configuration.yaml",
            "set: !env_var HA_CONFIG_TEST_MODEL\nunset: !env_var HA_CONFIG_TEST_UNSET fallback\n",
        );

        let value = load_yaml(dir.path(), "configuration.yaml").unwrap();
        assert_eq!(
            lookup(&value, "set"),
            Some(&Value::String("gpt-4o".to_string()))
        );
        assert_eq!(
            lookup(&value, "unset"),
            Some(&Value::String("fallback".to_string()))
        );

        std::env::remove_var("HA_CONFIG_TEST_MODEL");
    }

    #[test]
    fn test_env_var_missing_without_default() {
        let dir = TempDir::new().unwrap();
        write_file(
            dir.path(),
            "configuration.yaml",
            "key: !env_var HA_CONFIG_TEST_DEFINITELY_UNSET\n",
        );

        let result = load_yaml(dir.path(), "configuration.yaml");
        assert!(matches!(result, Err(ConfigError::EnvVarNotFound { .. })));
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
    fn test_missing_secret() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "configuration.yaml", "key: !secret nonexistent\n");

        let result = load_yaml(dir.path(), "configuration.yaml");
        assert!(matches!(result, Err(ConfigError::SecretNotFound { .. })));
    }

    #[test]
    fn test_empty_file_is_empty_mapping() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "configuration.yaml", "\n");

        let value = load_yaml(dir.path(), "configuration.yaml").unwrap();
        assert!(value.as_mapping().unwrap().is_empty());
    }
}
