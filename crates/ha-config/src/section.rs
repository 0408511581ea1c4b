//! Integration sections of `configuration.yaml`

use crate::error::{ConfigError, ConfigResult};
use serde::de::DeserializeOwned;
use serde_yaml::Value;

/// Deserialize the top-level `domain:` section of a loaded configuration
///
/// Returns `Ok(None)` when the section is absent. A section written as a
/// bare key (`my_domain:` with no body) deserializes from an empty mapping,
/// so every field falls back to its default.
pub fn integration_section<T: DeserializeOwned>(
    config: &Value,
    domain: &str,
) -> ConfigResult<Option<T>> {
    let Some(section) = config.as_mapping().and_then(|m| m.get(domain)) else {
        return Ok(None);
    };

    let section = match section {
        Value::Null => Value::Mapping(serde_yaml::Mapping::new()),
        other => other.clone(),
    };

    serde_yaml::from_value(section)
        .map(Some)
        .map_err(|source| ConfigError::InvalidSection {
            domain: domain.to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Example {
        #[serde(default = "default_title")]
        sidebar_title: String,
    }

    fn default_title() -> String {
        "AI Automation".to_string()
    }

    #[test]
    fn test_absent_section() {
        let config: Value = serde_yaml::from_str("other: {}").unwrap();
        let section: Option<Example> = integration_section(&config, "example").unwrap();
        assert!(section.is_none());
    }

    #[test]
    fn test_bare_section_uses_defaults() {
        let config: Value = serde_yaml::from_str("example:\n").unwrap();
        let section: Example = integration_section(&config, "example").unwrap().unwrap();
        assert_eq!(section.sidebar_title, "AI Automation");
    }

    #[test]
    fn test_invalid_section() {
        let config: Value = serde_yaml::from_str("example:\n  sidebar_title: [1, 2]\n").unwrap();
        let result: ConfigResult<Option<Example>> = integration_section(&config, "example");
        assert!(matches!(result, Err(ConfigError::InvalidSection { .. })));
    }
}
