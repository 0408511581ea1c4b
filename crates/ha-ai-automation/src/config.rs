//! `ai_automation_creator:` configuration
//!
//! ```yaml
//! ai_automation_creator:
//!   openai_api_key: !secret openai_api_key
//!   model: gpt-4o-mini
//!   persistence: file
//! ```

use std::time::Duration;

use ha_automation::{IdStrategy, NormalizeOptions};
use ha_config::{integration_section, ConfigError, ConfigResult, Value};
use serde::{Deserialize, Serialize};

use crate::config_flow::{EntryData, EntryOptions};
use crate::constants::*;

/// Where generated automations go
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistenceMode {
    /// Append to `automations.yaml`
    File,
    /// Call `automation.create`, falling back to the file plus `automation.reload`
    #[default]
    Service,
}

/// Integration configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AiAutomationConfig {
    #[serde(default, skip_serializing)]
    pub openai_api_key: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Seconds; no timeout when absent
    #[serde(default)]
    pub request_timeout: Option<u64>,

    #[serde(default = "default_sidebar_title")]
    pub sidebar_title: String,

    #[serde(default = "default_sidebar_icon")]
    pub sidebar_icon: String,

    #[serde(default)]
    pub id_strategy: IdStrategy,

    #[serde(default = "default_true")]
    pub restructure_actions: bool,

    /// Send a snapshot of the entity registry with each prompt
    #[serde(default = "default_true")]
    pub include_entities: bool,

    /// Warn in the description about unknown entity and device ids
    #[serde(default = "default_true")]
    pub validate_entities: bool,

    #[serde(default)]
    pub persistence: PersistenceMode,

    #[serde(default = "default_history_size")]
    pub history_size: usize,
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_temperature() -> f32 {
    DEFAULT_TEMPERATURE
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_sidebar_title() -> String {
    DEFAULT_SIDEBAR_TITLE.to_string()
}

fn default_sidebar_icon() -> String {
    DEFAULT_SIDEBAR_ICON.to_string()
}

fn default_true() -> bool {
    true
}

fn default_history_size() -> usize {
    DEFAULT_HISTORY_SIZE
}

impl Default for AiAutomationConfig {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            model: default_model(),
            temperature: default_temperature(),
            base_url: default_base_url(),
            request_timeout: None,
            sidebar_title: default_sidebar_title(),
            sidebar_icon: default_sidebar_icon(),
            id_strategy: IdStrategy::default(),
            restructure_actions: true,
            include_entities: true,
            validate_entities: true,
            persistence: PersistenceMode::default(),
            history_size: default_history_size(),
        }
    }
}

impl AiAutomationConfig {
    /// Read and validate the section from a loaded `configuration.yaml`
    ///
    /// `Ok(None)` when the integration is not configured.
    pub fn from_configuration(config: &Value) -> ConfigResult<Option<Self>> {
        let Some(section) = integration_section::<Self>(config, DOMAIN)? else {
            return Ok(None);
        };
        section.validate()?;
        Ok(Some(section))
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.model.trim().is_empty() {
            return Err(invalid(CONF_MODEL, "must not be empty"));
        }
        if !self.temperature.is_finite() || !(0.0..=2.0).contains(&self.temperature) {
            return Err(invalid("temperature", "must be between 0 and 2"));
        }
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(invalid("base_url", "must be an http(s) URL"));
        }
        if self.request_timeout == Some(0) {
            return Err(invalid("request_timeout", "must be at least one second"));
        }
        if self.history_size == 0 {
            return Err(invalid("history_size", "must be at least 1"));
        }
        if matches!(&self.openai_api_key, Some(key) if key.trim().is_empty()) {
            return Err(invalid(CONF_OPENAI_API_KEY, "must not be empty"));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.request_timeout.map(Duration::from_secs)
    }

    pub fn normalize_options(&self) -> NormalizeOptions {
        NormalizeOptions {
            id_strategy: self.id_strategy,
            restructure_actions: self.restructure_actions,
        }
    }

    /// Overlay a config entry: the entry's key, and the options' model over the entry's
    pub fn apply_entry(&mut self, data: &EntryData, options: &EntryOptions) {
        self.openai_api_key = Some(data.openai_api_key.clone());
        self.model = data.model.clone();
        self.apply_options(options);
    }

    /// Overlay the options flow's choices
    pub fn apply_options(&mut self, options: &EntryOptions) {
        if let Some(model) = &options.model {
            self.model = model.clone();
        }
    }
}

fn invalid(key: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: format!("{}.{}", DOMAIN, key),
        reason: reason.to_string(),
    }
}
