//! Config flow for the AI Automation Creator
//!
//! Step `user` asks for the OpenAI API key (and optionally a model) and
//! checks the key by listing models. Step `import` runs the same step with
//! the key from `configuration.yaml`. The options flow edits the model;
//! its result is kept in `.storage/ai_automation_creator.options`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use ha_registries::Storable;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::constants::*;

/// Version of the config entry data
pub const VERSION: u32 = 1;

/// Data stored in the config entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryData {
    pub openai_api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

/// Options of the config entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl Storable for EntryOptions {
    const KEY: &'static str = "ai_automation_creator.options";
    const VERSION: u32 = 1;
    const MINOR_VERSION: u32 = 1;
}

/// Checks an API key against the provider
#[async_trait]
pub trait ApiKeyValidator: Send + Sync {
    /// Any failure (bad key, network, quota) counts as invalid
    async fn validate_api_key(&self, api_key: &str) -> bool;
}

/// Form field schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl FormField {
    fn string(name: &str, required: bool, default: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            field_type: "string".to_string(),
            required: Some(required),
            default: default.map(|d| Value::String(d.to_string())),
        }
    }
}

/// Result of a flow step
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FlowResult {
    Form {
        handler: String,
        step_id: String,
        data_schema: Vec<FormField>,
        errors: HashMap<String, String>,
    },
    CreateEntry {
        handler: String,
        title: String,
        version: u32,
        data: Value,
    },
}

impl FlowResult {
    fn form(step_id: &str, data_schema: Vec<FormField>, errors: HashMap<String, String>) -> Self {
        Self::Form {
            handler: DOMAIN.to_string(),
            step_id: step_id.to_string(),
            data_schema,
            errors,
        }
    }

    fn create_entry(title: &str, data: Value) -> Self {
        Self::CreateEntry {
            handler: DOMAIN.to_string(),
            title: title.to_string(),
            version: VERSION,
            data,
        }
    }

    /// Entry data of a finished config flow
    pub fn entry_data(&self) -> Option<EntryData> {
        match self {
            Self::CreateEntry { data, .. } => serde_json::from_value(data.clone()).ok(),
            Self::Form { .. } => None,
        }
    }

    /// Options of a finished options flow
    pub fn entry_options(&self) -> Option<EntryOptions> {
        match self {
            Self::CreateEntry { data, .. } => serde_json::from_value(data.clone()).ok(),
            Self::Form { .. } => None,
        }
    }

    /// Errors shown on a form
    pub fn errors(&self) -> Option<&HashMap<String, String>> {
        match self {
            Self::Form { errors, .. } => Some(errors),
            Self::CreateEntry { .. } => None,
        }
    }
}

/// Config flow handler
pub struct ConfigFlow {
    validator: Arc<dyn ApiKeyValidator>,
}

impl ConfigFlow {
    pub fn new(validator: Arc<dyn ApiKeyValidator>) -> Self {
        Self { validator }
    }

    fn user_schema() -> Vec<FormField> {
        vec![
            FormField::string(CONF_OPENAI_API_KEY, true, None),
            FormField::string(CONF_MODEL, false, Some(DEFAULT_MODEL)),
        ]
    }

    /// Show the form, or create the entry once the key checks out
    pub async fn step_user(&self, user_input: Option<Value>) -> FlowResult {
        let mut errors = HashMap::new();

        if let Some(input) = user_input {
            match serde_json::from_value::<EntryData>(input) {
                Ok(data) => {
                    if self.validator.validate_api_key(&data.openai_api_key).await {
                        info!("Creating {} config entry (model {})", DOMAIN, data.model);
                        match serde_json::to_value(&data) {
                            Ok(value) => return FlowResult::create_entry(TITLE, value),
                            Err(e) => {
                                error!("Unexpected error during setup: {}", e);
                                errors.insert("base".to_string(), "unknown".to_string());
                            }
                        }
                    } else {
                        warn!("OpenAI API key was rejected");
                        errors.insert("base".to_string(), "invalid_api_key".to_string());
                    }
                }
                Err(e) => {
                    error!("Unexpected error during setup: {}", e);
                    errors.insert("base".to_string(), "unknown".to_string());
                }
            }
        }

        FlowResult::form("user", Self::user_schema(), errors)
    }

    /// Import from `configuration.yaml`
    pub async fn step_import(&self, import_config: Value) -> FlowResult {
        self.step_user(Some(import_config)).await
    }
}

/// Options flow handler
pub struct OptionsFlow {
    current: EntryOptions,
}

impl OptionsFlow {
    pub fn new(current: EntryOptions) -> Self {
        Self { current }
    }

    /// Show the model form, or finish with the submitted options
    ///
    /// A blank model clears the option, so the entry's model applies again.
    pub fn step_init(&self, user_input: Option<Value>) -> FlowResult {
        let mut errors = HashMap::new();

        if let Some(input) = user_input {
            match serde_json::from_value::<EntryOptions>(input) {
                Ok(mut options) => {
                    options.model = options
                        .model
                        .map(|model| model.trim().to_string())
                        .filter(|model| !model.is_empty());
                    match serde_json::to_value(&options) {
                        Ok(value) => return FlowResult::create_entry("", value),
                        Err(e) => {
                            error!("Unexpected error in options flow: {}", e);
                            errors.insert("base".to_string(), "unknown".to_string());
                        }
                    }
                }
                Err(e) => {
                    warn!("Rejected options: {}", e);
                    errors.insert("base".to_string(), "unknown".to_string());
                }
            }
        }

        let default = self.current.model.as_deref().unwrap_or(DEFAULT_MODEL);
        FlowResult::form(
            "init",
            vec![FormField::string(CONF_MODEL, false, Some(default))],
            errors,
        )
    }
}
