//! YAML configuration loading for Home Assistant
//!
//! Loads `configuration.yaml` and resolves the custom tags integrations rely
//! on to keep credentials out of the main file:
//!
//! - `!include path` - Include another YAML file
//! - `!secret key` - Substitute from secrets.yaml
//! - `!env_var VAR [default]` - Environment variable substitution
//!
//! Integrations then pull their own section out with [`integration_section`].
//!
//! # Example
//!
//! ```ignore
//! use ha_config::{integration_section, load_yaml};
//!
//! let config = load_yaml("/config", "configuration.yaml")?;
//! let section: Option<MyConfig> = integration_section(&config, "my_domain")?;
//! ```

mod error;
mod loader;
mod secrets;
mod section;

pub use error::{ConfigError, ConfigResult};
pub use loader::{load_yaml, YamlLoader};
pub use secrets::Secrets;
pub use section::integration_section;

pub use serde_yaml::Value;

/// Name of the main configuration file
pub const CONFIGURATION_FILE: &str = "configuration.yaml";
