//! Home Assistant Rust Server
//!
//! Main entry point: loads `configuration.yaml` and the registries, starts
//! the built-in components and the `automation` domain, sets up the AI
//! Automation Creator when it is configured, and serves the REST API.

mod api;
mod automation_host;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, Result};
use ha_ai_automation::{
    AiAutomationConfig, ConfigFlow, EntryOptions, IntegrationContext, LoadedEntry,
    OpenAiKeyValidator,
};
use ha_automation::AutomationsFile;
use ha_components::{register_notification_services, FrontendRegistry, PersistentNotificationManager};
use ha_config::{load_yaml, Value, CONFIGURATION_FILE};
use ha_core::AUTOMATIONS_FILE;
use ha_registries::Registries;
use ha_service_registry::ServiceRegistry;
use serde_json::json;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::AppState;
use crate::automation_host::AutomationHost;

const DEFAULT_CONFIG_DIR: &str = "config";
const DEFAULT_BIND: &str = "0.0.0.0:8123";

/// The central Home Assistant instance
pub struct HomeAssistant {
    pub config_dir: PathBuf,
    /// Service registry for service calls
    pub services: Arc<ServiceRegistry>,
    /// Entity, device and area registries
    pub registries: Arc<Registries>,
    pub notifications: Arc<PersistentNotificationManager>,
    pub frontend: Arc<FrontendRegistry>,
    pub automations: Arc<AutomationHost>,
    pub automations_file: Arc<AutomationsFile>,
}

impl HomeAssistant {
    /// Create a new Home Assistant instance
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        let config_dir = config_dir.into();
        let automations_file = Arc::new(AutomationsFile::new(config_dir.join(AUTOMATIONS_FILE)));

        Self {
            services: Arc::new(ServiceRegistry::new()),
            registries: Arc::new(Registries::new(&config_dir)),
            notifications: Arc::new(PersistentNotificationManager::new()),
            frontend: Arc::new(FrontendRegistry::new()),
            automations: Arc::new(AutomationHost::new(automations_file.clone())),
            automations_file,
            config_dir,
        }
    }

    /// Load storage and start the built-in components
    pub async fn start(&self) -> Result<()> {
        self.registries
            .load_all()
            .await
            .context("loading registries")?;

        register_notification_services(&self.services, self.notifications.clone());

        match self.automations.load().await {
            Ok(_) => info!(
                "Loaded {} automations",
                self.automations.manager().count()
            ),
            Err(e) => error!("Failed to load {}: {}", AUTOMATIONS_FILE, e),
        }
        automation_host::register_services(&self.services, self.automations.clone());
        Ok(())
    }

    pub fn integration_context(&self) -> IntegrationContext {
        IntegrationContext {
            config_dir: self.config_dir.clone(),
            services: self.services.clone(),
            registries: self.registries.clone(),
            frontend: self.frontend.clone(),
            automations_file: self.automations_file.clone(),
        }
    }

    pub fn app_state(&self, integration: Option<Arc<LoadedEntry>>) -> AppState {
        AppState {
            services: self.services.clone(),
            frontend: self.frontend.clone(),
            integration,
        }
    }
}

fn load_configuration(config_dir: &Path) -> Result<Value> {
    if !config_dir.join(CONFIGURATION_FILE).exists() {
        warn!(
            "No {} in {}, starting with an empty configuration",
            CONFIGURATION_FILE,
            config_dir.display()
        );
        return Ok(Value::Mapping(Default::default()));
    }
    load_yaml(config_dir, CONFIGURATION_FILE).context("loading configuration.yaml")
}

/// Set up the AI Automation Creator from its `configuration.yaml` section
///
/// A key in the section goes through the config flow's import step first;
/// a rejected key leaves the integration unloaded. Options stored by the
/// options flow are applied on top.
async fn setup_ai_automation(
    hass: &HomeAssistant,
    mut config: AiAutomationConfig,
) -> Result<Option<LoadedEntry>> {
    if let Some(api_key) = config.openai_api_key.clone() {
        let flow = ConfigFlow::new(Arc::new(OpenAiKeyValidator::from_config(&config)));
        let result = flow
            .step_import(json!({"openai_api_key": api_key, "model": config.model}))
            .await;
        match result.entry_data() {
            Some(data) => config.apply_entry(&data, &EntryOptions::default()),
            None => {
                error!(
                    "Not setting up {}: {:?}",
                    ha_ai_automation::DOMAIN,
                    result.errors()
                );
                return Ok(None);
            }
        }
    } else {
        warn!(
            "{} has no openai_api_key; create_automation will report it",
            ha_ai_automation::DOMAIN
        );
    }

    let entry = LoadedEntry::setup(hass.integration_context(), config)
        .await
        .context("setting up ai_automation_creator")?;
    Ok(Some(entry))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for ctrl-c: {}", e);
    }
    info!("Shutting down...");
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let config_dir = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("HA_CONFIG_DIR").ok())
        .unwrap_or_else(|| DEFAULT_CONFIG_DIR.to_string());
    let bind = std::env::var("HA_BIND").unwrap_or_else(|_| DEFAULT_BIND.to_string());

    info!("Starting Home Assistant (Rust) with config dir {}", config_dir);

    let hass = HomeAssistant::new(&config_dir);
    let configuration = load_configuration(&hass.config_dir)?;
    hass.start().await?;

    let integration = match AiAutomationConfig::from_configuration(&configuration)? {
        Some(config) => setup_ai_automation(&hass, config).await?.map(Arc::new),
        None => None,
    };

    info!("Home Assistant is running");
    api::start_server(hass.app_state(integration), &bind, shutdown_signal()).await?;

    ha_ai_automation::async_unload_entry(&hass.integration_context()).await;
    hass.registries
        .save_all()
        .await
        .context("saving registries")?;
    Ok(())
}
