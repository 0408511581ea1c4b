//! AI Automation Creator
//!
//! Creates Home Assistant automations from plain-language descriptions:
//! the description (plus a snapshot of known entities) goes to a
//! chat-completion model, the YAML that comes back is extracted and
//! normalized, then registered with the host or appended to
//! `automations.yaml`.
//!
//! # Key Types
//!
//! - [`AutomationCreator`] - Runs one create request end to end
//! - [`TextGenerator`] / [`OpenAiClient`] - The language model
//! - [`AutomationRegistry`] - Where finished automations go
//! - [`GenerationHistory`] - Recently generated automations
//! - [`LoadedEntry`] - The set-up integration and its options flow
//!
//! # Services
//!
//! - `ai_automation_creator.create_automation`
//! - `ai_automation_creator.get_automation_yaml`

pub mod config;
pub mod config_flow;
pub mod constants;
pub mod creator;
pub mod error;
pub mod generator;
pub mod history;
pub mod panel;
pub mod prompt;
pub mod services;
pub mod sink;

pub use config::{AiAutomationConfig, PersistenceMode};
pub use config_flow::{
    ApiKeyValidator, ConfigFlow, EntryData, EntryOptions, FlowResult, FormField, OptionsFlow,
};
pub use constants::DOMAIN;
pub use creator::{AutomationCreator, CreateOutcome, CreateRequest};
pub use error::{CreateError, GeneratorError, SetupError, SinkError};
pub use generator::{CompletionRequest, OpenAiClient, OpenAiKeyValidator, TextGenerator};
pub use history::{GenerationHistory, GenerationRecord};
pub use prompt::{build_prompt, entity_snapshot, ChatMessage, EntitySummary, Role};
pub use sink::{AutomationRegistry, FileAutomationSink, Persisted, ServiceAutomationSink};

use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use ha_automation::AutomationsFile;
use ha_components::FrontendRegistry;
use ha_registries::{Registries, Storable};
use ha_service_registry::ServiceRegistry;
use serde_json::Value;
use tracing::{info, warn};

/// Host pieces the integration plugs into
#[derive(Clone)]
pub struct IntegrationContext {
    pub config_dir: PathBuf,
    pub services: Arc<ServiceRegistry>,
    pub registries: Arc<Registries>,
    pub frontend: Arc<FrontendRegistry>,
    /// Shared with the host's `automation` domain
    pub automations_file: Arc<AutomationsFile>,
}

/// Set up the integration with the OpenAI client
pub async fn async_setup_entry(
    ctx: &IntegrationContext,
    config: AiAutomationConfig,
) -> Result<Arc<AutomationCreator>, SetupError> {
    let generator = Arc::new(OpenAiClient::from_config(&config)?);
    setup_with_generator(ctx, config, generator)
}

/// Set up the integration with any text generator
pub fn setup_with_generator(
    ctx: &IntegrationContext,
    config: AiAutomationConfig,
    generator: Arc<dyn TextGenerator>,
) -> Result<Arc<AutomationCreator>, SetupError> {
    config.validate()?;

    let sink: Arc<dyn AutomationRegistry> = match config.persistence {
        PersistenceMode::File => Arc::new(FileAutomationSink::new(ctx.automations_file.clone())),
        PersistenceMode::Service => Arc::new(ServiceAutomationSink::new(
            ctx.services.clone(),
            ctx.automations_file.clone(),
        )),
    };

    panel::register_panel(&ctx.frontend, &config, &ctx.config_dir)?;

    let creator = Arc::new(AutomationCreator::new(
        config,
        generator,
        sink,
        ctx.services.clone(),
        ctx.registries.clone(),
    ));
    services::register_services(&ctx.services, creator.clone());

    info!(
        "Set up {} (model {}, persistence {:?})",
        DOMAIN,
        creator.config().model,
        creator.config().persistence
    );
    Ok(creator)
}

/// Remove the integration's services and panel
pub async fn async_unload_entry(ctx: &IntegrationContext) -> bool {
    let removed = services::unregister_services(&ctx.services);
    panel::remove_panel(&ctx.frontend);
    info!("Unloaded {} ({} services removed)", DOMAIN, removed);
    removed > 0
}

/// Options saved by the options flow, or the defaults
pub async fn load_entry_options(ctx: &IntegrationContext) -> EntryOptions {
    match ctx.registries.storage.load_data::<EntryOptions>().await {
        Ok(options) => options.unwrap_or_default(),
        Err(e) => {
            warn!("Ignoring stored {} options: {}", DOMAIN, e);
            EntryOptions::default()
        }
    }
}

/// The integration as set up, with its config before any options
///
/// Finishing the options flow stores the options and reloads the entry.
pub struct LoadedEntry {
    ctx: IntegrationContext,
    config: AiAutomationConfig,
    generator: Option<Arc<dyn TextGenerator>>,
    creator: RwLock<Arc<AutomationCreator>>,
}

impl LoadedEntry {
    /// Set up with the stored options applied, using the OpenAI client
    pub async fn setup(
        ctx: IntegrationContext,
        config: AiAutomationConfig,
    ) -> Result<Self, SetupError> {
        Self::setup_inner(ctx, config, None).await
    }

    /// Set up with the stored options applied, using any text generator
    pub async fn setup_with_generator(
        ctx: IntegrationContext,
        config: AiAutomationConfig,
        generator: Arc<dyn TextGenerator>,
    ) -> Result<Self, SetupError> {
        Self::setup_inner(ctx, config, Some(generator)).await
    }

    async fn setup_inner(
        ctx: IntegrationContext,
        config: AiAutomationConfig,
        generator: Option<Arc<dyn TextGenerator>>,
    ) -> Result<Self, SetupError> {
        let options = load_entry_options(&ctx).await;
        let creator = start(&ctx, &config, &options, generator.clone()).await?;
        Ok(Self {
            ctx,
            config,
            generator,
            creator: RwLock::new(creator),
        })
    }

    /// The running creator
    pub fn creator(&self) -> Arc<AutomationCreator> {
        self.creator
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Run the options flow's `init` step
    ///
    /// Without input this shows the form. Valid input is stored and the
    /// entry is unloaded and set up again with it.
    pub async fn options_flow(&self, user_input: Option<Value>) -> Result<FlowResult, SetupError> {
        let flow = OptionsFlow::new(load_entry_options(&self.ctx).await);
        let result = flow.step_init(user_input);

        if let Some(options) = result.entry_options() {
            let mut config = self.config.clone();
            config.apply_options(&options);
            config.validate()?;

            self.ctx
                .registries
                .storage
                .save(&options.to_storage_file())
                .await?;
            info!("Stored {} options, reloading", DOMAIN);

            async_unload_entry(&self.ctx).await;
            let creator = start(&self.ctx, &self.config, &options, self.generator.clone()).await?;
            *self
                .creator
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner()) = creator;
        }

        Ok(result)
    }
}

async fn start(
    ctx: &IntegrationContext,
    config: &AiAutomationConfig,
    options: &EntryOptions,
    generator: Option<Arc<dyn TextGenerator>>,
) -> Result<Arc<AutomationCreator>, SetupError> {
    let mut config = config.clone();
    config.apply_options(options);
    match generator {
        Some(generator) => setup_with_generator(ctx, config, generator),
        None => async_setup_entry(ctx, config).await,
    }
}
