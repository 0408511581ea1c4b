//! Creating an automation from a description
//!
//! One request runs end to end: prompt, completion, extraction,
//! normalization, reference check, history, persistence, notification.
//! The result goes straight back to the caller; the history only serves
//! later `get_automation_yaml` calls.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use ha_automation::{
    append_missing_reference_warning, extract_document, extract_referenced_entities,
    format_for_automations_file, normalize, validate_entities_exist, IdGenerator,
};
use ha_components::persistent_notification;
use ha_core::Context;
use ha_registries::Registries;
use ha_service_registry::ServiceRegistry;
use serde::Serialize;
use serde_json::json;
use tracing::{error, info, instrument, warn};
use ulid::Ulid;

use crate::config::AiAutomationConfig;
use crate::constants::*;
use crate::error::{CreateError, CreateResult, GeneratorError};
use crate::generator::{CompletionRequest, TextGenerator};
use crate::history::{GenerationHistory, GenerationRecord};
use crate::prompt::{build_prompt, entity_snapshot};
use crate::sink::{AutomationRegistry, Persisted};

/// A request to create an automation
#[derive(Debug, Clone)]
pub struct CreateRequest {
    pub description: String,
    /// Overrides the configured model for this request
    pub model: Option<String>,
    pub context: Context,
}

impl CreateRequest {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            model: None,
            context: Context::new(),
        }
    }
}

/// What a successful request produced
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateOutcome {
    pub request_id: String,
    pub automation_id: String,
    /// The automation as an `automations.yaml` list item
    pub yaml: String,
    pub saved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persisted: Option<Persisted>,
    pub missing_entities: Vec<String>,
    pub missing_devices: Vec<String>,
}

/// Turns descriptions into automations
pub struct AutomationCreator {
    config: AiAutomationConfig,
    generator: Arc<dyn TextGenerator>,
    sink: Arc<dyn AutomationRegistry>,
    services: Arc<ServiceRegistry>,
    registries: Arc<Registries>,
    history: GenerationHistory,
    ids: IdGenerator,
}

impl AutomationCreator {
    pub fn new(
        config: AiAutomationConfig,
        generator: Arc<dyn TextGenerator>,
        sink: Arc<dyn AutomationRegistry>,
        services: Arc<ServiceRegistry>,
        registries: Arc<Registries>,
    ) -> Self {
        let history = GenerationHistory::new(config.history_size);
        Self {
            config,
            generator,
            sink,
            services,
            registries,
            history,
            ids: IdGenerator::new(),
        }
    }

    pub fn config(&self) -> &AiAutomationConfig {
        &self.config
    }

    pub fn history(&self) -> &GenerationHistory {
        &self.history
    }

    /// Show a persistent notification; failures are only logged
    async fn notify(&self, context: &Context, notification_id: &str, title: &str, message: String) {
        let data = json!({
            "notification_id": notification_id,
            "title": title,
            "message": message,
        });
        if let Err(e) = self
            .services
            .call(persistent_notification::DOMAIN, "create", data, context.child(), false)
            .await
        {
            warn!("Failed to show notification {}: {}", notification_id, e);
        }
    }

    async fn notify_generation_error(&self, context: &Context) {
        self.notify(
            context,
            NOTIFICATION_GENERATION_ERROR,
            NOTIFICATION_ERROR_TITLE,
            "Failed to generate automation YAML. Please try a different description.".to_string(),
        )
        .await;
    }

    #[instrument(skip(self, request), fields(request_id))]
    pub async fn create(&self, request: CreateRequest) -> CreateResult<CreateOutcome> {
        let description = request.description.trim();
        if description.is_empty() {
            return Err(CreateError::InvalidInput);
        }
        let context = &request.context;

        let request_id = Ulid::new().to_string();
        tracing::Span::current().record("request_id", request_id.as_str());
        info!("Creating automation from: {}", description);

        if !self.generator.is_configured() {
            error!("OpenAI API key not configured");
            self.notify(
                context,
                NOTIFICATION_API_ERROR,
                NOTIFICATION_ERROR_TITLE,
                "OpenAI API key not configured. Please set up the integration properly."
                    .to_string(),
            )
            .await;
            return Err(CreateError::MissingApiKey);
        }

        let snapshot = self
            .config
            .include_entities
            .then(|| entity_snapshot(&self.registries));
        let completion = CompletionRequest {
            model: request
                .model
                .clone()
                .unwrap_or_else(|| self.config.model.clone()),
            messages: build_prompt(description, snapshot.as_deref()),
            temperature: self.config.temperature,
        };

        let raw = match self.generator.generate(&completion).await {
            Ok(raw) => raw,
            Err(GeneratorError::NotConfigured) => {
                self.notify(
                    context,
                    NOTIFICATION_API_ERROR,
                    NOTIFICATION_ERROR_TITLE,
                    "OpenAI API key not configured. Please set up the integration properly."
                        .to_string(),
                )
                .await;
                return Err(CreateError::MissingApiKey);
            }
            Err(e) => {
                error!("Error generating automation: {}", e);
                self.notify_generation_error(context).await;
                return Err(CreateError::Upstream(e));
            }
        };

        let mut doc = match extract_document(&raw) {
            Ok(doc) => doc,
            Err(e) => {
                error!("Generated text is not a valid automation: {}", e);
                self.notify_generation_error(context).await;
                return Err(CreateError::Generation(e));
            }
        };

        let report = normalize(
            &mut doc,
            self.config.normalize_options(),
            description,
            &self.ids,
            Utc::now(),
        );

        let (missing_entities, missing_devices) = if self.config.validate_entities {
            let refs = extract_referenced_entities(&doc);
            let missing_entities =
                validate_entities_exist(&refs.entity_ids, |id| self.registries.entities.contains(id));
            let missing_devices =
                validate_entities_exist(&refs.device_ids, |id| self.registries.devices.contains(id));
            if append_missing_reference_warning(&mut doc, &missing_entities, &missing_devices) {
                warn!(
                    "Automation {} refers to {} unknown entities and {} unknown devices",
                    report.automation_id,
                    missing_entities.len(),
                    missing_devices.len()
                );
            }
            (missing_entities, missing_devices)
        } else {
            (BTreeSet::new(), BTreeSet::new())
        };

        let yaml = match format_for_automations_file(&doc) {
            Ok(yaml) => yaml,
            Err(e) => {
                error!("Error creating automation: {}", e);
                self.notify(
                    context,
                    NOTIFICATION_ERROR,
                    NOTIFICATION_ERROR_TITLE,
                    format!("Error creating automation: {}", e),
                )
                .await;
                return Err(CreateError::Render(e));
            }
        };

        self.history.record(GenerationRecord {
            request_id: request_id.clone(),
            description: description.to_string(),
            automation_id: report.automation_id.clone(),
            yaml: yaml.clone(),
            saved: false,
            created_at: Utc::now(),
        });

        let persisted = match self.sink.register(&doc, context).await {
            Ok(persisted) => {
                self.history.set_saved(&request_id, true);
                self.notify(
                    context,
                    NOTIFICATION_SUCCESS,
                    NOTIFICATION_SUCCESS_TITLE,
                    format!("Successfully created automation from: {}", description),
                )
                .await;
                Some(persisted)
            }
            Err(e) => {
                error!("Failed to save automation {}: {}", report.automation_id, e);
                self.notify(
                    context,
                    NOTIFICATION_WARNING,
                    NOTIFICATION_WARNING_TITLE,
                    "Automation was generated but could not be saved to file. Check the logs for details."
                        .to_string(),
                )
                .await;
                None
            }
        };

        Ok(CreateOutcome {
            request_id,
            automation_id: report.automation_id,
            yaml,
            saved: persisted.is_some(),
            persisted,
            missing_entities: missing_entities.into_iter().collect(),
            missing_devices: missing_devices.into_iter().collect(),
        })
    }
}
