//! The host's `automation` domain
//!
//! Loads `automations.yaml` into an [`AutomationManager`] and exposes
//! `automation.create` and `automation.reload`. Created automations are
//! appended to the same file the AI Automation Creator falls back to.

use std::sync::Arc;

use ha_automation::{
    keys, AutomationDocument, AutomationError, AutomationManager, AutomationResult,
    AutomationsFile,
};
use ha_core::{ServiceCall, SupportsResponse, AUTOMATION_DOMAIN};
use ha_service_registry::{ServiceDescription, ServiceError, ServiceRegistry};
use serde_json::json;
use tracing::{info, warn};

/// Automations known to the host
pub struct AutomationHost {
    manager: AutomationManager,
    file: Arc<AutomationsFile>,
}

impl AutomationHost {
    pub fn new(file: Arc<AutomationsFile>) -> Self {
        Self {
            manager: AutomationManager::new(),
            file,
        }
    }

    pub fn manager(&self) -> &AutomationManager {
        &self.manager
    }

    /// Replace the loaded automations with the file's contents
    pub async fn load(&self) -> AutomationResult<usize> {
        let documents = self.file.read_all().await?;
        self.manager.reload(documents)
    }

    /// Add an automation and append it to the file
    ///
    /// Nothing is written when the automation is rejected, and nothing stays
    /// loaded when the write fails.
    pub async fn create(&self, mut document: AutomationDocument) -> AutomationResult<String> {
        if document.id().is_none() {
            document.insert_first(keys::ID, ulid::Ulid::new().to_string().to_lowercase());
        }

        let id = self.manager.add(document.clone())?;
        if let Err(e) = self.file.append(&document, None).await {
            self.manager.remove(&id)?;
            return Err(e);
        }
        Ok(id)
    }
}

fn to_service_error(error: AutomationError) -> ServiceError {
    match error {
        AutomationError::Io(e) => ServiceError::CallFailed(e.to_string()),
        other => ServiceError::InvalidData(other.to_string()),
    }
}

/// Register `automation.create` and `automation.reload`
pub fn register_services(services: &ServiceRegistry, host: Arc<AutomationHost>) {
    let create_host = host.clone();
    services.register_with_description(
        ServiceDescription::new(AUTOMATION_DOMAIN, "create")
            .with_text("Create", "Adds an automation and saves it to automations.yaml")
            .with_schema(json!({"type": "object"}))
            .with_response(SupportsResponse::Optional),
        move |call: ServiceCall| {
            let host = create_host.clone();
            async move {
                let document = AutomationDocument::from_json(call.service_data)
                    .map_err(|e| ServiceError::InvalidData(e.to_string()))?;
                let id = host.create(document).await.map_err(to_service_error)?;
                info!("Created automation {}", id);
                Ok(Some(json!({ "id": id })))
            }
        },
    );

    services.register_with_description(
        ServiceDescription::new(AUTOMATION_DOMAIN, "reload")
            .with_text("Reload", "Reloads the automation configuration"),
        move |_call: ServiceCall| {
            let host = host.clone();
            async move {
                let count = host.load().await.map_err(|e| {
                    warn!("Reloading automations failed: {}", e);
                    to_service_error(e)
                })?;
                info!("Reloaded {} automations", count);
                Ok(None)
            }
        },
    );
}
