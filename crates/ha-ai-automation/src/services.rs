//! `ai_automation_creator.*` services

use std::sync::Arc;

use ha_core::{ServiceCall, SupportsResponse};
use ha_service_registry::{ServiceDescription, ServiceError, ServiceRegistry};
use serde_json::json;
use tracing::info;

use crate::constants::*;
use crate::creator::{AutomationCreator, CreateRequest};
use crate::error::CreateError;

/// Register `create_automation` and `get_automation_yaml`
pub fn register_services(services: &ServiceRegistry, creator: Arc<AutomationCreator>) {
    let create_creator = creator.clone();
    services.register_with_description(
        ServiceDescription::new(DOMAIN, SERVICE_CREATE_AUTOMATION)
            .with_text(
                "Create automation",
                "Creates an automation from a plain-language description",
            )
            .with_schema(json!({
                "type": "object",
                "properties": {
                    "description": {"type": "string", "minLength": 1},
                    "model": {"type": "string", "minLength": 1}
                },
                "required": ["description"],
                "additionalProperties": false
            }))
            .with_response(SupportsResponse::Optional),
        move |call: ServiceCall| {
            let creator = create_creator.clone();
            async move {
                let request = CreateRequest {
                    description: call.get_str("description").unwrap_or_default().to_string(),
                    model: call.get_str("model").map(String::from),
                    context: call.context.clone(),
                };
                let outcome = creator.create(request).await.map_err(|e| match e {
                    CreateError::InvalidInput => ServiceError::InvalidData(e.to_string()),
                    other => ServiceError::CallFailed(other.to_string()),
                })?;
                let response = serde_json::to_value(&outcome)
                    .map_err(|e| ServiceError::CallFailed(e.to_string()))?;
                Ok(Some(response))
            }
        },
    );

    services.register_with_description(
        ServiceDescription::new(DOMAIN, SERVICE_GET_AUTOMATION_YAML)
            .with_text(
                "Get automation YAML",
                "Returns the YAML of the most recently generated automation",
            )
            .with_schema(json!({
                "type": "object",
                "properties": {
                    "request_id": {"type": "string"}
                },
                "additionalProperties": false
            }))
            .with_response(SupportsResponse::Only),
        move |call: ServiceCall| {
            let creator = creator.clone();
            async move {
                let record = match call.get_str("request_id") {
                    Some(request_id) => Some(creator.history().get(request_id).ok_or_else(|| {
                        ServiceError::InvalidData(format!("unknown request_id {}", request_id))
                    })?),
                    None => creator.history().latest(),
                };
                let yaml = record.map(|r| r.yaml).unwrap_or_default();
                Ok(Some(json!({ "yaml": yaml })))
            }
        },
    );

    info!("AI Automation Creator services registered");
}

/// Remove every service of the integration
pub fn unregister_services(services: &ServiceRegistry) -> usize {
    services.unregister_domain(DOMAIN)
}
