//! Service registry with async handlers for Home Assistant
//!
//! Services are how commands reach an integration
//! (`ai_automation_creator.create_automation`) and how an integration asks
//! the host to do something (`automation.reload`). A service may carry a JSON
//! schema; data that does not match it is rejected before the handler runs.

use dashmap::DashMap;
use ha_core::{Context, ServiceCall, SupportsResponse};
use jsonschema::JSONSchema;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, instrument, warn};

/// Result type for service calls
pub type ServiceResult = Result<Option<serde_json::Value>, ServiceError>;

/// Future type for async service handlers
pub type ServiceFuture = Pin<Box<dyn Future<Output = ServiceResult> + Send>>;

/// Service handler function type
pub type ServiceHandler = Arc<dyn Fn(ServiceCall) -> ServiceFuture + Send + Sync>;

/// Errors that can occur when working with services
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    #[error("service not found: {domain}.{service}")]
    NotFound { domain: String, service: String },

    #[error("service call failed: {0}")]
    CallFailed(String),

    #[error("invalid service data: {0}")]
    InvalidData(String),

    #[error("service does not support responses")]
    ResponseNotSupported,
}

/// Information about a registered service
#[derive(Debug, Clone)]
pub struct ServiceDescription {
    /// Domain the service belongs to
    pub domain: String,
    /// Service name
    pub service: String,
    /// Human-readable name
    pub name: Option<String>,
    /// Description of what the service does
    pub description: Option<String>,
    /// JSON schema for service data (optional)
    pub schema: Option<serde_json::Value>,
    /// Whether this service supports returning a response
    pub supports_response: SupportsResponse,
}

impl ServiceDescription {
    /// Describe a service with no schema and no response
    pub fn new(domain: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            service: service.into(),
            name: None,
            description: None,
            schema: None,
            supports_response: SupportsResponse::None,
        }
    }

    /// Set the human-readable name and description
    pub fn with_text(mut self, name: impl Into<String>, description: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self.description = Some(description.into());
        self
    }

    /// Set the JSON schema for service data
    pub fn with_schema(mut self, schema: serde_json::Value) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Set response support
    pub fn with_response(mut self, supports_response: SupportsResponse) -> Self {
        self.supports_response = supports_response;
        self
    }
}

struct RegisteredService {
    handler: ServiceHandler,
    description: ServiceDescription,
    validator: Option<Arc<JSONSchema>>,
}

/// The service registry manages all registered services
pub struct ServiceRegistry {
    /// Services indexed by "domain.service" key
    services: DashMap<String, RegisteredService>,
}

impl ServiceRegistry {
    /// Create a new empty service registry
    pub fn new() -> Self {
        Self {
            services: DashMap::new(),
        }
    }

    /// Register a new service
    ///
    /// # Arguments
    /// * `domain` - The domain the service belongs to (e.g., "automation")
    /// * `service` - The service name (e.g., "reload")
    /// * `handler` - Async function to handle service calls
    /// * `schema` - Optional JSON schema for validating service data
    /// * `supports_response` - Whether the service can return a response
    #[instrument(skip(self, domain, service, handler, schema))]
    pub fn register<F, Fut>(
        &self,
        domain: impl Into<String>,
        service: impl Into<String>,
        handler: F,
        schema: Option<serde_json::Value>,
        supports_response: SupportsResponse,
    ) where
        F: Fn(ServiceCall) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ServiceResult> + Send + 'static,
    {
        let mut description =
            ServiceDescription::new(domain, service).with_response(supports_response);
        description.schema = schema;
        self.register_with_description(description, handler);
    }

    /// Register a service with full description
    #[instrument(skip(self, handler), fields(domain = %description.domain, service = %description.service))]
    pub fn register_with_description<F, Fut>(&self, description: ServiceDescription, handler: F)
    where
        F: Fn(ServiceCall) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ServiceResult> + Send + 'static,
    {
        let key = format!("{}.{}", description.domain, description.service);
        debug!("Registering service {}", key);

        let handler: ServiceHandler =
            Arc::new(move |call| Box::pin(handler(call)) as ServiceFuture);

        let validator = description.schema.as_ref().and_then(|schema| {
            match JSONSchema::compile(schema) {
                Ok(compiled) => Some(Arc::new(compiled)),
                Err(e) => {
                    warn!("Schema for {} does not compile, data is not checked: {}", key, e);
                    None
                }
            }
        });

        self.services.insert(
            key,
            RegisteredService {
                handler,
                description,
                validator,
            },
        );
    }

    /// Call a service
    ///
    /// # Arguments
    /// * `domain` - The domain of the service
    /// * `service` - The service name
    /// * `service_data` - Data to pass to the service
    /// * `context` - Context for tracking the call origin
    /// * `return_response` - Whether to return the service response
    #[instrument(skip(self, service_data, context))]
    pub async fn call(
        &self,
        domain: &str,
        service: &str,
        service_data: serde_json::Value,
        context: Context,
        return_response: bool,
    ) -> ServiceResult {
        let key = format!("{}.{}", domain, service);

        let registered = self.services.get(&key).ok_or_else(|| {
            warn!(domain = %domain, service = %service, "Service not found");
            ServiceError::NotFound {
                domain: domain.to_string(),
                service: service.to_string(),
            }
        })?;

        if return_response && registered.description.supports_response == SupportsResponse::None {
            return Err(ServiceError::ResponseNotSupported);
        }

        let handler = registered.handler.clone();
        let validator = registered.validator.clone();
        drop(registered); // Release the shard lock before running the handler

        if let Some(validator) = validator {
            validate_data(&validator, &service_data)?;
        }

        let call = ServiceCall::new(domain, service, service_data, context);

        debug!(domain = %domain, service = %service, "Calling service");

        let result = handler(call).await?;

        if return_response {
            Ok(result)
        } else {
            Ok(None)
        }
    }

    /// Check if a service exists
    pub fn has_service(&self, domain: &str, service: &str) -> bool {
        let key = format!("{}.{}", domain, service);
        self.services.contains_key(&key)
    }

    /// Get all registered services grouped by domain
    pub fn all_services(&self) -> HashMap<String, Vec<ServiceDescription>> {
        let mut result: HashMap<String, Vec<ServiceDescription>> = HashMap::new();

        for entry in self.services.iter() {
            result
                .entry(entry.description.domain.clone())
                .or_default()
                .push(entry.description.clone());
        }

        result
    }

    /// Unregister all services for a domain
    #[instrument(skip(self))]
    pub fn unregister_domain(&self, domain: &str) -> usize {
        let before = self.services.len();
        self.services.retain(|_, s| s.description.domain != domain);
        let count = before - self.services.len();

        debug!(domain = %domain, count = count, "Unregistered domain services");
        count
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_data(validator: &JSONSchema, data: &serde_json::Value) -> Result<(), ServiceError> {
    if let Err(errors) = validator.validate(data) {
        let messages: Vec<String> = errors
            .map(|e| {
                let path = e.instance_path.to_string();
                if path.is_empty() {
                    e.to_string()
                } else {
                    format!("{}: {}", path, e)
                }
            })
            .collect();
        return Err(ServiceError::InvalidData(messages.join("; ")));
    }
    Ok(())
}

/// Thread-safe wrapper for ServiceRegistry
pub type SharedServiceRegistry = Arc<ServiceRegistry>;
