//! Error types for the AI Automation Creator

use ha_automation::{AutomationError, DocumentError};
use ha_components::FrontendError;
use ha_config::ConfigError;
use ha_registries::StorageError;
use ha_service_registry::ServiceError;
use thiserror::Error;

/// Errors from the completion API
#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("OpenAI API key not configured")]
    NotConfigured,

    #[error("request to the completion API failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("completion API returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("completion API returned no choices")]
    EmptyResponse,

    #[error("unexpected completion API response: {0}")]
    InvalidResponse(String),
}

pub type GeneratorResult<T> = Result<T, GeneratorError>;

/// Errors while handing a generated automation to the host
#[derive(Debug, Error)]
pub enum SinkError {
    #[error(transparent)]
    Automation(#[from] AutomationError),

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error("automation service call failed: {0}")]
    Service(#[from] ServiceError),

    #[error("registration failed ({service}) and writing automations.yaml failed too ({file})")]
    Fallback {
        service: ServiceError,
        file: AutomationError,
    },
}

pub type SinkResult<T> = Result<T, SinkError>;

/// Why a create request produced no automation
///
/// Persistence problems are not in here: the automation still exists in the
/// generation history and the outcome reports it as unsaved.
#[derive(Debug, Error)]
pub enum CreateError {
    #[error("description must not be empty")]
    InvalidInput,

    #[error("OpenAI API key not configured")]
    MissingApiKey,

    #[error("automation generation failed: {0}")]
    Upstream(#[source] GeneratorError),

    #[error("generated text is not an automation: {0}")]
    Generation(#[source] DocumentError),

    #[error("failed to render the automation: {0}")]
    Render(#[source] DocumentError),
}

pub type CreateResult<T> = Result<T, CreateError>;

/// Errors while setting up or unloading the integration
#[derive(Debug, Error)]
pub enum SetupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Frontend(#[from] FrontendError),

    #[error(transparent)]
    Generator(#[from] GeneratorError),

    #[error("failed to store entry options: {0}")]
    Storage(#[from] StorageError),
}
