//! Service call type for invoking Home Assistant services

use crate::Context;
use serde::{Deserialize, Serialize};

/// A call to a registered service
///
/// The AI automation creator receives its commands this way
/// (`ai_automation_creator.create_automation`) and hands finished documents
/// to the host the same way (`automation.create`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceCall {
    /// The domain the service belongs to (e.g., "automation")
    pub domain: String,

    /// The service name (e.g., "reload")
    pub service: String,

    /// Data passed to the service
    pub service_data: serde_json::Value,

    /// Context tracking who initiated this call
    pub context: Context,
}

impl ServiceCall {
    /// Create a new service call
    pub fn new(
        domain: impl Into<String>,
        service: impl Into<String>,
        service_data: serde_json::Value,
        context: Context,
    ) -> Self {
        Self {
            domain: domain.into(),
            service: service.into(),
            service_data,
            context,
        }
    }

    /// Borrow a string field from service_data
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.service_data.get(key).and_then(|v| v.as_str())
    }
}

/// Whether a service supports returning a response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SupportsResponse {
    /// Service never returns a response
    #[default]
    None,
    /// Service may optionally return a response
    Optional,
    /// Service always returns a response
    Only,
}
