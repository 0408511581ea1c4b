//! Persistent Notification Component
//!
//! In-memory notification system for UI alerts, exposed through the
//! `persistent_notification.create`, `dismiss` and `dismiss_all` services.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use ha_core::{ServiceCall, SupportsResponse};
use ha_service_registry::{ServiceDescription, ServiceError, ServiceRegistry};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};

/// Domain name for persistent notification services
pub const DOMAIN: &str = "persistent_notification";

/// A persistent notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    /// Unique notification ID
    pub notification_id: String,
    /// Notification message (supports markdown)
    pub message: String,
    /// Optional title
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// Create a new notification
    pub fn new(notification_id: String, message: String, title: Option<String>) -> Self {
        Self {
            notification_id,
            message,
            title,
            created_at: Utc::now(),
        }
    }
}

/// What a create call did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateType {
    /// Notification was added
    Added,
    /// Notification with the same ID was replaced
    Updated,
}

/// Persistent Notification Manager
///
/// Thread-safe in-memory notification storage. Creating an existing ID
/// replaces it; dismissing an unknown ID is a no-op.
#[derive(Debug, Default)]
pub struct PersistentNotificationManager {
    notifications: DashMap<String, Notification>,
}

impl PersistentNotificationManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace a notification
    pub fn create(
        &self,
        notification_id: String,
        message: String,
        title: Option<String>,
    ) -> (Notification, UpdateType) {
        let notification = Notification::new(notification_id.clone(), message, title);
        let previous = self
            .notifications
            .insert(notification_id.clone(), notification.clone());

        let update_type = if previous.is_some() {
            debug!("Updated notification: {}", notification_id);
            UpdateType::Updated
        } else {
            info!("Created notification: {}", notification_id);
            UpdateType::Added
        };

        (notification, update_type)
    }

    /// Dismiss a notification
    pub fn dismiss(&self, notification_id: &str) -> Option<Notification> {
        let removed = self.notifications.remove(notification_id).map(|(_, n)| n);
        if removed.is_some() {
            info!("Dismissed notification: {}", notification_id);
        } else {
            debug!(
                "Attempted to dismiss non-existent notification: {}",
                notification_id
            );
        }
        removed
    }

    /// Dismiss all notifications
    pub fn dismiss_all(&self) -> usize {
        let count = self.notifications.len();
        self.notifications.clear();
        if count > 0 {
            info!("Dismissed all {} notifications", count);
        }
        count
    }

    /// Get a notification by ID
    pub fn get(&self, notification_id: &str) -> Option<Notification> {
        self.notifications
            .get(notification_id)
            .map(|r| r.value().clone())
    }

    pub fn len(&self) -> usize {
        self.notifications.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notifications.is_empty()
    }
}

/// Register the `persistent_notification` services
pub fn register_services(services: &ServiceRegistry, manager: Arc<PersistentNotificationManager>) {
    let create_manager = manager.clone();
    services.register_with_description(
        ServiceDescription::new(DOMAIN, "create")
            .with_text("Create", "Shows a notification on the notifications panel")
            .with_schema(json!({
                "type": "object",
                "properties": {
                    "message": {"type": "string"},
                    "title": {"type": "string"},
                    "notification_id": {"type": "string"}
                },
                "required": ["message"]
            })),
        move |call: ServiceCall| {
            let manager = create_manager.clone();
            async move {
                let message = call
                    .get_str("message")
                    .ok_or_else(|| ServiceError::InvalidData("message is required".to_string()))?
                    .to_string();
                let title = call.get_str("title").map(String::from);
                let notification_id = call
                    .get_str("notification_id")
                    .map(String::from)
                    .unwrap_or_else(|| call.context.id.clone());

                manager.create(notification_id, message, title);
                Ok(None)
            }
        },
    );

    let dismiss_manager = manager.clone();
    services.register_with_description(
        ServiceDescription::new(DOMAIN, "dismiss")
            .with_text("Dismiss", "Removes a notification from the notifications panel")
            .with_schema(json!({
                "type": "object",
                "properties": {"notification_id": {"type": "string"}},
                "required": ["notification_id"]
            })),
        move |call: ServiceCall| {
            let manager = dismiss_manager.clone();
            async move {
                if let Some(id) = call.get_str("notification_id") {
                    manager.dismiss(id);
                }
                Ok(None)
            }
        },
    );

    services.register_with_description(
        ServiceDescription::new(DOMAIN, "dismiss_all")
            .with_text("Dismiss all", "Removes all notifications from the notifications panel")
            .with_response(SupportsResponse::None),
        move |_call: ServiceCall| {
            let manager = manager.clone();
            async move {
                manager.dismiss_all();
                Ok(None)
            }
        },
    );
}
