//! Home Assistant Built-in Components
//!
//! Host-side components an integration talks to:
//!
//! - [`persistent_notification`]: user-visible notifications, reachable
//!   through the `persistent_notification.*` services
//! - [`frontend`]: sidebar panels, extra JS modules and static file paths

pub mod frontend;
pub mod persistent_notification;

pub use frontend::{FrontendError, FrontendRegistry, Panel, StaticPath};
pub use persistent_notification::{
    register_services as register_notification_services, Notification,
    PersistentNotificationManager, UpdateType,
};
