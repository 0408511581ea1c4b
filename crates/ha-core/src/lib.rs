//! Core types for Home Assistant
//!
//! The primitives every other crate in the workspace agrees on: the
//! [`Context`] that travels with a service call, the [`ServiceCall`] itself,
//! and the constants naming the host's `automation` domain.

mod context;
mod service_call;

pub use context::Context;
pub use service_call::{ServiceCall, SupportsResponse};

/// Domain of the host's automation integration
pub const AUTOMATION_DOMAIN: &str = "automation";

/// Default name of the file holding YAML-defined automations
pub const AUTOMATIONS_FILE: &str = "automations.yaml";
