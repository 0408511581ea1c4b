//! Sidebar panel and frontend module

use std::path::Path;

use ha_components::{FrontendError, FrontendRegistry, Panel};
use serde_json::json;
use tracing::debug;

use crate::config::AiAutomationConfig;
use crate::constants::*;

/// Register the admin panel, serve the panel script and load it as an extra module
pub fn register_panel(
    frontend: &FrontendRegistry,
    config: &AiAutomationConfig,
    config_dir: &Path,
) -> Result<(), FrontendError> {
    frontend.register_panel(
        Panel::new(PANEL_COMPONENT, PANEL_URL_PATH)
            .with_sidebar(config.sidebar_title.clone(), config.sidebar_icon.clone())
            .with_config(json!({
                "_panel_custom": {
                    "name": PANEL_ELEMENT,
                    "embed_iframe": false
                }
            }))
            .admin_only(),
    )?;

    frontend.register_static_path(FRONTEND_SCRIPT_URL, config_dir.join(FRONTEND_SCRIPT_PATH), true)?;
    frontend.add_extra_js_url(FRONTEND_SCRIPT_URL);

    debug!("Registered panel {}", PANEL_URL_PATH);
    Ok(())
}

pub fn remove_panel(frontend: &FrontendRegistry) {
    frontend.remove_panel(PANEL_URL_PATH);
    frontend.remove_static_path(FRONTEND_SCRIPT_URL);
    frontend.remove_extra_js_url(FRONTEND_SCRIPT_URL);
}
