//! Frontend registry
//!
//! Keeps track of what integrations add to the web UI: sidebar panels,
//! extra JS modules loaded by every page, and URL paths served straight
//! from disk.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Frontend registration errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrontendError {
    #[error("panel {0} is already registered")]
    PanelExists(String),

    #[error("static path {0} must start with '/'")]
    InvalidUrlPath(String),
}

/// A sidebar panel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Panel {
    /// Frontend component rendering the panel (`custom` for integration panels)
    pub component_name: String,
    /// Sidebar title
    pub title: Option<String>,
    /// Sidebar icon
    pub icon: Option<String>,
    /// URL path the panel is served at
    pub url_path: String,
    /// Component-specific configuration
    pub config: Option<serde_json::Value>,
    /// Only administrators see the panel
    pub require_admin: bool,
    pub config_panel_domain: Option<String>,
}

impl Panel {
    pub fn new(component_name: impl Into<String>, url_path: impl Into<String>) -> Self {
        Self {
            component_name: component_name.into(),
            title: None,
            icon: None,
            url_path: url_path.into(),
            config: None,
            require_admin: false,
            config_panel_domain: None,
        }
    }

    pub fn with_sidebar(mut self, title: impl Into<String>, icon: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self.icon = Some(icon.into());
        self
    }

    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        self.config = Some(config);
        self
    }

    pub fn admin_only(mut self) -> Self {
        self.require_admin = true;
        self
    }
}

/// A URL path served from a file or directory on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StaticPath {
    pub url_path: String,
    pub path: PathBuf,
    /// Whether clients may cache the response
    pub cache_headers: bool,
}

/// Registry of panels, extra JS modules and static paths
#[derive(Debug, Default)]
pub struct FrontendRegistry {
    panels: DashMap<String, Panel>,
    static_paths: DashMap<String, StaticPath>,
    extra_module_urls: RwLock<Vec<String>>,
}

impl FrontendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a panel under its URL path
    pub fn register_panel(&self, panel: Panel) -> Result<(), FrontendError> {
        if self.panels.contains_key(&panel.url_path) {
            return Err(FrontendError::PanelExists(panel.url_path));
        }
        info!(
            "Registered panel {} ({})",
            panel.url_path, panel.component_name
        );
        self.panels.insert(panel.url_path.clone(), panel);
        Ok(())
    }

    /// Remove a panel
    pub fn remove_panel(&self, url_path: &str) -> Option<Panel> {
        let removed = self.panels.remove(url_path).map(|(_, p)| p);
        if removed.is_none() {
            warn!("Removing unknown panel {}", url_path);
        }
        removed
    }

    pub fn panel(&self, url_path: &str) -> Option<Panel> {
        self.panels.get(url_path).map(|p| p.value().clone())
    }

    /// All panels, ordered by URL path
    pub fn panels(&self) -> Vec<Panel> {
        let mut panels: Vec<Panel> = self.panels.iter().map(|p| p.value().clone()).collect();
        panels.sort_by(|a, b| a.url_path.cmp(&b.url_path));
        panels
    }

    /// Serve `path` at `url_path`; a later registration replaces an earlier one
    pub fn register_static_path(
        &self,
        url_path: impl Into<String>,
        path: impl AsRef<Path>,
        cache_headers: bool,
    ) -> Result<(), FrontendError> {
        let url_path = url_path.into();
        if !url_path.starts_with('/') {
            return Err(FrontendError::InvalidUrlPath(url_path));
        }
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            warn!("Static path {} points at missing {:?}", url_path, path);
        }
        debug!("Serving {:?} at {}", path, url_path);
        self.static_paths.insert(
            url_path.clone(),
            StaticPath {
                url_path,
                path,
                cache_headers,
            },
        );
        Ok(())
    }

    pub fn remove_static_path(&self, url_path: &str) -> Option<StaticPath> {
        self.static_paths.remove(url_path).map(|(_, s)| s)
    }

    pub fn static_path(&self, url_path: &str) -> Option<StaticPath> {
        self.static_paths.get(url_path).map(|s| s.value().clone())
    }

    pub fn static_paths(&self) -> Vec<StaticPath> {
        let mut paths: Vec<StaticPath> =
            self.static_paths.iter().map(|s| s.value().clone()).collect();
        paths.sort_by(|a, b| a.url_path.cmp(&b.url_path));
        paths
    }

    /// Load a JS module on every frontend page; duplicates are ignored
    pub fn add_extra_js_url(&self, url: impl Into<String>) {
        let url = url.into();
        if let Ok(mut urls) = self.extra_module_urls.write() {
            if !urls.contains(&url) {
                debug!("Added extra JS module {}", url);
                urls.push(url);
            }
        }
    }

    pub fn remove_extra_js_url(&self, url: &str) {
        if let Ok(mut urls) = self.extra_module_urls.write() {
            urls.retain(|u| u != url);
        }
    }

    pub fn extra_js_urls(&self) -> Vec<String> {
        self.extra_module_urls
            .read()
            .map(|urls| urls.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn creator_panel() -> Panel {
        Panel::new("custom", "ai_automation_creator")
            .with_sidebar("AI Automation", "mdi:robot")
            .with_config(json!({"_panel_custom": {"name": "ai-automation-creator"}}))
            .admin_only()
    }

    #[test]
    fn test_register_panel() {
        let registry = FrontendRegistry::new();
        registry.register_panel(creator_panel()).unwrap();

        let panel = registry.panel("ai_automation_creator").unwrap();
        assert!(panel.require_admin);
        assert_eq!(panel.title.as_deref(), Some("AI Automation"));

        assert_eq!(
            registry.register_panel(creator_panel()),
            Err(FrontendError::PanelExists("ai_automation_creator".to_string()))
        );

        assert!(registry.remove_panel("ai_automation_creator").is_some());
        assert!(registry.panels().is_empty());
    }

    #[test]
    fn test_static_paths() {
        let registry = FrontendRegistry::new();
        assert!(matches!(
            registry.register_static_path("relative/main.js", "/tmp/main.js", true),
            Err(FrontendError::InvalidUrlPath(_))
        ));

        registry
            .register_static_path("/ai_automation_creator/frontend/main.js", "/tmp/main.js", true)
            .unwrap();
        let entry = registry
            .static_path("/ai_automation_creator/frontend/main.js")
            .unwrap();
        assert_eq!(entry.path, PathBuf::from("/tmp/main.js"));
        assert_eq!(registry.static_paths().len(), 1);
    }

    #[test]
    fn test_extra_js_urls_deduplicated() {
        let registry = FrontendRegistry::new();
        registry.add_extra_js_url("/ai_automation_creator/frontend/main.js");
        registry.add_extra_js_url("/ai_automation_creator/frontend/main.js");
        assert_eq!(registry.extra_js_urls().len(), 1);

        registry.remove_extra_js_url("/ai_automation_creator/frontend/main.js");
        assert!(registry.extra_js_urls().is_empty());
    }
}
