//! Constants for the AI Automation Creator integration

/// Integration domain, also the `configuration.yaml` section name
pub const DOMAIN: &str = "ai_automation_creator";

/// Title of the config entry
pub const TITLE: &str = "AI Automation Creator";

pub const CONF_OPENAI_API_KEY: &str = "openai_api_key";
pub const CONF_MODEL: &str = "model";

pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_TEMPERATURE: f32 = 0.2;
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_SIDEBAR_TITLE: &str = "AI Automation";
pub const DEFAULT_SIDEBAR_ICON: &str = "mdi:robot";
pub const DEFAULT_HISTORY_SIZE: usize = 10;

// Services
pub const SERVICE_CREATE_AUTOMATION: &str = "create_automation";
pub const SERVICE_GET_AUTOMATION_YAML: &str = "get_automation_yaml";

// Frontend
pub const PANEL_URL_PATH: &str = DOMAIN;
pub const PANEL_COMPONENT: &str = "custom";
pub const PANEL_ELEMENT: &str = "ai-automation-creator";
pub const FRONTEND_SCRIPT_URL: &str = "/ai_automation_creator/frontend/main.js";
pub const FRONTEND_SCRIPT_PATH: &str = "custom_components/ai_automation_creator/frontend/main.js";

// automations.yaml comments
pub const FILE_HEADER: &str = "# Automations created by AI Automation Creator\n\n";
pub const ENTRY_COMMENT: &str = "# AI Generated Automation";

// Notifications
pub const NOTIFICATION_ERROR_TITLE: &str = "AI Automation Creator Error";
pub const NOTIFICATION_SUCCESS_TITLE: &str = "AI Automation Creator Success";
pub const NOTIFICATION_WARNING_TITLE: &str = "AI Automation Creator Warning";

pub const NOTIFICATION_API_ERROR: &str = "ai_automation_creator_api_error";
pub const NOTIFICATION_GENERATION_ERROR: &str = "ai_automation_creator_generation_error";
pub const NOTIFICATION_SUCCESS: &str = "ai_automation_creator_success";
pub const NOTIFICATION_WARNING: &str = "ai_automation_creator_warning";
pub const NOTIFICATION_ERROR: &str = "ai_automation_creator_error";
