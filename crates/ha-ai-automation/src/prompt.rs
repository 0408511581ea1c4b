//! Prompt building

use ha_registries::Registries;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Instruction sent as the system message of every request
pub const SYSTEM_PROMPT: &str = "\
You are an expert Home Assistant automation creator.
Your task is to create a valid automation for Home Assistant based on the user's description.

IMPORTANT: DO NOT ASK ANY QUESTIONS. Generate the best possible automation with the information provided.

Return ONLY the YAML for the automation, without any markdown formatting, explanations, or code blocks.
Do not include any questions, suggestions, or comments - ONLY the YAML content.

The YAML should be valid and ready to be copied directly into an automations.yaml file.

Format your response as a single automation with the following structure:
- id: unique_id_for_automation
  alias: Descriptive Name
  description: Optional longer description
  trigger:
    # trigger configuration
  condition:
    # condition configuration (if needed)
  action:
    # action configuration
";

/// Chat message author
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// What the model is told about one entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntitySummary {
    pub entity_id: String,
    pub name: String,
    pub domain: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub area: Option<String>,
}

/// Summaries of every enabled entity, in registry order
pub fn entity_snapshot(registries: &Registries) -> Vec<EntitySummary> {
    let snapshot: Vec<EntitySummary> = registries
        .entities
        .enabled()
        .iter()
        .map(|entry| EntitySummary {
            entity_id: entry.entity_id.clone(),
            name: entry.display_name().to_string(),
            domain: entry.domain().to_string(),
            device_class: entry.effective_device_class().map(String::from),
            area: registries.entity_area_name(entry),
        })
        .collect();
    debug!("Entity snapshot holds {} entities", snapshot.len());
    snapshot
}

/// Build the system and user messages for a description
pub fn build_prompt(description: &str, entities: Option<&[EntitySummary]>) -> Vec<ChatMessage> {
    let mut user = format!("Create a Home Assistant automation for: {}", description.trim());

    if let Some(entities) = entities.filter(|e| !e.is_empty()) {
        match serde_json::to_string_pretty(entities) {
            Ok(json) => {
                user.push_str("\n\nAvailable entities:\n");
                user.push_str(&json);
            }
            Err(e) => warn!("Leaving entities out of the prompt: {}", e),
        }
    }

    vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(user)]
}
