//! Automation management
//!
//! The AutomationManager holds the automations the host has loaded from
//! `automations.yaml` or received through `automation.create`.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::document::{keys, AutomationDocument, DocumentError};

/// Automation errors
#[derive(Debug, Error)]
pub enum AutomationError {
    #[error("Automation not found: {0}")]
    NotFound(String),

    #[error("Automation with ID {0} already exists")]
    Duplicate(String),

    #[error("Invalid automation configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for automation operations
pub type AutomationResult<T> = Result<T, AutomationError>;

/// Execution mode for automations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Ignore new triggers while running
    #[default]
    Single,
    /// Restart from beginning on new trigger
    Restart,
    /// Queue triggers
    Queued,
    /// Run all simultaneously
    Parallel,
}

impl ExecutionMode {
    fn parse(mode: &str) -> Option<Self> {
        match mode {
            "single" => Some(Self::Single),
            "restart" => Some(Self::Restart),
            "queued" => Some(Self::Queued),
            "parallel" => Some(Self::Parallel),
            _ => None,
        }
    }
}

/// A loaded automation
#[derive(Debug, Clone)]
pub struct Automation {
    /// Unique identifier
    pub id: String,
    /// Human-readable name
    pub alias: Option<String>,
    /// Execution mode
    pub mode: ExecutionMode,
    /// The full document as written
    pub document: AutomationDocument,
    /// When the automation was loaded
    pub loaded_at: DateTime<Utc>,
}

impl Automation {
    /// Build from a document
    ///
    /// Automations without an `id` get a generated one.
    pub fn from_document(document: AutomationDocument) -> AutomationResult<Self> {
        let id = document
            .id()
            .unwrap_or_else(|| ulid::Ulid::new().to_string().to_lowercase());

        let mode = match document.get(keys::MODE) {
            None => ExecutionMode::default(),
            Some(value) => value
                .as_str()
                .and_then(ExecutionMode::parse)
                .ok_or_else(|| {
                    AutomationError::InvalidConfig(format!(
                        "automation {} has unknown mode {:?}",
                        id, value
                    ))
                })?,
        };

        Ok(Self {
            id,
            alias: document.alias().map(String::from),
            mode,
            document,
            loaded_at: Utc::now(),
        })
    }

    /// Get display name (alias or ID)
    pub fn display_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.id)
    }
}

/// Manages all automations
pub struct AutomationManager {
    /// All automations by ID
    automations: DashMap<String, Automation>,
}

impl AutomationManager {
    /// Create a new automation manager
    pub fn new() -> Self {
        Self {
            automations: DashMap::new(),
        }
    }

    /// Load automations from documents
    ///
    /// A later document with the same id replaces an earlier one. Documents
    /// that are not valid automations are skipped.
    pub fn load(&self, documents: Vec<AutomationDocument>) -> AutomationResult<usize> {
        let mut loaded = 0;
        for automation in valid_automations(documents) {
            debug!(
                "Loaded automation: {} ({})",
                automation.display_name(),
                automation.id
            );
            self.automations.insert(automation.id.clone(), automation);
            loaded += 1;
        }
        Ok(loaded)
    }

    /// Add a new automation, rejecting duplicate ids
    pub fn add(&self, document: AutomationDocument) -> AutomationResult<String> {
        let automation = Automation::from_document(document)?;
        let id = automation.id.clone();

        if self.automations.contains_key(&id) {
            return Err(AutomationError::Duplicate(id));
        }

        info!(
            "Added automation: {} ({})",
            automation.display_name(),
            automation.id
        );
        self.automations.insert(id.clone(), automation);
        Ok(id)
    }

    /// Get an automation by ID
    pub fn get(&self, id: &str) -> Option<Automation> {
        self.automations.get(id).map(|a| a.value().clone())
    }

    /// Get automation count
    pub fn count(&self) -> usize {
        self.automations.len()
    }

    /// Remove an automation
    pub fn remove(&self, id: &str) -> AutomationResult<Automation> {
        self.automations
            .remove(id)
            .map(|(_, a)| a)
            .ok_or_else(|| AutomationError::NotFound(id.to_string()))
    }

    /// Replace every automation with the given documents
    ///
    /// Invalid documents are skipped like in [`AutomationManager::load`].
    pub fn reload(&self, documents: Vec<AutomationDocument>) -> AutomationResult<usize> {
        let staged = valid_automations(documents);

        self.automations.clear();
        for automation in staged {
            self.automations.insert(automation.id.clone(), automation);
        }

        info!("Reloaded {} automations", self.automations.len());
        Ok(self.automations.len())
    }
}

/// Documents that turn into automations, warning about the rest
fn valid_automations(documents: Vec<AutomationDocument>) -> Vec<Automation> {
    documents
        .into_iter()
        .enumerate()
        .filter_map(|(index, document)| match Automation::from_document(document) {
            Ok(automation) => Some(automation),
            Err(e) => {
                warn!("Skipping automation #{}: {}", index + 1, e);
                None
            }
        })
        .collect()
}

impl Default for AutomationManager {
    fn default() -> Self {
        Self::new()
    }
}
