//! Automation documents
//!
//! Everything the host and the AI automation creator do with automation
//! YAML:
//!
//! - [`extract`]: pull a document out of free-form model output
//! - [`normalize`]: bring it into canonical shape
//! - [`references`]: find and check the entities and devices it refers to
//! - [`format`]: read and write `automations.yaml`
//! - [`manager`]: the host's in-memory set of loaded automations
//! - [`automations_file`]: serialized appends to `automations.yaml`
//!
//! # Key Types
//!
//! - [`AutomationDocument`] - An automation as an ordered YAML mapping
//! - [`IdGenerator`] - Strictly increasing millisecond ids
//! - [`AutomationManager`] - Manages all loaded automations

pub mod automations_file;
pub mod document;
pub mod extract;
pub mod format;
pub mod manager;
pub mod normalize;
pub mod references;

pub use automations_file::{AppendComments, AutomationsFile};
pub use document::{keys, AutomationDocument, DocumentError, DocumentResult};
pub use extract::{extract_document, parse_document, strip_code_fences};
pub use format::{format_for_automations_file, parse_automations_file};
pub use manager::{Automation, AutomationError, AutomationManager, AutomationResult, ExecutionMode};
pub use normalize::{
    assign_trigger_ids, canonicalize_keys, ensure_identifier, ensure_unique_trigger_ids,
    normalize, restructure_actions, slugify, IdGenerator, IdStrategy, NormalizeOptions,
    NormalizeReport,
};
pub use references::{
    append_missing_reference_warning, extract_referenced_entities, validate_entities_exist,
    EntityReferences,
};
