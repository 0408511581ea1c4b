//! Pulling an automation document out of free-form model output

use std::borrow::Cow;

use serde_yaml::Value;
use tracing::debug;

use crate::document::{value_kind, AutomationDocument, DocumentError, DocumentResult};

const FENCE: &str = "```";

/// Remove markdown code fences around the YAML
///
/// The first fenced block wins. The opening fence may carry an info string
/// (```` ```yaml ````); a block without a closing fence runs to the end of
/// the text. When the first fence opens no body (a lone closing fence after
/// the YAML, or an empty block) the fence markers are dropped and the rest
/// of the text is kept. Text without any fence is returned unchanged.
pub fn strip_code_fences(text: &str) -> Cow<'_, str> {
    let Some(open) = text.find(FENCE) else {
        return Cow::Borrowed(text);
    };

    let after_open = &text[open + FENCE.len()..];
    let body = match after_open.find('\n') {
        Some(newline) => &after_open[newline + 1..],
        None => "",
    };

    let inner = match body.find(FENCE) {
        Some(close) => &body[..close],
        None => body,
    };

    let inner = inner.trim();
    if inner.is_empty() {
        return Cow::Owned(remove_fence_markers(text));
    }
    Cow::Owned(inner.to_string())
}

/// Drop every fence marker along with an info string right after it
fn remove_fence_markers(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(at) = rest.find(FENCE) {
        out.push_str(&rest[..at]);
        rest = rest[at + FENCE.len()..].trim_start_matches(|c: char| c.is_ascii_alphanumeric());
    }
    out.push_str(rest);
    out.trim().to_string()
}

/// Parse text as an automation document
///
/// A top-level list (the `automations.yaml` shape) yields its first mapping.
pub fn parse_document(text: &str) -> DocumentResult<AutomationDocument> {
    let value: Value = serde_yaml::from_str(text)?;

    match value {
        Value::Null => Err(DocumentError::Empty),
        Value::Sequence(items) => {
            let count = items.len();
            let first = items
                .into_iter()
                .find(Value::is_mapping)
                .ok_or(DocumentError::EmptyList)?;
            if count > 1 {
                debug!("Generated YAML holds {} items, keeping the first automation", count);
            }
            AutomationDocument::from_value(first)
        }
        Value::Mapping(_) | Value::Tagged(_) => AutomationDocument::from_value(value),
        other => Err(DocumentError::NotAMapping(value_kind(&other))),
    }
}

/// Strip fences from raw model output and parse the result
pub fn extract_document(raw: &str) -> DocumentResult<AutomationDocument> {
    parse_document(&strip_code_fences(raw))
}
