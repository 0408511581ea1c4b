//! Reading and writing `automations.yaml`

use serde_yaml::Value;
use tracing::warn;

use crate::document::{value_kind, AutomationDocument, DocumentError, DocumentResult};

/// Render a document as one list item of `automations.yaml`
///
/// The first line starts with `- `, every following line is indented by two
/// spaces. Blank lines inside block scalars stay blank. Only the final line
/// break is left off, so a kept (`|+`) block scalar at the end keeps its
/// trailing blank lines once the caller terminates the item.
pub fn format_for_automations_file(doc: &AutomationDocument) -> DocumentResult<String> {
    let yaml = doc.to_yaml_string()?;
    let mut lines = yaml.strip_suffix('\n').unwrap_or(&yaml).split('\n');

    let mut out = String::with_capacity(yaml.len() + 64);
    out.push_str("- ");
    out.push_str(lines.next().unwrap_or("{}"));
    for line in lines {
        out.push('\n');
        if !line.is_empty() {
            out.push_str("  ");
            out.push_str(line);
        }
    }
    Ok(out)
}

/// Parse the contents of `automations.yaml`
///
/// An empty file (or one holding only comments) has no automations. A file
/// holding a single mapping is read as one automation. List items that are
/// not mappings are skipped.
pub fn parse_automations_file(text: &str) -> DocumentResult<Vec<AutomationDocument>> {
    let value: Value = serde_yaml::from_str(text)?;

    match value {
        Value::Null => Ok(Vec::new()),
        Value::Sequence(items) => Ok(items
            .into_iter()
            .enumerate()
            .filter_map(|(index, item)| match AutomationDocument::from_value(item) {
                Ok(doc) => Some(doc),
                Err(e) => {
                    warn!("Skipping automation #{}: {}", index + 1, e);
                    None
                }
            })
            .collect()),
        Value::Mapping(_) => Ok(vec![AutomationDocument::from_value(value)?]),
        other => Err(DocumentError::NotAMapping(value_kind(&other))),
    }
}
