//! Entity and device references inside an automation

use std::collections::BTreeSet;

use serde_yaml::Value;

use crate::document::{keys, AutomationDocument};

/// Entity and device ids an automation refers to
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityReferences {
    pub entity_ids: BTreeSet<String>,
    pub device_ids: BTreeSet<String>,
}

impl EntityReferences {
    pub fn is_empty(&self) -> bool {
        self.entity_ids.is_empty() && self.device_ids.is_empty()
    }
}

/// Values that are not literal ids: templates and the `all`/`none` keywords
fn is_literal_id(value: &str) -> bool {
    !(value.is_empty()
        || value.contains("{{")
        || value.contains("{%")
        || value.eq_ignore_ascii_case("all")
        || value.eq_ignore_ascii_case("none"))
}

fn collect_ids(value: &Value, out: &mut BTreeSet<String>) {
    match value {
        Value::String(s) => {
            if s.contains("{{") || s.contains("{%") {
                return;
            }
            out.extend(
                s.split(',')
                    .map(str::trim)
                    .filter(|id| is_literal_id(id))
                    .map(String::from),
            );
        }
        Value::Sequence(items) => {
            for item in items {
                if let Some(s) = item.as_str() {
                    let s = s.trim();
                    if is_literal_id(s) {
                        out.insert(s.to_string());
                    }
                }
            }
        }
        _ => {}
    }
}

fn walk(value: &Value, refs: &mut EntityReferences) {
    match value {
        Value::Mapping(mapping) => {
            for (key, child) in mapping {
                match key.as_str() {
                    Some("entity_id") => collect_ids(child, &mut refs.entity_ids),
                    Some("device_id") => collect_ids(child, &mut refs.device_ids),
                    _ => walk(child, refs),
                }
            }
        }
        Value::Sequence(items) => {
            for item in items {
                walk(item, refs);
            }
        }
        Value::Tagged(tagged) => walk(&tagged.value, refs),
        _ => {}
    }
}

/// Collect every `entity_id` and `device_id` referenced anywhere in the document
pub fn extract_referenced_entities(doc: &AutomationDocument) -> EntityReferences {
    let mut refs = EntityReferences::default();
    for (_, value) in doc.as_mapping() {
        walk(value, &mut refs);
    }
    refs
}

/// Ids for which `exists` returns false
pub fn validate_entities_exist<'a, I, F>(ids: I, exists: F) -> BTreeSet<String>
where
    I: IntoIterator<Item = &'a String>,
    F: Fn(&str) -> bool,
{
    ids.into_iter()
        .filter(|id| !exists(id))
        .cloned()
        .collect()
}

/// Append a warning about unknown references to the automation's description
///
/// Returns false (and leaves the document alone) when nothing is missing.
pub fn append_missing_reference_warning(
    doc: &mut AutomationDocument,
    missing_entities: &BTreeSet<String>,
    missing_devices: &BTreeSet<String>,
) -> bool {
    if missing_entities.is_empty() && missing_devices.is_empty() {
        return false;
    }

    let mut parts = Vec::new();
    if !missing_entities.is_empty() {
        parts.push(format!(
            "unknown entities: {}",
            missing_entities.iter().cloned().collect::<Vec<_>>().join(", ")
        ));
    }
    if !missing_devices.is_empty() {
        parts.push(format!(
            "unknown devices: {}",
            missing_devices.iter().cloned().collect::<Vec<_>>().join(", ")
        ));
    }
    let warning = format!("Warning: {}", parts.join("; "));

    let description = match doc.description() {
        Some(existing) if !existing.trim().is_empty() => {
            format!("{} ({})", existing.trim_end(), warning)
        }
        _ => warning,
    };
    doc.insert(keys::DESCRIPTION, description);
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(yaml: &str) -> AutomationDocument {
        serde_yaml::from_str(yaml).unwrap()
    }

    fn set(ids: &[&str]) -> BTreeSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_extract_nested_references() {
        let d = doc(r#"
triggers:
  - platform: state
    entity_id: binary_sensor.door, binary_sensor.window
  - platform: device
    device_id: abc123
    type: turned_on
conditions:
  - condition: state
    entity_id: [input_boolean.guest_mode]
actions:
  - choose:
      - conditions: []
        sequence:
          - service: light.turn_on
            target:
              entity_id: light.porch
              device_id: [def456]
"#);
        let refs = extract_referenced_entities(&d);
        assert_eq!(
            refs.entity_ids,
            set(&[
                "binary_sensor.door",
                "binary_sensor.window",
                "input_boolean.guest_mode",
                "light.porch"
            ])
        );
        assert_eq!(refs.device_ids, set(&["abc123", "def456"]));
    }

    #[test]
    fn test_extract_skips_templates_and_keywords() {
        let d = doc(r#"
actions:
  - service: light.turn_off
    target:
      entity_id: all
  - service: light.turn_on
    target:
      entity_id: "{{ trigger.entity_id }}"
  - service: switch.turn_on
    entity_id: [none, switch.fan]
"#);
        let refs = extract_referenced_entities(&d);
        assert_eq!(refs.entity_ids, set(&["switch.fan"]));
        assert!(refs.device_ids.is_empty());
    }

    #[test]
    fn test_validate_entities_exist() {
        let ids = set(&["light.porch", "light.ghost"]);
        let missing = validate_entities_exist(&ids, |id| id == "light.porch");
        assert_eq!(missing, set(&["light.ghost"]));
    }

    #[test]
    fn test_append_warning() {
        let mut d = doc("description: Porch light at dusk\n");
        assert!(append_missing_reference_warning(
            &mut d,
            &set(&["light.ghost"]),
            &set(&["dev9"])
        ));
        assert_eq!(
            d.description(),
            Some("Porch light at dusk (Warning: unknown entities: light.ghost; unknown devices: dev9)")
        );
    }

    #[test]
    fn test_append_warning_without_description() {
        let mut d = doc("alias: x\n");
        append_missing_reference_warning(&mut d, &set(&["light.ghost"]), &BTreeSet::new());
        assert_eq!(d.description(), Some("Warning: unknown entities: light.ghost"));

        let mut clean = doc("description: fine\n");
        assert!(!append_missing_reference_warning(
            &mut clean,
            &BTreeSet::new(),
            &BTreeSet::new()
        ));
        assert_eq!(clean.description(), Some("fine"));
    }
}
