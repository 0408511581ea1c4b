//! Bringing a generated automation into canonical shape
//!
//! The pipeline run by [`normalize`]:
//! 1. give the automation an `id`
//! 2. rename `trigger`/`condition`/`action` to their plural keys
//! 3. give every trigger an `id`
//! 4. make trigger ids unique
//! 5. optionally wrap the actions in a `choose` that dispatches on trigger id
//!
//! None of the steps fail: a document missing the pieces a step needs is
//! left as it is.

use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use tracing::{debug, info, warn};

use crate::document::{keys, scalar_to_string, AutomationDocument};

/// Longest description slug kept in a slug-based id
const MAX_SLUG_LEN: usize = 40;

/// How the automation `id` is chosen
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdStrategy {
    /// 13-digit millisecond timestamp, always replacing the model's id
    #[default]
    Timestamp,
    /// `ai_automation_<description slug>_<YYYYmmddHHMMSS>`, only when no id is present
    DescriptionSlug,
}

/// Source of strictly increasing millisecond ids
#[derive(Debug, Default)]
pub struct IdGenerator {
    last: AtomicI64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Milliseconds since the epoch for `now`, bumped past the last value handed out
    pub fn next_millis(&self, now: DateTime<Utc>) -> i64 {
        let candidate = now.timestamp_millis();
        let mut last = self.last.load(Ordering::Relaxed);
        loop {
            let next = candidate.max(last + 1);
            match self
                .last
                .compare_exchange_weak(last, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return next,
                Err(actual) => last = actual,
            }
        }
    }
}

/// Switches for the optional pipeline steps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizeOptions {
    pub id_strategy: IdStrategy,
    pub restructure_actions: bool,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            id_strategy: IdStrategy::Timestamp,
            restructure_actions: true,
        }
    }
}

/// What [`normalize`] did to a document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizeReport {
    /// The automation's id after normalization
    pub automation_id: String,
    /// Singular keys that were renamed to their plural form
    pub renamed_keys: Vec<String>,
    /// Number of triggers that received a derived id
    pub assigned_trigger_ids: usize,
    /// Number of trigger ids that were suffixed to make them unique
    pub deduplicated_trigger_ids: usize,
    /// Whether the actions were wrapped in a `choose`
    pub restructured_actions: bool,
}

/// Lowercase, replace anything outside `[a-z0-9_]` with `_` and collapse runs
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for c in text.to_lowercase().chars() {
        let c = if c.is_ascii_lowercase() || c.is_ascii_digit() {
            c
        } else {
            '_'
        };
        if c == '_' && slug.ends_with('_') {
            continue;
        }
        slug.push(c);
    }
    slug
}

fn description_slug(description: &str) -> String {
    let slug = slugify(description);
    slug.trim_matches('_').chars().take(MAX_SLUG_LEN).collect()
}

/// Make sure the document has an `id` and return it
///
/// With [`IdStrategy::Timestamp`] any existing id is replaced, so running
/// this twice gives two different ids. With [`IdStrategy::DescriptionSlug`]
/// an existing non-empty id is kept.
pub fn ensure_identifier(
    doc: &mut AutomationDocument,
    strategy: IdStrategy,
    description: &str,
    generator: &IdGenerator,
    now: DateTime<Utc>,
) -> String {
    let id = match strategy {
        IdStrategy::DescriptionSlug => {
            if let Some(existing) = doc.id() {
                debug!("Automation already has id {}", existing);
                return existing;
            }
            let slug = description_slug(description);
            let stamp = now.format("%Y%m%d%H%M%S");
            if slug.is_empty() {
                format!("ai_automation_{}", stamp)
            } else {
                format!("ai_automation_{}_{}", slug, stamp)
            }
        }
        IdStrategy::Timestamp => generator.next_millis(now).to_string(),
    };

    if doc.contains_key(keys::ID) {
        doc.insert(keys::ID, id.as_str());
    } else {
        doc.insert_first(keys::ID, id.as_str());
    }
    debug!("Assigned automation id {}", id);
    id
}

/// Rename singular section keys to plural and wrap lone mappings in lists
///
/// Returns the singular keys that were renamed.
pub fn canonicalize_keys(doc: &mut AutomationDocument) -> Vec<String> {
    let mut renamed = Vec::new();

    for (singular, plural) in [
        (keys::TRIGGER, keys::TRIGGERS),
        (keys::CONDITION, keys::CONDITIONS),
        (keys::ACTION, keys::ACTIONS),
    ] {
        if doc.contains_key(singular) {
            if doc.contains_key(plural) {
                warn!("Both '{}' and '{}' present, dropping '{}'", singular, plural, singular);
                doc.remove(singular);
            } else {
                doc.rename(singular, plural);
                renamed.push(singular.to_string());
            }
        }

        if let Some(value) = doc.get_mut(plural) {
            if value.is_mapping() {
                let single = std::mem::take(value);
                *value = Value::Sequence(vec![single]);
            }
        }
    }

    renamed
}

/// Kind of trigger: `platform`, then `trigger`, then `type`
fn trigger_kind(trigger: &Mapping) -> String {
    ["platform", "trigger", "type"]
        .iter()
        .filter_map(|key| trigger.get(*key).and_then(Value::as_str))
        .find(|kind| !kind.trim().is_empty())
        .unwrap_or("trigger")
        .to_string()
}

/// Object id of the first entity the trigger watches
fn trigger_entity_object_id(trigger: &Mapping) -> Option<String> {
    let first = match trigger.get("entity_id")? {
        Value::String(s) => s.split(',').next()?.trim().to_string(),
        Value::Sequence(items) => items.iter().find_map(Value::as_str)?.trim().to_string(),
        _ => return None,
    };
    let object_id = first.rsplit_once('.').map(|(_, o)| o).unwrap_or(first.as_str());
    (!object_id.is_empty()).then(|| object_id.to_string())
}

fn derive_trigger_id(trigger: &Mapping, position: usize) -> String {
    let kind = trigger_kind(trigger);

    let candidate = if let Some(alias) = trigger.get(keys::ALIAS).and_then(Value::as_str) {
        slugify(alias)
    } else if let Some(object_id) = trigger_entity_object_id(trigger) {
        slugify(&format!("{}_{}", kind, object_id))
    } else {
        String::new()
    };

    let candidate = candidate.trim_matches('_');
    if candidate.is_empty() {
        slugify(&format!("{}_{}_trigger", kind, position))
    } else {
        candidate.to_string()
    }
}

fn has_id(trigger: &Mapping) -> bool {
    trigger
        .get(keys::ID)
        .and_then(scalar_to_string)
        .is_some_and(|id| !id.is_empty())
}

fn triggers_mut(doc: &mut AutomationDocument) -> Option<&mut Vec<Value>> {
    doc.get_mut(keys::TRIGGERS).and_then(Value::as_sequence_mut)
}

/// Give every trigger without an `id` a derived one
///
/// Returns how many ids were assigned.
pub fn assign_trigger_ids(doc: &mut AutomationDocument) -> usize {
    let Some(triggers) = triggers_mut(doc) else {
        return 0;
    };

    let mut assigned = 0;
    for (index, trigger) in triggers.iter_mut().enumerate() {
        let Some(trigger) = trigger.as_mapping_mut() else {
            continue;
        };
        if has_id(trigger) {
            continue;
        }
        let id = derive_trigger_id(trigger, index + 1);
        debug!("Adding id '{}' to trigger #{}", id, index + 1);
        trigger.insert(Value::from(keys::ID), Value::from(id));
        assigned += 1;
    }
    assigned
}

/// Suffix repeated trigger ids with `_2`, `_3`, ... so every id is unique
///
/// The first occurrence keeps its id. Returns how many ids were changed.
pub fn ensure_unique_trigger_ids(doc: &mut AutomationDocument) -> usize {
    let Some(triggers) = triggers_mut(doc) else {
        return 0;
    };

    let taken: HashSet<String> = triggers
        .iter()
        .filter_map(|t| t.get(keys::ID).and_then(scalar_to_string))
        .collect();
    let mut seen: HashSet<String> = HashSet::new();
    let mut changed = 0;

    for trigger in triggers.iter_mut() {
        let Some(trigger) = trigger.as_mapping_mut() else {
            continue;
        };
        let Some(id) = trigger.get(keys::ID).and_then(scalar_to_string) else {
            continue;
        };

        if seen.insert(id.clone()) {
            continue;
        }

        let mut suffix = 2;
        let unique = loop {
            let candidate = format!("{}_{}", id, suffix);
            if !taken.contains(&candidate) && !seen.contains(&candidate) {
                break candidate;
            }
            suffix += 1;
        };
        warn!("Duplicate trigger id '{}', renamed to '{}'", id, unique);
        seen.insert(unique.clone());
        trigger.insert(Value::from(keys::ID), Value::from(unique));
        changed += 1;
    }
    changed
}

/// Wrap the action list in a `choose` with one branch per trigger id
///
/// Every branch gets the complete original action list as its `sequence`.
/// Nothing happens when an action already uses `choose`, when there are no
/// actions, or when no trigger carries an id.
pub fn restructure_actions(doc: &mut AutomationDocument) -> bool {
    let trigger_ids: Vec<Value> = doc
        .triggers()
        .iter()
        .filter_map(|t| t.get(keys::ID))
        .filter(|id| scalar_to_string(id).is_some_and(|s| !s.is_empty()))
        .cloned()
        .collect();

    let Some(actions) = doc.get(keys::ACTIONS).and_then(Value::as_sequence) else {
        return false;
    };

    if actions.is_empty() {
        return false;
    }

    if actions
        .iter()
        .any(|action| action.as_mapping().is_some_and(|m| m.contains_key("choose")))
    {
        debug!("Actions already use 'choose', leaving them as they are");
        return false;
    }

    if trigger_ids.is_empty() {
        warn!("Cannot create 'choose' structure: no trigger ids found");
        return false;
    }

    let original = Value::Sequence(actions.clone());
    let branches: Vec<Value> = trigger_ids
        .into_iter()
        .map(|id| {
            let mut condition = Mapping::new();
            condition.insert(Value::from("condition"), Value::from("trigger"));
            condition.insert(Value::from(keys::ID), id);

            let mut branch = Mapping::new();
            branch.insert(
                Value::from(keys::CONDITIONS),
                Value::Sequence(vec![Value::Mapping(condition)]),
            );
            branch.insert(Value::from("sequence"), original.clone());
            Value::Mapping(branch)
        })
        .collect();

    let mut choose = Mapping::new();
    choose.insert(Value::from("choose"), Value::Sequence(branches));
    doc.insert(keys::ACTIONS, Value::Sequence(vec![Value::Mapping(choose)]));
    true
}

/// Run the whole normalization pipeline on a freshly parsed document
pub fn normalize(
    doc: &mut AutomationDocument,
    options: NormalizeOptions,
    description: &str,
    generator: &IdGenerator,
    now: DateTime<Utc>,
) -> NormalizeReport {
    let automation_id = ensure_identifier(doc, options.id_strategy, description, generator, now);
    let renamed_keys = canonicalize_keys(doc);
    let assigned_trigger_ids = assign_trigger_ids(doc);
    let deduplicated_trigger_ids = ensure_unique_trigger_ids(doc);
    let restructured_actions = options.restructure_actions && restructure_actions(doc);

    info!(
        automation_id = %automation_id,
        assigned = assigned_trigger_ids,
        restructured = restructured_actions,
        "Normalized automation"
    );

    NormalizeReport {
        automation_id,
        renamed_keys,
        assigned_trigger_ids,
        deduplicated_trigger_ids,
        restructured_actions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn doc(yaml: &str) -> AutomationDocument {
        serde_yaml::from_str(yaml).unwrap()
    }

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 10, 18, 30, 5).unwrap()
    }

    fn trigger_ids(doc: &AutomationDocument) -> Vec<String> {
        doc.triggers()
            .iter()
            .filter_map(|t| t.get("id").and_then(scalar_to_string))
            .collect()
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Turn on lights at Sunset!"), "turn_on_lights_at_sunset_");
        assert_eq!(slugify("a--b  c"), "a_b_c");
    }

    #[test]
    fn test_id_generator_strictly_increasing() {
        let generator = IdGenerator::new();
        let now = fixed_now();
        let first = generator.next_millis(now);
        let second = generator.next_millis(now);
        let third = generator.next_millis(now);
        assert_eq!(first, now.timestamp_millis());
        assert!(second > first);
        assert!(third > second);
        assert_eq!(first.to_string().len(), 13);
    }

    #[test]
    fn test_timestamp_strategy_overwrites() {
        let generator = IdGenerator::new();
        let mut d = doc("alias: Porch\nid: model_supplied\n");
        let id = ensure_identifier(&mut d, IdStrategy::Timestamp, "", &generator, fixed_now());
        assert_eq!(id, fixed_now().timestamp_millis().to_string());
        assert_eq!(d.id(), Some(id.clone()));

        let again = ensure_identifier(&mut d, IdStrategy::Timestamp, "", &generator, fixed_now());
        assert_ne!(again, id);
    }

    #[test]
    fn test_new_id_goes_first() {
        let generator = IdGenerator::new();
        let mut d = doc("alias: Porch\nmode: single\n");
        ensure_identifier(&mut d, IdStrategy::Timestamp, "", &generator, fixed_now());
        let first_key = d.as_mapping().keys().next().and_then(Value::as_str);
        assert_eq!(first_key, Some("id"));
    }

    #[test]
    fn test_slug_strategy() {
        let generator = IdGenerator::new();
        let mut d = doc("alias: Sunset\n");
        let id = ensure_identifier(
            &mut d,
            IdStrategy::DescriptionSlug,
            "Turn on lights at sunset",
            &generator,
            fixed_now(),
        );
        assert_eq!(id, "ai_automation_turn_on_lights_at_sunset_20240610183005");

        let kept = ensure_identifier(
            &mut d,
            IdStrategy::DescriptionSlug,
            "something else",
            &generator,
            fixed_now(),
        );
        assert_eq!(kept, id);
    }

    #[test]
    fn test_slug_strategy_truncates() {
        let generator = IdGenerator::new();
        let mut d = AutomationDocument::new();
        let description = "When the front door opens after midnight and nobody is home, flash every light";
        let id = ensure_identifier(
            &mut d,
            IdStrategy::DescriptionSlug,
            description,
            &generator,
            fixed_now(),
        );
        let slug = id
            .strip_prefix("ai_automation_")
            .and_then(|rest| rest.strip_suffix("_20240610183005"))
            .unwrap();
        assert_eq!(slug.len(), MAX_SLUG_LEN);
    }

    #[test]
    fn test_canonicalize_renames() {
        let mut d = doc("alias: x\ntrigger:\n  - platform: sun\ncondition: []\naction:\n  - service: light.turn_on\n");
        let renamed = canonicalize_keys(&mut d);
        assert_eq!(renamed, vec!["trigger", "condition", "action"]);
        assert!(d.contains_key("triggers") && !d.contains_key("trigger"));
        assert!(d.contains_key("conditions") && !d.contains_key("condition"));
        assert!(d.contains_key("actions") && !d.contains_key("action"));
        assert_eq!(d.triggers().len(), 1);
    }

    #[test]
    fn test_canonicalize_drops_singular_when_both() {
        let mut d = doc("trigger:\n  - platform: sun\ntriggers:\n  - platform: time\n");
        assert!(canonicalize_keys(&mut d).is_empty());
        assert!(!d.contains_key("trigger"));
        assert_eq!(d.triggers()[0]["platform"], Value::from("time"));
    }

    #[test]
    fn test_canonicalize_wraps_lone_mapping() {
        let mut d = doc("trigger:\n  platform: sun\n  event: sunset\n");
        canonicalize_keys(&mut d);
        assert_eq!(d.triggers().len(), 1);
        assert_eq!(d.triggers()[0]["event"], Value::from("sunset"));
    }

    #[test]
    fn test_trigger_id_priority() {
        let mut d = doc(
            "triggers:\n\
             \x20 - platform: state\n    entity_id: binary_sensor.Front_Door\n    alias: Door Opened!\n\
             \x20 - platform: state\n    entity_id: [light.porch, light.hall]\n\
             \x20 - trigger: state\n    entity_id: 'switch.fan, switch.heater'\n\
             \x20 - type: turned_on\n    device_id: abc\n\
             \x20 - event: sunset\n\
             \x20 - platform: time\n    id: morning\n",
        );
        assert_eq!(assign_trigger_ids(&mut d), 5);
        assert_eq!(
            trigger_ids(&d),
            vec![
                "door_opened",
                "state_porch",
                "state_fan",
                "turned_on_4_trigger",
                "trigger_5_trigger",
                "morning"
            ]
        );
    }

    #[test]
    fn test_unique_trigger_ids() {
        let mut d = doc(
            "triggers:\n\
             \x20 - platform: state\n    alias: Motion\n\
             \x20 - platform: state\n    alias: motion\n\
             \x20 - platform: state\n    id: motion_2\n\
             \x20 - platform: state\n    alias: MOTION\n",
        );
        assign_trigger_ids(&mut d);
        assert_eq!(ensure_unique_trigger_ids(&mut d), 2);
        assert_eq!(trigger_ids(&d), vec!["motion", "motion_3", "motion_2", "motion_4"]);
    }

    #[test]
    fn test_restructure_actions() {
        let mut d = doc(
            "triggers:\n  - platform: sun\n    id: a\n  - platform: time\n    id: b\n\
             actions:\n  - service: light.turn_on\n  - delay: 5\n",
        );
        let original = d.get("actions").cloned().unwrap();
        assert!(restructure_actions(&mut d));

        let actions = d.actions();
        assert_eq!(actions.len(), 1);
        let branches = actions[0]["choose"].as_sequence().unwrap();
        assert_eq!(branches.len(), 2);
        for (branch, id) in branches.iter().zip(["a", "b"]) {
            assert_eq!(branch["conditions"][0]["condition"], Value::from("trigger"));
            assert_eq!(branch["conditions"][0]["id"], Value::from(id));
            assert_eq!(branch["sequence"], original);
        }
    }

    #[test]
    fn test_restructure_skips() {
        let mut existing = doc(
            "triggers:\n  - platform: sun\n    id: a\nactions:\n  - choose: []\n",
        );
        assert!(!restructure_actions(&mut existing));

        let mut no_ids = doc("triggers:\n  - platform: sun\nactions:\n  - service: x.y\n");
        assert!(!restructure_actions(&mut no_ids));

        let mut no_triggers = doc("actions:\n  - service: x.y\n");
        assert!(!restructure_actions(&mut no_triggers));

        let mut no_actions = doc("triggers:\n  - platform: sun\n    id: a\nactions: []\n");
        assert!(!restructure_actions(&mut no_actions));
    }

    #[test]
    fn test_normalize_without_restructure() {
        let generator = IdGenerator::new();
        let mut d = doc("trigger:\n  - platform: sun\naction:\n  - service: light.turn_on\n");
        let options = NormalizeOptions {
            id_strategy: IdStrategy::Timestamp,
            restructure_actions: false,
        };
        let report = normalize(&mut d, options, "", &generator, fixed_now());
        assert!(!report.restructured_actions);
        assert_eq!(report.assigned_trigger_ids, 1);
        assert_eq!(d.actions()[0]["service"], Value::from("light.turn_on"));
    }
}
