//! Entity Registry
//!
//! Tracks registered entities with unique_id tracking and device linking.
//! Insertion order is kept so the entity snapshot handed to the language
//! model is stable between runs.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::storage::{Storable, Storage, StorageResult};

/// Storage key for entity registry
pub const STORAGE_KEY: &str = "core.entity_registry";
/// Current storage version
pub const STORAGE_VERSION: u32 = 1;
/// Current minor version
pub const STORAGE_MINOR_VERSION: u32 = 19;

/// Reason an entity was disabled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisabledBy {
    ConfigEntry,
    Device,
    Hass,
    Integration,
    User,
}

/// A registered entity entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityEntry {
    /// Internal ID
    pub id: String,
    /// Full entity ID (domain.object_id)
    pub entity_id: String,
    /// Platform-specific unique identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_id: Option<String>,
    /// Component/platform that provides this entity
    pub platform: String,

    /// Parent device ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    /// Assigned area
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area_id: Option<String>,

    /// User-set name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Platform default name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_name: Option<String>,

    /// Device class (e.g., "motion", "temperature")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_class: Option<String>,
    /// Platform default device class
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_device_class: Option<String>,

    /// Disable reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled_by: Option<DisabledBy>,

    /// Creation timestamp
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    /// Last modified timestamp
    #[serde(default = "Utc::now")]
    pub modified_at: DateTime<Utc>,
}

impl EntityEntry {
    /// Create a new entity entry with minimal required fields
    pub fn new(
        entity_id: impl Into<String>,
        platform: impl Into<String>,
        unique_id: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: ulid::Ulid::new().to_string().to_lowercase(),
            entity_id: entity_id.into(),
            unique_id,
            platform: platform.into(),
            device_id: None,
            area_id: None,
            name: None,
            original_name: None,
            device_class: None,
            original_device_class: None,
            disabled_by: None,
            created_at: now,
            modified_at: now,
        }
    }

    /// Get the domain from entity_id
    pub fn domain(&self) -> &str {
        self.entity_id
            .split_once('.')
            .map(|(domain, _)| domain)
            .unwrap_or(&self.entity_id)
    }

    /// Get the object_id from entity_id
    pub fn object_id(&self) -> &str {
        self.entity_id
            .split_once('.')
            .map(|(_, object_id)| object_id)
            .unwrap_or(&self.entity_id)
    }

    /// Name shown to users: user name, then platform name, then object_id
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.original_name.as_deref())
            .unwrap_or_else(|| self.object_id())
    }

    /// Device class set by the user, falling back to the platform's
    pub fn effective_device_class(&self) -> Option<&str> {
        self.device_class
            .as_deref()
            .or(self.original_device_class.as_deref())
    }

    /// Check if entity is disabled
    pub fn is_disabled(&self) -> bool {
        self.disabled_by.is_some()
    }
}

/// Entity registry data for storage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityRegistryData {
    /// All registered entities
    pub entities: Vec<EntityEntry>,
}

impl Storable for EntityRegistryData {
    const KEY: &'static str = STORAGE_KEY;
    const VERSION: u32 = STORAGE_VERSION;
    const MINOR_VERSION: u32 = STORAGE_MINOR_VERSION;
}

/// Entity Registry
///
/// Entries are stored as `Arc<EntityEntry>` to avoid cloning on reads.
pub struct EntityRegistry {
    /// Storage backend
    storage: Arc<Storage>,

    /// Primary index: entity_id -> EntityEntry, in insertion order
    by_entity_id: RwLock<IndexMap<String, Arc<EntityEntry>>>,

    /// Index: unique_id -> entity_id
    by_unique_id: DashMap<String, String>,
}

impl EntityRegistry {
    /// Create a new entity registry
    pub fn new(storage: Arc<Storage>) -> Self {
        Self {
            storage,
            by_entity_id: RwLock::new(IndexMap::new()),
            by_unique_id: DashMap::new(),
        }
    }

    /// Load from storage
    pub async fn load(&self) -> StorageResult<()> {
        if let Some(data) = self.storage.load_data::<EntityRegistryData>().await? {
            info!("Loading {} entities from storage", data.entities.len());

            for entry in data.entities {
                self.index_entry(Arc::new(entry));
            }
        }
        Ok(())
    }

    /// Save to storage
    pub async fn save(&self) -> StorageResult<()> {
        let data = EntityRegistryData {
            entities: self.iter().into_iter().map(|e| (*e).clone()).collect(),
        };

        self.storage.save(&data.to_storage_file()).await?;
        debug!("Saved {} entities to storage", data.entities.len());
        Ok(())
    }

    /// Index an entry in all indexes
    fn index_entry(&self, entry: Arc<EntityEntry>) {
        let entity_id = entry.entity_id.clone();

        if let Some(ref unique_id) = entry.unique_id {
            self.by_unique_id.insert(unique_id.clone(), entity_id.clone());
        }

        if let Ok(mut idx) = self.by_entity_id.write() {
            idx.insert(entity_id, entry);
        }
    }

    /// Get entity by entity_id
    pub fn get(&self, entity_id: &str) -> Option<Arc<EntityEntry>> {
        self.by_entity_id
            .read()
            .ok()
            .and_then(|idx| idx.get(entity_id).cloned())
    }

    /// Get entity by unique_id
    pub fn get_by_unique_id(&self, unique_id: &str) -> Option<Arc<EntityEntry>> {
        self.by_unique_id
            .get(unique_id)
            .and_then(|entity_id| self.get(&entity_id))
    }

    /// Register an entity
    ///
    /// If an entity with the same unique_id or entity_id exists it is
    /// returned unchanged.
    pub fn register(
        &self,
        platform: &str,
        entity_id: &str,
        unique_id: Option<&str>,
    ) -> Arc<EntityEntry> {
        if let Some(existing) = unique_id.and_then(|uid| self.get_by_unique_id(uid)) {
            debug!("Found existing entity by unique_id: {}", existing.entity_id);
            return existing;
        }

        if let Some(existing) = self.get(entity_id) {
            return existing;
        }

        let entry = Arc::new(EntityEntry::new(
            entity_id,
            platform,
            unique_id.map(String::from),
        ));
        self.index_entry(Arc::clone(&entry));

        info!("Registered entity: {} (platform: {})", entity_id, platform);
        entry
    }

    /// Check if an entity_id is registered
    pub fn contains(&self, entity_id: &str) -> bool {
        self.by_entity_id
            .read()
            .map(|idx| idx.contains_key(entity_id))
            .unwrap_or(false)
    }

    /// Get count of entities
    pub fn len(&self) -> usize {
        self.by_entity_id.read().map(|idx| idx.len()).unwrap_or(0)
    }

    /// Check if registry is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All entities in registration order
    pub fn iter(&self) -> Vec<Arc<EntityEntry>> {
        self.by_entity_id
            .read()
            .map(|idx| idx.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Entities that are not disabled, in registration order
    pub fn enabled(&self) -> Vec<Arc<EntityEntry>> {
        self.iter().into_iter().filter(|e| !e.is_disabled()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn registry(dir: &TempDir) -> EntityRegistry {
        EntityRegistry::new(Arc::new(Storage::new(dir.path())))
    }

    #[test]
    fn test_register_and_get() {
        let temp_dir = TempDir::new().unwrap();
        let registry = registry(&temp_dir);

        let entry = registry.register("hue", "light.living_room", Some("hue-1"));
        assert_eq!(entry.domain(), "light");
        assert_eq!(entry.object_id(), "living_room");

        assert!(registry.contains("light.living_room"));
        assert_eq!(
            registry.get_by_unique_id("hue-1").unwrap().entity_id,
            "light.living_room"
        );
    }

    #[test]
    fn test_register_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let registry = registry(&temp_dir);

        let first = registry.register("hue", "light.kitchen", Some("hue-2"));
        let second = registry.register("hue", "light.kitchen_renamed", Some("hue-2"));

        assert_eq!(first.id, second.id);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_display_name_fallbacks() {
        let mut entry = EntityEntry::new("sensor.outdoor_temp", "met", None);
        assert_eq!(entry.display_name(), "outdoor_temp");

        entry.original_name = Some("Outdoor temperature".to_string());
        assert_eq!(entry.display_name(), "Outdoor temperature");

        entry.name = Some("Garden".to_string());
        assert_eq!(entry.display_name(), "Garden");

        entry.original_device_class = Some("temperature".to_string());
        assert_eq!(entry.effective_device_class(), Some("temperature"));
    }

    #[tokio::test]
    async fn test_enabled_skips_disabled() {
        let temp_dir = TempDir::new().unwrap();
        let storage = Arc::new(Storage::new(temp_dir.path()));

        let mut hidden = EntityEntry::new("light.b", "hue", None);
        hidden.disabled_by = Some(DisabledBy::User);
        let data = EntityRegistryData {
            entities: vec![EntityEntry::new("light.a", "hue", None), hidden],
        };
        storage.save(&data.to_storage_file()).await.unwrap();

        let registry = EntityRegistry::new(storage);
        registry.load().await.unwrap();

        let enabled: Vec<_> = registry
            .enabled()
            .iter()
            .map(|e| e.entity_id.clone())
            .collect();
        assert_eq!(enabled, vec!["light.a".to_string()]);
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn test_save_and_load_preserves_order() {
        let temp_dir = TempDir::new().unwrap();
        let registry = registry(&temp_dir);

        for id in ["switch.z", "light.a", "sensor.m"] {
            registry.register("demo", id, None);
        }
        registry.save().await.unwrap();

        let reloaded = EntityRegistry::new(Arc::new(Storage::new(temp_dir.path())));
        reloaded.load().await.unwrap();

        let ids: Vec<_> = reloaded.iter().iter().map(|e| e.entity_id.clone()).collect();
        assert_eq!(ids, vec!["switch.z", "light.a", "sensor.m"]);
    }
}
