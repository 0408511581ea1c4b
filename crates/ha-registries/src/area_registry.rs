//! Area Registry
//!
//! Tracks all registered areas (rooms, zones) in the home.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::storage::{Storable, Storage, StorageResult};

/// Storage key for area registry
pub const STORAGE_KEY: &str = "core.area_registry";
/// Current storage version
pub const STORAGE_VERSION: u32 = 1;
/// Current minor version
pub const STORAGE_MINOR_VERSION: u32 = 6;

/// A registered area entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AreaEntry {
    /// Area ID, derived from the name on creation
    pub id: String,

    /// Area name (e.g., "Living Room")
    pub name: String,

    /// Area icon (e.g., "mdi:sofa")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,

    /// Alternative names
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    #[serde(default = "Utc::now")]
    pub modified_at: DateTime<Utc>,
}

impl AreaEntry {
    /// Create a new area entry with the given ID
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            icon: None,
            aliases: Vec::new(),
            created_at: now,
            modified_at: now,
        }
    }
}

/// Normalize a name for searching
fn normalize_name(name: &str) -> String {
    name.to_lowercase()
        .trim()
        .replace(|c: char| !c.is_alphanumeric() && c != ' ', "")
}

/// Turn an area name into an ID (`"Living Room"` -> `living_room`)
fn area_id_from_name(name: &str) -> String {
    let mut id = String::with_capacity(name.len());
    for c in name.trim().to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            id.push(c);
        } else if !id.ends_with('_') {
            id.push('_');
        }
    }
    let id = id.trim_matches('_').to_string();
    if id.is_empty() {
        ulid::Ulid::new().to_string().to_lowercase()
    } else {
        id
    }
}

/// Area registry data for storage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AreaRegistryData {
    pub areas: Vec<AreaEntry>,
}

impl Storable for AreaRegistryData {
    const KEY: &'static str = STORAGE_KEY;
    const VERSION: u32 = STORAGE_VERSION;
    const MINOR_VERSION: u32 = STORAGE_MINOR_VERSION;
}

/// Area Registry
pub struct AreaRegistry {
    storage: Arc<Storage>,

    /// Primary index: area_id -> AreaEntry
    by_id: DashMap<String, Arc<AreaEntry>>,

    /// Index: normalized name -> area_id
    by_name: DashMap<String, String>,
}

impl AreaRegistry {
    /// Create a new area registry
    pub fn new(storage: Arc<Storage>) -> Self {
        Self {
            storage,
            by_id: DashMap::new(),
            by_name: DashMap::new(),
        }
    }

    /// Load from storage
    pub async fn load(&self) -> StorageResult<()> {
        if let Some(data) = self.storage.load_data::<AreaRegistryData>().await? {
            info!("Loading {} areas from storage", data.areas.len());
            for entry in data.areas {
                self.index_entry(Arc::new(entry));
            }
        }
        Ok(())
    }

    /// Save to storage
    pub async fn save(&self) -> StorageResult<()> {
        let mut areas: Vec<AreaEntry> = self.by_id.iter().map(|r| (**r.value()).clone()).collect();
        areas.sort_by(|a, b| a.created_at.cmp(&b.created_at));

        let data = AreaRegistryData { areas };
        self.storage.save(&data.to_storage_file()).await?;
        debug!("Saved {} areas to storage", data.areas.len());
        Ok(())
    }

    fn index_entry(&self, entry: Arc<AreaEntry>) {
        self.by_name
            .insert(normalize_name(&entry.name), entry.id.clone());
        self.by_id.insert(entry.id.clone(), entry);
    }

    /// Create an area, or return the existing one with the same name
    pub fn create(&self, name: &str) -> Arc<AreaEntry> {
        if let Some(existing) = self.get_by_name(name) {
            return existing;
        }

        let mut id = area_id_from_name(name);
        let mut suffix = 2;
        while self.by_id.contains_key(&id) {
            id = format!("{}_{}", area_id_from_name(name), suffix);
            suffix += 1;
        }

        let entry = Arc::new(AreaEntry::new(id, name));
        self.index_entry(Arc::clone(&entry));
        info!("Created area: {} ({})", name, entry.id);
        entry
    }

    /// Get area by ID
    pub fn get(&self, area_id: &str) -> Option<Arc<AreaEntry>> {
        self.by_id.get(area_id).map(|r| Arc::clone(r.value()))
    }

    /// Get area by name (case-insensitive)
    pub fn get_by_name(&self, name: &str) -> Option<Arc<AreaEntry>> {
        self.by_name
            .get(&normalize_name(name))
            .and_then(|id| self.get(&id))
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Iterate over all areas
    pub fn iter(&self) -> impl Iterator<Item = Arc<AreaEntry>> + '_ {
        self.by_id.iter().map(|r| Arc::clone(r.value()))
    }
}
