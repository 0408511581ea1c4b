//! Device Registry
//!
//! Tracks registered devices. Generated automations may reference a device
//! by `device_id`, so the registry is what those references are checked
//! against.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::storage::{Storable, Storage, StorageResult};

/// Storage key for device registry
pub const STORAGE_KEY: &str = "core.device_registry";
/// Current storage version
pub const STORAGE_VERSION: u32 = 1;
/// Current minor version
pub const STORAGE_MINOR_VERSION: u32 = 8;

/// A registered device entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceEntry {
    /// Device ID
    pub id: String,
    /// Name reported by the integration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Name set by the user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_by_user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Area the device is placed in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area_id: Option<String>,
    /// Disable reason (free-form, as stored by the host)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled_by: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub modified_at: DateTime<Utc>,
}

impl DeviceEntry {
    /// Create a new device entry
    pub fn new(name: Option<&str>) -> Self {
        let now = Utc::now();
        Self {
            id: ulid::Ulid::new().to_string().to_lowercase(),
            name: name.map(String::from),
            name_by_user: None,
            manufacturer: None,
            model: None,
            area_id: None,
            disabled_by: None,
            created_at: now,
            modified_at: now,
        }
    }

    /// Name shown to users
    pub fn display_name(&self) -> &str {
        self.name_by_user
            .as_deref()
            .or(self.name.as_deref())
            .unwrap_or(&self.id)
    }

    /// Check if device is disabled
    pub fn is_disabled(&self) -> bool {
        self.disabled_by.is_some()
    }
}

/// Device registry data for storage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceRegistryData {
    pub devices: Vec<DeviceEntry>,
}

impl Storable for DeviceRegistryData {
    const KEY: &'static str = STORAGE_KEY;
    const VERSION: u32 = STORAGE_VERSION;
    const MINOR_VERSION: u32 = STORAGE_MINOR_VERSION;
}

/// Device Registry
pub struct DeviceRegistry {
    storage: Arc<Storage>,

    /// Primary index: device_id -> DeviceEntry
    by_id: DashMap<String, Arc<DeviceEntry>>,
}

impl DeviceRegistry {
    /// Create a new device registry
    pub fn new(storage: Arc<Storage>) -> Self {
        Self {
            storage,
            by_id: DashMap::new(),
        }
    }

    /// Load from storage
    pub async fn load(&self) -> StorageResult<()> {
        if let Some(data) = self.storage.load_data::<DeviceRegistryData>().await? {
            info!("Loading {} devices from storage", data.devices.len());
            for entry in data.devices {
                self.index_entry(Arc::new(entry));
            }
        }
        Ok(())
    }

    /// Save to storage
    pub async fn save(&self) -> StorageResult<()> {
        let mut devices: Vec<DeviceEntry> =
            self.by_id.iter().map(|r| (**r.value()).clone()).collect();
        devices.sort_by(|a, b| a.created_at.cmp(&b.created_at));

        let data = DeviceRegistryData { devices };
        self.storage.save(&data.to_storage_file()).await?;
        debug!("Saved {} devices to storage", data.devices.len());
        Ok(())
    }

    fn index_entry(&self, entry: Arc<DeviceEntry>) {
        self.by_id.insert(entry.id.clone(), entry);
    }

    /// Create and register a device
    pub fn create(&self, name: &str) -> Arc<DeviceEntry> {
        let entry = Arc::new(DeviceEntry::new(Some(name)));
        self.index_entry(Arc::clone(&entry));
        info!("Registered device: {} ({})", name, entry.id);
        entry
    }

    /// Get device by ID
    pub fn get(&self, device_id: &str) -> Option<Arc<DeviceEntry>> {
        self.by_id.get(device_id).map(|r| Arc::clone(r.value()))
    }

    /// Check if a device ID is registered
    pub fn contains(&self, device_id: &str) -> bool {
        self.by_id.contains_key(device_id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Iterate over all devices
    pub fn iter(&self) -> impl Iterator<Item = Arc<DeviceEntry>> + '_ {
        self.by_id.iter().map(|r| Arc::clone(r.value()))
    }
}
