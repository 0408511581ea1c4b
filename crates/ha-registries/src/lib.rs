//! Home Assistant Registries
//!
//! Persistent registries the automation creator reads when it describes the
//! home to the language model and when it checks the references inside a
//! generated automation:
//! - Entities (EntityRegistry)
//! - Devices (DeviceRegistry)
//! - Areas (AreaRegistry)
//!
//! All registries use JSON persistence in the `.storage/` directory
//! with versioning.

pub mod storage;

pub mod area_registry;
pub mod device_registry;
pub mod entity_registry;

pub use storage::{Storable, Storage, StorageError, StorageFile, StorageResult};

pub use area_registry::{AreaEntry, AreaRegistry, AreaRegistryData};
pub use device_registry::{DeviceEntry, DeviceRegistry, DeviceRegistryData};
pub use entity_registry::{DisabledBy, EntityEntry, EntityRegistry, EntityRegistryData};

use std::sync::Arc;

/// All registries bundled together
pub struct Registries {
    pub storage: Arc<Storage>,
    pub entities: EntityRegistry,
    pub devices: DeviceRegistry,
    pub areas: AreaRegistry,
}

impl Registries {
    /// Create new registries with the given config directory
    pub fn new(config_dir: impl AsRef<std::path::Path>) -> Self {
        let storage = Arc::new(Storage::new(config_dir));

        Self {
            entities: EntityRegistry::new(storage.clone()),
            devices: DeviceRegistry::new(storage.clone()),
            areas: AreaRegistry::new(storage.clone()),
            storage,
        }
    }

    /// Load all registries from storage
    pub async fn load_all(&self) -> StorageResult<()> {
        self.entities.load().await?;
        self.devices.load().await?;
        self.areas.load().await?;
        Ok(())
    }

    /// Save all registries to storage
    pub async fn save_all(&self) -> StorageResult<()> {
        self.entities.save().await?;
        self.devices.save().await?;
        self.areas.save().await?;
        Ok(())
    }

    /// Name of the area an entity lives in
    ///
    /// The entity's own area wins; otherwise the area of its device is used.
    pub fn entity_area_name(&self, entity: &EntityEntry) -> Option<String> {
        let area_id = entity.area_id.clone().or_else(|| {
            entity
                .device_id
                .as_deref()
                .and_then(|device_id| self.devices.get(device_id))
                .and_then(|device| device.area_id.clone())
        })?;
        self.areas.get(&area_id).map(|area| area.name.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Write registry files the way the host leaves them in `.storage/`
    async fn seed(
        dir: &TempDir,
        areas: Vec<AreaEntry>,
        devices: Vec<DeviceEntry>,
        entities: Vec<EntityEntry>,
    ) -> Registries {
        let storage = Storage::new(dir.path());
        let areas = AreaRegistryData { areas };
        let devices = DeviceRegistryData { devices };
        let entities = EntityRegistryData { entities };
        storage.save(&areas.to_storage_file()).await.unwrap();
        storage.save(&devices.to_storage_file()).await.unwrap();
        storage.save(&entities.to_storage_file()).await.unwrap();

        let registries = Registries::new(dir.path());
        registries.load_all().await.unwrap();
        registries
    }

    #[tokio::test]
    async fn test_registries_bundle() {
        let temp_dir = TempDir::new().unwrap();

        let mut bridge = DeviceEntry::new(Some("Hue Bridge"));
        bridge.area_id = Some("living_room".to_string());
        let mut light = EntityEntry::new("light.living_room", "hue", Some("unique1".to_string()));
        light.device_id = Some(bridge.id.clone());

        let registries = seed(
            &temp_dir,
            vec![AreaEntry::new("living_room", "Living Room")],
            vec![bridge],
            vec![light],
        )
        .await;
        registries.entities.register("demo", "switch.fan", None);
        registries.save_all().await.unwrap();

        let reloaded = Registries::new(temp_dir.path());
        reloaded.load_all().await.unwrap();

        assert_eq!(reloaded.entities.len(), 2);
        assert_eq!(reloaded.devices.len(), 1);
        assert_eq!(reloaded.areas.len(), 1);

        let entity = reloaded.entities.get("light.living_room").unwrap();
        assert_eq!(
            reloaded.entity_area_name(&entity).as_deref(),
            Some("Living Room")
        );
        let fan = reloaded.entities.get("switch.fan").unwrap();
        assert_eq!(reloaded.entity_area_name(&fan), None);
    }

    #[tokio::test]
    async fn test_entity_area_overrides_device_area() {
        let temp_dir = TempDir::new().unwrap();

        let mut sensor = DeviceEntry::new(Some("Motion Sensor"));
        sensor.area_id = Some("kitchen".to_string());
        let mut motion = EntityEntry::new("binary_sensor.motion", "zha", None);
        motion.device_id = Some(sensor.id.clone());
        motion.area_id = Some("hallway".to_string());

        let registries = seed(
            &temp_dir,
            vec![
                AreaEntry::new("kitchen", "Kitchen"),
                AreaEntry::new("hallway", "Hallway"),
            ],
            vec![sensor],
            vec![motion],
        )
        .await;

        let entity = registries.entities.get("binary_sensor.motion").unwrap();
        assert_eq!(
            registries.entity_area_name(&entity).as_deref(),
            Some("Hallway")
        );
    }
}
