//! Device registry
//!
//! Maps the GUID of the writer that declared a device to the device itself.
//! The registry holds the lookup entry only; callers keep their own
//! `Arc<Device>` handles, which stay valid after removal.

use crate::device::info::{DeviceInfo, InfoError};
use crate::device::{Device, DeviceOptions};
use crate::guid::Guid;
use crate::participant::Participant;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Invalid device info for {guid}: {source}")]
    InvalidInfo {
        guid: Guid,
        #[source]
        source: InfoError,
    },
}

pub type Result<T> = std::result::Result<T, RegistryError>;

type DeviceMap = HashMap<Guid, Arc<Device>>;

/// Process-wide directory of known devices
pub struct DeviceRegistry {
    devices: Mutex<DeviceMap>,
    options: DeviceOptions,
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceRegistry {
    /// Create an empty registry with default device options
    pub fn new() -> Self {
        Self::with_options(DeviceOptions::default())
    }

    pub fn with_options(options: DeviceOptions) -> Self {
        Self {
            devices: Mutex::new(HashMap::new()),
            options,
        }
    }

    /// Look up a device by GUID
    pub async fn find(&self, guid: &Guid) -> Option<Arc<Device>> {
        let devices = self.devices.lock().await;
        Self::find_locked(&devices, guid)
    }

    // Lookup for callers already holding the registry lock
    fn find_locked(devices: &DeviceMap, guid: &Guid) -> Option<Arc<Device>> {
        devices.get(guid).cloned()
    }

    /// Return the device for `guid`, creating it in the `Created` state if absent.
    ///
    /// An existing entry always wins: a second call with different `info`
    /// returns the original device unchanged.
    pub async fn create(
        &self,
        participant: Arc<dyn Participant>,
        guid: Guid,
        info: DeviceInfo,
    ) -> Result<Arc<Device>> {
        let mut devices = self.devices.lock().await;

        if let Some(existing) = Self::find_locked(&devices, &guid) {
            if existing.device_info() != &info {
                log::debug!(
                    "Device {} already registered as '{}'; ignoring new info for '{}'",
                    guid,
                    existing.device_info().name,
                    info.name
                );
            }
            return Ok(existing);
        }

        info.validate()
            .map_err(|source| RegistryError::InvalidInfo { guid, source })?;

        log::info!(
            "Registering device '{}' ({}) at {}",
            info.name,
            guid,
            info.topic_root
        );
        let device = Arc::new(Device::new(participant, guid, info, self.options.clone()));
        devices.insert(guid, device.clone());
        Ok(device)
    }

    /// Detach the entry for `guid`; handles held elsewhere remain usable
    pub async fn remove(&self, guid: &Guid) -> Option<Arc<Device>> {
        let removed = self.devices.lock().await.remove(guid);
        if let Some(ref device) = removed {
            log::info!(
                "Removed device '{}' ({})",
                device.device_info().name,
                guid
            );
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.devices.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.devices.lock().await.is_empty()
    }

    /// Snapshot of all registered devices
    pub async fn devices(&self) -> Vec<Arc<Device>> {
        self.devices.lock().await.values().cloned().collect()
    }

    /// Drop every entry (shutdown)
    pub async fn clear(&self) {
        let mut devices = self.devices.lock().await;
        log::debug!("Clearing {} registered devices", devices.len());
        devices.clear();
    }
}
