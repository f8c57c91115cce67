// ── Device domain types ──

use indexmap::IndexMap;
use serde::Serialize;

use super::category::DeviceKind;
use tuyabridge_api::{DeviceFunction, StatusValue};

/// A device as held by the registry.
///
/// `status` keeps codes in the order the platform first reported them;
/// realtime updates overwrite values in place.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Device {
    pub id: String,
    pub name: String,
    pub category: String,
    pub kind: DeviceKind,
    pub online: bool,
    pub functions: Vec<DeviceFunction>,
    pub status: IndexMap<String, StatusValue>,
}

impl Device {
    /// The discovery view of this device.
    pub fn summary(&self) -> DeviceSummary {
        DeviceSummary {
            id: self.id.clone(),
            online: self.online,
            name: self.name.clone(),
            category: self.category.clone(),
            category_name: self.kind.name().to_owned(),
            functions: self.functions.clone(),
        }
    }

    pub fn status_value(&self, code: &str) -> Option<&StatusValue> {
        self.status.get(code)
    }
}

/// Payload of [`RegistryEvent::DeviceDiscovered`](super::RegistryEvent).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceSummary {
    pub id: String,
    pub online: bool,
    pub name: String,
    pub category: String,
    pub category_name: String,
    pub functions: Vec<DeviceFunction>,
}
