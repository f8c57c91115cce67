// ── Registry notifications ──

use serde::Serialize;

use super::device::DeviceSummary;
use tuyabridge_api::StatusValue;

/// One status code of one device changed (or was first reported).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusChange {
    pub device_id: String,
    pub code: String,
    pub value: StatusValue,
}

/// Outbound notification emitted by the device registry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RegistryEvent {
    DeviceDiscovered(DeviceSummary),
    StatusChanged(StatusChange),
}

impl RegistryEvent {
    pub fn device_id(&self) -> &str {
        match self {
            Self::DeviceDiscovered(d) => &d.id,
            Self::StatusChanged(s) => &s.device_id,
        }
    }
}
