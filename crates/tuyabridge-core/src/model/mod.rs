// ── Domain model ──
//
// Canonical device types held by the registry and the notifications it
// emits. API response shapes stay in `tuyabridge_api::models`.

pub mod category;
pub mod device;
pub mod event;

pub use category::DeviceKind;
pub use device::{Device, DeviceSummary};
pub use event::{RegistryEvent, StatusChange};

pub use tuyabridge_api::{DeviceFunction, StatusValue};
