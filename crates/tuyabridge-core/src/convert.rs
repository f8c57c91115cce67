// ── API-to-domain type conversions ──
//
// Bridges raw `tuyabridge_api` response types into the registry's
// `Device`. Status lists become an ordered code -> value map; entries
// without a code are dropped.

use indexmap::IndexMap;

use tuyabridge_api::models::{DeviceFunctions, StatusEntry};
use tuyabridge_api::{Device as ApiDevice, StatusValue};

use crate::model::{Device, DeviceKind};

/// Fold a status list into a map, skipping empty codes. Later entries
/// win over earlier ones with the same code.
pub(crate) fn status_map(entries: Vec<StatusEntry>) -> IndexMap<String, StatusValue> {
    entries
        .into_iter()
        .filter(|e| !e.code.is_empty())
        .map(|e| (e.code, e.value))
        .collect()
}

impl From<ApiDevice> for Device {
    fn from(d: ApiDevice) -> Self {
        let kind = DeviceKind::from_category(&d.category);
        Self {
            id: d.id,
            name: d.name,
            category: d.category,
            kind,
            online: d.online,
            functions: d.functions,
            status: status_map(d.status),
        }
    }
}

/// Combine a device-info response with its separately fetched control
/// surface, as done when a device is bound at runtime.
pub(crate) fn with_functions(mut info: ApiDevice, functions: DeviceFunctions) -> Device {
    info.functions = functions.functions;
    if info.category.is_empty() {
        info.category = functions.category;
    }
    info.into()
}
