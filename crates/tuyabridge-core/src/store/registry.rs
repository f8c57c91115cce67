// ── Device registry ──
//
// Devices keyed by platform id in a `DashMap`. Membership changes rebuild
// the sorted snapshot published on a `watch` channel; status merges patch
// the one affected entry in place. Discovery and status changes are
// additionally broadcast as `RegistryEvent`s.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info};

use tuyabridge_api::StatusEntry;

use crate::model::{Device, RegistryEvent, StatusChange};

const EVENT_CAPACITY: usize = 256;

/// In-memory map of known devices.
///
/// Reads are lock-free snapshots. Writes take the per-shard lock of the
/// touched entry only, so concurrent status merges on different devices
/// never contend; merges on the same device are last-writer-wins per code.
pub struct DeviceRegistry {
    devices: DashMap<String, Arc<Device>>,
    snapshot: watch::Sender<Arc<Vec<Arc<Device>>>>,
    events: broadcast::Sender<RegistryEvent>,
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceRegistry {
    pub fn new() -> Self {
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            devices: DashMap::new(),
            snapshot,
            events,
        }
    }

    // ── Mutations ────────────────────────────────────────────────────

    /// Insert or overwrite a device by id.
    ///
    /// Emits `DeviceDiscovered` followed by one `StatusChanged` per
    /// reported status code. Returns `true` if the id was new.
    pub fn add_or_update(&self, device: Device) -> bool {
        let summary = device.summary();
        let initial: Vec<StatusChange> = device
            .status
            .iter()
            .map(|(code, value)| StatusChange {
                device_id: device.id.clone(),
                code: code.clone(),
                value: value.clone(),
            })
            .collect();

        info!(
            device_id = %device.id,
            name = %device.name,
            category = %device.category,
            "adding device"
        );
        let is_new = self
            .devices
            .insert(device.id.clone(), Arc::new(device))
            .is_none();
        self.rebuild_snapshot();

        self.emit(RegistryEvent::DeviceDiscovered(summary));
        for change in initial {
            self.emit(RegistryEvent::StatusChanged(change));
        }
        is_new
    }

    /// Merge status codes into a known device.
    ///
    /// Codes not present in `status` are left untouched; entries with an
    /// empty code are skipped. Emits one `StatusChanged` per merged entry.
    /// Returns `false` (and changes nothing) if the id is unknown.
    pub fn apply_status(&self, device_id: &str, status: Vec<StatusEntry>) -> bool {
        let changes: Vec<StatusChange> = {
            let Some(mut entry) = self.devices.get_mut(device_id) else {
                debug!(device_id, "status for unknown device ignored");
                return false;
            };
            let device = Arc::make_mut(entry.value_mut());

            let changes: Vec<StatusChange> = status
                .into_iter()
                .filter(|s| !s.code.is_empty())
                .map(|s| {
                    device.status.insert(s.code.clone(), s.value.clone());
                    StatusChange {
                        device_id: device_id.to_owned(),
                        code: s.code,
                        value: s.value,
                    }
                })
                .collect();

            // Patched under the entry guard so concurrent merges on this
            // device publish in the order they were applied.
            if !changes.is_empty() {
                self.patch_snapshot(Arc::clone(entry.value()));
            }
            changes
        };

        for change in changes {
            self.emit(RegistryEvent::StatusChanged(change));
        }
        true
    }

    /// Forget a device. Emits nothing.
    pub fn remove(&self, device_id: &str) -> Option<Arc<Device>> {
        let removed = self.devices.remove(device_id).map(|(_, d)| d);
        if removed.is_some() {
            info!(device_id, "removed device");
            self.rebuild_snapshot();
        }
        removed
    }

    // ── Reads ────────────────────────────────────────────────────────

    pub fn get(&self, device_id: &str) -> Option<Arc<Device>> {
        self.devices.get(device_id).map(|r| Arc::clone(r.value()))
    }

    pub fn contains(&self, device_id: &str) -> bool {
        self.devices.contains_key(device_id)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Current device set, ordered by id (cheap `Arc` clone).
    pub fn snapshot(&self) -> Arc<Vec<Arc<Device>>> {
        self.snapshot.borrow().clone()
    }

    /// Subscribe to snapshot changes.
    pub fn subscribe(&self) -> watch::Receiver<Arc<Vec<Arc<Device>>>> {
        self.snapshot.subscribe()
    }

    /// Subscribe to discovery and status notifications.
    pub fn events(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn rebuild_snapshot(&self) {
        let mut values: Vec<Arc<Device>> =
            self.devices.iter().map(|r| Arc::clone(r.value())).collect();
        values.sort_by(|a, b| a.id.cmp(&b.id));
        // `send_modify` updates unconditionally, even with zero receivers.
        self.snapshot.send_modify(|snap| *snap = Arc::new(values));
    }

    /// Replace (or insert) one device in the published snapshot, keeping
    /// id order. Copy-on-write: snapshots already handed out are untouched.
    fn patch_snapshot(&self, device: Arc<Device>) {
        self.snapshot.send_modify(|snap| {
            let devices = Arc::make_mut(snap);
            match devices.binary_search_by(|d| d.id.as_str().cmp(device.id.as_str())) {
                Ok(i) => {
                    if let Some(slot) = devices.get_mut(i) {
                        *slot = device;
                    }
                }
                Err(i) => devices.insert(i, device),
            }
        });
    }

    fn emit(&self, event: RegistryEvent) {
        // No subscribers is not an error.
        let _ = self.events.send(event);
    }
}
