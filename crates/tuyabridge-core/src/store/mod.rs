// ── Device store ──
//
// Concurrent device map with push-based change notification.

mod registry;

pub use registry::DeviceRegistry;
