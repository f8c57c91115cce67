//! Device registry and bridge lifecycle on top of `tuyabridge-api`.
//!
//! - **[`Bridge`]**: facade owning one cloud session.
//!   [`connect()`](Bridge::connect) logs in, loads the device directory
//!   into the registry, starts the realtime channel and spawns the event
//!   router; [`disconnect()`](Bridge::disconnect) stops both.
//!
//! - **[`DeviceRegistry`]**: `DashMap`-backed device map with a `watch`
//!   snapshot and a `broadcast` stream of [`RegistryEvent`]s.
//!
//! - **[`EventRouter`]**: applies decoded channel events (bind, delete,
//!   status) to the registry.
//!
//! - **Domain model** ([`model`]): [`Device`], [`DeviceKind`] and the
//!   notification payloads.

pub mod bridge;
pub mod config;
pub mod convert;
pub mod error;
pub mod model;
pub mod router;
pub mod store;

// ── Primary re-exports ──────────────────────────────────────────────
pub use bridge::Bridge;
pub use config::BridgeConfig;
pub use error::CoreError;
pub use router::EventRouter;
pub use store::DeviceRegistry;

pub use model::{
    Device, DeviceFunction, DeviceKind, DeviceSummary, RegistryEvent, StatusChange, StatusValue,
};

// Types consumers need to configure a bridge without depending on the
// api crate directly.
pub use tuyabridge_api::{
    ApiResponse, ChannelState, Credentials, ProjectType, ProtocolVersion, TlsMode,
};
