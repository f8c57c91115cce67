// tuyabridge-api: Async Rust client for the Tuya OpenAPI and its MQTT event channel

pub mod auth;
pub mod client;
pub mod devices;
pub mod error;
pub mod models;
pub mod mq;
pub mod session;
pub mod sign;
pub mod transport;

pub use auth::{Credentials, ProjectType, Region};
pub use client::{CloudClient, Query, query};
pub use error::Error;
pub use models::{
    AccessConfig, ApiResponse, Device, DeviceFunction, DeviceFunctions, StatusEntry, StatusValue,
    TokenGrant,
};
pub use mq::{
    ChannelEvent, ChannelState, EventChannel, EventChannelConfig, MqttConnector, ProtocolVersion,
    ReconnectConfig,
};
pub use session::{AuthState, Session, SessionManager};
pub use sign::{Signature, Signer};
pub use transport::{TlsMode, TransportConfig};
