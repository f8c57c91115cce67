// ── Bridge facade ──
//
// Full lifecycle of one cloud session: login, directory load, realtime
// channel, event routing into the registry, outbound commands.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{Mutex, broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tuyabridge_api::mq::{BrokerConnector, ListenerError, ListenerId};
use tuyabridge_api::{
    ApiResponse, ChannelState, CloudClient, EventChannel, EventChannelConfig, MqttConnector,
    TransportConfig,
};

use crate::config::BridgeConfig;
use crate::error::CoreError;
use crate::model::{Device, RegistryEvent};
use crate::router::EventRouter;
use crate::store::DeviceRegistry;

/// Background pieces that exist only while connected.
struct Running {
    listener: ListenerId,
    cancel: CancellationToken,
    router: JoinHandle<()>,
}

/// The main entry point for consumers.
///
/// Cheaply cloneable. [`connect()`](Self::connect) authenticates, loads
/// the device directory and starts the realtime channel;
/// [`disconnect()`](Self::disconnect) tears it all down again.
pub struct Bridge<C: BrokerConnector = MqttConnector> {
    inner: Arc<BridgeInner<C>>,
}

impl<C: BrokerConnector> Clone for Bridge<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct BridgeInner<C: BrokerConnector> {
    config: BridgeConfig,
    client: Arc<CloudClient>,
    registry: Arc<DeviceRegistry>,
    channel: EventChannel<CloudClient, C>,
    running: Mutex<Option<Running>>,
}

impl Bridge<MqttConnector> {
    /// Create a bridge that talks to the vendor MQTT broker. Does NOT
    /// connect. The broker handshake shares the HTTP request timeout.
    pub fn new(config: BridgeConfig) -> Result<Self, CoreError> {
        let connector = MqttConnector::default().with_connect_timeout(config.timeout);
        Self::with_connector(config, connector)
    }
}

impl<C: BrokerConnector> Bridge<C> {
    /// Create a bridge with a custom broker connector.
    pub fn with_connector(config: BridgeConfig, connector: C) -> Result<Self, CoreError> {
        let transport = TransportConfig {
            tls: config.tls.clone(),
            timeout: config.timeout,
        };
        let client = Arc::new(CloudClient::new(
            config.credentials.clone(),
            config.project_type,
            config.endpoint.clone(),
            config.lang.clone(),
            &transport,
        )?);
        let channel = EventChannel::new(
            Arc::clone(&client),
            connector,
            EventChannelConfig::default().with_protocol_version(config.protocol_version),
        );

        Ok(Self {
            inner: Arc::new(BridgeInner {
                config,
                client,
                registry: Arc::new(DeviceRegistry::new()),
                channel,
                running: Mutex::new(None),
            }),
        })
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.inner.config
    }

    pub fn client(&self) -> &Arc<CloudClient> {
        &self.inner.client
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.inner.registry
    }

    // ── Connection lifecycle ─────────────────────────────────────────

    /// Log in, load every device into the registry, then start the
    /// realtime channel and the router task. No-op when already
    /// connected.
    pub async fn connect(&self) -> Result<(), CoreError> {
        let mut running = self.inner.running.lock().await;
        if running.is_some() {
            debug!("bridge already connected");
            return Ok(());
        }

        self.inner.client.login().await?;
        self.load_devices().await?;

        let (tx, rx) = mpsc::channel(self.inner.config.event_queue.max(1));
        let listener = self.inner.channel.add_listener(move |event| {
            tx.try_send(event.clone())
                .map_err(|e| ListenerError::from(format!("event queue: {e}")))
        });

        let cancel = CancellationToken::new();
        let router = EventRouter::new(
            Arc::clone(&self.inner.client),
            Arc::clone(&self.inner.registry),
        );
        let router = tokio::spawn(router.run(rx, cancel.clone()));

        self.inner.channel.start().await;
        *running = Some(Running {
            listener,
            cancel,
            router,
        });
        info!(devices = self.inner.registry.len(), "bridge connected");
        Ok(())
    }

    /// Stop the channel, then cancel and join the router. Idempotent.
    pub async fn disconnect(&self) {
        let Some(running) = self.inner.running.lock().await.take() else {
            return;
        };

        self.inner.channel.stop().await;
        self.inner.channel.remove_listener(running.listener);
        running.cancel.cancel();
        if let Err(e) = running.router.await {
            warn!(error = %e, "event router task failed");
        }
        info!("bridge disconnected");
    }

    /// Re-read the device directory into the registry.
    pub async fn load_devices(&self) -> Result<usize, CoreError> {
        let devices = self.inner.client.list_devices().await?;
        let count = devices.len();
        for device in devices {
            self.inner.registry.add_or_update(device.into());
        }
        debug!(count, "device directory loaded");
        Ok(count)
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Send one `(code, value)` command to a device.
    ///
    /// The cloud's envelope is returned as-is; a `success: false` reply
    /// is not an error here.
    pub async fn send_command(
        &self,
        device_id: &str,
        code: &str,
        value: Value,
    ) -> Result<ApiResponse, CoreError> {
        info!(device_id, code, "sending command");
        Ok(self.inner.client.send_command(device_id, code, value).await?)
    }

    // ── Observation ──────────────────────────────────────────────────

    pub fn devices_snapshot(&self) -> Arc<Vec<Arc<Device>>> {
        self.inner.registry.snapshot()
    }

    pub fn device(&self, device_id: &str) -> Result<Arc<Device>, CoreError> {
        self.inner
            .registry
            .get(device_id)
            .ok_or_else(|| CoreError::DeviceNotFound {
                identifier: device_id.to_owned(),
            })
    }

    /// Discovery and status notifications from the registry.
    pub fn events(&self) -> broadcast::Receiver<RegistryEvent> {
        self.inner.registry.events()
    }

    pub fn channel_state(&self) -> watch::Receiver<ChannelState> {
        self.inner.channel.state()
    }

    /// `false` once the realtime channel has given up, even while the
    /// bridge is still nominally connected.
    pub async fn channel_running(&self) -> bool {
        self.inner.channel.is_running().await
    }

    pub async fn is_connected(&self) -> bool {
        self.inner.running.lock().await.is_some()
    }
}
