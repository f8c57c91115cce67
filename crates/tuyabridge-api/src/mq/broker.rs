// Broker connection plumbing.
//
// `AccessConfigSource` fetches short-lived broker credentials and
// `BrokerConnector` opens one subscribed connection with them. The MQTT
// implementation keeps its own event loop alive across transient errors
// with exponential backoff; credential rotation is the channel's job.

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS, Transport};
use secrecy::ExposeSecret;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

use super::ProtocolVersion;
use crate::client::CloudClient;
use crate::error::Error;
use crate::models::{AccessConfig, ApiResponse};

const ACCESS_CONFIG_PATH: &str = "/v1.0/iot-03/open-hub/access-config";

// Bounded request queue between AsyncClient and EventLoop.
const REQUEST_CAPACITY: usize = 10;

const KEEP_ALIVE: Duration = Duration::from_secs(60);
const MAX_PACKET_SIZE: usize = 256 * 1024;
const DISCONNECT_GRACE: Duration = Duration::from_secs(2);

/// A raw message received on a subscribed topic.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Bytes,
}

// ── Seams ────────────────────────────────────────────────────────────

/// Something that can hand out broker connection parameters.
pub trait AccessConfigSource: Send + Sync + 'static {
    fn fetch_access_config(
        &self,
        link_id: &str,
        version: ProtocolVersion,
    ) -> impl Future<Output = Result<AccessConfig, Error>> + Send;
}

/// An open, subscribed broker connection.
pub trait BrokerConnection: Send + 'static {
    /// Close the connection. The socket is released when this returns.
    fn close(self) -> impl Future<Output = ()> + Send;
}

/// Opens broker connections and forwards their messages to `inbound`.
pub trait BrokerConnector: Send + Sync + 'static {
    type Connection: BrokerConnection;

    /// Connect, subscribe to the device topic and wait for the broker to
    /// acknowledge both.
    fn connect(
        &self,
        config: &AccessConfig,
        inbound: mpsc::Sender<InboundMessage>,
    ) -> impl Future<Output = Result<Self::Connection, Error>> + Send;
}

// ── Access config over the cloud API ─────────────────────────────────

impl AccessConfigSource for CloudClient {
    /// `POST /v1.0/iot-03/open-hub/access-config`. Unlike other calls,
    /// `success: false` is an error here.
    async fn fetch_access_config(
        &self,
        link_id: &str,
        version: ProtocolVersion,
    ) -> Result<AccessConfig, Error> {
        let body = json!({
            "uid": self.session().uid(),
            "link_id": link_id,
            "link_type": "mqtt",
            "topics": "device",
            "msg_encrypted_version": version.as_str(),
        });

        self.post(ACCESS_CONFIG_PATH, Some(&body))
            .await
            .and_then(ApiResponse::ensure_success)
            .and_then(ApiResponse::result_as)
            .map_err(|e| Error::ConfigFetch {
                message: e.to_string(),
            })
    }
}

// ── ReconnectConfig ──────────────────────────────────────────────────

/// Exponential backoff configuration for broker reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 1s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 30s.
    pub max_delay: Duration,

    /// Maximum reconnection attempts before giving up.
    /// `None` means retry forever.
    pub max_retries: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_retries: None,
        }
    }
}

impl ReconnectConfig {
    pub(crate) fn exhausted(&self, attempt: u32) -> bool {
        self.max_retries.is_some_and(|max| attempt >= max)
    }
}

/// Exponential backoff with jitter.
///
/// `delay = min(initial * 2^attempt, max) * (1 +- 0.25)`
pub(crate) fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let exp = i32::try_from(attempt.min(31)).unwrap_or(31);
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(exp);
    let capped = base.min(config.max_delay.as_secs_f64());

    // Deterministic jitter seeded from the attempt number.
    let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
    Duration::from_secs_f64((capped * jitter_factor).max(0.0))
}

// ── MQTT ─────────────────────────────────────────────────────────────

/// [`BrokerConnector`] backed by `rumqttc`.
#[derive(Debug, Clone)]
pub struct MqttConnector {
    reconnect: ReconnectConfig,
    connect_timeout: Duration,
}

impl Default for MqttConnector {
    fn default() -> Self {
        Self::new(ReconnectConfig::default())
    }
}

impl MqttConnector {
    pub fn new(reconnect: ReconnectConfig) -> Self {
        Self {
            reconnect,
            connect_timeout: Duration::from_secs(30),
        }
    }

    /// Bound on the connect + subscribe handshake.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }
}

/// A live `rumqttc` connection and the task pumping its event loop.
pub struct MqttConnection {
    client: AsyncClient,
    cancel: CancellationToken,
    pump: JoinHandle<()>,
}

impl BrokerConnection for MqttConnection {
    async fn close(self) {
        if let Err(e) = self.client.try_disconnect() {
            debug!(error = %e, "disconnect request not queued");
        }
        self.cancel.cancel();
        if let Err(e) = self.pump.await {
            warn!(error = %e, "broker pump task failed");
        }
    }
}

impl BrokerConnector for MqttConnector {
    type Connection = MqttConnection;

    async fn connect(
        &self,
        config: &AccessConfig,
        inbound: mpsc::Sender<InboundMessage>,
    ) -> Result<MqttConnection, Error> {
        let options = broker_options(config)?;
        let topic = config.source_topic.device.clone();
        info!(url = %config.url, %topic, "connecting to broker");

        let (client, mut eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        client
            .subscribe(topic.as_str(), QoS::AtLeastOnce)
            .await
            .map_err(|e| Error::Broker(format!("subscribe request failed: {e}")))?;

        let handshake = async {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => debug!("broker accepted connection"),
                    Ok(Event::Incoming(Packet::SubAck(_))) => return Ok(()),
                    Ok(Event::Incoming(Packet::Publish(p))) => {
                        forward(&inbound, topic_name(&p.topic), p.payload).await;
                    }
                    Ok(_) => {}
                    Err(e) => return Err(Error::Broker(e.to_string())),
                }
            }
        };
        tokio::time::timeout(self.connect_timeout, handshake)
            .await
            .map_err(|_| Error::Broker("timed out waiting for broker acknowledgement".into()))??;

        info!("broker connected and subscribed");

        let cancel = CancellationToken::new();
        let pump = tokio::spawn(pump(
            eventloop,
            client.clone(),
            topic,
            inbound,
            self.reconnect.clone(),
            cancel.clone(),
        ));

        Ok(MqttConnection {
            client,
            cancel,
            pump,
        })
    }
}

/// Host, port and whether TLS is required. `ssl://`, `mqtts://` and
/// `tls://` URLs use TLS and default to port 8883.
fn broker_endpoint(raw: &str) -> Result<(String, u16, bool), Error> {
    let url = Url::parse(raw)?;
    let host = url
        .host_str()
        .ok_or_else(|| Error::Broker(format!("broker url has no host: {raw}")))?;
    let tls = matches!(url.scheme(), "ssl" | "mqtts" | "tls");
    let port = url.port().unwrap_or(if tls { 8883 } else { 1883 });
    Ok((host.to_owned(), port, tls))
}

fn broker_options(config: &AccessConfig) -> Result<MqttOptions, Error> {
    let (host, port, tls) = broker_endpoint(&config.url)?;

    let mut options = MqttOptions::new(&config.client_id, host, port);
    options
        .set_credentials(&config.username, config.password.expose_secret())
        .set_keep_alive(KEEP_ALIVE)
        .set_max_packet_size(MAX_PACKET_SIZE, MAX_PACKET_SIZE);
    if tls {
        options.set_transport(Transport::tls_with_default_config());
    }
    Ok(options)
}

fn topic_name(raw: &impl AsRef<[u8]>) -> String {
    String::from_utf8_lossy(raw.as_ref()).into_owned()
}

async fn forward(inbound: &mpsc::Sender<InboundMessage>, topic: String, payload: Bytes) -> bool {
    inbound
        .send(InboundMessage { topic, payload })
        .await
        .is_ok()
}

/// Drive the event loop until cancelled, resubscribing after the client
/// reconnects on its own.
async fn pump(
    mut eventloop: EventLoop,
    client: AsyncClient,
    topic: String,
    inbound: mpsc::Sender<InboundMessage>,
    reconnect: ReconnectConfig,
    cancel: CancellationToken,
) {
    let mut attempt: u32 = 0;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                flush_disconnect(&mut eventloop).await;
                break;
            }
            event = eventloop.poll() => match event {
                Ok(Event::Incoming(Packet::Publish(p))) => {
                    if !forward(&inbound, topic_name(&p.topic), p.payload).await {
                        debug!("inbound receiver dropped, stopping pump");
                        break;
                    }
                }
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    info!(attempt, "broker connection re-established");
                    attempt = 0;
                    if let Err(e) = client.try_subscribe(topic.as_str(), QoS::AtLeastOnce) {
                        warn!(error = %e, "resubscribe failed");
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, attempt, "broker connection error");

                    if reconnect.exhausted(attempt) {
                        error!(
                            max_retries = reconnect.max_retries,
                            "broker reconnection limit reached, giving up"
                        );
                        break;
                    }

                    let delay = calculate_backoff(attempt, &reconnect);
                    debug!(
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        attempt,
                        "waiting before broker reconnect"
                    );

                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => break,
                        () = tokio::time::sleep(delay) => {}
                    }

                    attempt += 1;
                }
            }
        }
    }

    debug!("broker pump exiting");
}

/// Give a queued DISCONNECT a moment to reach the wire.
async fn flush_disconnect(eventloop: &mut EventLoop) {
    let flushed = tokio::time::timeout(DISCONNECT_GRACE, async {
        while let Ok(event) = eventloop.poll().await {
            if matches!(event, Event::Outgoing(Outgoing::Disconnect)) {
                return;
            }
        }
    })
    .await;
    if flushed.is_err() {
        debug!("disconnect not flushed before grace period");
    }
}
