//! Supervised broker connection with credential rotation.
//!
//! The supervisor loop is: fetch access config → connect (new) → close
//! (old) → sleep until shortly before the credentials expire → repeat.
//! A failed fetch is fatal. A failed connect backs off and re-fetches.
//! Each connection gets its own dispatch task that decrypts messages with
//! that connection's password and fans them out to listeners.
//!
//! ```rust,ignore
//! let channel = EventChannel::new(client, MqttConnector::default(), EventChannelConfig::default());
//! let id = channel.add_listener(|event| {
//!     println!("{event:?}");
//!     Ok(())
//! });
//! channel.start().await;
//! // ...
//! channel.stop().await;
//! ```

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::ProtocolVersion;
use super::broker::{
    AccessConfigSource, BrokerConnection, BrokerConnector, InboundMessage, ReconnectConfig,
    calculate_backoff,
};
use super::event::{ChannelEvent, MessageDecoder};

/// Link id sent with every access-config request; one per process.
static LINK_ID: LazyLock<String> = LazyLock::new(|| uuid::Uuid::new_v4().to_string());

/// Rotate this many seconds before the broker credentials expire.
const ROTATION_LEAD_SECS: u64 = 60;

const INBOUND_CAPACITY: usize = 256;

/// Error type listeners may return. Logged, never propagated.
pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;

type Listener = Arc<dyn Fn(&ChannelEvent) -> Result<(), ListenerError> + Send + Sync>;

/// Handle returned by [`EventChannel::add_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Lifecycle of the channel as seen through [`EventChannel::state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Stopped,
    Connecting,
    Connected,
    Disconnecting,
    Errored,
}

/// Tuning knobs for [`EventChannel`].
#[derive(Debug, Clone)]
pub struct EventChannelConfig {
    pub protocol_version: ProtocolVersion,
    /// Backoff applied when a connect attempt fails.
    pub reconnect: ReconnectConfig,
    /// Lower bound on the wait between credential rotations.
    pub min_rotation: Duration,
}

impl Default for EventChannelConfig {
    fn default() -> Self {
        Self {
            protocol_version: ProtocolVersion::V2,
            reconnect: ReconnectConfig::default(),
            min_rotation: Duration::from_secs(30),
        }
    }
}

impl EventChannelConfig {
    pub fn with_protocol_version(mut self, version: ProtocolVersion) -> Self {
        self.protocol_version = version;
        self
    }
}

/// How long to keep a connection before fetching fresh credentials.
pub fn rotation_delay(expire_time_secs: u64, floor: Duration) -> Duration {
    Duration::from_secs(expire_time_secs.saturating_sub(ROTATION_LEAD_SECS)).max(floor)
}

// ── Listeners ────────────────────────────────────────────────────────

#[derive(Default)]
struct Listeners {
    entries: DashMap<ListenerId, Listener>,
    next_id: AtomicU64,
}

impl Listeners {
    fn add(&self, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries.insert(id, listener);
        id
    }

    fn remove(&self, id: ListenerId) -> bool {
        self.entries.remove(&id).is_some()
    }

    /// Invoke every listener. Errors and panics are logged and contained.
    fn dispatch(&self, event: &ChannelEvent) {
        // Snapshot first so listeners may add or remove listeners.
        let snapshot: Vec<(ListenerId, Listener)> = self
            .entries
            .iter()
            .map(|e| (*e.key(), Arc::clone(e.value())))
            .collect();

        for (id, listener) in snapshot {
            match catch_unwind(AssertUnwindSafe(|| listener(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(listener = id.0, error = %e, "event listener failed"),
                Err(_) => error!(listener = id.0, "event listener panicked"),
            }
        }
    }
}

// ── EventChannel ─────────────────────────────────────────────────────

struct Supervisor {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

struct Inner<S, C> {
    source: Arc<S>,
    connector: C,
    config: EventChannelConfig,
    listeners: Arc<Listeners>,
    state: watch::Sender<ChannelState>,
    supervisor: Mutex<Option<Supervisor>>,
}

impl<S, C> Inner<S, C> {
    fn set_state(&self, state: ChannelState) {
        self.state.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
    }
}

/// Realtime event channel over the vendor broker.
///
/// Cheaply cloneable; clones share the same supervisor and listeners.
pub struct EventChannel<S, C> {
    inner: Arc<Inner<S, C>>,
}

impl<S, C> Clone for EventChannel<S, C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S, C> EventChannel<S, C>
where
    S: AccessConfigSource,
    C: BrokerConnector,
{
    pub fn new(source: Arc<S>, connector: C, config: EventChannelConfig) -> Self {
        let (state, _) = watch::channel(ChannelState::Stopped);
        Self {
            inner: Arc::new(Inner {
                source,
                connector,
                config,
                listeners: Arc::new(Listeners::default()),
                state,
                supervisor: Mutex::new(None),
            }),
        }
    }

    /// Register a listener for decoded events.
    pub fn add_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&ChannelEvent) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        self.inner.listeners.add(Arc::new(listener))
    }

    /// Remove a listener. Returns `false` if the id was unknown.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.inner.listeners.remove(id)
    }

    pub fn state(&self) -> watch::Receiver<ChannelState> {
        self.inner.state.subscribe()
    }

    pub fn current_state(&self) -> ChannelState {
        *self.inner.state.borrow()
    }

    /// Whether the supervisor task is alive. It exits on its own after a
    /// fatal access-config failure or when the retry limit is reached.
    pub async fn is_running(&self) -> bool {
        self.inner
            .supervisor
            .lock()
            .await
            .as_ref()
            .is_some_and(|s| !s.handle.is_finished())
    }

    /// Spawn the supervisor. No-op while one is already running.
    pub async fn start(&self) {
        let mut slot = self.inner.supervisor.lock().await;
        if slot.as_ref().is_some_and(|s| !s.handle.is_finished()) {
            debug!("event channel already running");
            return;
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(supervise(Arc::clone(&self.inner), cancel.clone()));
        *slot = Some(Supervisor { cancel, handle });
        info!("event channel started");
    }

    /// Stop the supervisor and close the live connection.
    ///
    /// Returns once the broker socket is closed. Idempotent.
    pub async fn stop(&self) {
        let running = self.inner.supervisor.lock().await.take();
        let Some(Supervisor { cancel, handle }) = running else {
            return;
        };

        cancel.cancel();
        if let Err(e) = handle.await {
            warn!(error = %e, "event channel supervisor failed");
        }
        self.inner.set_state(ChannelState::Stopped);
        info!("event channel stopped");
    }
}

// ── Supervisor loop ──────────────────────────────────────────────────

async fn supervise<S, C>(inner: Arc<Inner<S, C>>, cancel: CancellationToken)
where
    S: AccessConfigSource,
    C: BrokerConnector,
{
    let version = inner.config.protocol_version;
    let mut live: Option<C::Connection> = None;
    let mut final_state = ChannelState::Stopped;
    let mut attempt: u32 = 0;

    loop {
        inner.set_state(ChannelState::Connecting);

        let fetched = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            r = inner.source.fetch_access_config(&LINK_ID, version) => r,
        };
        let access = match fetched {
            Ok(access) => access,
            Err(e) => {
                error!(error = %e, "broker access config fetch failed, stopping event channel");
                final_state = ChannelState::Errored;
                break;
            }
        };

        let (tx, rx) = mpsc::channel(INBOUND_CAPACITY);
        let connected = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            r = inner.connector.connect(&access, tx) => r,
        };

        match connected {
            Ok(connection) => {
                attempt = 0;
                let decoder = MessageDecoder::new(&access, version);
                tokio::spawn(dispatch_loop(rx, decoder, Arc::clone(&inner.listeners)));

                if let Some(old) = live.replace(connection) {
                    debug!("closing previous broker connection");
                    old.close().await;
                }
                inner.set_state(ChannelState::Connected);

                let wait = rotation_delay(access.expire_time, inner.config.min_rotation);
                info!(
                    rotate_in_secs = wait.as_secs(),
                    "broker connected, scheduling credential rotation"
                );

                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(wait) => {}
                }
            }
            Err(e) => {
                inner.set_state(ChannelState::Errored);
                warn!(error = %e, attempt, "broker connect failed");

                if inner.config.reconnect.exhausted(attempt) {
                    error!(
                        max_retries = inner.config.reconnect.max_retries,
                        "broker connect limit reached, stopping event channel"
                    );
                    final_state = ChannelState::Errored;
                    break;
                }

                let delay = calculate_backoff(attempt, &inner.config.reconnect);
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

    if let Some(connection) = live.take() {
        inner.set_state(ChannelState::Disconnecting);
        connection.close().await;
    }
    inner.set_state(final_state);
    debug!("event channel supervisor exiting");
}

/// Decode messages from one connection until it closes.
async fn dispatch_loop(
    mut rx: mpsc::Receiver<InboundMessage>,
    decoder: MessageDecoder,
    listeners: Arc<Listeners>,
) {
    while let Some(message) = rx.recv().await {
        if message.topic != decoder.topic() {
            debug!(topic = %message.topic, "ignoring message on foreign topic");
            continue;
        }
        match decoder.decode(&message.payload) {
            Ok(event) => {
                debug!(?event, "broker event");
                listeners.dispatch(&event);
            }
            Err(e) => warn!(error = %e, "dropping undecodable broker message"),
        }
    }
}
