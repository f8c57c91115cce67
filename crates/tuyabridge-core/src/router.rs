// ── Realtime event routing ──
//
// Applies decoded channel events to the registry. Runs as a single task
// draining a bounded queue so the broker's dispatch path never waits on
// the cloud API.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use tuyabridge_api::{ChannelEvent, CloudClient};

use crate::convert::with_functions;
use crate::error::CoreError;
use crate::store::DeviceRegistry;

pub struct EventRouter {
    client: Arc<CloudClient>,
    registry: Arc<DeviceRegistry>,
}

impl EventRouter {
    pub fn new(client: Arc<CloudClient>, registry: Arc<DeviceRegistry>) -> Self {
        Self { client, registry }
    }

    /// Apply one event.
    ///
    /// `Delete` removes the device, `Bind` fetches its details and
    /// functions and adds it, `Status` merges codes. Anything else is
    /// ignored.
    pub async fn route(&self, event: ChannelEvent) -> Result<(), CoreError> {
        match event {
            ChannelEvent::Delete { dev_id } => {
                self.registry.remove(&dev_id);
            }
            ChannelEvent::Bind { dev_id } => {
                let info = self.client.get_device_info(&dev_id).await?;
                let functions = self.client.get_device_functions(&dev_id).await?;
                self.registry.add_or_update(with_functions(info, functions));
            }
            ChannelEvent::Status { dev_id, status } => {
                self.registry.apply_status(&dev_id, status);
            }
            ChannelEvent::Other { biz_code, .. } => {
                debug!(?biz_code, "ignoring channel event");
            }
        }
        Ok(())
    }

    /// Drain `events` until the queue closes or `cancel` fires.
    pub async fn run(self, mut events: mpsc::Receiver<ChannelEvent>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                next = events.recv() => {
                    let Some(event) = next else { break };
                    let device_id = event.device_id().map(str::to_owned);
                    if let Err(e) = self.route(event).await {
                        warn!(?device_id, error = %e, "failed to apply channel event");
                    }
                }
            }
        }
        debug!("event router stopped");
    }
}
