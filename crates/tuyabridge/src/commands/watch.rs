//! `watch`: connect and stream registry events until Ctrl-C.

use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tuyabridge_core::{Bridge, ChannelState, CoreError, RegistryEvent};

use crate::error::CliError;
use crate::output;

const LIVENESS_CHECK: Duration = Duration::from_secs(5);

/// One compact JSON object per line, whatever the output format.
fn render_event(event: &RegistryEvent) -> String {
    output::render_json(event, true)
}

pub async fn handle(bridge: &Bridge) -> Result<(), CliError> {
    // Subscribe first: connect() emits discovery events for the directory.
    let mut events = bridge.events();
    let mut state = bridge.channel_state();

    bridge.connect().await?;
    eprintln!("watching {} devices, Ctrl-C to stop", bridge.registry().len());

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut liveness = tokio::time::interval(LIVENESS_CHECK);

    let result = loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("interrupted");
                break Ok(());
            }
            recv = events.recv() => match recv {
                Ok(event) => output::print_output(&render_event(&event)),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event consumer lagged; some events were dropped");
                }
                Err(RecvError::Closed) => break Err(CoreError::Disconnected.into()),
            },
            changed = state.changed() => {
                if changed.is_err() {
                    break Err(CoreError::Disconnected.into());
                }
                let current = *state.borrow_and_update();
                match current {
                    ChannelState::Errored => warn!("event channel errored, reconnecting"),
                    other => info!(state = ?other, "event channel state changed"),
                }
            }
            _ = liveness.tick() => {
                // A fatal channel error leaves the state at Errored with no
                // further change notifications.
                if !bridge.channel_running().await {
                    break Err(CoreError::Disconnected.into());
                }
            }
        }
    };

    bridge.disconnect().await;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use tuyabridge_core::{StatusChange, StatusValue};

    #[test]
    fn events_are_json_lines() {
        let event = RegistryEvent::StatusChanged(StatusChange {
            device_id: "d1".into(),
            code: "switch_1".into(),
            value: StatusValue::Bool(true),
        });
        assert_eq!(
            render_event(&event),
            r#"{"event":"status_changed","device_id":"d1","code":"switch_1","value":true}"#
        );
    }
}
