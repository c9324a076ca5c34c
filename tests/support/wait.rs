use std::time::Duration;

use anyhow::{Context as _, Result};
use swap_watcher::swap::events::SwapEvent;
use tokio::sync::broadcast;

/// Waits for the next event called `name`, skipping others.
pub async fn wait_for_event(
    events: &mut broadcast::Receiver<SwapEvent>,
    name: &str,
    timeout: Duration,
) -> Result<SwapEvent> {
    tokio::time::timeout(timeout, async {
        loop {
            let event = events.recv().await.context("event channel closed")?;
            if event.name() == name {
                return Ok::<_, anyhow::Error>(event);
            }
        }
    })
    .await
    .with_context(|| format!("timeout waiting for {name}"))?
}
