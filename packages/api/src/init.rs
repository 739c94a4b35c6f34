//! Server initialization for the event hub.

use hub_core::HubConfig;

use crate::EventHub;

/// Initialize the event hub from `HUB_*` environment variables.
///
/// This should be called once at server startup before handling requests.
pub async fn init_hub() -> Result<EventHub, Box<dyn std::error::Error>> {
    tracing::info!("Initializing event hub...");

    let config = HubConfig::from_env()?;
    tracing::info!(
        heartbeat_secs = config.heartbeat_interval.as_secs(),
        connection_timeout_secs = config.connection_timeout.as_secs(),
        max_history_entries = config.max_history_entries,
        queue_capacity = config.queue_capacity,
        "Loaded hub configuration"
    );

    let (hub, _handle) = EventHub::start(config).await?;

    tracing::info!("Event hub initialized");
    Ok(hub)
}
