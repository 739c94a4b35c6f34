use std::error::Error;

use futures_util::StreamExt;
use tokio::task::JoinHandle;

use api::{EventHub, EventStream, HubConfig, HubError, WireRecord};

pub async fn start_hub(config: HubConfig) -> Result<(EventHub, JoinHandle<()>), HubError> {
    EventHub::start(config).await
}

pub async fn next_record(stream: &mut EventStream) -> Result<WireRecord, Box<dyn Error>> {
    stream.next().await.ok_or_else(|| "stream ended early".into())
}

/// Read records until the stream ends or `limit` records were seen.
pub async fn collect_records(stream: &mut EventStream, limit: usize) -> Vec<WireRecord> {
    let mut records = Vec::new();
    while records.len() < limit {
        match stream.next().await {
            Some(record) => records.push(record),
            None => break,
        }
    }
    records
}
