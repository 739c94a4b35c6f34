#![allow(clippy::disallowed_methods)]

mod common;

use std::error::Error;
use std::time::Duration;

use futures_util::StreamExt;
use serde_json::json;

use api::{
    ChannelTransport, HubConfig, HubError, Metadata, Transport, TransportError, WireRecord,
    payload_from_value, pump,
};
use common::next_record;

/// Accepts `limit` records, then fails every write.
struct FailingTransport {
    limit: usize,
    written: Vec<String>,
}

impl Transport for FailingTransport {
    async fn write(&mut self, record: &WireRecord) -> Result<(), TransportError> {
        if self.written.len() >= self.limit {
            return Err(TransportError::Write("peer reset".to_string()));
        }
        self.written.push(record.event.clone());
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_when_queue_is_idle() -> Result<(), Box<dyn Error>> {
    let config = HubConfig::default().with_heartbeat_interval(Duration::from_secs(5));
    let (hub, _handle) = common::start_hub(config).await?;

    let mut stream = hub.attach("t1", Metadata::new()).await?;
    assert_eq!(next_record(&mut stream).await?.event, "connected");

    let heartbeat = next_record(&mut stream).await?;
    assert_eq!(heartbeat.event, "heartbeat");
    assert!(heartbeat.data.contains_key("timestamp"));

    hub.publish("t1", "progress", payload_from_value(json!({"pct": 5})))
        .await?;
    assert_eq!(next_record(&mut stream).await?.event, "progress");

    // Heartbeats are never recorded.
    let stats = hub.stats().await?;
    assert_eq!(stats.history_entries(), 1);

    hub.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_stream_can_only_be_taken_once() -> Result<(), Box<dyn Error>> {
    let (hub, _handle) = common::start_hub(HubConfig::default()).await?;

    let id = hub.create_connection(None, Metadata::new()).await?;
    let stream = hub.get_stream(id).await?;
    assert_eq!(stream.connection_id(), id);
    assert!(matches!(
        hub.get_stream(id).await,
        Err(HubError::StreamTaken(taken)) if taken == id
    ));

    hub.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_dropping_stream_disconnects() -> Result<(), Box<dyn Error>> {
    let (hub, _handle) = common::start_hub(HubConfig::default()).await?;

    let mut stream = hub.attach("t1", Metadata::new()).await?;
    assert_eq!(next_record(&mut stream).await?.event, "connected");
    assert_eq!(hub.stats().await?.connection_count, 1);

    drop(stream);

    let stats = hub.stats().await?;
    assert_eq!(stats.connection_count, 0);
    assert_eq!(stats.task_count, 0);

    hub.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_pump_stops_on_transport_failure() -> Result<(), Box<dyn Error>> {
    let (hub, _handle) = common::start_hub(HubConfig::default()).await?;

    for n in 0..3 {
        hub.publish("t1", "progress", payload_from_value(json!({"n": n})))
            .await?;
    }

    let stream = hub.attach("t1", Metadata::new()).await?;
    let mut transport = FailingTransport {
        limit: 2,
        written: Vec::new(),
    };
    let written = pump(stream, &mut transport).await;

    assert_eq!(written, 2);
    assert_eq!(transport.written, vec!["connected", "progress"]);
    assert_eq!(hub.stats().await?.connection_count, 0);

    hub.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_pump_into_channel_transport() -> Result<(), Box<dyn Error>> {
    let (hub, _handle) = common::start_hub(HubConfig::default()).await?;

    hub.publish("job-7", "progress", payload_from_value(json!({"pct": 40})))
        .await?;
    hub.publish("job-7", "failed", payload_from_value(json!({"reason": "boom"})))
        .await?;

    // The task already finished: replay, then the stream ends by itself.
    let stream = hub.attach("job-7", Metadata::new()).await?;
    let (mut transport, mut rx) = ChannelTransport::channel(16);
    let written = pump(stream, &mut transport).await;
    assert_eq!(written, 3);
    drop(transport);

    let mut frames = Vec::new();
    while let Some(frame) = rx.recv().await {
        frames.push(frame);
    }
    assert_eq!(frames.len(), 3);
    assert!(frames[0].starts_with("event: connected\ndata: "));
    assert!(frames[1].starts_with("event: progress\ndata: "));
    assert!(frames[1].contains("\"pct\":40"));
    assert!(frames[2].starts_with("event: failed\ndata: "));
    assert!(frames.iter().all(|f| f.ends_with("\n\n")));

    hub.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_shutdown_closes_streams() -> Result<(), Box<dyn Error>> {
    let (hub, handle) = common::start_hub(HubConfig::default()).await?;

    let mut stream = hub.attach("t1", Metadata::new()).await?;
    hub.publish("t1", "progress", payload_from_value(json!({}))).await?;

    hub.shutdown().await?;
    handle.await?;

    // Queued records still drain, then the stream ends.
    assert_eq!(next_record(&mut stream).await?.event, "connected");
    assert_eq!(next_record(&mut stream).await?.event, "progress");
    assert!(stream.next().await.is_none());

    assert!(hub.stats().await.is_err());
    Ok(())
}
