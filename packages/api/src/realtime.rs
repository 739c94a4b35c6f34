//! Real-time event streaming via Server-Sent Events.

use std::future::Future;

use actors::EventStream;
use futures_util::StreamExt;
use hub_core::WireRecord;
use thiserror::Error;
use tokio::sync::mpsc;

/// Format a wire record as one SSE frame.
pub fn format_sse_record(record: &WireRecord) -> String {
    format!("event: {}\ndata: {}\n\n", record.event, record.data_json())
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport closed by peer")]
    Closed,

    #[error("transport write failed: {0}")]
    Write(String),
}

/// Destination that carries records to a remote client.
pub trait Transport {
    fn write(
        &mut self,
        record: &WireRecord,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// Transport that forwards SSE frames into a channel, typically the body of
/// a chunked HTTP response.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    tx: mpsc::Sender<String>,
}

impl ChannelTransport {
    pub fn new(tx: mpsc::Sender<String>) -> Self {
        Self { tx }
    }

    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }
}

impl Transport for ChannelTransport {
    async fn write(&mut self, record: &WireRecord) -> Result<(), TransportError> {
        self.tx
            .send(format_sse_record(record))
            .await
            .map_err(|_| TransportError::Closed)
    }
}

/// Copy a connection's stream into a transport until either side ends.
///
/// The stream is dropped on return, which disconnects the connection.
/// Returns the number of records written.
pub async fn pump<T: Transport>(mut stream: EventStream, transport: &mut T) -> usize {
    let connection_id = stream.connection_id();
    let mut written = 0;

    while let Some(record) = stream.next().await {
        if let Err(e) = transport.write(&record).await {
            tracing::debug!(%connection_id, error = %e, "Transport write failed, closing stream");
            break;
        }
        written += 1;
    }

    tracing::debug!(%connection_id, written, "Stream pump finished");
    written
}
