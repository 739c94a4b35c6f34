//! Per-connection outbound stream.
//!
//! A stream walks CONNECTED → STREAMING → CLOSING:
//! - CONNECTED emits one `connected` record.
//! - STREAMING forwards queued events and emits a `heartbeat` whenever the
//!   queue stays empty for a full heartbeat interval.
//! - CLOSING disconnects the connection from the hub and ends the stream.
//!
//! CLOSING is entered after a terminal event is forwarded, when the hub
//! closes the queue, or when the consumer drops the stream.

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use hub_core::{ConnectionId, TaskId, TerminalPolicy, WireRecord};
use ractor::ActorRef;

use crate::connection::EventReceiver;
use crate::messages::{HubMessage, StreamParts};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Connected,
    Streaming,
    Closing,
    Done,
}

struct Generator {
    phase: Phase,
    connection_id: ConnectionId,
    first_task: Option<TaskId>,
    receiver: EventReceiver,
    heartbeat_interval: Duration,
    terminal: TerminalPolicy,
    hub: ActorRef<HubMessage>,
    released: bool,
}

impl Generator {
    async fn next_record(&mut self) -> Option<WireRecord> {
        loop {
            match self.phase {
                Phase::Connected => {
                    self.phase = Phase::Streaming;
                    return Some(WireRecord::connected(
                        self.connection_id,
                        self.first_task.as_ref(),
                    ));
                }
                Phase::Streaming => {
                    match tokio::time::timeout(self.heartbeat_interval, self.receiver.recv()).await
                    {
                        Ok(Some(event)) => {
                            self.touch();
                            if self.terminal.is_terminal(&event.event_type) {
                                self.phase = Phase::Closing;
                            }
                            return Some(WireRecord::from_event(&event));
                        }
                        Ok(None) => {
                            // Queue closed by the hub.
                            self.phase = Phase::Closing;
                        }
                        Err(_) => {
                            self.touch();
                            return Some(WireRecord::heartbeat());
                        }
                    }
                }
                Phase::Closing => {
                    self.release();
                    self.phase = Phase::Done;
                }
                Phase::Done => return None,
            }
        }
    }

    fn touch(&self) {
        let _ = self.hub.send_message(HubMessage::Touch {
            connection_id: self.connection_id,
        });
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        let sent = self.hub.send_message(HubMessage::Disconnect {
            connection_id: self.connection_id,
            reply: None,
        });
        if sent.is_err() {
            tracing::debug!(connection_id = %self.connection_id, "Hub already stopped");
        } else {
            tracing::debug!(connection_id = %self.connection_id, "Stream closed");
        }
    }
}

impl Drop for Generator {
    fn drop(&mut self) {
        self.release();
    }
}

/// Lazy, non-restartable sequence of wire records for one connection.
///
/// Dropping the stream disconnects the connection.
pub struct EventStream {
    connection_id: ConnectionId,
    inner: BoxStream<'static, WireRecord>,
}

impl EventStream {
    /// Build the stream from the parts handed out by the hub.
    pub fn new(hub: ActorRef<HubMessage>, parts: StreamParts) -> Self {
        let connection_id = parts.connection_id;
        let generator = Generator {
            phase: Phase::Connected,
            connection_id,
            first_task: parts.first_task,
            receiver: parts.receiver,
            heartbeat_interval: parts.heartbeat_interval,
            terminal: parts.terminal,
            hub,
            released: false,
        };

        let inner = stream::unfold(generator, |mut generator| async move {
            let record = generator.next_record().await?;
            Some((record, generator))
        })
        .boxed();

        Self {
            connection_id,
            inner,
        }
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }
}

impl Stream for EventStream {
    type Item = WireRecord;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

impl std::fmt::Debug for EventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream")
            .field("connection_id", &self.connection_id)
            .finish_non_exhaustive()
    }
}
