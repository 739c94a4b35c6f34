//! Per-client connection state.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use hub_core::{ConnectionId, DeliveryError, Event, Metadata, TaskId};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::Instant;

/// Receiving half of a connection's delivery queue.
pub type EventReceiver = mpsc::Receiver<Arc<Event>>;

/// One open output channel to a client.
///
/// The hub owns the sending half; the stream generator takes the receiving
/// half exactly once.
#[derive(Debug)]
pub struct Connection {
    /// Unique connection ID.
    pub id: ConnectionId,
    /// When the connection was created.
    pub created_at: DateTime<Utc>,
    /// Owner or request context supplied by the caller.
    pub metadata: Metadata,
    tx: Option<mpsc::Sender<Arc<Event>>>,
    rx: Option<EventReceiver>,
    last_activity: Instant,
    active: bool,
    first_task: Option<TaskId>,
}

impl Connection {
    /// Create an active connection with an empty queue of the given capacity.
    pub fn new(capacity: usize, metadata: Metadata) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            id: ConnectionId::new(),
            created_at: Utc::now(),
            metadata,
            tx: Some(tx),
            rx: Some(rx),
            last_activity: Instant::now(),
            active: true,
            first_task: None,
        }
    }

    /// Enqueue an event for this connection's stream.
    ///
    /// Never blocks. A full queue counts as a failure so one stalled client
    /// cannot hold up fan-out to everyone else.
    pub fn send(&mut self, event: Arc<Event>) -> Result<(), DeliveryError> {
        if !self.active {
            return Err(DeliveryError::Inactive);
        }
        let Some(tx) = self.tx.as_ref() else {
            return Err(DeliveryError::Inactive);
        };
        match tx.try_send(event) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(DeliveryError::QueueFull),
            Err(TrySendError::Closed(_)) => {
                self.close();
                Err(DeliveryError::Closed)
            }
        }
    }

    /// Refresh the last-activity time.
    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// Whether the connection has been idle for longer than `timeout`.
    pub fn is_expired(&self, timeout: Duration) -> bool {
        self.last_activity.elapsed() > timeout
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Stop accepting events. Already-queued events stay readable; the
    /// stream ends once they are drained.
    pub fn close(&mut self) {
        self.active = false;
        self.tx = None;
    }

    /// Hand out the receiving half. Returns `None` once it has been taken.
    pub fn take_receiver(&mut self) -> Option<EventReceiver> {
        self.rx.take()
    }

    pub fn stream_opened(&self) -> bool {
        self.rx.is_none()
    }

    /// The first task this connection subscribed to.
    pub fn first_task(&self) -> Option<&TaskId> {
        self.first_task.as_ref()
    }

    /// Remember `task` as the first subscription if there was none yet.
    pub fn note_subscription(&mut self, task: &TaskId) {
        if self.first_task.is_none() {
            self.first_task = Some(task.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn event(kind: &str) -> Arc<Event> {
        Arc::new(Event::new(kind, Map::new()))
    }

    #[tokio::test]
    async fn send_preserves_order() {
        let mut conn = Connection::new(8, Map::new());
        let mut rx = conn.take_receiver().expect("receiver available");

        for kind in ["a", "b", "c"] {
            conn.send(event(kind)).expect("queued");
        }
        for kind in ["a", "b", "c"] {
            let got = rx.recv().await.expect("event");
            assert_eq!(got.event_type, kind);
        }
    }

    #[test]
    fn send_to_inactive_connection_fails() {
        let mut conn = Connection::new(8, Map::new());
        conn.close();
        assert_eq!(conn.send(event("x")), Err(DeliveryError::Inactive));
        assert!(!conn.is_active());
    }

    #[test]
    fn send_to_full_queue_fails() {
        let mut conn = Connection::new(1, Map::new());
        conn.send(event("first")).expect("queued");
        assert_eq!(conn.send(event("second")), Err(DeliveryError::QueueFull));
        // Still active; the caller decides what to do with it.
        assert!(conn.is_active());
    }

    #[test]
    fn send_after_reader_dropped_closes() {
        let mut conn = Connection::new(4, Map::new());
        drop(conn.take_receiver());
        assert_eq!(conn.send(event("x")), Err(DeliveryError::Closed));
        assert!(!conn.is_active());
    }

    #[tokio::test]
    async fn close_lets_reader_drain() {
        let mut conn = Connection::new(4, Map::new());
        let mut rx = conn.take_receiver().expect("receiver available");
        conn.send(event("last")).expect("queued");
        conn.close();

        assert_eq!(rx.recv().await.expect("drained").event_type, "last");
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn receiver_is_handed_out_once() {
        let mut conn = Connection::new(4, Map::new());
        assert!(!conn.stream_opened());
        assert!(conn.take_receiver().is_some());
        assert!(conn.take_receiver().is_none());
        assert!(conn.stream_opened());
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_follows_last_activity() {
        let mut conn = Connection::new(4, Map::new());
        let timeout = Duration::from_secs(10);
        assert!(!conn.is_expired(timeout));

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(conn.is_expired(timeout));

        conn.touch();
        assert!(!conn.is_expired(timeout));
    }

    #[test]
    fn first_task_is_sticky() {
        let mut conn = Connection::new(4, Map::new());
        conn.note_subscription(&TaskId::from("t1"));
        conn.note_subscription(&TaskId::from("t2"));
        assert_eq!(conn.first_task().map(TaskId::as_str), Some("t1"));
    }
}
