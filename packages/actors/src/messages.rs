//! Message types for the hub actor.

use std::time::Duration;

use hub_core::{
    ConnectionId, DeliveryReport, Event, HubError, HubStats, Metadata, TaskId, TerminalPolicy,
};
use ractor::RpcReplyPort;

use crate::connection::EventReceiver;

/// Everything a stream generator needs, handed out once per connection.
#[derive(Debug)]
pub struct StreamParts {
    pub connection_id: ConnectionId,
    pub receiver: EventReceiver,
    pub first_task: Option<TaskId>,
    pub heartbeat_interval: Duration,
    pub terminal: TerminalPolicy,
}

/// Messages for the HubActor.
#[derive(Debug)]
pub enum HubMessage {
    /// Open a connection, optionally subscribing it to a task right away.
    CreateConnection {
        initial_task: Option<TaskId>,
        metadata: Metadata,
        reply: RpcReplyPort<Result<ConnectionId, HubError>>,
    },

    /// Subscribe a connection to a task and replay its history.
    Subscribe {
        connection_id: ConnectionId,
        task_id: TaskId,
        reply: RpcReplyPort<Result<usize, HubError>>,
    },

    /// Remove one subscription.
    Unsubscribe {
        connection_id: ConnectionId,
        task_id: TaskId,
        reply: RpcReplyPort<Result<(), HubError>>,
    },

    /// Drop a connection and all its subscriptions. Unknown ids are ignored.
    Disconnect {
        connection_id: ConnectionId,
        reply: Option<RpcReplyPort<()>>,
    },

    /// Record an event for a task and fan it out.
    Publish {
        task_id: TaskId,
        event: Event,
        reply: Option<RpcReplyPort<DeliveryReport>>,
    },

    /// Deliver an event to every active connection without recording it.
    BroadcastAll {
        event: Event,
        reply: Option<RpcReplyPort<DeliveryReport>>,
    },

    /// Hand out the receiving side of a connection's queue.
    OpenStream {
        connection_id: ConnectionId,
        reply: RpcReplyPort<Result<StreamParts, HubError>>,
    },

    /// Refresh a connection's last-activity time.
    Touch { connection_id: ConnectionId },

    /// Get hub statistics.
    GetStats { reply: RpcReplyPort<HubStats> },

    /// Periodic expiry sweep over connections.
    SweepConnections,

    /// Periodic age-based history eviction.
    SweepHistory,

    /// Deferred eviction of one task's history after a terminal event.
    EvictTask { task_id: TaskId, through_seq: u64 },

    /// Stop maintenance, close every connection and stop the actor.
    Shutdown { reply: Option<RpcReplyPort<()>> },
}
