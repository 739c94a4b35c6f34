//! Error types shared by the hub packages.

use std::time::Duration;

use thiserror::Error;

use crate::{ConnectionId, TaskId};

/// Errors reported to callers of the hub.
///
/// None of these are fatal to the hub itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HubError {
    #[error("Connection not found: {0}")]
    ConnectionNotFound(ConnectionId),

    #[error("Connection {connection_id} is not subscribed to task {task_id}")]
    NotSubscribed {
        connection_id: ConnectionId,
        task_id: TaskId,
    },

    #[error("Connection is closed: {0}")]
    ConnectionClosed(ConnectionId),

    #[error("Stream already opened for connection {0}")]
    StreamTaken(ConnectionId),

    #[error("Hub unavailable: {0}")]
    Unavailable(String),

    #[error("Replay of task {task_id} to connection {connection_id} failed; the connection stays open")]
    ReplayFailed {
        connection_id: ConnectionId,
        task_id: TaskId,
    },

    #[error("Invalid event type: {0:?}")]
    InvalidEventType(String),

    #[error("Hub call timed out")]
    Timeout,

    #[error("Invalid hub configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Why a single delivery to a connection failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("connection is inactive")]
    Inactive,

    #[error("delivery queue is full")]
    QueueFull,

    #[error("stream reader is gone")]
    Closed,
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },

    #[error("{key} must be greater than zero")]
    Zero { key: String },

    #[error(
        "queue_capacity ({queue_capacity}) must be at least max_history_entries ({max_history_entries})"
    )]
    QueueBelowHistory {
        queue_capacity: usize,
        max_history_entries: usize,
    },

    #[error(
        "heartbeat_interval ({heartbeat_interval:?}) must be shorter than connection_timeout ({connection_timeout:?})"
    )]
    HeartbeatTooSlow {
        heartbeat_interval: Duration,
        connection_timeout: Duration,
    },
}
