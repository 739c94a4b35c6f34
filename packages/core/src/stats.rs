//! Hub statistics and delivery reports.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::TaskId;

/// Outcome of publishing or broadcasting one event.
///
/// `delivered == 0 && dropped == 0` means nobody was listening;
/// `dropped > 0` means listeners existed but their sends failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReport {
    /// Connections the event was enqueued for.
    pub delivered: usize,
    /// Connections whose send failed and which were dropped.
    pub dropped: usize,
}

impl DeliveryReport {
    /// Total number of connections the hub attempted to reach.
    pub fn attempted(&self) -> usize {
        self.delivered + self.dropped
    }
}

/// Snapshot of the hub's in-memory state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HubStats {
    /// Connections currently known to the hub.
    pub connection_count: usize,
    /// Tasks with at least one subscribed connection.
    pub task_count: usize,
    /// Number of history entries held per task.
    pub history_size_by_task: BTreeMap<TaskId, usize>,
    /// Creation time of the oldest connection.
    pub oldest_connection_time: Option<DateTime<Utc>>,
    /// Creation time of the newest connection.
    pub newest_connection_time: Option<DateTime<Utc>>,
}

impl HubStats {
    /// Total number of history entries across all tasks.
    pub fn history_entries(&self) -> usize {
        self.history_size_by_task.values().sum()
    }
}
