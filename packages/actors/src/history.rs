//! Bounded per-task event history used to replay state to late subscribers.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use hub_core::{Event, TaskId};
use tokio::time::Instant;

/// One recorded event.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    /// Monotonic sequence number across all tasks.
    pub seq: u64,
    /// The recorded event.
    pub event: Arc<Event>,
    recorded_at: Instant,
}

/// Per-task, insertion-ordered event history with count and age limits.
#[derive(Debug)]
pub struct HistoryStore {
    entries: HashMap<TaskId, VecDeque<HistoryEntry>>,
    max_entries: usize,
    max_age: Duration,
    next_seq: u64,
}

impl HistoryStore {
    pub fn new(max_entries: usize, max_age: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            max_entries: max_entries.max(1),
            max_age,
            next_seq: 1,
        }
    }

    /// Append an event for `task`, trimming the oldest entries past the cap.
    ///
    /// Returns the sequence number of the new entry.
    pub fn record(&mut self, task: &TaskId, event: Arc<Event>) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;

        let entries = self.entries.entry(task.clone()).or_default();
        entries.push_back(HistoryEntry {
            seq,
            event,
            recorded_at: Instant::now(),
        });
        while entries.len() > self.max_entries {
            entries.pop_front();
        }
        seq
    }

    /// Copy of the task's events in recorded order.
    ///
    /// Replay iterates this copy, so later records cannot disturb it.
    pub fn snapshot(&self, task: &TaskId) -> Vec<Arc<Event>> {
        self.entries
            .get(task)
            .map(|entries| entries.iter().map(|e| e.event.clone()).collect())
            .unwrap_or_default()
    }

    /// Sequence number of the task's newest entry.
    pub fn last_seq(&self, task: &TaskId) -> Option<u64> {
        self.entries
            .get(task)
            .and_then(|entries| entries.back())
            .map(|entry| entry.seq)
    }

    /// Drop the task's whole history. Returns the number of entries removed.
    pub fn evict_task(&mut self, task: &TaskId) -> usize {
        self.entries.remove(task).map_or(0, |entries| entries.len())
    }

    /// Drop the task's history only if its newest entry is still `seq`.
    pub fn evict_if_last(&mut self, task: &TaskId, seq: u64) -> usize {
        if self.last_seq(task) == Some(seq) {
            self.evict_task(task)
        } else {
            0
        }
    }

    /// Remove entries older than the age window and tasks left empty.
    ///
    /// Returns the number of entries removed.
    pub fn sweep(&mut self) -> usize {
        let max_age = self.max_age;
        let mut removed = 0;
        self.entries.retain(|_, entries| {
            while entries
                .front()
                .is_some_and(|entry| entry.recorded_at.elapsed() > max_age)
            {
                entries.pop_front();
                removed += 1;
            }
            !entries.is_empty()
        });
        removed
    }

    pub fn len(&self, task: &TaskId) -> usize {
        self.entries.get(task).map_or(0, VecDeque::len)
    }

    /// Number of tasks with recorded history.
    pub fn task_count(&self) -> usize {
        self.entries.len()
    }

    /// Entry counts per task.
    pub fn sizes(&self) -> BTreeMap<TaskId, usize> {
        self.entries
            .iter()
            .map(|(task, entries)| (task.clone(), entries.len()))
            .collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map, json};

    fn event(pct: u64) -> Arc<Event> {
        let mut payload = Map::new();
        payload.insert("pct".into(), json!(pct));
        Arc::new(Event::new("progress", payload))
    }

    fn pcts(events: &[Arc<Event>]) -> Vec<u64> {
        events
            .iter()
            .filter_map(|e| e.payload.get("pct").and_then(|v| v.as_u64()))
            .collect()
    }

    #[test]
    fn record_trims_to_cap_keeping_newest() {
        let mut store = HistoryStore::new(3, Duration::from_secs(300));
        let task = TaskId::from("t1");
        for pct in 0..5 {
            store.record(&task, event(pct));
        }
        assert_eq!(store.len(&task), 3);
        assert_eq!(pcts(&store.snapshot(&task)), vec![2, 3, 4]);
    }

    #[test]
    fn snapshot_is_isolated_from_later_records() {
        let mut store = HistoryStore::new(10, Duration::from_secs(300));
        let task = TaskId::from("t1");
        store.record(&task, event(1));

        let snapshot = store.snapshot(&task);
        store.record(&task, event(2));

        assert_eq!(pcts(&snapshot), vec![1]);
        assert_eq!(store.len(&task), 2);
    }

    #[test]
    fn evict_if_last_respects_newer_entries() {
        let mut store = HistoryStore::new(10, Duration::from_secs(300));
        let task = TaskId::from("t1");
        let terminal = store.record(&task, event(100));
        store.record(&task, event(5));

        assert_eq!(store.evict_if_last(&task, terminal), 0);
        assert_eq!(store.len(&task), 2);

        let last = store.last_seq(&task).expect("has entries");
        assert_eq!(store.evict_if_last(&task, last), 2);
        assert_eq!(store.task_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_removes_only_aged_entries() {
        let mut store = HistoryStore::new(10, Duration::from_secs(60));
        let old_task = TaskId::from("old");
        let mixed_task = TaskId::from("mixed");

        store.record(&old_task, event(1));
        store.record(&mixed_task, event(1));
        tokio::time::advance(Duration::from_secs(45)).await;
        store.record(&mixed_task, event(2));
        tokio::time::advance(Duration::from_secs(30)).await;

        assert_eq!(store.sweep(), 2);
        assert_eq!(store.len(&old_task), 0);
        assert_eq!(pcts(&store.snapshot(&mixed_task)), vec![2]);
        assert_eq!(store.task_count(), 1);
    }

    #[test]
    fn unknown_task_is_empty() {
        let store = HistoryStore::new(10, Duration::from_secs(60));
        let task = TaskId::from("none");
        assert!(store.snapshot(&task).is_empty());
        assert_eq!(store.last_seq(&task), None);
    }
}
