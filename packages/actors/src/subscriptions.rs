//! Bidirectional connection ⇄ task subscription index.

use std::collections::{HashMap, HashSet};

use hub_core::{ConnectionId, TaskId};

/// Many-to-many relation between connections and tasks.
///
/// Both directions are updated together so a connection appears under a
/// task iff the task appears under the connection.
#[derive(Debug, Default)]
pub struct SubscriptionIndex {
    by_task: HashMap<TaskId, HashSet<ConnectionId>>,
    by_connection: HashMap<ConnectionId, HashSet<TaskId>>,
}

impl SubscriptionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `connection` watches `task`. Returns `false` if it already did.
    pub fn insert(&mut self, connection: ConnectionId, task: &TaskId) -> bool {
        let added = self
            .by_task
            .entry(task.clone())
            .or_default()
            .insert(connection);
        self.by_connection
            .entry(connection)
            .or_default()
            .insert(task.clone());
        added
    }

    /// Remove one subscription. Returns `false` if it did not exist.
    pub fn remove(&mut self, connection: ConnectionId, task: &TaskId) -> bool {
        let removed = match self.by_task.get_mut(task) {
            Some(conns) => {
                let removed = conns.remove(&connection);
                if conns.is_empty() {
                    self.by_task.remove(task);
                }
                removed
            }
            None => false,
        };
        if let Some(tasks) = self.by_connection.get_mut(&connection) {
            tasks.remove(task);
            if tasks.is_empty() {
                self.by_connection.remove(&connection);
            }
        }
        removed
    }

    /// Remove every subscription of `connection`, returning the tasks it watched.
    pub fn remove_connection(&mut self, connection: ConnectionId) -> Vec<TaskId> {
        let tasks: Vec<TaskId> = self
            .by_connection
            .remove(&connection)
            .map(|tasks| tasks.into_iter().collect())
            .unwrap_or_default();
        for task in &tasks {
            if let Some(conns) = self.by_task.get_mut(task) {
                conns.remove(&connection);
                if conns.is_empty() {
                    self.by_task.remove(task);
                }
            }
        }
        tasks
    }

    /// Connections currently watching `task`.
    pub fn subscribers(&self, task: &TaskId) -> Vec<ConnectionId> {
        self.by_task
            .get(task)
            .map(|conns| conns.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn is_subscribed(&self, connection: ConnectionId, task: &TaskId) -> bool {
        self.by_task
            .get(task)
            .is_some_and(|conns| conns.contains(&connection))
    }

    /// Number of tasks the connection still watches.
    pub fn task_count_of(&self, connection: ConnectionId) -> usize {
        self.by_connection.get(&connection).map_or(0, HashSet::len)
    }

    /// Number of tasks with at least one subscriber.
    pub fn task_count(&self) -> usize {
        self.by_task.len()
    }

    pub fn clear(&mut self) {
        self.by_task.clear();
        self.by_connection.clear();
    }

    /// Check that both directions describe the same relation.
    pub fn is_consistent(&self) -> bool {
        let forward = self.by_task.iter().all(|(task, conns)| {
            !conns.is_empty()
                && conns.iter().all(|c| {
                    self.by_connection
                        .get(c)
                        .is_some_and(|tasks| tasks.contains(task))
                })
        });
        let backward = self.by_connection.iter().all(|(conn, tasks)| {
            !tasks.is_empty()
                && tasks.iter().all(|t| {
                    self.by_task
                        .get(t)
                        .is_some_and(|conns| conns.contains(conn))
                })
        });
        forward && backward
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_updates_both_directions() {
        let mut index = SubscriptionIndex::new();
        let c1 = ConnectionId::new();
        let t1 = TaskId::from("t1");

        assert!(index.insert(c1, &t1));
        assert!(!index.insert(c1, &t1));
        assert!(index.is_subscribed(c1, &t1));
        assert_eq!(index.subscribers(&t1), vec![c1]);
        assert_eq!(index.task_count_of(c1), 1);
        assert!(index.is_consistent());
    }

    #[test]
    fn remove_drops_empty_sets() {
        let mut index = SubscriptionIndex::new();
        let c1 = ConnectionId::new();
        let t1 = TaskId::from("t1");

        index.insert(c1, &t1);
        assert!(index.remove(c1, &t1));
        assert!(!index.remove(c1, &t1));
        assert_eq!(index.task_count(), 0);
        assert_eq!(index.task_count_of(c1), 0);
        assert!(index.is_consistent());
    }

    #[test]
    fn remove_connection_clears_every_task() {
        let mut index = SubscriptionIndex::new();
        let c1 = ConnectionId::new();
        let c2 = ConnectionId::new();
        let t1 = TaskId::from("t1");
        let t2 = TaskId::from("t2");

        index.insert(c1, &t1);
        index.insert(c1, &t2);
        index.insert(c2, &t1);

        let mut removed = index.remove_connection(c1);
        removed.sort();
        assert_eq!(removed, vec![t1.clone(), t2.clone()]);
        assert_eq!(index.subscribers(&t1), vec![c2]);
        assert!(index.subscribers(&t2).is_empty());
        assert_eq!(index.task_count(), 1);
        assert!(index.is_consistent());

        assert!(index.remove_connection(c1).is_empty());
    }

    #[test]
    fn unknown_task_has_no_subscribers() {
        let index = SubscriptionIndex::new();
        assert!(index.subscribers(&TaskId::from("nope")).is_empty());
    }
}
