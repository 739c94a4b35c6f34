//! Hub actor owning connections, subscriptions and history.

use std::collections::HashMap;
use std::sync::Arc;

use hub_core::{
    ConnectionId, DeliveryError, DeliveryReport, Event, HubConfig, HubError, HubStats, Metadata,
    TaskId, TerminalPolicy,
};
use ractor::{Actor, ActorProcessingErr, ActorRef};
use tokio::task::JoinHandle;

use crate::connection::Connection;
use crate::history::HistoryStore;
use crate::maintenance;
use crate::messages::{HubMessage, StreamParts};
use crate::subscriptions::SubscriptionIndex;

/// Result of publishing one event to a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishOutcome {
    pub report: DeliveryReport,
    /// History sequence of the event when it was terminal.
    pub terminal_seq: Option<u64>,
}

/// State for the hub actor.
///
/// Every registry lives here and is only touched from the actor's message
/// loop, one message at a time.
pub struct HubState {
    config: HubConfig,
    terminal: TerminalPolicy,
    connections: HashMap<ConnectionId, Connection>,
    subscriptions: SubscriptionIndex,
    history: HistoryStore,
    tickers: Vec<JoinHandle<()>>,
    evictions: HashMap<TaskId, JoinHandle<()>>,
}

impl HubState {
    /// Create an empty hub state.
    pub fn new(config: HubConfig, terminal: TerminalPolicy) -> Self {
        let history = HistoryStore::new(config.max_history_entries, config.max_history_age);
        Self {
            config,
            terminal,
            connections: HashMap::new(),
            subscriptions: SubscriptionIndex::new(),
            history,
            tickers: Vec::new(),
            evictions: HashMap::new(),
        }
    }

    /// Open a connection, subscribing it to `initial_task` when given.
    pub fn create_connection(
        &mut self,
        initial_task: Option<TaskId>,
        metadata: Metadata,
    ) -> Result<ConnectionId, HubError> {
        let connection = Connection::new(self.config.queue_capacity, metadata);
        let id = connection.id;
        self.connections.insert(id, connection);
        tracing::info!(connection_id = %id, "Connection opened");

        if let Some(task) = initial_task {
            self.subscribe(id, &task)?;
        }
        Ok(id)
    }

    /// Subscribe a connection to a task, then replay the task's history to it.
    ///
    /// Returns the number of replayed events. Replay runs to completion
    /// before this returns, so it always precedes live events for the task.
    pub fn subscribe(&mut self, id: ConnectionId, task: &TaskId) -> Result<usize, HubError> {
        let Some(connection) = self.connections.get_mut(&id) else {
            return Err(HubError::ConnectionNotFound(id));
        };
        if !connection.is_active() {
            return Err(HubError::ConnectionClosed(id));
        }

        self.subscriptions.insert(id, task);
        connection.note_subscription(task);

        let snapshot = self.history.snapshot(task);
        let mut replayed = 0;
        let mut saw_terminal = false;
        let mut failure = None;
        for event in snapshot {
            saw_terminal |= self.terminal.is_terminal(&event.event_type);
            match connection.send(event) {
                Ok(()) => replayed += 1,
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }

        if let Some(err) = failure {
            tracing::warn!(connection_id = %id, task_id = %task, error = %err, "Replay failed");
            self.drop_failed(id, task);
            if self.connections.contains_key(&id) {
                return Err(HubError::ReplayFailed {
                    connection_id: id,
                    task_id: task.clone(),
                });
            }
            return Err(HubError::ConnectionClosed(id));
        }

        tracing::debug!(connection_id = %id, task_id = %task, replayed, "Subscribed");
        if saw_terminal {
            self.close_connection(id);
        }
        Ok(replayed)
    }

    /// Remove one subscription.
    pub fn unsubscribe(&mut self, id: ConnectionId, task: &TaskId) -> Result<(), HubError> {
        if !self.connections.contains_key(&id) {
            return Err(HubError::ConnectionNotFound(id));
        }
        if !self.subscriptions.remove(id, task) {
            return Err(HubError::NotSubscribed {
                connection_id: id,
                task_id: task.clone(),
            });
        }
        tracing::debug!(connection_id = %id, task_id = %task, "Unsubscribed");
        Ok(())
    }

    /// Unsubscribe a connection from everything and discard it.
    ///
    /// Returns `false` for unknown or already-removed ids.
    pub fn disconnect(&mut self, id: ConnectionId) -> bool {
        self.subscriptions.remove_connection(id);
        match self.connections.remove(&id) {
            Some(_) => {
                tracing::info!(connection_id = %id, "Connection closed");
                true
            }
            None => false,
        }
    }

    /// Stop delivering to a connection but keep it until its stream drains.
    fn close_connection(&mut self, id: ConnectionId) {
        self.subscriptions.remove_connection(id);
        if let Some(connection) = self.connections.get_mut(&id) {
            connection.close();
        }
    }

    /// Handle a failed send: drop the subscription and, if nothing else is
    /// watched, the connection.
    fn drop_failed(&mut self, id: ConnectionId, task: &TaskId) {
        self.subscriptions.remove(id, task);
        if self.subscriptions.task_count_of(id) == 0 {
            self.disconnect(id);
        }
    }

    /// Record an event to the task's history, then fan it out.
    pub fn publish(&mut self, task: &TaskId, event: Event) -> PublishOutcome {
        let event = Arc::new(event);
        let seq = self.history.record(task, event.clone());
        let terminal = self.terminal.is_terminal(&event.event_type);

        let mut report = DeliveryReport::default();
        for id in self.subscriptions.subscribers(task) {
            let result = match self.connections.get_mut(&id) {
                Some(connection) => connection.send(event.clone()),
                None => Err(DeliveryError::Inactive),
            };
            match result {
                Ok(()) => {
                    report.delivered += 1;
                    if terminal {
                        self.close_connection(id);
                    }
                }
                Err(err) => {
                    report.dropped += 1;
                    tracing::warn!(
                        connection_id = %id,
                        task_id = %task,
                        error = %err,
                        "Failed to deliver event"
                    );
                    self.drop_failed(id, task);
                }
            }
        }

        tracing::debug!(
            task_id = %task,
            event_type = %event.event_type,
            delivered = report.delivered,
            dropped = report.dropped,
            "Published event"
        );

        PublishOutcome {
            report,
            terminal_seq: terminal.then_some(seq),
        }
    }

    /// Deliver an event to every active connection. History is untouched.
    pub fn broadcast_all(&mut self, event: Event) -> DeliveryReport {
        let event = Arc::new(event);
        let targets: Vec<ConnectionId> = self
            .connections
            .iter()
            .filter(|(_, c)| c.is_active())
            .map(|(id, _)| *id)
            .collect();

        let mut report = DeliveryReport::default();
        for id in targets {
            let result = match self.connections.get_mut(&id) {
                Some(connection) => connection.send(event.clone()),
                None => continue,
            };
            match result {
                Ok(()) => report.delivered += 1,
                Err(err) => {
                    report.dropped += 1;
                    tracing::warn!(connection_id = %id, error = %err, "Failed to broadcast event");
                    self.disconnect(id);
                }
            }
        }

        tracing::debug!(
            event_type = %event.event_type,
            delivered = report.delivered,
            dropped = report.dropped,
            "Broadcast event"
        );
        report
    }

    /// Hand out the receiving half of a connection's queue.
    pub fn open_stream(&mut self, id: ConnectionId) -> Result<StreamParts, HubError> {
        let connection = self
            .connections
            .get_mut(&id)
            .ok_or(HubError::ConnectionNotFound(id))?;
        let receiver = connection
            .take_receiver()
            .ok_or(HubError::StreamTaken(id))?;
        connection.touch();

        Ok(StreamParts {
            connection_id: id,
            receiver,
            first_task: connection.first_task().cloned(),
            heartbeat_interval: self.config.heartbeat_interval,
            terminal: self.terminal.clone(),
        })
    }

    pub fn touch(&mut self, id: ConnectionId) {
        if let Some(connection) = self.connections.get_mut(&id) {
            connection.touch();
        }
    }

    pub fn stats(&self) -> HubStats {
        let created = self.connections.values().map(|c| c.created_at);
        HubStats {
            connection_count: self.connections.len(),
            task_count: self.subscriptions.task_count(),
            history_size_by_task: self.history.sizes(),
            oldest_connection_time: created.clone().min(),
            newest_connection_time: created.max(),
        }
    }

    /// Disconnect every connection idle for longer than the configured timeout.
    pub fn sweep_connections(&mut self) -> usize {
        let timeout = self.config.connection_timeout;
        let expired: Vec<ConnectionId> = self
            .connections
            .iter()
            .filter(|(_, c)| c.is_expired(timeout))
            .map(|(id, _)| *id)
            .collect();
        for id in &expired {
            self.disconnect(*id);
        }
        expired.len()
    }

    /// Evict history entries past the age window.
    pub fn sweep_history(&mut self) -> usize {
        self.history.sweep()
    }

    /// Deferred eviction of a task whose last event was terminal.
    pub fn evict_task(&mut self, task: &TaskId, through_seq: u64) -> usize {
        self.evictions.remove(task);
        self.history.evict_if_last(task, through_seq)
    }

    /// Start the periodic expiry and history sweeps.
    pub fn start_maintenance(&mut self, hub: ActorRef<HubMessage>) {
        let period = self.config.sweep_interval;
        self.tickers.push(maintenance::spawn_ticker(
            hub.clone(),
            period,
            "connection_expiry",
            || HubMessage::SweepConnections,
        ));
        self.tickers.push(maintenance::spawn_ticker(
            hub,
            period,
            "history_eviction",
            || HubMessage::SweepHistory,
        ));
    }

    /// Schedule the one-shot eviction of a task's history, replacing any
    /// eviction already pending for it.
    pub fn schedule_eviction(&mut self, hub: ActorRef<HubMessage>, task: &TaskId, seq: u64) {
        let handle = maintenance::schedule_eviction(
            hub,
            self.config.terminal_retention,
            task.clone(),
            seq,
        );
        if let Some(previous) = self.evictions.insert(task.clone(), handle) {
            previous.abort();
        }
    }

    /// Cancel every timer owned by the hub.
    pub fn stop_maintenance(&mut self) {
        for ticker in self.tickers.drain(..) {
            ticker.abort();
        }
        for (_, eviction) in self.evictions.drain() {
            eviction.abort();
        }
    }

    /// Cancel timers and force-disconnect every connection.
    pub fn shutdown(&mut self) -> usize {
        self.stop_maintenance();
        let closed = self.connections.len();
        for connection in self.connections.values_mut() {
            connection.close();
        }
        self.connections.clear();
        self.subscriptions.clear();
        self.history.clear();
        closed
    }

    #[cfg(test)]
    fn connection(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.get(&id)
    }

    #[cfg(test)]
    fn subscriptions(&self) -> &SubscriptionIndex {
        &self.subscriptions
    }
}

/// Arguments for spawning the hub actor.
pub struct HubArgs {
    pub config: HubConfig,
    /// Overrides the policy derived from `config.terminal_events`.
    pub terminal: Option<TerminalPolicy>,
}

/// Actor that owns the event hub.
pub struct HubActor;

impl Actor for HubActor {
    type Msg = HubMessage;
    type State = HubState;
    type Arguments = HubArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        args.config.validate()?;
        tracing::info!(
            heartbeat_secs = args.config.heartbeat_interval.as_secs(),
            max_history_entries = args.config.max_history_entries,
            "Starting event hub"
        );

        let terminal = args
            .terminal
            .unwrap_or_else(|| args.config.terminal_policy());
        let mut state = HubState::new(args.config, terminal);
        state.start_maintenance(myself);
        Ok(state)
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            HubMessage::CreateConnection {
                initial_task,
                metadata,
                reply,
            } => {
                let _ = reply.send(state.create_connection(initial_task, metadata));
            }

            HubMessage::Subscribe {
                connection_id,
                task_id,
                reply,
            } => {
                let _ = reply.send(state.subscribe(connection_id, &task_id));
            }

            HubMessage::Unsubscribe {
                connection_id,
                task_id,
                reply,
            } => {
                let _ = reply.send(state.unsubscribe(connection_id, &task_id));
            }

            HubMessage::Disconnect {
                connection_id,
                reply,
            } => {
                state.disconnect(connection_id);
                if let Some(reply) = reply {
                    let _ = reply.send(());
                }
            }

            HubMessage::Publish {
                task_id,
                event,
                reply,
            } => {
                let outcome = state.publish(&task_id, event);
                if let Some(seq) = outcome.terminal_seq {
                    state.schedule_eviction(myself, &task_id, seq);
                }
                if let Some(reply) = reply {
                    let _ = reply.send(outcome.report);
                }
            }

            HubMessage::BroadcastAll { event, reply } => {
                let report = state.broadcast_all(event);
                if let Some(reply) = reply {
                    let _ = reply.send(report);
                }
            }

            HubMessage::OpenStream {
                connection_id,
                reply,
            } => {
                let _ = reply.send(state.open_stream(connection_id));
            }

            HubMessage::Touch { connection_id } => {
                state.touch(connection_id);
            }

            HubMessage::GetStats { reply } => {
                let _ = reply.send(state.stats());
            }

            HubMessage::SweepConnections => {
                let expired = state.sweep_connections();
                if expired > 0 {
                    tracing::info!(expired, "Expired idle connections");
                }
            }

            HubMessage::SweepHistory => {
                let evicted = state.sweep_history();
                if evicted > 0 {
                    tracing::info!(evicted, "Evicted aged history entries");
                }
            }

            HubMessage::EvictTask {
                task_id,
                through_seq,
            } => {
                let evicted = state.evict_task(&task_id, through_seq);
                tracing::debug!(task_id = %task_id, evicted, "Deferred history eviction");
            }

            HubMessage::Shutdown { reply } => {
                let closed = state.shutdown();
                tracing::info!(closed, "Shutting down event hub");
                if let Some(reply) = reply {
                    let _ = reply.send(());
                }
                myself.stop(None);
            }
        }

        Ok(())
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        state.stop_maintenance();
        Ok(())
    }
}

/// Validate `config` and start the hub actor.
///
/// `terminal` overrides the policy built from `config.terminal_events`.
pub async fn start_hub(
    config: HubConfig,
    terminal: Option<TerminalPolicy>,
) -> Result<(ActorRef<HubMessage>, JoinHandle<()>), HubError> {
    config.validate()?;
    Actor::spawn(None, HubActor, HubArgs { config, terminal })
        .await
        .map_err(|e| HubError::Unavailable(format!("Failed to spawn hub: {}", e)))
}
