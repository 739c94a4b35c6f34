//! Client handle for the event hub actor.

use std::time::Duration;

use actors::{EventStream, HubMessage, RpcReplyPort, start_hub};
use hub_core::{
    ConnectionId, DeliveryReport, Event, HubConfig, HubError, HubStats, Metadata, Payload, TaskId,
    TerminalPolicy, validate_event_type,
};
use ractor::ActorRef;
use ractor::rpc::CallResult;
use tokio::task::JoinHandle;

/// Cheaply cloneable handle to a running hub.
///
/// Collaborators hold one of these and pass it explicitly to whatever
/// publishes events or serves streams.
#[derive(Clone)]
pub struct EventHub {
    actor: ActorRef<HubMessage>,
    call_timeout: Duration,
}

impl EventHub {
    /// Start a hub using the terminal events listed in `config`.
    pub async fn start(config: HubConfig) -> Result<(Self, JoinHandle<()>), HubError> {
        Self::start_with_policy(config, None).await
    }

    /// Start a hub with an explicit terminal policy.
    pub async fn start_with_policy(
        config: HubConfig,
        terminal: Option<TerminalPolicy>,
    ) -> Result<(Self, JoinHandle<()>), HubError> {
        let call_timeout = config.call_timeout;
        let (actor, handle) = start_hub(config, terminal).await?;
        Ok((Self::from_actor(actor, call_timeout), handle))
    }

    /// Wrap an already running hub actor.
    pub fn from_actor(actor: ActorRef<HubMessage>, call_timeout: Duration) -> Self {
        Self {
            actor,
            call_timeout,
        }
    }

    pub fn actor(&self) -> &ActorRef<HubMessage> {
        &self.actor
    }

    async fn call<T, F>(&self, build: F) -> Result<T, HubError>
    where
        T: Send + 'static,
        F: FnOnce(RpcReplyPort<T>) -> HubMessage,
    {
        match ractor::rpc::call(&self.actor, build, Some(self.call_timeout)).await {
            Ok(CallResult::Success(value)) => Ok(value),
            Ok(CallResult::Timeout) => Err(HubError::Timeout),
            Ok(CallResult::SenderError) => Err(HubError::Unavailable(
                "hub dropped the request".to_string(),
            )),
            Err(e) => Err(HubError::Unavailable(e.to_string())),
        }
    }

    fn cast(&self, message: HubMessage) -> Result<(), HubError> {
        self.actor
            .send_message(message)
            .map_err(|e| HubError::Unavailable(e.to_string()))
    }

    /// Open a connection, optionally subscribed to `initial_task`.
    pub async fn create_connection(
        &self,
        initial_task: Option<TaskId>,
        metadata: Metadata,
    ) -> Result<ConnectionId, HubError> {
        self.call(|reply| HubMessage::CreateConnection {
            initial_task,
            metadata,
            reply,
        })
        .await?
    }

    /// Subscribe a connection to a task. Returns how many events were replayed.
    pub async fn subscribe(
        &self,
        connection_id: ConnectionId,
        task_id: impl Into<TaskId>,
    ) -> Result<usize, HubError> {
        let task_id = task_id.into();
        self.call(|reply| HubMessage::Subscribe {
            connection_id,
            task_id,
            reply,
        })
        .await?
    }

    pub async fn unsubscribe(
        &self,
        connection_id: ConnectionId,
        task_id: impl Into<TaskId>,
    ) -> Result<(), HubError> {
        let task_id = task_id.into();
        self.call(|reply| HubMessage::Unsubscribe {
            connection_id,
            task_id,
            reply,
        })
        .await?
    }

    /// Drop a connection. Disconnecting an unknown id is a no-op.
    pub async fn disconnect(&self, connection_id: ConnectionId) -> Result<(), HubError> {
        self.call(|reply| HubMessage::Disconnect {
            connection_id,
            reply: Some(reply),
        })
        .await
    }

    /// Record an event for a task and deliver it to the task's watchers.
    ///
    /// Event types must be non-empty and free of line breaks.
    pub async fn publish(
        &self,
        task_id: impl Into<TaskId>,
        event_type: impl Into<String>,
        payload: Payload,
    ) -> Result<DeliveryReport, HubError> {
        self.publish_event(task_id, Event::new(event_type, payload))
            .await
    }

    pub async fn publish_event(
        &self,
        task_id: impl Into<TaskId>,
        event: Event,
    ) -> Result<DeliveryReport, HubError> {
        validate_event_type(&event.event_type)?;
        let task_id = task_id.into();
        self.call(|reply| HubMessage::Publish {
            task_id,
            event,
            reply: Some(reply),
        })
        .await
    }

    /// Publish without waiting for the delivery report.
    pub fn publish_nowait(
        &self,
        task_id: impl Into<TaskId>,
        event: Event,
    ) -> Result<(), HubError> {
        validate_event_type(&event.event_type)?;
        self.cast(HubMessage::Publish {
            task_id: task_id.into(),
            event,
            reply: None,
        })
    }

    /// Deliver a process-wide notice to every active connection.
    pub async fn broadcast_all(
        &self,
        event_type: impl Into<String>,
        payload: Payload,
    ) -> Result<DeliveryReport, HubError> {
        let event = Event::new(event_type, payload);
        validate_event_type(&event.event_type)?;
        self.call(|reply| HubMessage::BroadcastAll {
            event,
            reply: Some(reply),
        })
        .await
    }

    /// Broadcast without waiting for the delivery report.
    pub fn broadcast_nowait(&self, event: Event) -> Result<(), HubError> {
        validate_event_type(&event.event_type)?;
        self.cast(HubMessage::BroadcastAll { event, reply: None })
    }

    /// Take the connection's outbound stream. Only the first call succeeds.
    pub async fn get_stream(&self, connection_id: ConnectionId) -> Result<EventStream, HubError> {
        let parts = self
            .call(|reply| HubMessage::OpenStream {
                connection_id,
                reply,
            })
            .await??;
        Ok(EventStream::new(self.actor.clone(), parts))
    }

    /// Create a connection watching `task_id` and return its stream.
    pub async fn attach(
        &self,
        task_id: impl Into<TaskId>,
        metadata: Metadata,
    ) -> Result<EventStream, HubError> {
        let connection_id = self
            .create_connection(Some(task_id.into()), metadata)
            .await?;
        self.get_stream(connection_id).await
    }

    pub async fn stats(&self) -> Result<HubStats, HubError> {
        self.call(|reply| HubMessage::GetStats { reply }).await
    }

    /// Stop maintenance, close every connection and stop the hub.
    pub async fn shutdown(&self) -> Result<(), HubError> {
        self.call(|reply| HubMessage::Shutdown { reply: Some(reply) })
            .await
    }
}

impl std::fmt::Debug for EventHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHub")
            .field("actor", &self.actor.get_id())
            .field("call_timeout", &self.call_timeout)
            .finish()
    }
}
