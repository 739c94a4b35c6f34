//! Event types pushed to client streams.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{ConnectionId, HubError, TaskId};

/// Free-form key/value payload carried by an event.
pub type Payload = Map<String, Value>;

/// Free-form connection metadata (owner, request context, ...).
pub type Metadata = Map<String, Value>;

/// Record type emitted first on every stream.
pub const CONNECTED: &str = "connected";

/// Record type synthesized when a stream has been idle for one heartbeat interval.
pub const HEARTBEAT: &str = "heartbeat";

/// Turn any JSON value into a payload.
///
/// Objects are used as-is; any other value is wrapped as `{"value": ...}`
/// and `null` becomes an empty payload.
pub fn payload_from_value(value: Value) -> Payload {
    match value {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other);
            map
        }
    }
}

/// Check that an event type can be framed as a single `event:` line.
pub fn validate_event_type(event_type: &str) -> Result<(), HubError> {
    if event_type.is_empty() || event_type.contains(['\r', '\n']) {
        return Err(HubError::InvalidEventType(event_type.to_string()));
    }
    Ok(())
}

/// An immutable event published to a task or broadcast to every connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Caller-defined type, e.g. `progress` or `completed`.
    pub event_type: String,
    /// Event body.
    #[serde(default)]
    pub payload: Payload,
    /// When the event was created.
    pub timestamp: DateTime<Utc>,
}

impl Event {
    /// Create an event stamped with the current time.
    pub fn new(event_type: impl Into<String>, payload: Payload) -> Self {
        Self {
            event_type: event_type.into(),
            payload,
            timestamp: Utc::now(),
        }
    }

    /// Create an event from any JSON value.
    ///
    /// Objects become the payload as-is; any other value is wrapped as
    /// `{"value": ...}` and `null` becomes an empty payload.
    pub fn from_value(event_type: impl Into<String>, value: Value) -> Self {
        Self::new(event_type, payload_from_value(value))
    }

    /// Check whether this event carries the given type.
    pub fn is(&self, event_type: &str) -> bool {
        self.event_type == event_type
    }
}

/// One item of an outbound stream, ready for any wire encoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireRecord {
    /// Record type.
    pub event: String,
    /// Record body; always contains a `timestamp` key.
    pub data: Payload,
}

impl WireRecord {
    /// Build the wire form of an event, injecting its timestamp if the payload has none.
    pub fn from_event(event: &Event) -> Self {
        let mut data = event.payload.clone();
        data.entry("timestamp")
            .or_insert_with(|| Value::String(event.timestamp.to_rfc3339()));
        Self {
            event: event.event_type.clone(),
            data,
        }
    }

    /// The synthetic first record of every stream.
    pub fn connected(connection_id: ConnectionId, task_id: Option<&TaskId>) -> Self {
        let mut data = Map::new();
        data.insert(
            "connection_id".to_string(),
            Value::String(connection_id.to_string()),
        );
        data.insert(
            "task_id".to_string(),
            task_id.map_or(Value::Null, |t| Value::String(t.to_string())),
        );
        Self::synthetic(CONNECTED, data)
    }

    /// A keep-alive record; never stored in history.
    pub fn heartbeat() -> Self {
        Self::synthetic(HEARTBEAT, Map::new())
    }

    fn synthetic(event: &str, mut data: Payload) -> Self {
        data.insert(
            "timestamp".to_string(),
            Value::String(Utc::now().to_rfc3339()),
        );
        Self {
            event: event.to_string(),
            data,
        }
    }

    /// Serialize the record body as JSON.
    pub fn data_json(&self) -> String {
        Value::Object(self.data.clone()).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wire_record_injects_timestamp() {
        let event = Event::new("progress", payload_from_value(json!({"pct": 10})));
        let record = WireRecord::from_event(&event);

        assert_eq!(record.event, "progress");
        assert_eq!(record.data["pct"], 10);
        assert_eq!(
            record.data["timestamp"],
            Value::String(event.timestamp.to_rfc3339())
        );
    }

    #[test]
    fn wire_record_keeps_caller_timestamp() {
        let event = Event::new("progress", payload_from_value(json!({"timestamp": "yesterday"})));
        let record = WireRecord::from_event(&event);
        assert_eq!(record.data["timestamp"], "yesterday");
    }

    #[test]
    fn connected_record_carries_ids() {
        let id = ConnectionId::new();
        let task = TaskId::from("t1");

        let record = WireRecord::connected(id, Some(&task));
        assert_eq!(record.event, CONNECTED);
        assert_eq!(record.data["connection_id"], id.to_string());
        assert_eq!(record.data["task_id"], "t1");

        let unbound = WireRecord::connected(id, None);
        assert!(unbound.data["task_id"].is_null());
    }

    #[test]
    fn heartbeat_has_timestamp_only() {
        let record = WireRecord::heartbeat();
        assert_eq!(record.event, HEARTBEAT);
        assert_eq!(record.data.len(), 1);
        assert!(record.data.contains_key("timestamp"));
    }

    #[test]
    fn from_value_wraps_scalars() {
        assert_eq!(Event::from_value("x", json!(5)).payload["value"], 5);
        assert!(Event::from_value("x", Value::Null).payload.is_empty());
        assert_eq!(Event::from_value("x", json!({"a": 1})).payload["a"], 1);
    }

    #[test]
    fn event_types_must_fit_one_line() {
        assert!(validate_event_type("progress").is_ok());
        assert!(validate_event_type("").is_err());
        assert_eq!(
            validate_event_type("progress\ndata: {}\n\nevent: completed"),
            Err(HubError::InvalidEventType(
                "progress\ndata: {}\n\nevent: completed".to_string()
            ))
        );
        assert!(validate_event_type("progress\r").is_err());
    }

    #[test]
    fn wire_record_serializes_as_event_and_data() {
        let record = WireRecord::from_event(&Event::new("done", Map::new()));
        let json = serde_json::to_value(&record).expect("serialize");
        assert_eq!(json["event"], "done");
        assert!(json["data"]["timestamp"].is_string());
    }
}
