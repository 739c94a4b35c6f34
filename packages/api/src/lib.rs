//! Server-side API for the task event hub.
//!
//! This crate contains:
//! - `EventHub` - handle used by producers and stream consumers
//! - SSE framing and the transport pump for serving streams
//! - Startup helpers that read configuration from the environment

mod hub;
mod init;
mod realtime;

pub use hub::EventHub;
pub use init::init_hub;
pub use realtime::{ChannelTransport, Transport, TransportError, format_sse_record, pump};

// Re-export core types for convenience
pub use actors::EventStream;
pub use hub_core::{
    ConfigError, ConnectionId, DeliveryReport, Event, HubConfig, HubError, HubStats, Metadata,
    Payload, TaskId, TerminalPolicy, WireRecord, payload_from_value, validate_event_type,
};
