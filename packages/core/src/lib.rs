//! Core domain types for the task event hub.
//!
//! This crate contains shared types used across all packages:
//! - Connection and task identifiers
//! - Events and their wire representation
//! - Hub configuration and terminal-event policy
//! - Errors, statistics and delivery reports

mod config;
mod error;
mod events;
mod ids;
mod stats;
mod terminal;

pub use config::{DEFAULT_TERMINAL_EVENTS, HubConfig};
pub use error::{ConfigError, DeliveryError, HubError};
pub use events::{
    CONNECTED, Event, HEARTBEAT, Metadata, Payload, WireRecord, payload_from_value,
    validate_event_type,
};
pub use ids::{ConnectionId, TaskId};
pub use stats::{DeliveryReport, HubStats};
pub use terminal::{TerminalPolicy, TerminalPredicate};
