//! Actor system for the task event hub.
//!
//! This crate provides the Ractor-based hub that owns every connection,
//! subscription and history entry, plus the per-connection stream generator.
//!
//! # Architecture
//!
//! - `HubActor` - Single actor whose mailbox serializes all hub operations
//! - `Connection` - Delivery queue and liveness data for one client
//! - `SubscriptionIndex` - Connection ⇄ task relation
//! - `HistoryStore` - Bounded per-task history used for replay
//! - `EventStream` - Outbound record sequence for one connection
//!
//! # Usage
//!
//! ```ignore
//! use actors::{HubMessage, start_hub};
//!
//! let (hub, handle) = start_hub(HubConfig::default(), None).await?;
//! hub.send_message(HubMessage::Publish { task_id, event, reply: None })?;
//! ```

mod connection;
mod history;
mod hub_actor;
mod maintenance;
mod messages;
mod stream;
mod subscriptions;

pub use connection::{Connection, EventReceiver};
pub use history::{HistoryEntry, HistoryStore};
pub use hub_actor::{HubActor, HubArgs, HubState, PublishOutcome, start_hub};
pub use messages::{HubMessage, StreamParts};
pub use stream::EventStream;
pub use subscriptions::SubscriptionIndex;

/// Re-export ractor types for convenience.
pub use ractor::{Actor, ActorRef, RpcReplyPort, concurrency};
