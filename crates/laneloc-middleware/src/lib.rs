//! `laneloc-middleware` – message routing for the lane filter.
//!
//! Moves inbound segments, velocity commands, switch toggles and
//! configurations to the filter node, and its results back out, without
//! caring about what the data means.
//!
//! # Modules
//!
//! - [`bus`] – Headless, typed, topic-based publish/subscribe event bus built
//!   on Tokio broadcast channels.
//! - [`ws_bridge`] – JSON WebSocket bridge that feeds client frames onto the
//!   bus and streams outbound results to clients.

pub mod bus;
pub mod ws_bridge;

pub use bus::{EventBus, Topic, TopicReceiver};
pub use ws_bridge::WsBridge;
