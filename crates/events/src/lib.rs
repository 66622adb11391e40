//! Review change notifications.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`ReviewEvent`]: envelope published by the review store whenever a
//!   command is confirmed or rolled back, so views know to re-read the store.

pub mod bus;

pub use bus::{event_types, EventBus, ReviewEvent};
