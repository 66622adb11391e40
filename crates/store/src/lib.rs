//! `reelnote-store` library crate.
//!
//! The async review store and the collaborator contracts it depends on.
//! The `reelnote-session` binary in `main.rs` drives a scripted review
//! session against the in-memory backend.

pub mod config;
pub mod error;
pub mod memory;
pub mod persistence;
mod rollback;
pub mod store;

pub use config::StoreConfig;
pub use error::{StoreError, StoreResult};
pub use memory::{InMemoryPersistence, Operation};
pub use persistence::{PersistenceError, PersistenceResult, Playback, ReviewPersistence};
pub use store::{NewComment, NewThread, ReviewState, ReviewStore};
