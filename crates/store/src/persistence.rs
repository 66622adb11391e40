//! Boundary contracts for the collaborators the store talks to.
//!
//! The store owns no storage and no player. It is handed a
//! [`ReviewPersistence`] implementation (HTTP client, database, or the
//! [`InMemoryPersistence`](crate::memory::InMemoryPersistence) used by tests)
//! and optionally a [`Playback`] handle for seeking.

use async_trait::async_trait;

use reelnote_core::review::{AssetStatus, Comment, ReviewAsset, Thread, ThreadState};
use reelnote_core::types::{EntityId, Seconds};

/// Failure reported by a persistence collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PersistenceError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("write rejected: {0}")]
    Rejected(String),
}

pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Durable storage for review assets.
///
/// Every write is scoped to the entity it names; implementations must not
/// overwrite unrelated fields. `persist_thread` is an append-only upsert of
/// the thread anchor: it creates the thread, or adds shapes it has not seen.
#[async_trait]
pub trait ReviewPersistence: Send + Sync {
    async fn fetch_asset(&self, asset_id: EntityId) -> PersistenceResult<ReviewAsset>;

    async fn fetch_asset_by_share_token(&self, token: &str) -> PersistenceResult<ReviewAsset>;

    async fn persist_thread(&self, asset_id: EntityId, thread: &Thread) -> PersistenceResult<()>;

    async fn persist_comment(&self, thread_id: EntityId, comment: &Comment) -> PersistenceResult<()>;

    async fn persist_thread_state(
        &self,
        thread_id: EntityId,
        state: ThreadState,
    ) -> PersistenceResult<()>;

    async fn persist_status(&self, asset_id: EntityId, status: AssetStatus) -> PersistenceResult<()>;

    /// Create (or return the existing) share token for an asset.
    async fn create_share_token(&self, asset_id: EntityId) -> PersistenceResult<String>;
}

/// The video element the review UI is attached to.
pub trait Playback: Send + Sync {
    fn current_time(&self) -> Seconds;

    fn seek(&self, time: Seconds);
}
