use reelnote_core::error::CoreError;
use reelnote_core::types::EntityId;

use crate::persistence::PersistenceError;

/// Failure of a review store command.
///
/// The store records the display form of every failure in its `error`
/// field as well as returning it, so callers may ignore the `Err` and just
/// re-render.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    /// A domain-level validation error from `reelnote_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Thread not found: {0}")]
    ThreadNotFound(EntityId),

    #[error("No review asset is loaded")]
    AssetNotLoaded,

    #[error("Persistence failure: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Share token generation failed: {0}")]
    TokenGenerationFailed(String),
}

pub type StoreResult<T> = Result<T, StoreError>;
