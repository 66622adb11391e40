//! Reelnote core: annotation geometry, the review domain model and thread
//! navigation. No I/O and no internal dependencies.

pub mod annotation;
pub mod error;
pub mod navigator;
pub mod normalize;
pub mod review;
pub mod types;
