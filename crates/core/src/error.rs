#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CoreError {
    #[error("Invalid dimensions: {width}x{height} (both must be positive and finite)")]
    InvalidDimensions { width: f64, height: f64 },

    #[error("A thread must be anchored to at least one shape")]
    EmptyShapeSet,

    #[error("Invalid time range: start {start} end {end:?}")]
    InvalidTimeRange { start: f64, end: Option<f64> },

    #[error("Validation failed: {0}")]
    Validation(String),
}
