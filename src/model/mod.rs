//! Data exchanged between the producer, the aggregator and observers.

/// Driving coefficients and pose overrides.
pub mod driving;
/// Rendered frames.
pub mod frame;
/// Keypoints and mapped driving vectors.
pub mod keypoints;
/// RGB pixel grids.
pub mod pixels;
/// Per-job source portrait.
pub mod portrait;
