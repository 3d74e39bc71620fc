//! The streaming pipeline: production, idle filling, progress aggregation and dispatch.

/// Fan-out of frames to observers.
pub mod dispatch;
/// Idle nodding frames.
pub mod filler;
/// Per-job frame production.
pub mod producer;
/// Session facade.
pub mod session;
/// Progress/state aggregation.
pub mod state;
