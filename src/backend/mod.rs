//! Inference backends consumed by the producer and the idle filler.

/// Backend trait and factory.
pub mod inference;
/// Deterministic procedural backend.
pub mod synthetic;
