//! Artifact assemblers.
//!
//! Assemblers consume the ordered frames of a finished job and are called by the frame producer
//! once every frame has rendered.

/// `ffmpeg`-based assembler (MP4 output via system `ffmpeg`).
pub mod ffmpeg;
/// Numbered PNG output.
pub mod png;
/// Assembler trait, audio input and the in-memory assembler.
pub mod sink;
