//! Headcast streams talking-head frames to viewers while a job is still rendering.
//!
//! A job renders one frame per driving coefficient vector and hands every frame, as soon as it
//! exists, to a progress record and to any number of observers. While the first real frame is
//! pending, an idle loop keeps viewers busy with cheap "nodding" frames. The public API is
//! session-oriented:
//!
//! - Prepare a [`SourcePortrait`] from a [`PixelGrid`] and its semantic [`Coefficients`]
//! - Create a [`StreamSession`] over an [`InferenceBackend`] and register [`FrameObserver`]s
//! - Run a [`DrivingSequence`] into an [`ArtifactAssembler`] and poll [`StreamSession::snapshot`]
#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod foundation;

/// Inference backends.
pub mod backend;
/// Pipeline configuration.
pub mod config;
/// Artifact assemblers.
pub mod encode;
/// Frames, coefficients and keypoints.
pub mod model;
/// Production, filler, aggregation and dispatch.
pub mod stream;
/// Presentation-side envelopes.
pub mod transport;

pub use crate::foundation::core::{Fps, FrameIndex, progress_fraction};
pub use crate::foundation::error::{HeadcastError, HeadcastResult, ObserverError};

pub use crate::backend::inference::{BackendKind, InferenceBackend, create_backend};
pub use crate::backend::synthetic::{SyntheticBackend, SyntheticBackendOpts};
pub use crate::config::StreamConfig;
pub use crate::encode::ffmpeg::{FfmpegAssembler, FfmpegAssemblerOpts, is_ffmpeg_on_path};
pub use crate::encode::png::PngSequenceAssembler;
pub use crate::encode::sink::{ArtifactAssembler, AudioTrack, InMemoryAssembler};
pub use crate::model::driving::{Coefficients, DrivingSequence, PoseOverrides};
pub use crate::model::frame::{FILLER_FRAME_INDEX, Frame, FrameKind};
pub use crate::model::keypoints::{DrivingVector, Keypoints, PoseSample};
pub use crate::model::pixels::PixelGrid;
pub use crate::model::portrait::SourcePortrait;
pub use crate::stream::dispatch::{
    Backpressure, FrameDispatcher, FrameObserver, ObserverId, ObserverReport, observer_fn,
};
pub use crate::stream::filler::{IdleFiller, IdleLoop, NodOpts};
pub use crate::stream::producer::{
    CancelToken, FrameProducer, JobOutput, ProducerOpts, RenderedSequence,
};
pub use crate::stream::session::{JobRequest, JobTask, StreamSession};
pub use crate::stream::state::{JobHandle, JobId, JobState, ProgressTracker};
pub use crate::transport::broadcast::{BroadcastObserver, BroadcastOpts, FrameEnvelope};
