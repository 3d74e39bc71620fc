use crate::backend::inference::InferenceBackend;
use crate::encode::sink::{ArtifactAssembler, AudioTrack};
use crate::foundation::core::FrameIndex;
use crate::foundation::error::{HeadcastError, HeadcastResult, panic_message};
use crate::model::driving::{Coefficients, DrivingSequence};
use crate::model::frame::Frame;
use crate::model::pixels::PixelGrid;
use crate::model::portrait::SourcePortrait;
use crate::stream::state::JobHandle;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Options controlling frame production.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ProducerOpts {
    /// Render at a reduced square resolution and tag frames as previews.
    pub preview_size: Option<u32>,
}

/// Cooperative cancellation flag, checked between frames.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create an untripped token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// All frames of a job that rendered successfully, in production order.
///
/// Kept separate from assembly so a failed assembly can be retried without re-rendering.
#[derive(Clone, Debug)]
pub struct RenderedSequence {
    frames: Vec<Frame>,
}

impl RenderedSequence {
    /// Frames in index order.
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Number of frames.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Always `false`; a sequence holds at least one frame.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Hand the frames to `assembler`.
    pub fn assemble(
        &self,
        assembler: &mut dyn ArtifactAssembler,
        audio: Option<&AudioTrack>,
    ) -> HeadcastResult<PathBuf> {
        assembler
            .assemble(&self.frames, audio)
            .map_err(|e| match e {
                HeadcastError::Assembly(_) => e,
                other => HeadcastError::assembly(other.to_string()),
            })
    }
}

/// Where a job's frames go once rendering succeeds.
pub struct JobOutput<'a> {
    /// Assembler receiving the ordered frames.
    pub assembler: &'a mut dyn ArtifactAssembler,
    /// Optional audio track muxed into the artifact.
    pub audio: Option<&'a AudioTrack>,
    /// Optional cancellation token checked between frames.
    pub cancel: Option<&'a CancelToken>,
}

impl<'a> JobOutput<'a> {
    /// Output to `assembler` with no audio and no cancellation.
    pub fn new(assembler: &'a mut dyn ArtifactAssembler) -> Self {
        Self {
            assembler,
            audio: None,
            cancel: None,
        }
    }

    /// Attach an audio track.
    pub fn with_audio(mut self, audio: Option<&'a AudioTrack>) -> Self {
        self.audio = audio;
        self
    }

    /// Attach a cancellation token.
    pub fn with_cancel(mut self, cancel: Option<&'a CancelToken>) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Runs the inference backend one frame at a time and reports each frame as it is produced.
pub struct FrameProducer {
    backend: Arc<dyn InferenceBackend>,
    opts: ProducerOpts,
}

impl FrameProducer {
    /// Create a producer over `backend`.
    pub fn new(backend: Arc<dyn InferenceBackend>, opts: ProducerOpts) -> Self {
        Self { backend, opts }
    }

    /// Downscale (in preview mode) and extract the per-job source data.
    pub fn prepare_source(
        &self,
        image: PixelGrid,
        semantics: Coefficients,
    ) -> HeadcastResult<SourcePortrait> {
        let image = match self.opts.preview_size {
            Some(0) => return Err(HeadcastError::input("preview size must be non-zero")),
            Some(size) => image.resize_bilinear(size, size)?,
            None => image,
        };
        SourcePortrait::prepare(image, semantics, self.backend.as_ref())
    }

    /// Render every driving frame, reporting each through `on_frame`.
    ///
    /// Stops at the first failure; frames from the failing index on are discarded.
    #[tracing::instrument(skip_all, fields(backend = self.backend.name(), frames = driving.len()))]
    pub fn render_sequence(
        &self,
        source: &SourcePortrait,
        driving: &DrivingSequence,
        on_frame: &mut dyn FnMut(Frame),
        cancel: Option<&CancelToken>,
    ) -> HeadcastResult<RenderedSequence> {
        self.check_inputs(source, driving)?;

        let total = driving.len() as u64;
        let is_preview = self.opts.preview_size.is_some();
        let mut frames = Vec::with_capacity(driving.len());
        for i in 0..driving.len() {
            if cancel.is_some_and(CancelToken::is_cancelled) {
                return Err(HeadcastError::Cancelled(i as u64));
            }
            let image = self.render_one(source, driving, i)?;
            let frame = Frame::content(image, FrameIndex(i as u64), total, is_preview);
            tracing::trace!(frame = i, progress = frame.progress(), "frame rendered");
            on_frame(frame.clone());
            frames.push(frame);
        }
        Ok(RenderedSequence { frames })
    }

    /// Render, assemble and record the outcome on `job`.
    ///
    /// On success the job finishes with `"Generation complete!"` and the artifact path is
    /// returned. Any failure finishes the job with `"Error: ..."` and is returned as well;
    /// `last_frame` on the job keeps the last good frame.
    pub fn produce(
        &self,
        source: &SourcePortrait,
        driving: &DrivingSequence,
        job: &JobHandle,
        on_frame: &mut dyn FnMut(Frame),
        output: JobOutput<'_>,
    ) -> HeadcastResult<PathBuf> {
        let JobOutput {
            assembler,
            audio,
            cancel,
        } = output;
        let res = self
            .render_sequence(source, driving, on_frame, cancel)
            .and_then(|seq| seq.assemble(assembler, audio));
        match &res {
            Ok(path) => {
                tracing::info!(artifact = %path.display(), "job produced artifact");
                job.complete();
            }
            Err(e) => {
                job.fail(e);
            }
        }
        res
    }

    fn check_inputs(
        &self,
        source: &SourcePortrait,
        driving: &DrivingSequence,
    ) -> HeadcastResult<()> {
        if driving.is_empty() {
            return Err(HeadcastError::input("driving sequence is empty"));
        }
        if driving.width() != source.semantics().len() {
            return Err(HeadcastError::input(format!(
                "driving coefficients have {} channels, source has {}",
                driving.width(),
                source.semantics().len()
            )));
        }
        Ok(())
    }

    /// Render content frame `i`. A backend panic is contained and reported as a render error
    /// so the job still finishes.
    fn render_one(
        &self,
        source: &SourcePortrait,
        driving: &DrivingSequence,
        i: usize,
    ) -> HeadcastResult<PixelGrid> {
        let fail = |e: HeadcastError| match e {
            HeadcastError::Render { .. } => e,
            other => HeadcastError::render(i as u64, other.to_string()),
        };
        let coefficients = driving
            .coefficients(i)
            .ok_or_else(|| HeadcastError::input(format!("driving frame {i} missing")))?;
        let image = std::panic::catch_unwind(AssertUnwindSafe(|| {
            let mapped = self.backend.map_parameters(coefficients)?;
            let driving_vec = mapped.with_pose(driving.pose_at(i));
            let driving_kp = source.canonical().transform(&driving_vec)?;
            self.backend
                .render_frame(source.image(), source.source_keypoints(), &driving_kp)
        }))
        .unwrap_or_else(|payload| {
            Err(HeadcastError::render(
                i as u64,
                format!("backend panicked: {}", panic_message(&*payload)),
            ))
        })
        .map_err(fail)?;
        if image.width() != source.image().width() || image.height() != source.image().height() {
            return Err(HeadcastError::render(
                i as u64,
                format!(
                    "backend returned {}x{}, expected {}x{}",
                    image.width(),
                    image.height(),
                    source.image().width(),
                    source.image().height()
                ),
            ));
        }
        Ok(image)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/stream/producer.rs"]
mod tests;
