use crate::foundation::error::HeadcastError;
use crate::model::frame::Frame;
use parking_lot::Mutex;
use std::sync::Arc;

/// Status before any job has started.
pub const STATUS_READY: &str = "Ready";
/// Status right after `start_job`.
pub const STATUS_INITIALIZING: &str = "Initializing";
/// Status while only idle filler frames have been seen.
pub const STATUS_NODDING: &str = "Avatar is ready... nodding while processing";
/// Status after a successful job.
pub const STATUS_COMPLETE: &str = "Generation complete!";

/// Identifier of one rendering job on a [`ProgressTracker`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobId(pub u64);

/// Point-in-time copy of the aggregated job state.
#[derive(Clone, Debug, PartialEq)]
pub struct JobState {
    /// Job this state belongs to, `None` before the first job.
    pub job: Option<JobId>,
    /// Whether the job is still producing frames.
    pub active: bool,
    /// Human-readable status line.
    pub status: String,
    /// Fraction of content frames produced, in `[0, 1]`.
    pub progress: f32,
    /// Most recent frame observed (content or filler).
    pub last_frame: Option<Frame>,
    /// Total content frames, once known.
    pub total_frames: Option<u64>,
}

impl JobState {
    fn idle() -> Self {
        Self {
            job: None,
            active: false,
            status: STATUS_READY.to_owned(),
            progress: 0.0,
            last_frame: None,
            total_frames: None,
        }
    }

    fn started(job: JobId) -> Self {
        Self {
            job: Some(job),
            active: true,
            status: STATUS_INITIALIZING.to_owned(),
            progress: 0.0,
            last_frame: None,
            total_frames: None,
        }
    }
}

struct Shared {
    state: JobState,
    next_job: u64,
    content_seen: bool,
}

impl Shared {
    fn accepts_filler(&self) -> bool {
        match self.state.job {
            None => true,
            Some(_) => self.state.active && !self.content_seen,
        }
    }

    fn apply_filler(&mut self, frame: &Frame) -> bool {
        if !self.accepts_filler() {
            return false;
        }
        self.state.last_frame = Some(frame.clone());
        self.state.status = STATUS_NODDING.to_owned();
        true
    }
}

/// Multi-reader aggregator of the current job's progress.
///
/// Cloning yields another handle to the same record. Every read and write holds the lock only
/// long enough to copy a few fields; frames are reference counted, so nothing is rendered or
/// deep-copied under the lock.
#[derive(Clone)]
pub struct ProgressTracker {
    inner: Arc<Mutex<Shared>>,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressTracker")
            .field("state", &self.snapshot())
            .finish()
    }
}

impl ProgressTracker {
    /// Create a tracker in the idle `"Ready"` state.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Shared {
                state: JobState::idle(),
                next_job: 0,
                content_seen: false,
            })),
        }
    }

    /// Start a new job, superseding whatever job came before.
    ///
    /// Handles of earlier jobs stop having any effect.
    pub fn start_job(&self) -> JobHandle {
        let id = {
            let mut shared = self.inner.lock();
            let id = JobId(shared.next_job);
            shared.next_job += 1;
            shared.state = JobState::started(id);
            shared.content_seen = false;
            id
        };
        tracing::debug!(job = id.0, "job started");
        JobHandle {
            id,
            inner: Arc::clone(&self.inner),
        }
    }

    /// Consistent copy of the current state.
    pub fn snapshot(&self) -> JobState {
        self.inner.lock().state.clone()
    }

    /// Whether a filler frame recorded now would be accepted.
    ///
    /// Advisory: the answer can change before the frame is recorded, so
    /// [`ProgressTracker::record_filler_and`] checks again.
    pub fn accepts_filler(&self) -> bool {
        self.inner.lock().accepts_filler()
    }

    /// Record an idle filler frame produced outside any job's producer.
    ///
    /// Applied only before the first job, or while the current job has not produced content
    /// yet. Never touches `progress` or `total_frames`.
    pub fn record_filler(&self, frame: &Frame) -> bool {
        if !frame.is_filler() {
            return false;
        }
        self.inner.lock().apply_filler(frame)
    }

    /// Like [`ProgressTracker::record_filler`], handing an accepted frame to `publish` before
    /// the record is released so no content frame can be published in between.
    ///
    /// `publish` must not block.
    pub fn record_filler_and(&self, frame: Frame, publish: impl FnOnce(Frame)) -> bool {
        if !frame.is_filler() {
            return false;
        }
        let mut shared = self.inner.lock();
        if !shared.apply_filler(&frame) {
            return false;
        }
        publish(frame);
        true
    }
}

/// Write handle for one job on a [`ProgressTracker`].
#[derive(Clone)]
pub struct JobHandle {
    id: JobId,
    inner: Arc<Mutex<Shared>>,
}

impl std::fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobHandle").field("id", &self.id).finish()
    }
}

impl JobHandle {
    /// Job id.
    pub fn id(&self) -> JobId {
        self.id
    }

    /// Whether this job is still the tracker's current job.
    pub fn is_current(&self) -> bool {
        self.inner.lock().state.job == Some(self.id)
    }

    /// Fold one produced frame into the state. Returns `false` when the write was ignored
    /// (superseded or finished job, or a filler frame after content).
    pub fn on_frame(&self, frame: &Frame) -> bool {
        self.apply(&mut self.inner.lock(), frame)
    }

    /// Like [`JobHandle::on_frame`], handing an accepted frame to `publish` before the record
    /// is released. Publication order then matches the order frames were folded in.
    ///
    /// `publish` must not block.
    pub fn on_frame_and(&self, frame: Frame, publish: impl FnOnce(Frame)) -> bool {
        let mut shared = self.inner.lock();
        if !self.apply(&mut shared, &frame) {
            return false;
        }
        publish(frame);
        true
    }

    fn apply(&self, shared: &mut Shared, frame: &Frame) -> bool {
        if shared.state.job != Some(self.id) || !shared.state.active {
            return false;
        }
        if frame.is_filler() {
            return shared.apply_filler(frame);
        }

        shared.content_seen = true;
        let state = &mut shared.state;
        state.progress = state.progress.max(frame.progress());
        if let Some(total) = frame.total_frames() {
            state.total_frames = Some(total);
        }
        state.status = content_status(frame);
        state.last_frame = Some(frame.clone());
        true
    }

    /// Mark the job finished with `message` as its final status.
    ///
    /// Only the first call takes effect. `last_frame` keeps its last value.
    pub fn finish(&self, success: bool, message: impl Into<String>) -> bool {
        let message = message.into();
        {
            let mut shared = self.inner.lock();
            if shared.state.job != Some(self.id) || !shared.state.active {
                return false;
            }
            shared.state.active = false;
            shared.state.status.clone_from(&message);
        }
        if success {
            tracing::info!(job = self.id.0, status = %message, "job finished");
        } else {
            tracing::warn!(job = self.id.0, status = %message, "job failed");
        }
        true
    }

    /// Finish successfully with the standard completion status.
    pub fn complete(&self) -> bool {
        self.finish(true, STATUS_COMPLETE)
    }

    /// Finish with `"Error: <err>"` as the status.
    pub fn fail(&self, err: &HeadcastError) -> bool {
        self.finish(false, format!("Error: {err}"))
    }
}

pub(crate) fn content_status(frame: &Frame) -> String {
    let k = frame.frame_index() + 1;
    let n = frame.total_frames().unwrap_or_default();
    format!(
        "Generating frame {k}/{n} ({:.1}%)",
        f64::from(frame.progress()) * 100.0
    )
}

#[cfg(test)]
#[path = "../../tests/unit/stream/state.rs"]
mod tests;
