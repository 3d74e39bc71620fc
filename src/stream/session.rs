use crate::backend::inference::InferenceBackend;
use crate::config::StreamConfig;
use crate::encode::sink::{ArtifactAssembler, AudioTrack};
use crate::foundation::error::{HeadcastError, HeadcastResult};
use crate::model::driving::{Coefficients, DrivingSequence};
use crate::model::frame::Frame;
use crate::model::pixels::PixelGrid;
use crate::model::portrait::SourcePortrait;
use crate::stream::dispatch::{FrameDispatcher, FrameObserver, ObserverId, ObserverReport};
use crate::stream::filler::{IdleFiller, IdleLoop};
use crate::stream::producer::{CancelToken, FrameProducer, JobOutput};
use crate::stream::state::{JobHandle, JobState, ProgressTracker};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Session-oriented front end tying production, idle filling, progress and dispatch together.
///
/// A session owns one progress record and one observer set. Jobs run one at a time from the
/// session's point of view: starting a job supersedes the previous one.
#[derive(Clone)]
pub struct StreamSession {
    producer: Arc<FrameProducer>,
    filler: IdleFiller,
    tracker: ProgressTracker,
    dispatcher: FrameDispatcher,
    idle_interval: Duration,
}

impl StreamSession {
    /// Construct a session over `backend`.
    pub fn new(backend: Arc<dyn InferenceBackend>, config: &StreamConfig) -> HeadcastResult<Self> {
        config.validate()?;
        let preview = config.producer.preview_size.is_some();
        Ok(Self {
            producer: Arc::new(FrameProducer::new(Arc::clone(&backend), config.producer.clone())),
            filler: IdleFiller::new(backend, config.nod.clone(), preview),
            tracker: ProgressTracker::new(),
            dispatcher: FrameDispatcher::new(config.dispatch),
            idle_interval: config.idle_interval(),
        })
    }

    /// Progress record shared with readers.
    pub fn tracker(&self) -> &ProgressTracker {
        &self.tracker
    }

    /// Idle filler.
    pub fn filler(&self) -> &IdleFiller {
        &self.filler
    }

    /// Register an observer for every subsequent frame.
    pub fn register(&self, observer: impl FrameObserver) -> HeadcastResult<ObserverId> {
        self.dispatcher.register(observer)
    }

    /// Remove an observer.
    pub fn unregister(&self, id: ObserverId) -> bool {
        self.dispatcher.unregister(id)
    }

    /// Consistent copy of the current job state.
    pub fn snapshot(&self) -> JobState {
        self.tracker.snapshot()
    }

    /// Prepare per-job source data.
    pub fn prepare_source(
        &self,
        image: PixelGrid,
        semantics: Coefficients,
    ) -> HeadcastResult<SourcePortrait> {
        self.producer.prepare_source(image, semantics)
    }

    /// Start the idle loop for `source`. It goes quiet once the current job produces content
    /// and stops when the returned handle is stopped or dropped.
    pub fn start_idle_loop(&self, source: &SourcePortrait) -> HeadcastResult<IdleLoop> {
        IdleLoop::spawn(
            self.filler.clone(),
            source.clone(),
            self.tracker.clone(),
            self.dispatcher.clone(),
            self.idle_interval,
        )
    }

    /// Start a new job and run it to completion on the calling thread.
    pub fn run(
        &self,
        source: &SourcePortrait,
        driving: &DrivingSequence,
        output: JobOutput<'_>,
    ) -> HeadcastResult<PathBuf> {
        let job = self.tracker.start_job();
        self.run_job(&job, source, driving, output)
    }

    /// Like [`StreamSession::run`], with idle filler frames emitted until content arrives.
    pub fn run_with_idle(
        &self,
        source: &SourcePortrait,
        driving: &DrivingSequence,
        output: JobOutput<'_>,
    ) -> HeadcastResult<PathBuf> {
        let job = self.tracker.start_job();
        self.run_job_with_idle(&job, source, driving, output)
    }

    fn run_job_with_idle(
        &self,
        job: &JobHandle,
        source: &SourcePortrait,
        driving: &DrivingSequence,
        output: JobOutput<'_>,
    ) -> HeadcastResult<PathBuf> {
        let idle = match self.start_idle_loop(source) {
            Ok(idle) => idle,
            Err(e) => {
                job.fail(&e);
                return Err(e);
            }
        };
        let res = self.run_job(job, source, driving, output);
        let emitted = idle.stop();
        tracing::debug!(job = job.id().0, filler_frames = emitted, "idle loop finished");
        res
    }

    /// Run an already started job. Frames are folded into the progress record and then
    /// dispatched; frames of a superseded job are not dispatched.
    pub fn run_job(
        &self,
        job: &JobHandle,
        source: &SourcePortrait,
        driving: &DrivingSequence,
        output: JobOutput<'_>,
    ) -> HeadcastResult<PathBuf> {
        let dispatcher = &self.dispatcher;
        let mut on_frame = |frame: Frame| {
            job.on_frame_and(frame, |frame| {
                dispatcher.dispatch(frame);
            });
        };
        self.producer.produce(source, driving, job, &mut on_frame, output)
    }

    /// Start a job on a dedicated worker thread.
    pub fn spawn_job(&self, request: JobRequest) -> HeadcastResult<JobTask> {
        let job = self.tracker.start_job();
        let cancel = CancelToken::new();
        let session = self.clone();
        let worker = std::thread::Builder::new()
            .name(format!("headcast-job-{}", job.id().0))
            .spawn({
                let job = job.clone();
                let cancel = cancel.clone();
                move || {
                    let JobRequest {
                        source,
                        driving,
                        mut assembler,
                        audio,
                        idle,
                    } = request;
                    let output = JobOutput::new(assembler.as_mut())
                        .with_audio(audio.as_ref())
                        .with_cancel(Some(&cancel));
                    if idle {
                        session.run_job_with_idle(&job, &source, &driving, output)
                    } else {
                        session.run_job(&job, &source, &driving, output)
                    }
                }
            })
            .map_err(|e| {
                let err = HeadcastError::Other(anyhow::anyhow!("spawn job thread: {e}"));
                job.fail(&err);
                err
            })?;
        Ok(JobTask {
            job,
            cancel,
            worker,
        })
    }

    /// Drain every observer queue and join delivery threads.
    pub fn close(&self) -> Vec<ObserverReport> {
        self.dispatcher.close()
    }
}

/// Owned inputs for [`StreamSession::spawn_job`].
pub struct JobRequest {
    /// Prepared source.
    pub source: SourcePortrait,
    /// Driving sequence.
    pub driving: DrivingSequence,
    /// Assembler receiving the finished frames.
    pub assembler: Box<dyn ArtifactAssembler>,
    /// Optional audio track.
    pub audio: Option<AudioTrack>,
    /// Emit idle filler frames until the first content frame.
    pub idle: bool,
}

/// A job running on its own thread.
pub struct JobTask {
    job: JobHandle,
    cancel: CancelToken,
    worker: JoinHandle<HeadcastResult<PathBuf>>,
}

impl JobTask {
    /// Job handle, for identity checks.
    pub fn job(&self) -> &JobHandle {
        &self.job
    }

    /// Request cancellation before the next frame.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether the worker has finished.
    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    /// Wait for the job and return its outcome.
    pub fn join(self) -> HeadcastResult<PathBuf> {
        match self.worker.join() {
            Ok(res) => res,
            Err(_) => {
                let err = HeadcastError::Other(anyhow::anyhow!("job thread panicked"));
                self.job.fail(&err);
                Err(err)
            }
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/stream/session.rs"]
mod tests;
