use crate::backend::inference::InferenceBackend;
use crate::foundation::error::{HeadcastError, HeadcastResult};
use crate::model::driving::Coefficients;
use crate::model::frame::Frame;
use crate::model::portrait::SourcePortrait;
use crate::stream::dispatch::FrameDispatcher;
use crate::stream::state::ProgressTracker;
use crossbeam_channel::{Sender, bounded, select, tick};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Parameters of the idle nodding motion.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct NodOpts {
    /// Coefficient channel that is perturbed.
    pub channel: usize,
    /// Peak deflection, in units of the coefficient's nominal scale.
    pub amplitude: f32,
    /// Angular frequency in radians per second.
    pub frequency: f32,
}

impl Default for NodOpts {
    fn default() -> Self {
        Self {
            channel: 6,
            amplitude: 0.03,
            frequency: 2.0,
        }
    }
}

impl NodOpts {
    /// Reject non-finite or unbounded parameters.
    pub fn validate(&self) -> HeadcastResult<()> {
        if !self.amplitude.is_finite() || self.amplitude < 0.0 || self.amplitude > 1.0 {
            return Err(HeadcastError::config("nod amplitude must be within [0, 1]"));
        }
        if !self.frequency.is_finite() || self.frequency < 0.0 {
            return Err(HeadcastError::config("nod frequency must be finite and >= 0"));
        }
        Ok(())
    }
}

/// Offset applied to the nod channel at `clock_secs`.
pub fn nod_offset(opts: &NodOpts, clock_secs: f64) -> f32 {
    (f64::from(opts.amplitude) * (clock_secs * f64::from(opts.frequency)).sin()) as f32
}

/// Baseline coefficients with the nod offset applied. Vectors without the nod channel are
/// returned unchanged.
pub fn nod_coefficients(baseline: &Coefficients, opts: &NodOpts, clock_secs: f64) -> Coefficients {
    baseline.with_offset(opts.channel, nod_offset(opts, clock_secs))
}

/// Renders single low-cost "alive" frames while no real output is available.
#[derive(Clone)]
pub struct IdleFiller {
    backend: Arc<dyn InferenceBackend>,
    opts: NodOpts,
    preview: bool,
}

impl IdleFiller {
    /// Create a filler. `preview` tags produced frames as preview frames.
    pub fn new(backend: Arc<dyn InferenceBackend>, opts: NodOpts, preview: bool) -> Self {
        Self {
            backend,
            opts,
            preview,
        }
    }

    /// Render the filler frame for `clock_secs` (typically wall-clock seconds).
    ///
    /// Deterministic in `clock_secs`; always index `-1` and progress `0`.
    pub fn filler_frame(&self, source: &SourcePortrait, clock_secs: f64) -> HeadcastResult<Frame> {
        let coefficients = nod_coefficients(source.semantics(), &self.opts, clock_secs);
        let driving = self.backend.map_parameters(&coefficients)?;
        let driving_kp = source.canonical().transform(&driving)?;
        let image = self
            .backend
            .render_frame(source.image(), source.source_keypoints(), &driving_kp)?;
        Ok(Frame::filler(image, self.preview))
    }
}

/// Background thread emitting filler frames on a fixed tick until stopped.
///
/// A tick renders nothing while the tracker refuses filler frames, so the loop stops using the
/// backend once the current job produces real content. Frames are recorded on the tracker first
/// and only dispatched when it accepts them, so no filler frame follows the first content frame.
pub struct IdleLoop {
    stop_tx: Option<Sender<()>>,
    worker: Option<JoinHandle<u64>>,
}

impl IdleLoop {
    /// Start emitting one filler frame per `interval`.
    pub fn spawn(
        filler: IdleFiller,
        source: SourcePortrait,
        tracker: ProgressTracker,
        dispatcher: FrameDispatcher,
        interval: Duration,
    ) -> HeadcastResult<Self> {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let interval = interval.max(Duration::from_millis(1));
        let worker = std::thread::Builder::new()
            .name("headcast-idle".to_owned())
            .spawn(move || {
                let ticker = tick(interval);
                let mut emitted = 0u64;
                loop {
                    select! {
                        recv(stop_rx) -> _ => break,
                        recv(ticker) -> _ => {
                            if !tracker.accepts_filler() {
                                continue;
                            }
                            let frame = match filler.filler_frame(&source, wall_clock_secs()) {
                                Ok(frame) => frame,
                                Err(e) => {
                                    tracing::warn!(error = %e, "idle filler frame failed");
                                    continue;
                                }
                            };
                            let accepted = tracker.record_filler_and(frame, |frame| {
                                dispatcher.dispatch(frame);
                            });
                            if accepted {
                                emitted += 1;
                            }
                        }
                    }
                }
                tracing::debug!(emitted, "idle loop stopped");
                emitted
            })
            .map_err(|e| HeadcastError::Other(anyhow::anyhow!("spawn idle loop: {e}")))?;
        Ok(Self {
            stop_tx: Some(stop_tx),
            worker: Some(worker),
        })
    }

    /// Stop the loop and return how many filler frames were dispatched.
    pub fn stop(mut self) -> u64 {
        self.shutdown()
    }

    fn shutdown(&mut self) -> u64 {
        drop(self.stop_tx.take());
        match self.worker.take() {
            Some(worker) => worker.join().unwrap_or_else(|_| {
                tracing::warn!("idle loop thread panicked");
                0
            }),
            None => 0,
        }
    }
}

impl Drop for IdleLoop {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn wall_clock_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

#[cfg(test)]
#[path = "../../tests/unit/stream/filler.rs"]
mod tests;
