use super::*;
use crate::backend::synthetic::SyntheticBackend;
use crate::encode::sink::InMemoryAssembler;
use crate::model::keypoints::{DrivingVector, Keypoints};
use crate::stream::state::{ProgressTracker, STATUS_COMPLETE};
use std::sync::atomic::AtomicUsize;

/// Synthetic backend that fails (or panics on) its `fail_at`-th render call.
struct FlakyBackend {
    inner: SyntheticBackend,
    calls: AtomicUsize,
    fail_at: usize,
    panics: bool,
}

impl FlakyBackend {
    fn new(fail_at: usize) -> Self {
        Self {
            inner: SyntheticBackend::default(),
            calls: AtomicUsize::new(0),
            fail_at,
            panics: false,
        }
    }

    fn panicking(fail_at: usize) -> Self {
        Self {
            panics: true,
            ..Self::new(fail_at)
        }
    }
}

impl InferenceBackend for FlakyBackend {
    fn extract_canonical_keypoints(&self, image: &PixelGrid) -> HeadcastResult<Keypoints> {
        self.inner.extract_canonical_keypoints(image)
    }

    fn map_parameters(&self, coefficients: &Coefficients) -> HeadcastResult<DrivingVector> {
        self.inner.map_parameters(coefficients)
    }

    fn render_frame(
        &self,
        source: &PixelGrid,
        source_kp: &Keypoints,
        driving_kp: &Keypoints,
    ) -> HeadcastResult<PixelGrid> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == self.fail_at {
            if self.panics {
                panic!("kernel launch failed");
            }
            return Err(HeadcastError::Other(anyhow::anyhow!("out of memory")));
        }
        self.inner.render_frame(source, source_kp, driving_kp)
    }
}

const CHANNELS: usize = 8;

fn sequence(n: usize) -> DrivingSequence {
    let frames = (0..n)
        .map(|i| Coefficients::new(vec![i as f32 * 0.1; CHANNELS]).unwrap())
        .collect();
    DrivingSequence::new(frames).unwrap()
}

fn producer(backend: Arc<dyn InferenceBackend>, preview_size: Option<u32>) -> FrameProducer {
    FrameProducer::new(backend, ProducerOpts { preview_size })
}

fn gradient(w: u32, h: u32) -> PixelGrid {
    let mut data = Vec::new();
    for y in 0..h {
        for x in 0..w {
            let v = x as f32 / w as f32;
            data.extend_from_slice(&[v, y as f32 / h as f32, 1.0 - v]);
        }
    }
    PixelGrid::new(w, h, data).unwrap()
}

fn source(p: &FrameProducer) -> SourcePortrait {
    let image = gradient(16, 12);
    p.prepare_source(image, Coefficients::new(vec![0.0; CHANNELS]).unwrap())
        .unwrap()
}

#[test]
fn render_sequence_reports_every_frame_in_order() {
    let p = producer(Arc::new(SyntheticBackend::default()), None);
    let src = source(&p);
    let mut seen = Vec::new();
    let seq = p
        .render_sequence(&src, &sequence(5), &mut |f| seen.push(f), None)
        .unwrap();
    assert_eq!(seq.len(), 5);
    let progress: Vec<f32> = seen.iter().map(Frame::progress).collect();
    assert_eq!(progress, vec![0.2, 0.4, 0.6, 0.8, 1.0]);
    let idx: Vec<i64> = seen.iter().map(Frame::frame_index).collect();
    assert_eq!(idx, vec![0, 1, 2, 3, 4]);
    assert!(seen.iter().all(|f| !f.is_preview() && f.image().width() == 16));
    assert_eq!(seq.frames(), &seen[..]);
}

#[test]
fn single_frame_job_reaches_full_progress() {
    let p = producer(Arc::new(SyntheticBackend::default()), None);
    let src = source(&p);
    let seq = p
        .render_sequence(&src, &sequence(1), &mut |_| {}, None)
        .unwrap();
    assert_eq!(seq.frames()[0].progress(), 1.0);
}

#[test]
fn backend_failure_stops_production() {
    let p = producer(Arc::new(FlakyBackend::new(2)), None);
    let src = source(&p);
    let mut seen = Vec::new();
    let err = p
        .render_sequence(&src, &sequence(5), &mut |f| seen.push(f.frame_index()), None)
        .unwrap_err();
    assert!(matches!(err, HeadcastError::Render { frame: 2, .. }));
    assert_eq!(seen, vec![0, 1]);
}

#[test]
fn mismatched_coefficient_width_is_an_input_error() {
    let p = producer(Arc::new(SyntheticBackend::default()), None);
    let image = PixelGrid::filled(4, 4, [0.5; 3]).unwrap();
    let src = p
        .prepare_source(image, Coefficients::new(vec![0.0; 3]).unwrap())
        .unwrap();
    let mut calls = 0;
    let err = p
        .render_sequence(&src, &sequence(2), &mut |_| calls += 1, None)
        .unwrap_err();
    assert!(matches!(err, HeadcastError::Input(_)));
    assert_eq!(calls, 0);
}

#[test]
fn preview_mode_downscales_and_tags_frames() {
    let p = producer(Arc::new(SyntheticBackend::default()), Some(8));
    let src = source(&p);
    assert_eq!((src.image().width(), src.image().height()), (8, 8));
    let seq = p
        .render_sequence(&src, &sequence(2), &mut |_| {}, None)
        .unwrap();
    assert!(seq.frames().iter().all(|f| f.is_preview() && f.resolution() == 8));

    let zero = producer(Arc::new(SyntheticBackend::default()), Some(0));
    let image = PixelGrid::filled(4, 4, [0.5; 3]).unwrap();
    assert!(
        zero.prepare_source(image, Coefficients::new(vec![0.0; 2]).unwrap())
            .is_err()
    );
}

#[test]
fn pose_overrides_change_the_rendered_frame() {
    let p = producer(Arc::new(SyntheticBackend::default()), None);
    let src = source(&p);
    let plain = sequence(2);
    let posed = plain
        .clone()
        .with_pose_overrides(crate::model::driving::PoseOverrides {
            yaw: Some(vec![0.0, 30.0]),
            ..Default::default()
        })
        .unwrap();
    let a = p.render_sequence(&src, &plain, &mut |_| {}, None).unwrap();
    let b = p.render_sequence(&src, &posed, &mut |_| {}, None).unwrap();
    assert_ne!(a.frames()[1].image(), b.frames()[1].image());
}

#[test]
fn cancellation_is_checked_between_frames() {
    let p = producer(Arc::new(SyntheticBackend::default()), None);
    let src = source(&p);
    let cancel = CancelToken::new();
    let mut seen = 0;
    let err = p
        .render_sequence(
            &src,
            &sequence(5),
            &mut |_| {
                seen += 1;
                if seen == 3 {
                    cancel.cancel();
                }
            },
            Some(&cancel),
        )
        .unwrap_err();
    assert!(matches!(err, HeadcastError::Cancelled(3)));
    assert_eq!(seen, 3);
}

#[test]
fn produce_completes_the_job_and_assembles() {
    let p = producer(Arc::new(SyntheticBackend::default()), None);
    let src = source(&p);
    let tracker = ProgressTracker::new();
    let job = tracker.start_job();
    let mut asm = InMemoryAssembler::new("out.mp4");
    let path = p
        .produce(
            &src,
            &sequence(3),
            &job,
            &mut |f| {
                job.on_frame(&f);
            },
            JobOutput::new(&mut asm),
        )
        .unwrap();
    assert_eq!(path, PathBuf::from("out.mp4"));
    assert_eq!(asm.frames().len(), 3);
    let s = tracker.snapshot();
    assert_eq!(s.status, STATUS_COMPLETE);
    assert!(!s.active);
}

#[test]
fn produce_records_failure_and_skips_assembly() {
    let p = producer(Arc::new(FlakyBackend::new(1)), None);
    let src = source(&p);
    let tracker = ProgressTracker::new();
    let job = tracker.start_job();
    let mut asm = InMemoryAssembler::new("out.mp4");
    let err = p
        .produce(
            &src,
            &sequence(3),
            &job,
            &mut |f| {
                job.on_frame(&f);
            },
            JobOutput::new(&mut asm),
        )
        .unwrap_err();
    assert!(matches!(err, HeadcastError::Render { frame: 1, .. }));
    assert_eq!(asm.calls(), 0);
    let s = tracker.snapshot();
    assert!(s.status.starts_with("Error: "));
    assert_eq!(s.last_frame.and_then(|f| f.index()), Some(FrameIndex(0)));
}

#[test]
fn backend_panic_fails_the_job_instead_of_unwinding() {
    let p = producer(Arc::new(FlakyBackend::panicking(2)), None);
    let src = source(&p);
    let tracker = ProgressTracker::new();
    let job = tracker.start_job();
    let mut asm = InMemoryAssembler::new("out.mp4");
    let mut seen = Vec::new();
    let err = p
        .produce(
            &src,
            &sequence(5),
            &job,
            &mut |f| {
                seen.push(f.frame_index());
                job.on_frame(&f);
            },
            JobOutput::new(&mut asm),
        )
        .unwrap_err();
    match &err {
        HeadcastError::Render { frame, message } => {
            assert_eq!(*frame, 2);
            assert!(message.contains("kernel launch failed"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(seen, vec![0, 1]);
    assert_eq!(asm.calls(), 0);
    let s = tracker.snapshot();
    assert!(!s.active);
    assert!(s.status.starts_with("Error: "));
    assert_eq!(s.last_frame.and_then(|f| f.index()), Some(FrameIndex(1)));
}

#[test]
fn failed_assembly_can_be_retried_from_the_rendered_sequence() {
    struct Broken;
    impl ArtifactAssembler for Broken {
        fn assemble(
            &mut self,
            _frames: &[Frame],
            _audio: Option<&AudioTrack>,
        ) -> HeadcastResult<PathBuf> {
            Err(HeadcastError::Other(anyhow::anyhow!("disk full")))
        }
    }

    let p = producer(Arc::new(SyntheticBackend::default()), None);
    let src = source(&p);
    let seq = p
        .render_sequence(&src, &sequence(2), &mut |_| {}, None)
        .unwrap();
    let err = seq.assemble(&mut Broken, None).unwrap_err();
    assert!(matches!(err, HeadcastError::Assembly(_)));
    let mut asm = InMemoryAssembler::new("retry.mp4");
    assert!(seq.assemble(&mut asm, None).is_ok());
    assert_eq!(asm.frames().len(), 2);
}
