use super::*;
use crate::backend::synthetic::SyntheticBackend;
use crate::encode::sink::InMemoryAssembler;
use crate::foundation::error::ObserverError;
use crate::stream::dispatch::observer_fn;
use crate::stream::state::STATUS_COMPLETE;
use crossbeam_channel::unbounded;

fn session(config: &StreamConfig) -> StreamSession {
    StreamSession::new(Arc::new(SyntheticBackend::default()), config).unwrap()
}

fn driving(n: usize, channels: usize) -> DrivingSequence {
    let frames = (0..n)
        .map(|i| Coefficients::new(vec![(i as f32 * 0.3).sin(); channels]).unwrap())
        .collect();
    DrivingSequence::new(frames).unwrap()
}

fn prepared(s: &StreamSession, channels: usize) -> SourcePortrait {
    let image = PixelGrid::filled(8, 8, [0.7, 0.5, 0.3]).unwrap();
    s.prepare_source(image, Coefficients::new(vec![0.0; channels]).unwrap())
        .unwrap()
}

#[test]
fn invalid_config_is_rejected() {
    let config = StreamConfig {
        idle_interval_ms: 0,
        ..StreamConfig::default()
    };
    assert!(StreamSession::new(Arc::new(SyntheticBackend::default()), &config).is_err());
}

#[test]
fn run_dispatches_and_completes() {
    let s = session(&StreamConfig::default());
    let (tx, rx) = unbounded();
    s.register(observer_fn("collect", move |f: &Frame| {
        tx.send(f.frame_index()).map_err(|_| ObserverError::Closed)
    }))
    .unwrap();
    let src = prepared(&s, 10);
    let mut asm = InMemoryAssembler::new("job.mp4");
    let path = s
        .run(&src, &driving(4, 10), JobOutput::new(&mut asm))
        .unwrap();
    assert_eq!(path, PathBuf::from("job.mp4"));
    s.close();
    assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![0, 1, 2, 3]);
    let state = s.snapshot();
    assert_eq!(state.status, STATUS_COMPLETE);
    assert_eq!(state.progress, 1.0);
}

#[test]
fn run_with_idle_never_sends_filler_after_content() {
    let config = StreamConfig {
        idle_interval_ms: 1,
        ..StreamConfig::default()
    };
    let s = session(&config);
    let (tx, rx) = unbounded();
    s.register(observer_fn("collect", move |f: &Frame| {
        tx.send(f.frame_index()).map_err(|_| ObserverError::Closed)
    }))
    .unwrap();
    let src = prepared(&s, 10);
    let mut asm = InMemoryAssembler::new("job.mp4");
    s.run_with_idle(&src, &driving(3, 10), JobOutput::new(&mut asm))
        .unwrap();
    s.close();

    let seen: Vec<i64> = rx.try_iter().collect();
    let content: Vec<i64> = seen.iter().copied().filter(|&i| i >= 0).collect();
    assert_eq!(content, vec![0, 1, 2]);
    let first = seen.iter().position(|&i| i == 0).unwrap();
    assert!(seen[first..].iter().all(|&i| i >= 0));
}

#[test]
fn spawned_job_can_be_joined() {
    let s = session(&StreamConfig::default());
    let src = prepared(&s, 10);
    let task = s
        .spawn_job(JobRequest {
            source: src,
            driving: driving(3, 10),
            assembler: Box::new(InMemoryAssembler::new("bg.mp4")),
            audio: None,
            idle: true,
        })
        .unwrap();
    assert!(task.job().is_current());
    assert_eq!(task.join().unwrap(), PathBuf::from("bg.mp4"));
    assert_eq!(s.snapshot().status, STATUS_COMPLETE);
}

/// Synthetic backend whose renders wait until the gate sender is dropped.
struct GatedBackend {
    inner: SyntheticBackend,
    gate: crossbeam_channel::Receiver<()>,
}

impl InferenceBackend for GatedBackend {
    fn extract_canonical_keypoints(
        &self,
        image: &PixelGrid,
    ) -> HeadcastResult<crate::model::keypoints::Keypoints> {
        self.inner.extract_canonical_keypoints(image)
    }

    fn map_parameters(
        &self,
        coefficients: &Coefficients,
    ) -> HeadcastResult<crate::model::keypoints::DrivingVector> {
        self.inner.map_parameters(coefficients)
    }

    fn render_frame(
        &self,
        source: &PixelGrid,
        source_kp: &crate::model::keypoints::Keypoints,
        driving_kp: &crate::model::keypoints::Keypoints,
    ) -> HeadcastResult<PixelGrid> {
        let _ = self.gate.recv();
        self.inner.render_frame(source, source_kp, driving_kp)
    }
}

#[test]
fn cancelled_job_reports_an_error_status() {
    let (gate_tx, gate_rx) = crossbeam_channel::bounded::<()>(0);
    let backend = Arc::new(GatedBackend {
        inner: SyntheticBackend::default(),
        gate: gate_rx,
    });
    let s = StreamSession::new(backend, &StreamConfig::default()).unwrap();
    let src = prepared(&s, 10);
    let task = s
        .spawn_job(JobRequest {
            source: src,
            driving: driving(5, 10),
            assembler: Box::new(InMemoryAssembler::new("never.mp4")),
            audio: None,
            idle: false,
        })
        .unwrap();
    task.cancel();
    drop(gate_tx);
    let err = task.join().unwrap_err();
    assert!(matches!(err, HeadcastError::Cancelled(_)));
    let state = s.snapshot();
    assert!(state.status.starts_with("Error: "));
    assert!(!state.active);
}

#[test]
fn new_job_supersedes_the_previous_one() {
    let s = session(&StreamConfig::default());
    let src = prepared(&s, 10);
    let stale = s.tracker().start_job();
    let mut asm = InMemoryAssembler::new("a.mp4");
    s.run(&src, &driving(2, 10), JobOutput::new(&mut asm))
        .unwrap();
    assert!(!stale.is_current());
    assert!(!stale.complete());
    assert_eq!(s.snapshot().status, STATUS_COMPLETE);
}
