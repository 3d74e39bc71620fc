use super::*;
use crate::foundation::core::FrameIndex;
use crate::model::pixels::PixelGrid;

fn content(i: u64, total: u64) -> Frame {
    Frame::content(PixelGrid::filled(2, 2, [0.5; 3]).unwrap(), FrameIndex(i), total, false)
}

fn filler() -> Frame {
    Frame::filler(PixelGrid::filled(2, 2, [0.1; 3]).unwrap(), false)
}

#[test]
fn fresh_tracker_is_ready() {
    let tracker = ProgressTracker::new();
    let s = tracker.snapshot();
    assert_eq!(s.status, STATUS_READY);
    assert!(!s.active);
    assert_eq!(s.job, None);
    assert_eq!(s.progress, 0.0);
    assert!(s.last_frame.is_none());
}

#[test]
fn start_job_resets_state() {
    let tracker = ProgressTracker::new();
    let job = tracker.start_job();
    job.on_frame(&content(0, 2));
    let next = tracker.start_job();
    let s = tracker.snapshot();
    assert_eq!(s.job, Some(next.id()));
    assert!(s.active);
    assert_eq!(s.status, STATUS_INITIALIZING);
    assert_eq!(s.progress, 0.0);
    assert!(s.last_frame.is_none());
    assert_eq!(s.total_frames, None);
}

#[test]
fn content_frames_update_progress_and_status() {
    let tracker = ProgressTracker::new();
    let job = tracker.start_job();
    assert!(job.on_frame(&content(0, 4)));
    let s = tracker.snapshot();
    assert_eq!(s.progress, 0.25);
    assert_eq!(s.total_frames, Some(4));
    assert_eq!(s.status, "Generating frame 1/4 (25.0%)");
    assert_eq!(s.last_frame.as_ref().and_then(Frame::index), Some(FrameIndex(0)));
}

#[test]
fn progress_never_decreases() {
    let tracker = ProgressTracker::new();
    let job = tracker.start_job();
    job.on_frame(&content(2, 4));
    job.on_frame(&content(0, 4));
    assert_eq!(tracker.snapshot().progress, 0.75);
}

#[test]
fn filler_only_counts_before_content() {
    let tracker = ProgressTracker::new();
    assert!(tracker.record_filler(&filler()));
    assert_eq!(tracker.snapshot().status, STATUS_NODDING);

    let job = tracker.start_job();
    assert!(tracker.record_filler(&filler()));
    let s = tracker.snapshot();
    assert_eq!(s.status, STATUS_NODDING);
    assert_eq!(s.progress, 0.0);
    assert_eq!(s.total_frames, None);

    job.on_frame(&content(0, 2));
    assert!(!tracker.record_filler(&filler()));
    assert!(!job.on_frame(&filler()));
    let s = tracker.snapshot();
    assert!(!s.last_frame.unwrap().is_filler());
    assert_eq!(s.status, "Generating frame 1/2 (50.0%)");
}

#[test]
fn record_filler_ignores_content_frames() {
    let tracker = ProgressTracker::new();
    assert!(!tracker.record_filler(&content(0, 1)));
    assert!(tracker.snapshot().last_frame.is_none());
}

#[test]
fn finish_is_idempotent_and_keeps_last_frame() {
    let tracker = ProgressTracker::new();
    let job = tracker.start_job();
    job.on_frame(&content(0, 3));
    assert!(job.fail(&HeadcastError::render(1, "boom")));
    assert!(!job.complete());
    let s = tracker.snapshot();
    assert!(!s.active);
    assert!(s.status.starts_with("Error: "));
    assert!(s.status.contains("boom"));
    assert_eq!(s.last_frame.and_then(|f| f.index()), Some(FrameIndex(0)));
    assert!(!job.on_frame(&content(1, 3)));
    assert!(!tracker.record_filler(&filler()));
}

#[test]
fn complete_sets_final_status() {
    let tracker = ProgressTracker::new();
    let job = tracker.start_job();
    job.on_frame(&content(0, 1));
    job.complete();
    let s = tracker.snapshot();
    assert_eq!(s.status, STATUS_COMPLETE);
    assert_eq!(s.progress, 1.0);
    assert!(!s.active);
}

#[test]
fn stale_handles_cannot_write() {
    let tracker = ProgressTracker::new();
    let old = tracker.start_job();
    let new = tracker.start_job();
    assert!(!old.is_current());
    assert!(new.is_current());
    assert!(!old.on_frame(&content(0, 1)));
    assert!(!old.complete());
    let s = tracker.snapshot();
    assert_eq!(s.status, STATUS_INITIALIZING);
    assert!(s.active);
}

#[test]
fn snapshots_without_production_are_identical() {
    let tracker = ProgressTracker::new();
    let job = tracker.start_job();
    job.on_frame(&content(1, 3));
    assert_eq!(tracker.snapshot(), tracker.snapshot());
}

#[test]
fn concurrent_readers_see_monotonic_progress() {
    let tracker = ProgressTracker::new();
    let job = tracker.start_job();
    let reader = {
        let tracker = tracker.clone();
        std::thread::spawn(move || {
            let mut last = 0.0f32;
            for _ in 0..2000 {
                let p = tracker.snapshot().progress;
                assert!(p >= last);
                last = p;
            }
        })
    };
    for i in 0..200 {
        job.on_frame(&content(i, 200));
    }
    job.complete();
    reader.join().unwrap();
}

#[test]
fn publish_runs_only_for_accepted_frames() {
    let tracker = ProgressTracker::new();
    let job = tracker.start_job();
    let mut published = Vec::new();
    assert!(tracker.record_filler_and(filler(), |f| published.push(f.frame_index())));
    assert!(job.on_frame_and(content(0, 2), |f| published.push(f.frame_index())));
    assert!(!tracker.record_filler_and(filler(), |f| published.push(f.frame_index())));
    job.complete();
    assert!(!job.on_frame_and(content(1, 2), |f| published.push(f.frame_index())));
    assert_eq!(published, vec![-1, 0]);
}

#[test]
fn accepts_filler_tracks_the_current_job() {
    let tracker = ProgressTracker::new();
    assert!(tracker.accepts_filler());
    let job = tracker.start_job();
    assert!(tracker.accepts_filler());
    job.on_frame(&content(0, 3));
    assert!(!tracker.accepts_filler());
    let next = tracker.start_job();
    assert!(tracker.accepts_filler());
    next.complete();
    assert!(!tracker.accepts_filler());
}
