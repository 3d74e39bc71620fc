use super::*;
use crate::foundation::core::FrameIndex;
use crate::model::pixels::PixelGrid;

fn content(i: u64, total: u64) -> Frame {
    Frame::content(PixelGrid::filled(6, 4, [0.2, 0.6, 0.9]).unwrap(), FrameIndex(i), total, true)
}

#[test]
fn envelope_carries_frame_metadata() {
    let env = encode_envelope(&content(1, 4), "working", 90).unwrap();
    assert_eq!(env.kind, FRAME_UPDATE);
    assert_eq!(env.frame_idx, 1);
    assert_eq!(env.progress, 0.5);
    assert_eq!(env.total_frames, Some(4));
    assert_eq!(env.status, "working");
    assert!(!env.is_nodding);
    assert!(env.is_preview);
    assert_eq!(env.resolution, 6);

    let jpeg = base64::engine::general_purpose::STANDARD
        .decode(&env.frame)
        .unwrap();
    let img = image::load_from_memory_with_format(&jpeg, image::ImageFormat::Jpeg).unwrap();
    assert_eq!((img.width(), img.height()), (6, 4));
}

#[test]
fn envelope_serializes_with_type_tag() {
    let filler = Frame::filler(PixelGrid::filled(2, 2, [0.5; 3]).unwrap(), false);
    let env = encode_envelope(&filler, frame_status(&filler), 80).unwrap();
    let json: serde_json::Value = serde_json::to_value(&env).unwrap();
    assert_eq!(json["type"], "frame_update");
    assert_eq!(json["frame_idx"], -1);
    assert_eq!(json["is_nodding"], true);
    assert!(json["total_frames"].is_null());
    assert_eq!(json["status"], STATUS_NODDING);
}

#[test]
fn frame_status_matches_progress_line() {
    assert_eq!(frame_status(&content(0, 4)), "Generating frame 1/4 (25.0%)");
}

#[test]
fn subscribers_receive_json_and_disconnects_are_pruned() {
    let mut hub = BroadcastObserver::new(BroadcastOpts::default());
    let a = hub.subscribe();
    let b = hub.subscribe();
    hub.on_frame(&content(0, 2)).unwrap();
    let msg: FrameEnvelope = serde_json::from_str(&a.try_recv().unwrap()).unwrap();
    assert_eq!(msg.frame_idx, 0);
    assert!(b.try_recv().is_ok());

    drop(b);
    hub.on_frame(&content(1, 2)).unwrap();
    assert_eq!(hub.subscriber_count(), 1);
    assert_eq!(hub.sent(), 3);
}

#[test]
fn full_outbox_drops_messages() {
    let mut hub = BroadcastObserver::new(BroadcastOpts {
        outbox_capacity: 1,
        ..BroadcastOpts::default()
    });
    let rx = hub.subscribe();
    hub.on_frame(&content(0, 3)).unwrap();
    hub.on_frame(&content(1, 3)).unwrap();
    assert_eq!(hub.dropped(), 1);
    assert_eq!(rx.len(), 1);
    assert_eq!(hub.subscriber_count(), 1);
}

#[test]
fn late_frames_keep_their_own_status() {
    use crate::stream::state::{ProgressTracker, STATUS_COMPLETE};

    let tracker = ProgressTracker::new();
    let job = tracker.start_job();
    let queued = content(0, 3);
    job.on_frame(&queued);
    job.on_frame(&content(2, 3));
    job.complete();
    assert_eq!(tracker.snapshot().status, STATUS_COMPLETE);

    let mut hub = BroadcastObserver::new(BroadcastOpts::default());
    let rx = hub.subscribe();
    hub.on_frame(&queued).unwrap();
    let msg: FrameEnvelope = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
    assert_eq!(msg.frame_idx, 0);
    assert_eq!(msg.status, "Generating frame 1/3 (33.3%)");
}

#[test]
fn clones_share_subscribers() {
    let hub = BroadcastObserver::new(BroadcastOpts::default());
    let mut registered = hub.clone();
    let rx = hub.subscribe();
    registered.on_frame(&content(0, 1)).unwrap();
    assert!(rx.try_recv().is_ok());
}
