use super::*;

fn grid() -> PixelGrid {
    PixelGrid::filled(4, 2, [0.5, 0.5, 0.5]).unwrap()
}

#[test]
fn content_frame_carries_progress_and_index() {
    let frame = Frame::content(grid(), FrameIndex(1), 4, false);
    assert_eq!(frame.index(), Some(FrameIndex(1)));
    assert_eq!(frame.frame_index(), 1);
    assert_eq!(frame.total_frames(), Some(4));
    assert_eq!(frame.progress(), 0.5);
    assert!(!frame.is_filler());
    assert_eq!(frame.resolution(), 4);
}

#[test]
fn filler_frame_has_negative_index_and_zero_progress() {
    let frame = Frame::filler(grid(), true);
    assert_eq!(frame.frame_index(), FILLER_FRAME_INDEX);
    assert_eq!(frame.index(), None);
    assert_eq!(frame.total_frames(), None);
    assert_eq!(frame.progress(), 0.0);
    assert!(frame.is_filler());
    assert!(frame.is_preview());
    assert_eq!(frame.kind(), FrameKind::Filler);
}

#[test]
fn clones_share_pixels() {
    let frame = Frame::content(grid(), FrameIndex(0), 1, false);
    let copy = frame.clone();
    assert!(Arc::ptr_eq(&frame.shared_image(), &copy.shared_image()));
    assert_eq!(frame, copy);
    assert_eq!(copy.progress(), 1.0);
}
