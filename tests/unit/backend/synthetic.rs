use super::*;

fn portrait() -> PixelGrid {
    let mut data = Vec::new();
    for y in 0..8u32 {
        for x in 0..8u32 {
            let v = (x + y) as f32 / 14.0;
            data.extend_from_slice(&[v, 1.0 - v, 0.5]);
        }
    }
    PixelGrid::new(8, 8, data).unwrap()
}

#[test]
fn keypoints_have_configured_count() {
    let backend = SyntheticBackend::new(SyntheticBackendOpts {
        num_keypoints: 7,
        ..SyntheticBackendOpts::default()
    });
    let kp = backend.extract_canonical_keypoints(&portrait()).unwrap();
    assert_eq!(kp.len(), 7);
}

#[test]
fn short_vectors_map_to_expression_only() {
    let backend = SyntheticBackend::default();
    let c = Coefficients::new(vec![1.0, 2.0]).unwrap();
    let d = backend.map_parameters(&c).unwrap();
    assert_eq!(d.expression.len(), 15 * 3);
    assert_eq!((d.yaw, d.pitch, d.roll), (0.0, 0.0, 0.0));
    assert!((d.expression[1] - 0.1).abs() < 1e-6);
}

#[test]
fn trailing_channels_drive_pose() {
    let backend = SyntheticBackend::default();
    let mut values = vec![0.0; 70];
    values[64] = 0.5;
    values[67] = 1.0;
    let d = backend
        .map_parameters(&Coefficients::new(values).unwrap())
        .unwrap();
    assert!((d.yaw - 10.0).abs() < 1e-5);
    assert!((d.translation[0] - 0.1).abs() < 1e-6);
}

#[test]
fn identical_keypoints_reproduce_source() {
    let backend = SyntheticBackend::default();
    let src = portrait();
    let kp = backend.extract_canonical_keypoints(&src).unwrap();
    let out = backend.render_frame(&src, &kp, &kp).unwrap();
    assert_eq!(out, src);
}

#[test]
fn rendering_is_deterministic_and_keeps_size() {
    let backend = SyntheticBackend::default();
    let src = portrait();
    let kp = backend.extract_canonical_keypoints(&src).unwrap();
    let driving = DrivingVector {
        yaw: 15.0,
        translation: [0.1, 0.0, 0.0],
        ..DrivingVector::default()
    };
    let moved = kp.transform(&driving).unwrap();
    let a = backend.render_frame(&src, &kp, &moved).unwrap();
    let b = backend.render_frame(&src, &kp, &moved).unwrap();
    assert_eq!(a, b);
    assert_eq!((a.width(), a.height()), (8, 8));
    assert_ne!(a, src);
}

#[test]
fn keypoint_count_mismatch_is_an_error() {
    let backend = SyntheticBackend::default();
    let a = Keypoints::new(vec![[0.0; 3]]).unwrap();
    let b = Keypoints::new(vec![[0.0; 3], [1.0; 3]]).unwrap();
    assert!(backend.render_frame(&portrait(), &a, &b).is_err());
}
