use crate::foundation::error::HeadcastResult;
use crate::model::driving::Coefficients;
use crate::model::keypoints::{DrivingVector, Keypoints};
use crate::model::pixels::PixelGrid;
use std::sync::Arc;

/// The pretrained face-rendering network, seen as a black box.
///
/// Numeric contract: every image crossing this boundary is an RGB [`PixelGrid`] with samples in
/// `[0, 1]`, and `render_frame` returns a grid of the same size as `source`. Implementations are
/// shared across the producer, the idle filler and worker threads, so they take `&self`.
pub trait InferenceBackend: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str {
        "backend"
    }

    /// Detect canonical keypoints once per source image.
    fn extract_canonical_keypoints(&self, image: &PixelGrid) -> HeadcastResult<Keypoints>;

    /// Map raw coefficients to a head pose and expression.
    fn map_parameters(&self, coefficients: &Coefficients) -> HeadcastResult<DrivingVector>;

    /// Render `source` re-posed from `source_kp` to `driving_kp`.
    fn render_frame(
        &self,
        source: &PixelGrid,
        source_kp: &Keypoints,
        driving_kp: &Keypoints,
    ) -> HeadcastResult<PixelGrid>;
}

/// Available backend kinds.
///
/// - `Synthetic` is always available and needs no model weights.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendKind {
    /// Deterministic procedural backend.
    Synthetic,
}

/// Create an inference backend implementation.
pub fn create_backend(kind: BackendKind) -> Arc<dyn InferenceBackend> {
    match kind {
        BackendKind::Synthetic => Arc::new(crate::backend::synthetic::SyntheticBackend::default()),
    }
}
