use crate::backend::inference::InferenceBackend;
use crate::foundation::error::{HeadcastError, HeadcastResult};
use crate::model::driving::Coefficients;
use crate::model::keypoints::Keypoints;
use crate::model::pixels::PixelGrid;
use std::sync::Arc;

/// A source image with everything derived from it once per job.
///
/// Read-only for the lifetime of the job and shared by every frame computation.
#[derive(Clone, Debug)]
pub struct SourcePortrait {
    image: Arc<PixelGrid>,
    semantics: Coefficients,
    canonical: Keypoints,
    source_keypoints: Keypoints,
}

impl SourcePortrait {
    /// Extract canonical keypoints and the source pose from `image` and its coefficients.
    pub fn prepare(
        image: PixelGrid,
        semantics: Coefficients,
        backend: &dyn InferenceBackend,
    ) -> HeadcastResult<Self> {
        let canonical = backend.extract_canonical_keypoints(&image).map_err(|e| {
            HeadcastError::input(format!("extract canonical keypoints: {e}"))
        })?;
        let source_driving = backend
            .map_parameters(&semantics)
            .map_err(|e| HeadcastError::input(format!("map source coefficients: {e}")))?;
        let source_keypoints = canonical.transform(&source_driving)?;
        Ok(Self {
            image: Arc::new(image),
            semantics,
            canonical,
            source_keypoints,
        })
    }

    /// Source pixels.
    pub fn image(&self) -> &PixelGrid {
        &self.image
    }

    /// Source coefficients (the idle filler's baseline).
    pub fn semantics(&self) -> &Coefficients {
        &self.semantics
    }

    /// Canonical keypoints.
    pub fn canonical(&self) -> &Keypoints {
        &self.canonical
    }

    /// Canonical keypoints posed by the source coefficients.
    pub fn source_keypoints(&self) -> &Keypoints {
        &self.source_keypoints
    }
}
