use crate::foundation::core::{FrameIndex, progress_fraction};
use crate::model::pixels::PixelGrid;
use std::sync::Arc;

/// Wire-level index carried by filler frames.
pub const FILLER_FRAME_INDEX: i64 = -1;

/// What a [`Frame`] represents.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameKind {
    /// Real job output.
    Content {
        /// 0-based position in the job.
        index: FrameIndex,
        /// Total content frames in the job.
        total: u64,
    },
    /// Idle "nodding" placeholder, outside any job ordering.
    Filler,
}

/// A rendered, immutable frame with its progress metadata.
///
/// Cloning is cheap and shares the pixel buffer; there is no way to mutate a frame after
/// construction.
#[derive(Clone, Debug)]
pub struct Frame {
    image: Arc<PixelGrid>,
    kind: FrameKind,
    progress: f32,
    is_preview: bool,
}

impl PartialEq for Frame {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.progress == other.progress
            && self.is_preview == other.is_preview
            && (Arc::ptr_eq(&self.image, &other.image) || self.image == other.image)
    }
}

impl Frame {
    /// A content frame at `index` out of `total`; progress is `(index + 1) / total`.
    pub fn content(image: PixelGrid, index: FrameIndex, total: u64, is_preview: bool) -> Self {
        Self {
            image: Arc::new(image),
            kind: FrameKind::Content { index, total },
            progress: progress_fraction(index, total),
            is_preview,
        }
    }

    /// An idle filler frame (index `-1`, progress `0`).
    pub fn filler(image: PixelGrid, is_preview: bool) -> Self {
        Self {
            image: Arc::new(image),
            kind: FrameKind::Filler,
            progress: 0.0,
            is_preview,
        }
    }

    /// Rendered pixels.
    pub fn image(&self) -> &PixelGrid {
        &self.image
    }

    /// Shared handle to the rendered pixels.
    pub fn shared_image(&self) -> Arc<PixelGrid> {
        Arc::clone(&self.image)
    }

    /// Frame kind.
    pub fn kind(&self) -> FrameKind {
        self.kind
    }

    /// Content index, `None` for filler frames.
    pub fn index(&self) -> Option<FrameIndex> {
        match self.kind {
            FrameKind::Content { index, .. } => Some(index),
            FrameKind::Filler => None,
        }
    }

    /// Signed index as exchanged with presentation layers (`-1` for filler).
    pub fn frame_index(&self) -> i64 {
        match self.kind {
            FrameKind::Content { index, .. } => i64::try_from(index.0).unwrap_or(i64::MAX),
            FrameKind::Filler => FILLER_FRAME_INDEX,
        }
    }

    /// Total content frames of the job, `None` for filler frames.
    pub fn total_frames(&self) -> Option<u64> {
        match self.kind {
            FrameKind::Content { total, .. } => Some(total),
            FrameKind::Filler => None,
        }
    }

    /// Progress in `[0, 1]`.
    pub fn progress(&self) -> f32 {
        self.progress
    }

    /// Whether this is an idle filler frame.
    pub fn is_filler(&self) -> bool {
        matches!(self.kind, FrameKind::Filler)
    }

    /// Whether this frame came from the reduced-resolution preview path.
    pub fn is_preview(&self) -> bool {
        self.is_preview
    }

    /// Longest side of the image in pixels.
    pub fn resolution(&self) -> u32 {
        self.image.width().max(self.image.height())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/model/frame.rs"]
mod tests;
