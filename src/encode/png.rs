use crate::encode::sink::{ArtifactAssembler, AudioTrack, validate_frames};
use crate::foundation::error::{HeadcastError, HeadcastResult};
use crate::model::frame::Frame;
use anyhow::Context as _;
use rayon::prelude::*;
use std::path::PathBuf;

/// Writes each frame as `frame_00000.png` into a directory and returns the directory.
///
/// Audio is ignored; this is the fallback when `ffmpeg` is unavailable.
#[derive(Clone, Debug)]
pub struct PngSequenceAssembler {
    out_dir: PathBuf,
}

impl PngSequenceAssembler {
    /// Create an assembler writing into `out_dir` (created on demand).
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
        }
    }

    /// File name used for content frame `idx`.
    pub fn file_name(idx: u64) -> String {
        format!("frame_{idx:05}.png")
    }
}

impl ArtifactAssembler for PngSequenceAssembler {
    fn assemble(
        &mut self,
        frames: &[Frame],
        audio: Option<&AudioTrack>,
    ) -> HeadcastResult<PathBuf> {
        let (width, height) = validate_frames(frames)?;
        if audio.is_some() {
            tracing::warn!("png sequence output ignores the audio track");
        }
        std::fs::create_dir_all(&self.out_dir)
            .with_context(|| format!("create output dir '{}'", self.out_dir.display()))?;

        frames.par_iter().try_for_each(|frame| {
            let idx = frame.index().map(|i| i.0).unwrap_or_default();
            let path = self.out_dir.join(Self::file_name(idx));
            image::save_buffer_with_format(
                &path,
                &frame.image().to_rgb8(),
                width,
                height,
                image::ColorType::Rgb8,
                image::ImageFormat::Png,
            )
            .map_err(|e| HeadcastError::assembly(format!("write png '{}': {e}", path.display())))
        })?;

        tracing::info!(frames = frames.len(), dir = %self.out_dir.display(), "wrote png sequence");
        Ok(self.out_dir.clone())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/encode/png.rs"]
mod tests;
