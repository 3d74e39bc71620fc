use crate::foundation::error::{HeadcastError, HeadcastResult};
use crate::model::frame::Frame;
use std::path::{Path, PathBuf};

/// Audio to mux alongside the assembled frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioTrack {
    /// Any container/codec `ffmpeg` can decode (wav, mp3, ...).
    File(PathBuf),
    /// Interleaved raw `f32le` PCM.
    RawF32le {
        /// Path to the PCM data.
        path: PathBuf,
        /// Sample rate in Hz.
        sample_rate: u32,
        /// Channel count.
        channels: u16,
    },
}

impl AudioTrack {
    /// Path of the audio data.
    pub fn path(&self) -> &Path {
        match self {
            Self::File(path) | Self::RawF32le { path, .. } => path,
        }
    }
}

/// Turns the ordered frames of a finished job into a video artifact.
///
/// Ordering contract: `frames` are content frames in strictly increasing index order, all of the
/// same size. Assemblers borrow the frames, so a failed call can be retried.
pub trait ArtifactAssembler: Send {
    /// Encode `frames` (and `audio`, when given) and return the artifact path.
    fn assemble(
        &mut self,
        frames: &[Frame],
        audio: Option<&AudioTrack>,
    ) -> HeadcastResult<PathBuf>;
}

/// Check the ordering contract and return the shared `(width, height)`.
pub fn validate_frames(frames: &[Frame]) -> HeadcastResult<(u32, u32)> {
    let Some(first) = frames.first() else {
        return Err(HeadcastError::assembly("no frames to assemble"));
    };
    let (w, h) = (first.image().width(), first.image().height());
    let mut last: Option<u64> = None;
    for frame in frames {
        let Some(idx) = frame.index() else {
            return Err(HeadcastError::assembly("filler frames cannot be assembled"));
        };
        if let Some(prev) = last
            && idx.0 <= prev
        {
            return Err(HeadcastError::assembly("frames are not in increasing index order"));
        }
        last = Some(idx.0);
        if frame.image().width() != w || frame.image().height() != h {
            return Err(HeadcastError::assembly(format!(
                "frame size mismatch: got {}x{}, expected {w}x{h}",
                frame.image().width(),
                frame.image().height()
            )));
        }
    }
    Ok((w, h))
}

/// In-memory assembler for tests and debugging.
#[derive(Debug)]
pub struct InMemoryAssembler {
    path: PathBuf,
    frames: Vec<Frame>,
    audio: Option<AudioTrack>,
    calls: usize,
}

impl InMemoryAssembler {
    /// Create an assembler that reports `path` as its artifact.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            frames: Vec::new(),
            audio: None,
            calls: 0,
        }
    }

    /// Frames captured by the last successful call.
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Audio passed to the last successful call.
    pub fn audio(&self) -> Option<&AudioTrack> {
        self.audio.as_ref()
    }

    /// Number of `assemble` calls.
    pub fn calls(&self) -> usize {
        self.calls
    }
}

impl ArtifactAssembler for InMemoryAssembler {
    fn assemble(
        &mut self,
        frames: &[Frame],
        audio: Option<&AudioTrack>,
    ) -> HeadcastResult<PathBuf> {
        self.calls += 1;
        validate_frames(frames)?;
        self.frames = frames.to_vec();
        self.audio = audio.cloned();
        Ok(self.path.clone())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/encode/sink.rs"]
mod tests;
