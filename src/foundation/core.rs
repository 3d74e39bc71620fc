use crate::foundation::error::{HeadcastError, HeadcastResult};

/// Absolute 0-based index of a content frame within one job.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct FrameIndex(pub u64);

/// Frames-per-second represented as a rational `num/den`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Fps {
    /// Numerator (frames).
    pub num: u32,
    /// Denominator (seconds), must be non-zero.
    pub den: u32,
}

impl Fps {
    /// Create a validated FPS value.
    pub fn new(num: u32, den: u32) -> HeadcastResult<Self> {
        if den == 0 {
            return Err(HeadcastError::config("fps den must be > 0"));
        }
        if num == 0 {
            return Err(HeadcastError::config("fps num must be > 0"));
        }
        Ok(Self { num, den })
    }

    /// Duration of one frame in seconds.
    pub fn frame_duration_secs(self) -> f64 {
        f64::from(self.den) / f64::from(self.num)
    }
}

impl Default for Fps {
    /// 25 fps, the rate the face renderer's audio features are sampled at.
    fn default() -> Self {
        Self { num: 25, den: 1 }
    }
}

/// Progress fraction for content frame `idx` out of `total`.
///
/// The last frame always reports exactly `1.0`, independent of float rounding.
pub fn progress_fraction(idx: FrameIndex, total: u64) -> f32 {
    if total == 0 {
        return 0.0;
    }
    let done = idx.0.saturating_add(1);
    if done >= total {
        return 1.0;
    }
    (done as f64 / total as f64) as f32
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
