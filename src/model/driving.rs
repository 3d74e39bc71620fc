use crate::foundation::error::{HeadcastError, HeadcastResult};
use crate::model::keypoints::PoseSample;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// One raw coefficient vector (expression and pose 3DMM coefficients).
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Coefficients(Vec<f32>);

impl Coefficients {
    /// Create a validated, non-empty, finite coefficient vector.
    pub fn new(values: Vec<f32>) -> HeadcastResult<Self> {
        if values.is_empty() {
            return Err(HeadcastError::input("coefficient vector must be non-empty"));
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(HeadcastError::input("coefficient vector contains non-finite values"));
        }
        Ok(Self(values))
    }

    /// Number of channels.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always `false` for validated vectors.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Borrow the raw values.
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    /// Copy with `delta` added to `channel`. Out-of-range channels leave the copy unchanged.
    pub fn with_offset(&self, channel: usize, delta: f32) -> Coefficients {
        let mut values = self.0.clone();
        if let Some(v) = values.get_mut(channel) {
            *v += delta;
        }
        Coefficients(values)
    }
}

/// Optional per-frame yaw/pitch/roll sequences applied after parameter mapping.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PoseOverrides {
    /// Yaw per frame, in degrees.
    #[serde(default)]
    pub yaw: Option<Vec<f32>>,
    /// Pitch per frame, in degrees.
    #[serde(default)]
    pub pitch: Option<Vec<f32>>,
    /// Roll per frame, in degrees.
    #[serde(default)]
    pub roll: Option<Vec<f32>>,
}

impl PoseOverrides {
    fn validate(&self, frames: usize) -> HeadcastResult<()> {
        for (name, seq) in [("yaw", &self.yaw), ("pitch", &self.pitch), ("roll", &self.roll)] {
            let Some(seq) = seq else { continue };
            if seq.len() != frames {
                return Err(HeadcastError::input(format!(
                    "{name} override has {} values, expected {frames}",
                    seq.len()
                )));
            }
            if seq.iter().any(|v| !v.is_finite()) {
                return Err(HeadcastError::input(format!(
                    "{name} override contains non-finite values"
                )));
            }
        }
        Ok(())
    }

    fn sample(&self, i: usize) -> PoseSample {
        PoseSample {
            yaw: self.yaw.as_ref().map(|s| s[i]),
            pitch: self.pitch.as_ref().map(|s| s[i]),
            roll: self.roll.as_ref().map(|s| s[i]),
        }
    }
}

/// Ordered per-frame driving coefficients derived from audio. Immutable once constructed.
#[derive(Clone, Debug, PartialEq)]
pub struct DrivingSequence {
    frames: Vec<Coefficients>,
    pose: PoseOverrides,
}

#[derive(serde::Deserialize)]
struct DrivingSequenceDef {
    coefficients: Vec<Vec<f32>>,
    #[serde(flatten)]
    pose: PoseOverrides,
}

impl DrivingSequence {
    /// Create a validated sequence: non-empty, all vectors of the same width.
    pub fn new(frames: Vec<Coefficients>) -> HeadcastResult<Self> {
        let Some(first) = frames.first() else {
            return Err(HeadcastError::input("driving sequence must contain at least one frame"));
        };
        let width = first.len();
        if let Some((i, bad)) = frames.iter().enumerate().find(|(_, c)| c.len() != width) {
            return Err(HeadcastError::input(format!(
                "driving frame {i} has {} coefficients, expected {width}",
                bad.len()
            )));
        }
        Ok(Self {
            frames,
            pose: PoseOverrides::default(),
        })
    }

    /// Attach per-frame pose overrides; each present sequence must match the frame count.
    pub fn with_pose_overrides(mut self, pose: PoseOverrides) -> HeadcastResult<Self> {
        pose.validate(self.frames.len())?;
        self.pose = pose;
        Ok(self)
    }

    /// Parse `{"coefficients": [[..], ..], "yaw"?: [..], "pitch"?: [..], "roll"?: [..]}`.
    pub fn from_reader<R: std::io::Read>(r: R) -> HeadcastResult<Self> {
        let def: DrivingSequenceDef = serde_json::from_reader(r)
            .map_err(|e| HeadcastError::input(format!("parse driving sequence JSON: {e}")))?;
        let frames = def
            .coefficients
            .into_iter()
            .map(Coefficients::new)
            .collect::<HeadcastResult<Vec<_>>>()?;
        Self::new(frames)?.with_pose_overrides(def.pose)
    }

    /// Parse a driving sequence JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> HeadcastResult<Self> {
        let path = path.as_ref();
        let f = File::open(path).map_err(|e| {
            HeadcastError::input(format!("open driving sequence '{}': {e}", path.display()))
        })?;
        Self::from_reader(BufReader::new(f))
    }

    /// Total frame count.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Always `false` for validated sequences.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Coefficient width shared by every frame.
    pub fn width(&self) -> usize {
        self.frames[0].len()
    }

    /// Coefficients for frame `i`.
    pub fn coefficients(&self, i: usize) -> Option<&Coefficients> {
        self.frames.get(i)
    }

    /// Pose overrides for frame `i` (all `None` when absent).
    pub fn pose_at(&self, i: usize) -> PoseSample {
        if i >= self.frames.len() {
            return PoseSample::default();
        }
        self.pose.sample(i)
    }

    /// Borrow the attached overrides.
    pub fn pose_overrides(&self) -> &PoseOverrides {
        &self.pose
    }
}

#[cfg(test)]
#[path = "../../tests/unit/model/driving.rs"]
mod tests;
