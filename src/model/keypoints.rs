use crate::foundation::error::{HeadcastError, HeadcastResult};
use crate::foundation::math::{mat3_apply, rotation_matrix};

/// Canonical 3D face keypoints.
#[derive(Clone, Debug, PartialEq)]
pub struct Keypoints {
    points: Vec<[f32; 3]>,
}

impl Keypoints {
    /// Create a validated keypoint set (non-empty, finite).
    pub fn new(points: Vec<[f32; 3]>) -> HeadcastResult<Self> {
        if points.is_empty() {
            return Err(HeadcastError::input("keypoint set must be non-empty"));
        }
        if points.iter().flatten().any(|v| !v.is_finite()) {
            return Err(HeadcastError::input("keypoints contain non-finite values"));
        }
        Ok(Self { points })
    }

    /// Number of keypoints.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Always `false`; construction rejects empty sets.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Borrow the points.
    pub fn points(&self) -> &[[f32; 3]] {
        &self.points
    }

    /// Apply a head pose and expression to these (canonical) keypoints.
    ///
    /// `kp' = R(yaw, pitch, roll) * kp + t + exp[k]`. An empty expression vector means no
    /// expression offset; otherwise it must carry exactly three values per keypoint.
    pub fn transform(&self, driving: &DrivingVector) -> HeadcastResult<Keypoints> {
        let exp = &driving.expression;
        if !exp.is_empty() && exp.len() != self.points.len() * 3 {
            return Err(HeadcastError::input(format!(
                "expression length {} does not match {} keypoints",
                exp.len(),
                self.points.len()
            )));
        }
        let rot = rotation_matrix(driving.yaw, driving.pitch, driving.roll);
        let t = driving.translation;
        let points = self
            .points
            .iter()
            .enumerate()
            .map(|(k, p)| {
                let r = mat3_apply(rot, *p);
                let (ex, ey, ez) = if exp.is_empty() {
                    (0.0, 0.0, 0.0)
                } else {
                    (exp[3 * k], exp[3 * k + 1], exp[3 * k + 2])
                };
                [r[0] + t[0] + ex, r[1] + t[1] + ey, r[2] + t[2] + ez]
            })
            .collect();
        Ok(Keypoints { points })
    }

    /// Mean per-axis displacement from `self` to `other`.
    pub fn mean_displacement(&self, other: &Keypoints) -> [f32; 3] {
        let n = self.points.len().min(other.points.len());
        if n == 0 {
            return [0.0; 3];
        }
        let mut acc = [0.0f32; 3];
        for (a, b) in self.points.iter().zip(other.points.iter()) {
            for c in 0..3 {
                acc[c] += b[c] - a[c];
            }
        }
        acc.map(|v| v / n as f32)
    }
}

/// Head pose and expression produced by the mapping network for one coefficient vector.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DrivingVector {
    /// Yaw in degrees.
    pub yaw: f32,
    /// Pitch in degrees.
    pub pitch: f32,
    /// Roll in degrees.
    pub roll: f32,
    /// Head translation.
    pub translation: [f32; 3],
    /// Per-keypoint 3D expression offsets (flattened), or empty.
    pub expression: Vec<f32>,
}

impl DrivingVector {
    /// Replace mapped angles with any explicit per-frame overrides.
    pub fn with_pose(mut self, pose: PoseSample) -> Self {
        if let Some(yaw) = pose.yaw {
            self.yaw = yaw;
        }
        if let Some(pitch) = pose.pitch {
            self.pitch = pitch;
        }
        if let Some(roll) = pose.roll {
            self.roll = roll;
        }
        self
    }
}

/// Optional per-frame pose overrides, in degrees.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PoseSample {
    /// Yaw override.
    pub yaw: Option<f32>,
    /// Pitch override.
    pub pitch: Option<f32>,
    /// Roll override.
    pub roll: Option<f32>,
}

#[cfg(test)]
#[path = "../../tests/unit/model/keypoints.rs"]
mod tests;
