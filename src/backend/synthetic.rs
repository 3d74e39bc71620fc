use crate::backend::inference::InferenceBackend;
use crate::foundation::error::{HeadcastError, HeadcastResult};
use crate::model::driving::Coefficients;
use crate::model::keypoints::{DrivingVector, Keypoints};
use crate::model::pixels::PixelGrid;

/// Options for [`SyntheticBackend`].
#[derive(Clone, Debug)]
pub struct SyntheticBackendOpts {
    /// Number of canonical keypoints.
    pub num_keypoints: usize,
    /// Expression offset per unit coefficient.
    pub expression_scale: f32,
    /// Degrees per unit pose coefficient.
    pub angle_scale: f32,
    /// Pixel shift, as a fraction of the image size, per unit of mean keypoint displacement.
    pub warp_gain: f32,
}

impl Default for SyntheticBackendOpts {
    fn default() -> Self {
        Self {
            num_keypoints: 15,
            expression_scale: 0.05,
            angle_scale: 20.0,
            warp_gain: 0.25,
        }
    }
}

/// Deterministic stand-in for the neural renderer.
///
/// Keypoints are a nose tip plus a fixed ring around the face center; coefficients map linearly
/// to expression offsets, and the trailing six channels (when present) to rotation and
/// translation. Rendering shifts the source by the mean keypoint displacement and shades it by
/// depth. Output is a pure function of the inputs.
#[derive(Clone, Debug, Default)]
pub struct SyntheticBackend {
    opts: SyntheticBackendOpts,
}

impl SyntheticBackend {
    /// Create a backend with explicit options.
    pub fn new(opts: SyntheticBackendOpts) -> Self {
        Self { opts }
    }
}

impl InferenceBackend for SyntheticBackend {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn extract_canonical_keypoints(&self, image: &PixelGrid) -> HeadcastResult<Keypoints> {
        let n = self.opts.num_keypoints.max(1);
        let depth = image.mean() - 0.5;
        let ring = (n - 1).max(1) as f32;
        let points = (0..n)
            .map(|k| {
                if k == 0 {
                    // Nose tip sits off the ring plane so head rotation moves the mean.
                    return [0.0, 0.0, 0.3 + 0.1 * depth];
                }
                let theta = std::f32::consts::TAU * ((k - 1) as f32) / ring;
                let (s, c) = theta.sin_cos();
                [0.5 * c, 0.6 * s, 0.1 * depth]
            })
            .collect();
        Keypoints::new(points)
    }

    fn map_parameters(&self, coefficients: &Coefficients) -> HeadcastResult<DrivingVector> {
        let c = coefficients.as_slice();
        if c.is_empty() {
            return Err(HeadcastError::input("cannot map an empty coefficient vector"));
        }
        let n = self.opts.num_keypoints.max(1);
        let exp_channels = if c.len() > 6 { c.len() - 6 } else { c.len() };
        let expression = (0..n * 3)
            .map(|i| self.opts.expression_scale * c[i % exp_channels])
            .collect();

        let mut out = DrivingVector {
            expression,
            ..DrivingVector::default()
        };
        if c.len() > 6 {
            let p = &c[c.len() - 6..];
            out.yaw = self.opts.angle_scale * p[0];
            out.pitch = self.opts.angle_scale * p[1];
            out.roll = self.opts.angle_scale * p[2];
            out.translation = [p[3] * 0.1, p[4] * 0.1, p[5] * 0.1];
        }
        Ok(out)
    }

    fn render_frame(
        &self,
        source: &PixelGrid,
        source_kp: &Keypoints,
        driving_kp: &Keypoints,
    ) -> HeadcastResult<PixelGrid> {
        if source_kp.len() != driving_kp.len() {
            return Err(HeadcastError::input(format!(
                "keypoint count mismatch: source {} vs driving {}",
                source_kp.len(),
                driving_kp.len()
            )));
        }
        let d = source_kp.mean_displacement(driving_kp);
        let dx = d[0] * self.opts.warp_gain * source.width() as f32;
        let dy = d[1] * self.opts.warp_gain * source.height() as f32;
        let shade = (1.0 + d[2]).clamp(0.5, 1.5);

        let mut data = Vec::with_capacity(source.data().len());
        for y in 0..source.height() {
            for x in 0..source.width() {
                let px = source.sample_bilinear(x as f32 - dx, y as f32 - dy);
                data.extend(px.iter().map(|v| (v * shade).clamp(0.0, 1.0)));
            }
        }
        PixelGrid::new(source.width(), source.height(), data)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/backend/synthetic.rs"]
mod tests;
