use crate::foundation::error::{HeadcastError, HeadcastResult};
use crate::foundation::math::{lerp, u8_to_unit, unit_to_u8};
use std::path::Path;

/// Samples per pixel (RGB).
pub const CHANNELS: usize = 3;

/// A fixed-size RGB image exchanged with the inference backend.
///
/// Samples are interleaved (`HWC`, row-major) `f32` values normalized to `[0, 1]`.
#[derive(Clone, Debug, PartialEq)]
pub struct PixelGrid {
    width: u32,
    height: u32,
    data: Vec<f32>,
}

impl PixelGrid {
    /// Create a validated grid from interleaved RGB samples.
    pub fn new(width: u32, height: u32, data: Vec<f32>) -> HeadcastResult<Self> {
        if width == 0 || height == 0 {
            return Err(HeadcastError::input("pixel grid width/height must be non-zero"));
        }
        let expected = (width as usize) * (height as usize) * CHANNELS;
        if data.len() != expected {
            return Err(HeadcastError::input(format!(
                "pixel grid data length {} does not match {width}x{height}x{CHANNELS}",
                data.len()
            )));
        }
        if data.iter().any(|v| !v.is_finite()) {
            return Err(HeadcastError::input("pixel grid contains non-finite samples"));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// A grid filled with a single color.
    pub fn filled(width: u32, height: u32, rgb: [f32; 3]) -> HeadcastResult<Self> {
        let px = (width as usize) * (height as usize);
        let mut data = Vec::with_capacity(px * CHANNELS);
        for _ in 0..px {
            data.extend_from_slice(&rgb);
        }
        Self::new(width, height, data)
    }

    /// Build from tightly packed RGB8 bytes.
    pub fn from_rgb8(width: u32, height: u32, bytes: &[u8]) -> HeadcastResult<Self> {
        Self::new(width, height, bytes.iter().copied().map(u8_to_unit).collect())
    }

    /// Decode an image file (any format supported by `image`) into a grid.
    pub fn from_image_path(path: impl AsRef<Path>) -> HeadcastResult<Self> {
        let path = path.as_ref();
        let img = image::open(path)
            .map_err(|e| {
                HeadcastError::input(format!("decode source image '{}': {e}", path.display()))
            })?
            .to_rgb8();
        let (w, h) = img.dimensions();
        Self::from_rgb8(w, h, img.as_raw())
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Interleaved samples.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// RGB sample at `(x, y)`. Coordinates are clamped to the grid.
    pub fn pixel(&self, x: u32, y: u32) -> [f32; 3] {
        let x = x.min(self.width - 1) as usize;
        let y = y.min(self.height - 1) as usize;
        let i = (y * self.width as usize + x) * CHANNELS;
        [self.data[i], self.data[i + 1], self.data[i + 2]]
    }

    /// Bilinear sample at continuous pixel-center coordinates, clamped at the edges.
    pub fn sample_bilinear(&self, fx: f32, fy: f32) -> [f32; 3] {
        let max_x = (self.width - 1) as f32;
        let max_y = (self.height - 1) as f32;
        let fx = fx.clamp(0.0, max_x);
        let fy = fy.clamp(0.0, max_y);
        let x0 = fx.floor();
        let y0 = fy.floor();
        let tx = fx - x0;
        let ty = fy - y0;
        let (x0, y0) = (x0 as u32, y0 as u32);
        let (x1, y1) = (x0 + 1, y0 + 1);

        let p00 = self.pixel(x0, y0);
        let p10 = self.pixel(x1, y0);
        let p01 = self.pixel(x0, y1);
        let p11 = self.pixel(x1, y1);
        let mut out = [0.0f32; 3];
        for c in 0..CHANNELS {
            let top = lerp(p00[c], p10[c], tx);
            let bottom = lerp(p01[c], p11[c], tx);
            out[c] = lerp(top, bottom, ty);
        }
        out
    }

    /// Bilinear resize using half-pixel centers (no corner alignment).
    pub fn resize_bilinear(&self, width: u32, height: u32) -> HeadcastResult<Self> {
        if width == 0 || height == 0 {
            return Err(HeadcastError::input("resize target must be non-zero"));
        }
        if width == self.width && height == self.height {
            return Ok(self.clone());
        }
        let sx = self.width as f32 / width as f32;
        let sy = self.height as f32 / height as f32;
        let mut data = Vec::with_capacity((width as usize) * (height as usize) * CHANNELS);
        for y in 0..height {
            let fy = (y as f32 + 0.5) * sy - 0.5;
            for x in 0..width {
                let fx = (x as f32 + 0.5) * sx - 0.5;
                data.extend_from_slice(&self.sample_bilinear(fx, fy));
            }
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Quantize to tightly packed RGB8 bytes.
    pub fn to_rgb8(&self) -> Vec<u8> {
        self.data.iter().copied().map(unit_to_u8).collect()
    }

    /// Mean of all samples, used as a cheap image fingerprint in diagnostics.
    pub fn mean(&self) -> f32 {
        let sum: f64 = self.data.iter().map(|v| f64::from(*v)).sum();
        (sum / self.data.len() as f64) as f32
    }
}

#[cfg(test)]
#[path = "../../tests/unit/model/pixels.rs"]
mod tests;
