//! Progressive accumulation: a running per-pixel mean across frames.

use image::RgbImage;
use nalgebra::Vector3;
use rayon::prelude::*;

use crate::error::RenderError;
use crate::render_system::ray::Ray;

/// Running mean of every frame rendered since the last reset, stored in
/// linear RGB. While the camera and scene stay static, the stored pixel after
/// N frames equals the arithmetic mean of the N per-frame radiances.
pub struct AccumulationImage {
    pixels: Vec<Vector3<f32>>,
    extent: [u32; 2],
}

impl AccumulationImage {
    pub fn new(extent: [u32; 2]) -> Result<AccumulationImage, RenderError> {
        let mut image = AccumulationImage {
            pixels: Vec::new(),
            extent: [0, 0],
        };
        image.resize(extent)?;
        Ok(image)
    }

    pub fn extent(&self) -> [u32; 2] {
        self.extent
    }

    pub fn pixel(&self, x: u32, y: u32) -> Vector3<f32> {
        self.pixels[(y * self.extent[0] + x) as usize]
    }

    /// Drops the history and reallocates for a new output resolution. On
    /// allocation failure the image keeps its old extent and the caller must
    /// not run a frame against the new one.
    pub fn resize(&mut self, extent: [u32; 2]) -> Result<(), RenderError> {
        let pixels = extent[0] as usize * extent[1] as usize;
        self.pixels.clear();
        self.pixels
            .try_reserve_exact(pixels)
            .map_err(|_| RenderError::BufferAllocation { pixels })?;
        self.pixels.resize(pixels, Vector3::zeros());
        self.extent = extent;
        Ok(())
    }

    /// Restarts accumulation without reallocating.
    pub fn clear(&mut self) {
        self.pixels.fill(Vector3::zeros());
    }

    /// Folds one frame's final per-pixel radiance into the running mean.
    pub fn accumulate(&mut self, rays: &[Ray], frame_index: u32) {
        debug_assert_eq!(rays.len(), self.pixels.len());
        self.pixels
            .par_iter_mut()
            .zip(rays.par_iter())
            .for_each(|(stored, ray)| *stored = blend(*stored, ray.radiance, frame_index));
    }

    /// Hands the running mean to the presentation layer. Values are clamped
    /// to 8 bit; color-space conversion is the presenter's job.
    pub fn to_rgb_image(&self) -> RgbImage {
        RgbImage::from_fn(self.extent[0], self.extent[1], |x, y| {
            let c = self.pixel(x, y);
            image::Rgb([channel(c.x), channel(c.y), channel(c.z)])
        })
    }
}

/// The incremental mean rule with `w = frame / (frame + 1)`: frame 0
/// overwrites the pixel, every later frame folds its sample in so the stored
/// value stays the mean of all frames so far, without a separate counter.
pub fn blend(stored: Vector3<f32>, new: Vector3<f32>, frame_index: u32) -> Vector3<f32> {
    if frame_index == 0 {
        return new;
    }
    let w = frame_index as f32 / (frame_index + 1) as f32;
    new + (stored - new) * w
}

fn channel(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ray_with_radiance(radiance: Vector3<f32>) -> Ray {
        let mut ray = Ray::terminated();
        ray.radiance = radiance;
        ray
    }

    #[test]
    fn blend_sequence_yields_the_exact_mean() {
        // frames 0, 1, 2 with radiances 1, 3, 2 must average to exactly 2
        let mut stored = Vector3::zeros();
        for (frame, sample) in [1.0f32, 3.0, 2.0].into_iter().enumerate() {
            stored = blend(stored, Vector3::new(sample, sample, sample), frame as u32);
        }
        assert_relative_eq!(stored.x, 2.0, epsilon = 1e-6);
        assert_relative_eq!(stored.y, 2.0, epsilon = 1e-6);
        assert_relative_eq!(stored.z, 2.0, epsilon = 1e-6);
    }

    #[test]
    fn frame_zero_ignores_prior_contents() {
        let stale = Vector3::new(9.0, 9.0, 9.0);
        let fresh = Vector3::new(0.25, 0.5, 0.75);
        assert_eq!(blend(stale, fresh, 0), fresh);
    }

    #[test]
    fn long_run_converges_to_the_mean() {
        let mut stored = Vector3::zeros();
        // alternate 0 and 4: mean 2
        for frame in 0..1000u32 {
            let sample = if frame % 2 == 0 { 0.0 } else { 4.0 };
            stored = blend(stored, Vector3::new(sample, sample, sample), frame);
        }
        assert_relative_eq!(stored.x, 2.0, epsilon = 1e-2);
    }

    #[test]
    fn accumulate_updates_every_pixel() {
        let mut image = AccumulationImage::new([2, 2]).unwrap();
        let frame0: Vec<Ray> = (0..4)
            .map(|i| ray_with_radiance(Vector3::new(i as f32, 0.0, 0.0)))
            .collect();
        let frame1: Vec<Ray> = (0..4)
            .map(|i| ray_with_radiance(Vector3::new(i as f32 + 2.0, 0.0, 0.0)))
            .collect();

        image.accumulate(&frame0, 0);
        image.accumulate(&frame1, 1);

        for i in 0..4u32 {
            let expected = i as f32 + 1.0;
            assert_relative_eq!(image.pixel(i % 2, i / 2).x, expected, epsilon = 1e-6);
        }
    }

    #[test]
    fn resize_drops_the_history() {
        let mut image = AccumulationImage::new([2, 1]).unwrap();
        image.accumulate(&[ray_with_radiance(Vector3::new(1.0, 1.0, 1.0)); 2], 0);

        image.resize([3, 2]).unwrap();

        assert_eq!(image.extent(), [3, 2]);
        for y in 0..2 {
            for x in 0..3 {
                assert_eq!(image.pixel(x, y), Vector3::zeros());
            }
        }
    }

    #[test]
    fn rgb_snapshot_clamps_to_displayable_range() {
        let mut image = AccumulationImage::new([1, 1]).unwrap();
        image.accumulate(&[ray_with_radiance(Vector3::new(4.0, 0.5, -1.0))], 0);

        let rgb = image.to_rgb_image();
        let px = rgb.get_pixel(0, 0);
        assert_eq!(px.0[0], 255);
        assert_eq!(px.0[1], 127);
        assert_eq!(px.0[2], 0);
    }
}
