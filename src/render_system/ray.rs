//! Per-pixel transport state and primary ray generation.

use nalgebra::{Matrix4, Point3, Vector2, Vector3, Vector4};

/// One path's transport state. The ray buffer holds exactly one of these per
/// pixel and every bounce mutates it in place.
///
/// A negative `max_distance` marks the path terminated; radiance only grows
/// and throughput only attenuates until that happens.
#[derive(Clone, Copy, Debug)]
pub struct Ray {
    pub origin: Point3<f32>,
    pub direction: Vector3<f32>,
    pub min_distance: f32,
    pub max_distance: f32,
    /// Light accumulated along the path so far, linear RGB, unclamped.
    pub radiance: Vector3<f32>,
    /// Product of sampling weights along the path so far.
    pub throughput: Vector3<f32>,
    /// Completed surface interactions.
    pub bounces: u32,
}

impl Ray {
    /// Inert placeholder used when (re)allocating ray buffers.
    pub fn terminated() -> Ray {
        Ray {
            origin: Point3::origin(),
            direction: Vector3::z(),
            min_distance: 0.0,
            max_distance: -1.0,
            radiance: Vector3::zeros(),
            throughput: Vector3::zeros(),
            bounces: 0,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.max_distance >= 0.0
    }

    pub fn terminate(&mut self) {
        self.max_distance = -1.0;
    }
}

/// Builds the primary ray for one pixel by un-projecting the near-plane and
/// far-plane points under the inverse view-projection transform.
///
/// Pure and stateless: the only per-frame variation is the sub-pixel `offset`,
/// reserved for jittered anti-aliasing across the accumulation window.
pub fn generate_camera_ray(
    inv_view_projection: &Matrix4<f32>,
    pixel: [u32; 2],
    offset: Vector2<f32>,
    extent: [u32; 2],
) -> Ray {
    let ndc_x = 2.0 * (pixel[0] as f32 + 0.5 + offset.x) / extent[0] as f32 - 1.0;
    let ndc_y = 1.0 - 2.0 * (pixel[1] as f32 + 0.5 + offset.y) / extent[1] as f32;

    let near = unproject(inv_view_projection, ndc_x, ndc_y, 0.0);
    let far = unproject(inv_view_projection, ndc_x, ndc_y, 1.0);

    let direction = far - near;
    let max_distance = direction.norm();

    Ray {
        origin: near,
        direction: direction / max_distance,
        min_distance: 0.0,
        max_distance,
        radiance: Vector3::zeros(),
        throughput: Vector3::new(1.0, 1.0, 1.0),
        bounces: 0,
    }
}

fn unproject(inv_view_projection: &Matrix4<f32>, x: f32, y: f32, depth: f32) -> Point3<f32> {
    let h = inv_view_projection * Vector4::new(x, y, depth, 1.0);
    Point3::new(h.x / h.w, h.y / h.w, h.z / h.w)
}
