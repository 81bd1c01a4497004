//! Nearest-hit intersection query contract, plus a reference intersector.
//!
//! The per-frame pipeline treats the intersection engine as a black box:
//! given the ray buffer and a geometry handle, produce one result per ray in
//! input order. A BVH-backed collaborator slots in behind the same trait.

use std::sync::Arc;

use nalgebra::{Point3, Vector2};
use rayon::prelude::*;

use crate::render_system::ray::Ray;
use crate::render_system::scene::SceneGeometry;

/// One nearest-hit result per ray; a negative distance is a miss.
#[derive(Clone, Copy, Debug)]
pub struct Intersection {
    pub distance: f32,
    pub primitive_index: u32,
    /// Barycentric weights of the first two triangle vertices; the third is
    /// `1 - x - y`.
    pub coordinates: Vector2<f32>,
}

impl Intersection {
    pub fn miss() -> Intersection {
        Intersection {
            distance: -1.0,
            primitive_index: u32::MAX,
            coordinates: Vector2::zeros(),
        }
    }

    pub fn is_hit(&self) -> bool {
        self.distance >= 0.0
    }
}

/// Nearest-hit query over a prebuilt geometry handle.
///
/// Implementations must process exactly `rays.len()` rays, write exactly one
/// result per ray in input order, and report terminated rays as misses.
pub trait AccelerationStructure: Send + Sync {
    fn intersect(&self, rays: &[Ray], intersections: &mut [Intersection]);
}

/// Reference intersector that tests every triangle per ray. It stands in for
/// an acceleration-structure backend; the contract is identical.
pub struct BruteForceIntersector {
    scene: Arc<SceneGeometry>,
}

impl BruteForceIntersector {
    pub fn new(scene: Arc<SceneGeometry>) -> BruteForceIntersector {
        BruteForceIntersector { scene }
    }

    fn closest_hit(&self, ray: &Ray) -> Intersection {
        // terminated rays read as no-ops on every later dispatch
        if !ray.is_alive() {
            return Intersection::miss();
        }

        let mut nearest = Intersection::miss();
        for (index, corner_indices) in self.scene.indices.iter().enumerate() {
            let v0 = self.scene.vertices[corner_indices[0] as usize].position;
            let v1 = self.scene.vertices[corner_indices[1] as usize].position;
            let v2 = self.scene.vertices[corner_indices[2] as usize].position;
            if let Some((distance, u, v)) = intersect_triangle(ray, v0, v1, v2) {
                if !nearest.is_hit() || distance < nearest.distance {
                    nearest = Intersection {
                        distance,
                        primitive_index: index as u32,
                        coordinates: Vector2::new(1.0 - u - v, u),
                    };
                }
            }
        }
        nearest
    }
}

impl AccelerationStructure for BruteForceIntersector {
    fn intersect(&self, rays: &[Ray], intersections: &mut [Intersection]) {
        debug_assert_eq!(rays.len(), intersections.len());
        intersections
            .par_iter_mut()
            .zip(rays.par_iter())
            .for_each(|(hit, ray)| *hit = self.closest_hit(ray));
    }
}

/// Moeller-Trumbore. Returns (distance, u, v) with u weighting v1 and v
/// weighting v2.
fn intersect_triangle(
    ray: &Ray,
    v0: Point3<f32>,
    v1: Point3<f32>,
    v2: Point3<f32>,
) -> Option<(f32, f32, f32)> {
    let e1 = v1 - v0;
    let e2 = v2 - v0;

    let p = ray.direction.cross(&e2);
    let det = e1.dot(&p);
    if det.abs() < 1e-8 {
        return None;
    }
    let inv_det = 1.0 / det;

    let s = ray.origin - v0;
    let u = s.dot(&p) * inv_det;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }

    let q = s.cross(&e1);
    let v = ray.direction.dot(&q) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }

    let distance = e2.dot(&q) * inv_det;
    if distance < ray.min_distance || distance > ray.max_distance {
        return None;
    }
    Some((distance, u, v))
}
