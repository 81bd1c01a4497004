//! Intersection response kernel: one invocation per ray per bounce.

use std::f32::consts::PI;

use nalgebra::Vector3;

use crate::render_system::accel::Intersection;
use crate::render_system::ray::Ray;
use crate::render_system::rng::Crng;
use crate::render_system::scene::{interpolate, SceneGeometry};

/// Hits closer than this are treated as degenerate and terminate the path;
/// bounce origins are offset along the normal by the same amount so the next
/// segment cannot immediately re-intersect its own surface.
pub const DISTANCE_EPSILON: f32 = 1e-3;

/// Fixed roughness of the bounce lobe.
const GGX_ROUGHNESS: f32 = 0.35;

/// Consumes one intersection result and advances the ray by one bounce.
///
/// Misses and degenerate hits terminate the path. Otherwise the hit point's
/// attributes are interpolated, a directly-hit emitter contributes
/// `emissive * throughput` (the sole light-transport mechanism here), and the
/// ray is respawned along an importance-sampled lobe around the surface
/// normal. Terminated rays are left untouched, so a second pass over the same
/// buffer is a no-op for them.
pub fn shade_ray(
    ray: &mut Ray,
    hit: &Intersection,
    scene: &SceneGeometry,
    pixel: [u32; 2],
    frame_index: u32,
) {
    if !ray.is_alive() {
        return;
    }
    if hit.distance < DISTANCE_EPSILON {
        ray.terminate();
        return;
    }

    let primitive = hit.primitive_index as usize;
    let [i0, i1, i2] = scene.indices[primitive];
    let material = &scene.materials[scene.triangles[primitive].material_index as usize];
    let surface = interpolate(
        &scene.vertices[i0 as usize],
        &scene.vertices[i1 as usize],
        &scene.vertices[i2 as usize],
        hit.coordinates,
    );
    let normal = surface.normal.normalize();

    if material.is_emissive() {
        ray.radiance += material.emissive.component_mul(&ray.throughput);
    }

    // seeding with frame + bounce count decorrelates consecutive bounces
    // within the same frame
    let mut rng = Crng::new(pixel, frame_index + ray.bounces);

    ray.origin = surface.position + normal * DISTANCE_EPSILON;
    ray.direction = sample_ggx_lobe(&mut rng, &normal);
    ray.min_distance = 0.0;
    ray.max_distance = f32::MAX;
    // the cosine weighting of the sampled lobe cancels against the cosine in
    // the reflectance integral, leaving the albedo as the whole weight
    ray.throughput.component_mul_assign(&material.diffuse);
    ray.bounces += 1;
}

/// Draws a bounce direction around `normal`: longitude uniform in [0, 2pi),
/// colatitude shaped by the GGX normal distribution at the fixed roughness.
fn sample_ggx_lobe(rng: &mut Crng, normal: &Vector3<f32>) -> Vector3<f32> {
    let u1 = rng.uniform_f32();
    let u2 = rng.uniform_f32();

    let phi = 2.0 * PI * u1;
    let alpha = GGX_ROUGHNESS * GGX_ROUGHNESS;
    let cos_theta = ((1.0 - u2) / (1.0 + (alpha * alpha - 1.0) * u2)).sqrt();
    let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();

    let (tangent, bitangent) = orthonormal_basis(normal);
    tangent * (sin_theta * phi.cos()) + bitangent * (sin_theta * phi.sin()) + normal * cos_theta
}

fn orthonormal_basis(normal: &Vector3<f32>) -> (Vector3<f32>, Vector3<f32>) {
    let helper = if normal.x.abs() > 0.9 {
        Vector3::y()
    } else {
        Vector3::x()
    };
    let bitangent = normal.cross(&helper).normalize();
    let tangent = bitangent.cross(normal);
    (tangent, bitangent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render_system::scene::{Material, Triangle, Vertex};
    use approx::assert_relative_eq;
    use nalgebra::{Point3, Vector2};

    /// One triangle in the z = 0 plane with the given material.
    fn single_triangle_scene(material: Material) -> SceneGeometry {
        let normal = Vector3::z();
        let vertices = vec![
            Vertex::new(Point3::new(-10.0, -10.0, 0.0), normal),
            Vertex::new(Point3::new(10.0, -10.0, 0.0), normal),
            Vertex::new(Point3::new(0.0, 10.0, 0.0), normal),
        ];
        SceneGeometry::new(
            vertices,
            vec![[0, 1, 2]],
            vec![Triangle { material_index: 0 }],
            vec![material],
        )
        .unwrap()
    }

    fn ray_towards_origin() -> Ray {
        Ray {
            origin: Point3::new(0.0, 0.0, 3.0),
            direction: -Vector3::z(),
            min_distance: 0.0,
            max_distance: 100.0,
            radiance: Vector3::zeros(),
            throughput: Vector3::new(1.0, 1.0, 1.0),
            bounces: 0,
        }
    }

    fn interior_hit() -> Intersection {
        Intersection {
            distance: 3.0,
            primitive_index: 0,
            coordinates: Vector2::new(0.3, 0.3),
        }
    }

    #[test]
    fn direct_emitter_hit_contributes_its_radiance() {
        let emissive = Vector3::new(2.0, 3.0, 4.0);
        let scene = single_triangle_scene(Material::light(emissive));
        let mut ray = ray_towards_origin();

        shade_ray(&mut ray, &interior_hit(), &scene, [2, 2], 0);

        assert_relative_eq!(ray.radiance, emissive, epsilon = 1e-6);
        assert_eq!(ray.bounces, 1);
        assert!(ray.is_alive());
        // a pure light reflects nothing, so the path carries no more weight
        assert_eq!(ray.throughput, Vector3::zeros());
    }

    #[test]
    fn diffuse_hit_attenuates_throughput_and_adds_nothing() {
        let diffuse = Vector3::new(0.5, 0.25, 0.125);
        let scene = single_triangle_scene(Material::diffuse(diffuse));
        let mut ray = ray_towards_origin();

        shade_ray(&mut ray, &interior_hit(), &scene, [2, 2], 0);

        assert_eq!(ray.radiance, Vector3::zeros());
        assert_relative_eq!(ray.throughput, diffuse, epsilon = 1e-6);
        assert_eq!(ray.bounces, 1);
    }

    #[test]
    fn miss_terminates_the_ray() {
        let scene = single_triangle_scene(Material::diffuse(Vector3::new(0.5, 0.5, 0.5)));
        let mut ray = ray_towards_origin();

        shade_ray(&mut ray, &Intersection::miss(), &scene, [0, 0], 0);

        assert!(!ray.is_alive());
    }

    #[test]
    fn degenerate_near_hit_terminates_the_ray() {
        let scene = single_triangle_scene(Material::diffuse(Vector3::new(0.5, 0.5, 0.5)));
        let mut ray = ray_towards_origin();
        let hit = Intersection {
            distance: DISTANCE_EPSILON / 2.0,
            primitive_index: 0,
            coordinates: Vector2::new(0.3, 0.3),
        };

        shade_ray(&mut ray, &hit, &scene, [0, 0], 0);

        assert!(!ray.is_alive());
    }

    #[test]
    fn terminated_rays_are_never_touched_again() {
        let scene = single_triangle_scene(Material::light(Vector3::new(5.0, 5.0, 5.0)));
        let mut ray = ray_towards_origin();
        ray.radiance = Vector3::new(1.0, 2.0, 3.0);
        ray.throughput = Vector3::new(0.5, 0.5, 0.5);
        ray.terminate();

        // even a valid emitter hit must be a no-op on a dead ray
        shade_ray(&mut ray, &interior_hit(), &scene, [1, 1], 7);

        assert_eq!(ray.radiance, Vector3::new(1.0, 2.0, 3.0));
        assert_eq!(ray.throughput, Vector3::new(0.5, 0.5, 0.5));
        assert_eq!(ray.bounces, 0);
        assert!(!ray.is_alive());
    }

    #[test]
    fn bounce_origin_is_lifted_off_the_surface() {
        let scene = single_triangle_scene(Material::diffuse(Vector3::new(0.5, 0.5, 0.5)));
        let mut ray = ray_towards_origin();

        shade_ray(&mut ray, &interior_hit(), &scene, [2, 2], 0);

        assert_relative_eq!(ray.origin.z, DISTANCE_EPSILON, epsilon = 1e-6);
        assert_eq!(ray.max_distance, f32::MAX);
    }

    #[test]
    fn sampled_lobe_stays_in_the_upper_hemisphere() {
        for seed in 0..64 {
            let mut rng = Crng::new([seed, seed * 3 + 1], seed);
            for normal in [Vector3::z(), Vector3::y(), Vector3::x(), -Vector3::z()] {
                let direction = sample_ggx_lobe(&mut rng, &normal);
                assert!(direction.dot(&normal) > 0.0);
                assert_relative_eq!(direction.norm(), 1.0, epsilon = 1e-4);
            }
        }
    }

    #[test]
    fn consecutive_bounces_draw_from_different_streams() {
        let scene = single_triangle_scene(Material::diffuse(Vector3::new(0.9, 0.9, 0.9)));
        let mut first = ray_towards_origin();
        let mut second = ray_towards_origin();
        second.bounces = 1;

        shade_ray(&mut first, &interior_hit(), &scene, [2, 2], 0);
        shade_ray(&mut second, &interior_hit(), &scene, [2, 2], 0);

        assert_ne!(first.direction, second.direction);
    }
}
