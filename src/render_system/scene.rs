//! Scene geometry tables shared read-only by every dispatch.
//!
//! The vertex/index/material arrays come from the asset-loading collaborator;
//! this module validates them once and derives the emitter importance table.
//! Everything here is immutable for the lifetime of a loaded scene.

use nalgebra::{Point3, Vector2, Vector3};

use crate::error::RenderError;

/// Interpolatable per-vertex attributes. Texcoords are carried for future use
/// and ignored by shading.
#[derive(Clone, Copy, Debug)]
pub struct Vertex {
    pub position: Point3<f32>,
    pub normal: Vector3<f32>,
    pub texcoord: Vector2<f32>,
}

impl Vertex {
    pub fn new(position: Point3<f32>, normal: Vector3<f32>) -> Vertex {
        Vertex {
            position,
            normal,
            texcoord: Vector2::zeros(),
        }
    }
}

/// Diagnostic material tag. Shading never branches on it; emission is decided
/// by the emissive color being non-zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum MaterialKind {
    Diffuse = 1,
    Light = 100,
}

#[derive(Clone, Copy, Debug)]
pub struct Material {
    /// Diffuse reflectance, linear RGB, components in [0, 1] by convention.
    pub diffuse: Vector3<f32>,
    pub kind: MaterialKind,
    /// Emitted radiance, linear RGB, non-negative.
    pub emissive: Vector3<f32>,
}

impl Material {
    pub fn diffuse(diffuse: Vector3<f32>) -> Material {
        Material {
            diffuse,
            kind: MaterialKind::Diffuse,
            emissive: Vector3::zeros(),
        }
    }

    pub fn light(emissive: Vector3<f32>) -> Material {
        Material {
            diffuse: Vector3::zeros(),
            kind: MaterialKind::Light,
            emissive,
        }
    }

    pub fn is_emissive(&self) -> bool {
        self.emissive != Vector3::zeros()
    }
}

/// Per-triangle material binding; positions and normals are resolved through
/// the index buffer.
#[derive(Clone, Copy, Debug)]
pub struct Triangle {
    pub material_index: u32,
}

/// One emissive triangle in the importance table, with its vertices and color
/// denormalized so sampling never chases back into the geometry arrays.
#[derive(Clone, Copy, Debug)]
pub struct EmitterTriangle {
    pub area: f32,
    /// Cumulative probability mass of all emitters before this one in the
    /// ascending-area sort order.
    pub cdf: f32,
    /// Probability mass of this emitter: area / total emitter area.
    pub pdf: f32,
    /// Index of the source triangle within the scene.
    pub global_index: u32,
    pub vertices: [Vertex; 3],
    pub emissive: Vector3<f32>,
}

pub struct SceneGeometry {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<[u32; 3]>,
    pub triangles: Vec<Triangle>,
    pub materials: Vec<Material>,
    emitter_triangles: Vec<EmitterTriangle>,
}

impl SceneGeometry {
    /// Validates the imported arrays and builds the emitter importance table.
    /// A triangle without a resolvable material or vertex is a load-time
    /// fatal error.
    pub fn new(
        vertices: Vec<Vertex>,
        indices: Vec<[u32; 3]>,
        triangles: Vec<Triangle>,
        materials: Vec<Material>,
    ) -> Result<SceneGeometry, RenderError> {
        if indices.len() != triangles.len() {
            return Err(RenderError::TriangleCountMismatch {
                triangles: triangles.len(),
                index_groups: indices.len(),
            });
        }
        for (i, (triangle, corner_indices)) in triangles.iter().zip(indices.iter()).enumerate() {
            if triangle.material_index as usize >= materials.len() {
                return Err(RenderError::MaterialOutOfRange {
                    triangle: i,
                    material: triangle.material_index,
                    count: materials.len(),
                });
            }
            for &vertex in corner_indices {
                if vertex as usize >= vertices.len() {
                    return Err(RenderError::VertexOutOfRange {
                        triangle: i,
                        vertex,
                        count: vertices.len(),
                    });
                }
            }
        }

        let emitter_triangles = build_emitter_table(&vertices, &indices, &triangles, &materials);

        Ok(SceneGeometry {
            vertices,
            indices,
            triangles,
            materials,
            emitter_triangles,
        })
    }

    /// The importance table, sentinel entry included. Empty when the scene has
    /// no emitters.
    pub fn emitter_table(&self) -> &[EmitterTriangle] {
        &self.emitter_triangles
    }

    /// Number of emissive triangles, excluding the sentinel.
    pub fn emitter_count(&self) -> u32 {
        self.emitter_triangles.len().saturating_sub(1) as u32
    }

    /// Inverse-CDF selection of an emitter proportional to its area: the
    /// sentinel's cdf of 1.0 guarantees an upper bound exists for any deviate.
    /// Returns `None` when the scene has no emitters.
    pub fn sample_emitter(&self, u: f32) -> Option<&EmitterTriangle> {
        if self.emitter_triangles.is_empty() {
            return None;
        }
        let u = u.max(0.0);
        let upper = self
            .emitter_triangles
            .partition_point(|e| e.cdf <= u)
            .min(self.emitter_triangles.len() - 1);
        Some(&self.emitter_triangles[upper - 1])
    }
}

/// Interpolates vertex attributes at a barycentric location. The weights are
/// (x, y, 1 - x - y) for (v0, v1, v2).
pub fn interpolate(v0: &Vertex, v1: &Vertex, v2: &Vertex, barycentric: Vector2<f32>) -> Vertex {
    let u = barycentric.x;
    let v = barycentric.y;
    let w = 1.0 - u - v;

    Vertex {
        position: Point3::from(
            v0.position.coords * u + v1.position.coords * v + v2.position.coords * w,
        ),
        normal: v0.normal * u + v1.normal * v + v2.normal * w,
        texcoord: v0.texcoord * u + v1.texcoord * v + v2.texcoord * w,
    }
}

fn triangle_area(v0: &Vertex, v1: &Vertex, v2: &Vertex) -> f32 {
    let e1 = v1.position - v0.position;
    let e2 = v2.position - v0.position;
    0.5 * e1.cross(&e2).norm()
}

/// Collects every triangle with a non-zero emissive color, sorts ascending by
/// area (this fixes the tie-break order of the cdf search), assigns pdf/cdf,
/// and closes the table with a sentinel at cdf 1.0.
fn build_emitter_table(
    vertices: &[Vertex],
    indices: &[[u32; 3]],
    triangles: &[Triangle],
    materials: &[Material],
) -> Vec<EmitterTriangle> {
    let mut emitters = Vec::new();
    let mut total_area = 0.0f32;

    for (i, (triangle, corner_indices)) in triangles.iter().zip(indices.iter()).enumerate() {
        let material = &materials[triangle.material_index as usize];
        if !material.is_emissive() {
            continue;
        }
        let corners = [
            vertices[corner_indices[0] as usize],
            vertices[corner_indices[1] as usize],
            vertices[corner_indices[2] as usize],
        ];
        let area = triangle_area(&corners[0], &corners[1], &corners[2]);
        total_area += area;
        emitters.push(EmitterTriangle {
            area,
            cdf: 0.0,
            pdf: 0.0,
            global_index: i as u32,
            vertices: corners,
            emissive: material.emissive,
        });
    }

    // with no emitter area the pdf would be undefined; leave the table empty
    if emitters.is_empty() || total_area == 0.0 {
        if !emitters.is_empty() {
            log::warn!("all {} emitter triangles are degenerate", emitters.len());
        }
        return Vec::new();
    }

    emitters.sort_by(|a, b| a.area.total_cmp(&b.area));

    let mut cdf = 0.0f32;
    for emitter in emitters.iter_mut() {
        emitter.pdf = emitter.area / total_area;
        emitter.cdf = cdf;
        cdf += emitter.pdf;
    }

    emitters.push(EmitterTriangle {
        area: 0.0,
        cdf: 1.0,
        pdf: 0.0,
        global_index: u32::MAX,
        vertices: [
            Vertex::new(Point3::origin(), Vector3::zeros()),
            Vertex::new(Point3::origin(), Vector3::zeros()),
            Vertex::new(Point3::origin(), Vector3::zeros()),
        ],
        emissive: Vector3::zeros(),
    });

    log::info!(
        "emitter table: {} triangles, total area {}",
        emitters.len() - 1,
        total_area
    );

    emitters
}
