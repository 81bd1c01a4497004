use thiserror::Error;

/// Centralized error type for the render core.
///
/// Scene validation failures are load-time fatal; buffer allocation failures
/// abort the frame or resize that needed them. The core never retries.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("triangle {triangle} references material {material}, but only {count} materials are loaded")]
    MaterialOutOfRange {
        triangle: usize,
        material: u32,
        count: usize,
    },

    #[error("triangle {triangle} references vertex {vertex}, but only {count} vertices are loaded")]
    VertexOutOfRange {
        triangle: usize,
        vertex: u32,
        count: usize,
    },

    #[error("index buffer holds {index_groups} triangles but {triangles} material bindings were provided")]
    TriangleCountMismatch {
        triangles: usize,
        index_groups: usize,
    },

    #[error("failed to allocate frame buffers for {pixels} pixels")]
    BufferAllocation { pixels: usize },

    #[error("view-projection matrix is not invertible")]
    SingularViewProjection,

    #[error("frame queue worker has shut down")]
    QueueClosed,
}
