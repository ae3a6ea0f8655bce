use glam::Vec3;

use crate::error::RenderResult;
use crate::renderer::device::{GraphicsDevice, MeshId};
use crate::renderer::Vertex;
use crate::scene::Aabb;

/// An uploaded mesh plus the CPU-side data culling needs.
#[derive(Clone, Debug)]
pub struct Mesh {
    gpu: MeshId,
    bounds: Aabb,
    vertex_count: u32,
}

impl Mesh {
    pub fn upload(
        device: &mut dyn GraphicsDevice,
        vertices: &[Vertex],
        indices: &[u32],
    ) -> RenderResult<Self> {
        let gpu = device.create_mesh(vertices, indices)?;
        let bounds = Aabb::from_points(vertices.iter().map(Vertex::position))
            .unwrap_or(Aabb::new(Vec3::ZERO, Vec3::ZERO));

        Ok(Self {
            gpu,
            bounds,
            vertex_count: vertices.len() as u32,
        })
    }

    /// Wrap a mesh uploaded elsewhere.
    pub fn from_parts(gpu: MeshId, bounds: Aabb, vertex_count: u32) -> Self {
        Self {
            gpu,
            bounds,
            vertex_count,
        }
    }

    pub fn gpu(&self) -> MeshId {
        self.gpu
    }

    /// Bounding box in mesh-local space.
    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    pub fn is_empty(&self) -> bool {
        self.vertex_count == 0
    }
}
