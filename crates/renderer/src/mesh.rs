//! The quad drawn every frame.

use std::sync::Arc;

use ash::vk;
use glam::{Vec2, Vec3};
use tracing::debug;

use framepace_rhi::buffer::{Buffer, BufferUsage};
use framepace_rhi::command::CommandPool;
use framepace_rhi::device::Device;
use framepace_rhi::vertex::ColorVertex;

use crate::error::{RendererError, RendererResult};
use crate::recorder::DrawBindings;

/// Corners of a unit quad centered on the origin, counter-clockwise from bottom-left.
pub const QUAD_VERTICES: [ColorVertex; 4] = [
    ColorVertex::new(Vec2::new(-0.5, -0.5), Vec3::new(1.0, 0.0, 0.0)),
    ColorVertex::new(Vec2::new(0.5, -0.5), Vec3::new(0.0, 1.0, 0.0)),
    ColorVertex::new(Vec2::new(0.5, 0.5), Vec3::new(0.0, 0.0, 1.0)),
    ColorVertex::new(Vec2::new(-0.5, 0.5), Vec3::new(1.0, 1.0, 1.0)),
];

/// Two counter-clockwise triangles covering the quad.
pub const QUAD_INDICES: [u16; 6] = [0, 1, 2, 2, 3, 0];

/// Vertex and index buffers for the quad.
pub struct QuadMesh {
    vertex_buffer: Buffer,
    index_buffer: Buffer,
    index_count: u32,
}

impl QuadMesh {
    /// Uploads the quad into device-local buffers through `pool`'s queue.
    ///
    /// Blocks until both copies have completed.
    ///
    /// # Errors
    ///
    /// Returns [`RendererError::ResourceCreation`] if either buffer cannot be
    /// created or filled.
    pub fn new(device: Arc<Device>, pool: &CommandPool) -> RendererResult<Self> {
        let vertex_buffer = Buffer::upload(
            device.clone(),
            pool,
            BufferUsage::Vertex,
            bytemuck::cast_slice(&QUAD_VERTICES),
        )
        .map_err(RendererError::creating("vertex buffer"))?;

        let index_buffer = Buffer::upload(
            device,
            pool,
            BufferUsage::Index,
            bytemuck::cast_slice(&QUAD_INDICES),
        )
        .map_err(RendererError::creating("index buffer"))?;

        debug!(
            "Quad mesh: {} vertices, {} indices",
            QUAD_VERTICES.len(),
            QUAD_INDICES.len()
        );

        Ok(Self {
            vertex_buffer,
            index_buffer,
            index_count: QUAD_INDICES.len() as u32,
        })
    }

    /// Bindings drawing the quad with `descriptor_set`.
    pub fn bindings(&self, descriptor_set: vk::DescriptorSet) -> DrawBindings {
        DrawBindings {
            vertex_buffer: self.vertex_buffer.handle(),
            index_buffer: self.index_buffer.handle(),
            index_type: vk::IndexType::UINT16,
            index_count: self.index_count,
            descriptor_set,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quad_indices_reference_every_vertex() {
        for vertex in 0..QUAD_VERTICES.len() as u16 {
            assert!(QUAD_INDICES.contains(&vertex));
        }
        assert!(QUAD_INDICES.iter().all(|&i| (i as usize) < QUAD_VERTICES.len()));
    }

    #[test]
    fn test_quad_triangles_are_counter_clockwise() {
        for triangle in QUAD_INDICES.chunks(3) {
            let a = QUAD_VERTICES[triangle[0] as usize].position;
            let b = QUAD_VERTICES[triangle[1] as usize].position;
            let c = QUAD_VERTICES[triangle[2] as usize].position;
            assert!((b - a).perp_dot(c - a) > 0.0);
        }
    }

    #[test]
    fn test_quad_byte_sizes() {
        assert_eq!(bytemuck::cast_slice::<_, u8>(&QUAD_VERTICES).len(), 80);
        assert_eq!(bytemuck::cast_slice::<_, u8>(&QUAD_INDICES).len(), 12);
    }
}
