//! Vertex formats and their pipeline input descriptions.

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};

/// 2D position with a per-vertex RGB color, 20 bytes tightly packed.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct ColorVertex {
    /// Position in model space, z = 0.
    pub position: Vec2,
    /// Linear RGB color.
    pub color: Vec3,
}

impl ColorVertex {
    /// Byte offset of `color` within the vertex.
    pub const COLOR_OFFSET: u32 = size_of::<Vec2>() as u32;

    pub const fn new(position: Vec2, color: Vec3) -> Self {
        Self { position, color }
    }

    /// Per-vertex binding at slot 0.
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription::default()
            .stride(size_of::<Self>() as u32)
            .input_rate(vk::VertexInputRate::VERTEX)
    }

    /// Position at location 0, color at location 1, both from binding 0.
    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 2] {
        let attribute = |location, format, offset| {
            vk::VertexInputAttributeDescription::default()
                .location(location)
                .format(format)
                .offset(offset)
        };
        [
            attribute(0, vk::Format::R32G32_SFLOAT, 0),
            attribute(1, vk::Format::R32G32B32_SFLOAT, Self::COLOR_OFFSET),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_vertex_size() {
        assert_eq!(std::mem::size_of::<ColorVertex>(), 20);
        assert_eq!(std::mem::align_of::<ColorVertex>(), 4);
    }

    #[test]
    fn test_color_offset_matches_layout() {
        let vertex = ColorVertex::new(Vec2::new(1.0, 2.0), Vec3::new(3.0, 4.0, 5.0));
        let bytes = bytemuck::bytes_of(&vertex);
        let offset = ColorVertex::COLOR_OFFSET as usize;
        let red = f32::from_ne_bytes(bytes[offset..offset + 4].try_into().unwrap());
        assert_eq!(red, 3.0);
    }

    #[test]
    fn test_binding_description() {
        let binding = ColorVertex::binding_description();
        assert_eq!(binding.binding, 0);
        assert_eq!(binding.stride, 20);
        assert_eq!(binding.input_rate, vk::VertexInputRate::VERTEX);
    }

    #[test]
    fn test_attribute_descriptions() {
        let attributes = ColorVertex::attribute_descriptions();

        assert_eq!(attributes[0].location, 0);
        assert_eq!(attributes[0].format, vk::Format::R32G32_SFLOAT);
        assert_eq!(attributes[0].offset, 0);

        assert_eq!(attributes[1].location, 1);
        assert_eq!(attributes[1].format, vk::Format::R32G32B32_SFLOAT);
        assert_eq!(attributes[1].offset, 8);
    }
}
