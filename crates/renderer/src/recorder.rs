//! Command recording for one frame.
//!
//! [`CommandRecorder`] owns the extent-independent drawing objects (render
//! pass, descriptor set layout, pipeline layout and pipeline) and fills a
//! command buffer for a given framebuffer. Viewport and scissor are set from
//! the target extent on every recording, so the pipeline survives rebuilds.

use std::sync::Arc;

use ash::vk;
use tracing::{info, trace};

use framepace_rhi::command::CommandBuffer;
use framepace_rhi::descriptor::{DescriptorSetLayout, uniform_binding};
use framepace_rhi::device::Device;
use framepace_rhi::pipeline::{GraphicsPipelineDesc, Pipeline, PipelineLayout};
use framepace_rhi::render_pass::RenderPass;
use framepace_rhi::shader::{Shader, ShaderStage};
use framepace_rhi::vertex::ColorVertex;

use crate::error::{RendererError, RendererResult};

/// WGSL source for the quad shaders.
pub const QUAD_SHADER: &str = include_str!("../shaders/quad.wgsl");

/// Color every frame is cleared to.
pub const CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

/// The framebuffer a command buffer renders into.
#[derive(Clone, Copy, Debug)]
pub struct RecordTarget {
    /// Framebuffer for the acquired image.
    pub framebuffer: vk::Framebuffer,
    /// Current swapchain extent.
    pub extent: vk::Extent2D,
}

impl RecordTarget {
    /// Viewport covering the whole target with a 0..1 depth range.
    pub fn viewport(&self) -> vk::Viewport {
        vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: self.extent.width as f32,
            height: self.extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }

    /// Scissor covering the whole target.
    pub fn scissor(&self) -> vk::Rect2D {
        vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: self.extent,
        }
    }
}

/// Geometry and descriptor resources bound for the draw.
#[derive(Clone, Copy, Debug)]
pub struct DrawBindings {
    pub vertex_buffer: vk::Buffer,
    pub index_buffer: vk::Buffer,
    pub index_type: vk::IndexType,
    pub index_count: u32,
    /// Uniform set for the acquired image.
    pub descriptor_set: vk::DescriptorSet,
}

/// Records the draw for one frame.
pub struct CommandRecorder {
    // Field order is drop order: the pipeline goes before its layout.
    pipeline: Pipeline,
    pipeline_layout: PipelineLayout,
    descriptor_set_layout: DescriptorSetLayout,
    render_pass: RenderPass,
}

impl CommandRecorder {
    /// Creates the render pass and compiles the quad pipeline for `color_format`.
    ///
    /// # Errors
    ///
    /// Returns [`RendererError::ResourceCreation`] if shader compilation or
    /// any object creation fails.
    pub fn new(device: Arc<Device>, color_format: vk::Format) -> RendererResult<Self> {
        let render_pass = RenderPass::new(device.clone(), color_format)
            .map_err(RendererError::creating("render pass"))?;

        let binding = uniform_binding(0, vk::ShaderStageFlags::VERTEX);
        let descriptor_set_layout = DescriptorSetLayout::new(device.clone(), &[binding])
            .map_err(RendererError::creating("descriptor set layout"))?;

        let pipeline_layout = PipelineLayout::new(device.clone(), &[descriptor_set_layout.handle()])
            .map_err(RendererError::creating("pipeline layout"))?;

        let vertex_shader =
            Shader::from_wgsl(device.clone(), QUAD_SHADER, ShaderStage::Vertex, "vs_main")
                .map_err(RendererError::creating("vertex shader"))?;
        let fragment_shader =
            Shader::from_wgsl(device.clone(), QUAD_SHADER, ShaderStage::Fragment, "fs_main")
                .map_err(RendererError::creating("fragment shader"))?;

        let attributes = ColorVertex::attribute_descriptions();
        let desc = GraphicsPipelineDesc::new(
            &vertex_shader,
            &fragment_shader,
            ColorVertex::binding_description(),
            &attributes,
            &render_pass,
        );
        let pipeline = Pipeline::graphics(device, &pipeline_layout, &desc)
            .map_err(RendererError::creating("graphics pipeline"))?;

        info!("Command recorder ready for {:?}", color_format);

        Ok(Self {
            pipeline,
            pipeline_layout,
            descriptor_set_layout,
            render_pass,
        })
    }

    /// Render pass framebuffers must be compatible with.
    #[inline]
    pub fn render_pass(&self) -> &RenderPass {
        &self.render_pass
    }

    /// Layout of the per-image uniform descriptor sets.
    #[inline]
    pub fn descriptor_set_layout(&self) -> &DescriptorSetLayout {
        &self.descriptor_set_layout
    }

    /// Records the full frame into `cmd`.
    ///
    /// The buffer is reset first, so it must not be pending execution.
    ///
    /// # Arguments
    ///
    /// * `cmd` - Command buffer of the current frame slot
    /// * `target` - Framebuffer and extent of the acquired image
    /// * `bindings` - Buffers and descriptor set to draw with
    ///
    /// # Errors
    ///
    /// Returns [`RendererError::RecordingFailed`] naming the Vulkan call that
    /// failed. The buffer contents are then unusable.
    pub fn record(
        &self,
        cmd: &CommandBuffer,
        target: &RecordTarget,
        bindings: &DrawBindings,
    ) -> RendererResult<()> {
        cmd.reset()
            .map_err(|e| RendererError::recording("vkResetCommandBuffer", e))?;
        let recording = cmd
            .begin()
            .map_err(|e| RendererError::recording("vkBeginCommandBuffer", e))?;

        recording.begin_render_pass(
            &self.render_pass,
            target.framebuffer,
            target.scissor(),
            CLEAR_COLOR,
        );
        recording.bind_pipeline(&self.pipeline);
        recording.set_viewport_and_scissor(target.viewport(), target.scissor());
        recording.bind_vertex_buffer(bindings.vertex_buffer);
        recording.bind_index_buffer(bindings.index_buffer, bindings.index_type);
        recording.bind_descriptor_set(&self.pipeline_layout, bindings.descriptor_set);
        recording.draw_indexed(bindings.index_count);
        recording.end_render_pass();

        recording
            .finish()
            .map_err(|e| RendererError::recording("vkEndCommandBuffer", e))?;

        trace!(
            "Recorded {} indices into {}x{} target",
            bindings.index_count, target.extent.width, target.extent.height
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use framepace_rhi::shader::compile_wgsl;

    fn target(width: u32, height: u32) -> RecordTarget {
        RecordTarget {
            framebuffer: vk::Framebuffer::null(),
            extent: vk::Extent2D { width, height },
        }
    }

    #[test]
    fn test_viewport_follows_extent() {
        let viewport = target(1280, 720).viewport();
        assert_eq!(viewport.width, 1280.0);
        assert_eq!(viewport.height, 720.0);
        assert_eq!(viewport.min_depth, 0.0);
        assert_eq!(viewport.max_depth, 1.0);
    }

    #[test]
    fn test_scissor_covers_target() {
        let scissor = target(640, 480).scissor();
        assert_eq!(scissor.offset.x, 0);
        assert_eq!(scissor.offset.y, 0);
        assert_eq!(scissor.extent.width, 640);
        assert_eq!(scissor.extent.height, 480);
    }

    #[test]
    fn test_clear_color_is_opaque_black() {
        assert_eq!(CLEAR_COLOR, [0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_quad_shader_compiles_for_both_stages() {
        assert!(compile_wgsl(QUAD_SHADER, ShaderStage::Vertex, "vs_main").is_ok());
        assert!(compile_wgsl(QUAD_SHADER, ShaderStage::Fragment, "fs_main").is_ok());
    }
}
