//! Graphics pipelines and their layouts.
//!
//! Every pipeline built here renders into subpass 0 of a single-attachment
//! [`RenderPass`] and declares viewport and scissor as dynamic state, so the
//! pipeline is independent of the swapchain extent and survives rebuilds.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use framepace_rhi::device::Device;
//! use framepace_rhi::render_pass::RenderPass;
//! use framepace_rhi::shader::{Shader, ShaderStage};
//! use framepace_rhi::pipeline::{GraphicsPipelineDesc, Pipeline, PipelineLayout};
//! use framepace_rhi::vertex::ColorVertex;
//! use ash::vk;
//!
//! # fn example(device: Arc<Device>, source: &str) -> Result<(), framepace_rhi::RhiError> {
//! let vertex_shader = Shader::from_wgsl(device.clone(), source, ShaderStage::Vertex, "vs_main")?;
//! let fragment_shader = Shader::from_wgsl(device.clone(), source, ShaderStage::Fragment, "fs_main")?;
//! let render_pass = RenderPass::new(device.clone(), vk::Format::B8G8R8A8_SRGB)?;
//! let layout = PipelineLayout::new(device.clone(), &[])?;
//!
//! let attributes = ColorVertex::attribute_descriptions();
//! let desc = GraphicsPipelineDesc::new(
//!     &vertex_shader,
//!     &fragment_shader,
//!     ColorVertex::binding_description(),
//!     &attributes,
//!     &render_pass,
//! );
//! let pipeline = Pipeline::graphics(device, &layout, &desc)?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::render_pass::RenderPass;
use crate::shader::Shader;

/// State set on the command buffer instead of baked into the pipeline.
pub const DYNAMIC_STATES: [vk::DynamicState; 2] =
    [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];

/// Descriptor set layouts visible to a pipeline.
pub struct PipelineLayout {
    device: Arc<Device>,
    layout: vk::PipelineLayout,
}

impl PipelineLayout {
    /// Creates a layout over `set_layouts`, in set-index order. No push constants.
    ///
    /// # Errors
    ///
    /// Returns an error if pipeline layout creation fails.
    pub fn new(device: Arc<Device>, set_layouts: &[vk::DescriptorSetLayout]) -> RhiResult<Self> {
        let create_info = vk::PipelineLayoutCreateInfo::default().set_layouts(set_layouts);

        // SAFETY: the set layouts are alive for the duration of the call.
        let layout = unsafe { device.handle().create_pipeline_layout(&create_info, None)? };
        debug!("Pipeline layout created over {} set(s)", set_layouts.len());

        Ok(Self { device, layout })
    }

    #[inline]
    pub fn handle(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        // SAFETY: pipelines using this layout are destroyed first.
        unsafe {
            self.device
                .handle()
                .destroy_pipeline_layout(self.layout, None);
        }
    }
}

/// Inputs for [`Pipeline::graphics`].
///
/// [`GraphicsPipelineDesc::new`] fills in back-face culling with
/// counter-clockwise front faces; both fields can be overridden.
#[derive(Clone, Copy)]
pub struct GraphicsPipelineDesc<'a> {
    pub vertex_shader: &'a Shader,
    pub fragment_shader: &'a Shader,
    pub vertex_binding: vk::VertexInputBindingDescription,
    pub vertex_attributes: &'a [vk::VertexInputAttributeDescription],
    pub render_pass: &'a RenderPass,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
}

impl<'a> GraphicsPipelineDesc<'a> {
    pub fn new(
        vertex_shader: &'a Shader,
        fragment_shader: &'a Shader,
        vertex_binding: vk::VertexInputBindingDescription,
        vertex_attributes: &'a [vk::VertexInputAttributeDescription],
        render_pass: &'a RenderPass,
    ) -> Self {
        Self {
            vertex_shader,
            fragment_shader,
            vertex_binding,
            vertex_attributes,
            render_pass,
            cull_mode: vk::CullModeFlags::BACK,
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
        }
    }
}

/// Filled triangles with the given culling, no depth bias or clamping.
fn rasterization_state(
    cull_mode: vk::CullModeFlags,
    front_face: vk::FrontFace,
) -> vk::PipelineRasterizationStateCreateInfo<'static> {
    vk::PipelineRasterizationStateCreateInfo::default()
        .polygon_mode(vk::PolygonMode::FILL)
        .line_width(1.0)
        .cull_mode(cull_mode)
        .front_face(front_face)
}

/// Opaque writes to all four channels.
fn opaque_blend_attachment() -> vk::PipelineColorBlendAttachmentState {
    vk::PipelineColorBlendAttachmentState::default()
        .blend_enable(false)
        .color_write_mask(vk::ColorComponentFlags::RGBA)
}

/// A graphics pipeline.
pub struct Pipeline {
    device: Arc<Device>,
    pipeline: vk::Pipeline,
}

impl Pipeline {
    /// Builds a triangle-list pipeline for subpass 0 of `desc.render_pass`.
    ///
    /// # Errors
    ///
    /// Returns the Vulkan error if creation fails, or
    /// [`RhiError::PipelineError`] if the driver returns no pipeline.
    pub fn graphics(
        device: Arc<Device>,
        layout: &PipelineLayout,
        desc: &GraphicsPipelineDesc<'_>,
    ) -> RhiResult<Self> {
        let stages = [
            desc.vertex_shader.stage_create_info(),
            desc.fragment_shader.stage_create_info(),
        ];
        let bindings = [desc.vertex_binding];
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&bindings)
            .vertex_attribute_descriptions(desc.vertex_attributes);
        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST);
        // Counts only; the values are set per frame
        let viewport = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);
        let rasterization = rasterization_state(desc.cull_mode, desc.front_face);
        let multisample = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);
        let attachments = [opaque_blend_attachment()];
        let color_blend =
            vk::PipelineColorBlendStateCreateInfo::default().attachments(&attachments);
        let dynamic = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&DYNAMIC_STATES);

        let create_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .color_blend_state(&color_blend)
            .dynamic_state(&dynamic)
            .layout(layout.handle())
            .render_pass(desc.render_pass.handle())
            .subpass(0);

        // SAFETY: every state struct borrowed by create_info is alive here.
        let pipeline = unsafe {
            device
                .handle()
                .create_graphics_pipelines(vk::PipelineCache::null(), &[create_info], None)
                .map_err(|(_, result)| result)?
        }
        .into_iter()
        .next()
        .ok_or_else(|| RhiError::PipelineError("driver returned no pipeline".to_string()))?;

        debug!(
            "Graphics pipeline created for {:?}",
            desc.render_pass.color_format()
        );
        Ok(Self { device, pipeline })
    }

    #[inline]
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    /// Always [`vk::PipelineBindPoint::GRAPHICS`].
    #[inline]
    pub fn bind_point(&self) -> vk::PipelineBindPoint {
        vk::PipelineBindPoint::GRAPHICS
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        // SAFETY: no command buffer referencing the pipeline is pending.
        unsafe {
            self.device.handle().destroy_pipeline(self.pipeline, None);
        }
        debug!("Graphics pipeline destroyed");
    }
}
