//! Render pass for presenting a single color attachment.

use std::sync::Arc;

use ash::vk;
use tracing::info;

use crate::device::Device;
use crate::error::RhiResult;

/// Builds the attachment description for a presentable color target.
///
/// Cleared on load, stored at the end, transitioned from UNDEFINED to
/// PRESENT_SRC_KHR.
pub fn color_attachment_description(format: vk::Format) -> vk::AttachmentDescription {
    vk::AttachmentDescription::default()
        .format(format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)
}

/// External dependency making subpass 0 wait for the acquired image.
///
/// Matches the semaphore wait stage used at submit time, so the layout
/// transition happens only after the presentation engine releases the image.
pub fn acquire_dependency() -> vk::SubpassDependency {
    vk::SubpassDependency::default()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .src_access_mask(vk::AccessFlags::empty())
        .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
}

/// Vulkan render pass wrapper.
///
/// The render pass depends only on the color format, not on the extent, so
/// it survives swapchain rebuilds.
pub struct RenderPass {
    device: Arc<Device>,
    render_pass: vk::RenderPass,
    color_format: vk::Format,
}

impl RenderPass {
    /// Creates a render pass with one color attachment and one graphics subpass.
    ///
    /// # Errors
    ///
    /// Returns an error if render pass creation fails.
    pub fn new(device: Arc<Device>, color_format: vk::Format) -> RhiResult<Self> {
        let attachments = [color_attachment_description(color_format)];

        let color_attachment_ref = vk::AttachmentReference::default()
            .attachment(0)
            .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);

        let subpasses = [vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(std::slice::from_ref(&color_attachment_ref))];

        let dependencies = [acquire_dependency()];

        let create_info = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);

        // SAFETY: create_info only borrows locals that outlive the call.
        let render_pass = unsafe { device.handle().create_render_pass(&create_info, None)? };

        info!("Render pass created for format {:?}", color_format);

        Ok(Self {
            device,
            render_pass,
            color_format,
        })
    }

    /// Returns the Vulkan render pass handle.
    #[inline]
    pub fn handle(&self) -> vk::RenderPass {
        self.render_pass
    }

    /// Returns the color attachment format this pass was built for.
    #[inline]
    pub fn color_format(&self) -> vk::Format {
        self.color_format
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        // SAFETY: pipelines and framebuffers built on this pass are gone.
        unsafe {
            self.device
                .handle()
                .destroy_render_pass(self.render_pass, None);
        }
    }
}
