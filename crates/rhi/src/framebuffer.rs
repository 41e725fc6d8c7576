//! Framebuffers binding swapchain image views to a render pass.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::RhiResult;
use crate::render_pass::RenderPass;

/// Vulkan framebuffer wrapper with a single color attachment.
pub struct Framebuffer {
    device: Arc<Device>,
    framebuffer: vk::Framebuffer,
    extent: vk::Extent2D,
}

impl Framebuffer {
    /// Creates a framebuffer for one image view.
    ///
    /// # Errors
    ///
    /// Returns an error if framebuffer creation fails.
    pub fn new(
        device: Arc<Device>,
        render_pass: &RenderPass,
        view: vk::ImageView,
        extent: vk::Extent2D,
    ) -> RhiResult<Self> {
        let attachments = [view];
        let create_info = vk::FramebufferCreateInfo::default()
            .render_pass(render_pass.handle())
            .attachments(&attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        // SAFETY: the view and render pass are alive and format-compatible.
        let framebuffer = unsafe { device.handle().create_framebuffer(&create_info, None)? };

        Ok(Self {
            device,
            framebuffer,
            extent,
        })
    }

    /// Creates one framebuffer per view, in view order.
    ///
    /// On failure the framebuffers created so far are destroyed.
    ///
    /// # Errors
    ///
    /// Returns the first creation error.
    pub fn for_views(
        device: &Arc<Device>,
        render_pass: &RenderPass,
        views: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> RhiResult<Vec<Self>> {
        let framebuffers = views
            .iter()
            .map(|&view| Self::new(device.clone(), render_pass, view, extent))
            .collect::<RhiResult<Vec<_>>>()?;

        debug!(
            "Created {} framebuffers ({}x{})",
            framebuffers.len(),
            extent.width,
            extent.height
        );
        Ok(framebuffers)
    }

    /// Returns the Vulkan framebuffer handle.
    #[inline]
    pub fn handle(&self) -> vk::Framebuffer {
        self.framebuffer
    }

    /// Returns the framebuffer size.
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        // SAFETY: owners drop framebuffers only after the device is idle.
        unsafe {
            self.device
                .handle()
                .destroy_framebuffer(self.framebuffer, None);
        }
    }
}
