//! Presentation surface resources.
//!
//! [`SurfaceResources`] owns the swapchain, its image views and one
//! framebuffer per view. Everything here depends on the surface extent and
//! is replaced as a unit by [`SurfaceResources::rebuild`]. The render pass
//! the framebuffers are bound to is extent-independent and owned elsewhere.
//!
//! None of the methods that destroy resources wait for the GPU. Callers must
//! wait for device idle first.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use framepace_rhi::device::Device;
use framepace_rhi::framebuffer::Framebuffer;
use framepace_rhi::render_pass::RenderPass;
use framepace_rhi::swapchain::{
    AcquireOutcome, PresentOutcome, SurfaceContext, SurfaceSupport, Swapchain,
    choose_surface_format,
};
use framepace_rhi::RhiError;

use crate::error::{RendererError, RendererResult};

/// Returns the color format a swapchain on this surface will use.
///
/// The render pass is created with this format before the first swapchain.
///
/// # Errors
///
/// Returns an error if the surface cannot be queried or reports no formats.
pub fn surface_color_format(device: &Device, surface: &SurfaceContext) -> RendererResult<vk::Format> {
    let support = SurfaceSupport::query(device.physical_device(), surface)?;
    let format = choose_surface_format(&support.formats)
        .ok_or_else(|| RhiError::SwapchainError("surface reports no formats".to_string()))?;
    Ok(format.format)
}

/// Checks that every presentable image has exactly one view and one framebuffer.
fn check_parity(images: usize, views: usize, framebuffers: usize) -> RendererResult<()> {
    if images == views && views == framebuffers {
        return Ok(());
    }
    Err(RhiError::SwapchainError(format!(
        "{} images but {} views and {} framebuffers",
        images, views, framebuffers
    ))
    .into())
}

/// Swapchain, image views and framebuffers for one surface.
pub struct SurfaceResources {
    device: Arc<Device>,
    surface: SurfaceContext,
    framebuffers: Vec<Framebuffer>,
    swapchain: Option<Swapchain>,
}

impl SurfaceResources {
    /// Builds the swapchain, its views and framebuffers.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `surface` - Surface to present to; must outlive these resources
    /// * `render_pass` - Render pass the framebuffers are compatible with
    /// * `desired_extent` - Drawable size, used when the surface lets the swapchain pick
    ///
    /// # Errors
    ///
    /// Returns [`RendererError::ResourceCreation`] if any object cannot be created.
    pub fn build(
        device: Arc<Device>,
        surface: SurfaceContext,
        render_pass: &RenderPass,
        desired_extent: vk::Extent2D,
    ) -> RendererResult<Self> {
        let mut resources = Self {
            device,
            surface,
            framebuffers: Vec::new(),
            swapchain: None,
        };
        resources.create(render_pass, desired_extent, None)?;
        Ok(resources)
    }

    /// Replaces every extent-dependent resource.
    ///
    /// Framebuffers and views of the current swapchain are destroyed, a new
    /// swapchain is created chained from the old one, then the old swapchain
    /// is destroyed and new views and framebuffers are created.
    ///
    /// # Errors
    ///
    /// Returns [`RendererError::ResourceCreation`] if any object cannot be
    /// created, and [`RhiError::SwapchainError`] if the surface format changed.
    /// After an error no swapchain is held.
    pub fn rebuild(
        &mut self,
        render_pass: &RenderPass,
        desired_extent: vk::Extent2D,
    ) -> RendererResult<()> {
        self.framebuffers.clear();

        let mut old = self.swapchain.take();
        if let Some(old) = old.as_mut() {
            old.destroy_image_views();
        }

        self.create(render_pass, desired_extent, old.as_ref())?;

        if let Some(old) = old {
            debug!(
                "Retiring swapchain {}x{}",
                old.extent().width,
                old.extent().height
            );
        }
        Ok(())
    }

    fn create(
        &mut self,
        render_pass: &RenderPass,
        desired_extent: vk::Extent2D,
        old: Option<&Swapchain>,
    ) -> RendererResult<()> {
        let swapchain = Swapchain::new(&self.surface, self.device.clone(), desired_extent, old)
            .map_err(RendererError::creating("swapchain"))?;

        if swapchain.format() != render_pass.color_format() {
            return Err(RhiError::SwapchainError(format!(
                "surface format changed from {:?} to {:?}",
                render_pass.color_format(),
                swapchain.format()
            ))
            .into());
        }

        let framebuffers = Framebuffer::for_views(
            &self.device,
            render_pass,
            swapchain.image_views(),
            swapchain.extent(),
        )
        .map_err(RendererError::creating("framebuffers"))?;
        check_parity(
            swapchain.image_count(),
            swapchain.view_count(),
            framebuffers.len(),
        )?;

        info!(
            "Surface resources ready: {}x{}, {} images",
            swapchain.extent().width,
            swapchain.extent().height,
            swapchain.image_count()
        );

        self.framebuffers = framebuffers;
        self.swapchain = Some(swapchain);
        Ok(())
    }

    /// Destroys framebuffers, views and the swapchain, in that order.
    ///
    /// Safe to call more than once.
    pub fn teardown(&mut self) {
        self.framebuffers.clear();
        if let Some(mut swapchain) = self.swapchain.take() {
            swapchain.destroy_image_views();
        }
    }

    fn swapchain(&self) -> RendererResult<&Swapchain> {
        self.swapchain
            .as_ref()
            .ok_or_else(|| RhiError::InvalidHandle("no swapchain is held".to_string()).into())
    }

    /// Acquires the next image, signaling `semaphore` when it is ready.
    ///
    /// # Errors
    ///
    /// Returns [`RendererError::AcquireFailed`] for statuses other than
    /// success, suboptimal or out-of-date.
    pub fn acquire(&self, semaphore: vk::Semaphore) -> RendererResult<AcquireOutcome> {
        self.swapchain()?
            .acquire_next_image(semaphore)
            .map_err(|e| match e {
                RhiError::VulkanError(result) => RendererError::AcquireFailed(result),
                other => other.into(),
            })
    }

    /// Queues `image_index` for presentation after `wait` is signaled.
    ///
    /// # Errors
    ///
    /// Returns [`RendererError::PresentFailed`] for statuses other than
    /// success, suboptimal or out-of-date.
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> RendererResult<PresentOutcome> {
        self.swapchain()?
            .present(queue, image_index, wait)
            .map_err(|e| match e {
                RhiError::VulkanError(result) => RendererError::PresentFailed(result),
                other => other.into(),
            })
    }

    /// Number of presentable images, zero after teardown.
    pub fn image_count(&self) -> usize {
        self.swapchain.as_ref().map_or(0, Swapchain::image_count)
    }


    /// Framebuffer targeting the image at `index`.
    pub fn framebuffer(&self, index: usize) -> Option<&Framebuffer> {
        self.framebuffers.get(index)
    }

    /// Current swapchain extent, zero after teardown.
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain
            .as_ref()
            .map_or(vk::Extent2D::default(), Swapchain::extent)
    }

    /// Swapchain color format, `UNDEFINED` after teardown.
    pub fn format(&self) -> vk::Format {
        self.swapchain
            .as_ref()
            .map_or(vk::Format::UNDEFINED, Swapchain::format)
    }
}

impl Drop for SurfaceResources {
    fn drop(&mut self) {
        self.teardown();
    }
}
