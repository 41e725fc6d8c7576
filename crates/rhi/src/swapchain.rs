//! Swapchain negotiation, creation, acquisition and presentation.
//!
//! Building a swapchain happens in two steps. [`SurfaceSupport::negotiate`]
//! turns what the surface reports into a [`SwapchainPlan`] without touching
//! the device, which keeps every selection rule testable. [`Swapchain::new`]
//! then creates the swapchain and one image view per image from that plan,
//! chaining from the swapchain being replaced when there is one.
//!
//! Acquisition and presentation report a stale surface as a value
//! ([`AcquireOutcome::Stale`], [`PresentOutcome::Stale`]) instead of an
//! error: both are routine whenever the window changes.
//!
//! # Example
//!
//! ```no_run
//! use framepace_rhi::swapchain::{AcquireOutcome, PresentOutcome, Swapchain};
//! # fn demo(
//! #     surface: &framepace_rhi::swapchain::SurfaceContext,
//! #     device: std::sync::Arc<framepace_rhi::device::Device>,
//! #     image_available: ash::vk::Semaphore,
//! #     render_finished: ash::vk::Semaphore,
//! # ) -> framepace_rhi::RhiResult<()> {
//! let extent = ash::vk::Extent2D { width: 800, height: 600 };
//! let swapchain = Swapchain::new(surface, device.clone(), extent, None)?;
//!
//! if let AcquireOutcome::Ready { image_index, .. } = swapchain.acquire_next_image(image_available)? {
//!     // ... record and submit work targeting image_index ...
//!     if swapchain
//!         .present(device.present_queue(), image_index, render_finished)?
//!         .needs_rebuild()
//!     {
//!         // rebuild
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info, warn};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::physical_device::QueueFamilies;

/// Color format and space used when the surface offers them.
pub const PREFERRED_SURFACE_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_SRGB,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

/// A presentation surface together with the loader used to query it.
///
/// The surface handle is owned elsewhere and must outlive every swapchain
/// created from this context.
#[derive(Clone)]
pub struct SurfaceContext {
    pub loader: ash::khr::surface::Instance,
    pub surface: vk::SurfaceKHR,
}

/// What a surface reports for one physical device.
#[derive(Debug, Clone)]
pub struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceSupport {
    /// Queries capabilities, formats and present modes of `surface` on `physical_device`.
    ///
    /// # Errors
    ///
    /// Returns the Vulkan error if any query fails.
    pub fn query(physical_device: vk::PhysicalDevice, surface: &SurfaceContext) -> RhiResult<Self> {
        let loader = &surface.loader;
        // SAFETY: the surface and physical device come from the same instance.
        let support = unsafe {
            Self {
                capabilities: loader
                    .get_physical_device_surface_capabilities(physical_device, surface.surface)?,
                formats: loader
                    .get_physical_device_surface_formats(physical_device, surface.surface)?,
                present_modes: loader
                    .get_physical_device_surface_present_modes(physical_device, surface.surface)?,
            }
        };

        debug!(
            "Surface reports {} format(s), {} present mode(s), min {} image(s)",
            support.formats.len(),
            support.present_modes.len(),
            support.capabilities.min_image_count
        );
        Ok(support)
    }

    /// Whether a swapchain can be built at all: at least one format and one present mode.
    #[inline]
    pub fn can_present(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }

    /// Picks every swapchain parameter for a drawable of `desired` pixels.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::SwapchainError`] if the surface offers no format
    /// or no present mode.
    pub fn negotiate(
        &self,
        desired: vk::Extent2D,
        families: QueueFamilies,
    ) -> RhiResult<SwapchainPlan> {
        if !self.can_present() {
            return Err(RhiError::SwapchainError(format!(
                "surface offers {} format(s) and {} present mode(s)",
                self.formats.len(),
                self.present_modes.len()
            )));
        }
        let surface_format = choose_surface_format(&self.formats)
            .ok_or_else(|| RhiError::SwapchainError("surface reports no formats".to_string()))?;
        let (sharing_mode, queue_family_indices) = choose_sharing_mode(families);

        Ok(SwapchainPlan {
            surface_format,
            present_mode: choose_present_mode(&self.present_modes),
            extent: choose_extent(&self.capabilities, desired),
            image_count: choose_image_count(&self.capabilities),
            sharing_mode,
            queue_family_indices,
            pre_transform: self.capabilities.current_transform,
        })
    }
}

/// Parameters a swapchain is created with.
#[derive(Debug, Clone)]
pub struct SwapchainPlan {
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    /// Minimum image count requested; the driver may create more.
    pub image_count: u32,
    pub sharing_mode: vk::SharingMode,
    /// Families sharing the images; empty for exclusive sharing.
    pub queue_family_indices: Vec<u32>,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
}

/// Result of asking the swapchain for the next image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// An image was acquired. `suboptimal` means it is usable but the
    /// swapchain no longer matches the surface exactly.
    Ready { image_index: u32, suboptimal: bool },
    /// The swapchain is out of date and cannot be used.
    Stale,
}

impl AcquireOutcome {
    /// Classifies the raw result of `vkAcquireNextImageKHR`.
    ///
    /// # Errors
    ///
    /// Any status other than success, suboptimal or out-of-date.
    pub fn from_raw(raw: Result<(u32, bool), vk::Result>) -> RhiResult<Self> {
        match raw {
            Ok((image_index, suboptimal)) => Ok(Self::Ready {
                image_index,
                suboptimal,
            }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(Self::Stale),
            Err(e) => Err(RhiError::VulkanError(e)),
        }
    }
}

/// Result of queueing an image for presentation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentOutcome {
    /// Presented and the swapchain still matches the surface.
    Presented,
    /// Presented, but the swapchain should be rebuilt.
    Suboptimal,
    /// The swapchain is out of date; the image was not presented.
    Stale,
}

impl PresentOutcome {
    /// Classifies the raw result of `vkQueuePresentKHR`.
    ///
    /// # Errors
    ///
    /// Any status other than success, suboptimal or out-of-date.
    pub fn from_raw(raw: Result<bool, vk::Result>) -> RhiResult<Self> {
        match raw {
            Ok(false) => Ok(Self::Presented),
            Ok(true) => Ok(Self::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(Self::Stale),
            Err(e) => Err(RhiError::VulkanError(e)),
        }
    }

    /// Returns whether the swapchain must be rebuilt.
    #[inline]
    pub fn needs_rebuild(self) -> bool {
        !matches!(self, Self::Presented)
    }
}

/// A swapchain and one image view per image, in image order.
///
/// Only the frame thread touches it.
pub struct Swapchain {
    device: Arc<Device>,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    format: vk::Format,
    extent: vk::Extent2D,
}

impl Swapchain {
    /// Negotiates parameters for `surface` and creates the swapchain with its views.
    ///
    /// # Arguments
    ///
    /// * `surface` - The window surface
    /// * `device` - The logical device
    /// * `desired_extent` - Drawable size in pixels, used when the surface lets the swapchain pick
    /// * `old` - Swapchain being replaced, if any. It is retired by this call
    ///   but stays alive; the caller destroys it once the new one exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the surface queries fail, the surface offers no
    /// format or present mode, or swapchain or view creation fails. Nothing
    /// created by this call survives a failure.
    pub fn new(
        surface: &SurfaceContext,
        device: Arc<Device>,
        desired_extent: vk::Extent2D,
        old: Option<&Swapchain>,
    ) -> RhiResult<Self> {
        let plan = SurfaceSupport::query(device.physical_device(), surface)?
            .negotiate(desired_extent, device.queue_families())?;

        info!(
            "Creating swapchain: {}x{}, {:?}/{:?}, {:?}, at least {} images",
            plan.extent.width,
            plan.extent.height,
            plan.surface_format.format,
            plan.surface_format.color_space,
            plan.present_mode,
            plan.image_count
        );

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface.surface)
            .min_image_count(plan.image_count)
            .image_format(plan.surface_format.format)
            .image_color_space(plan.surface_format.color_space)
            .image_extent(plan.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(plan.sharing_mode)
            .queue_family_indices(&plan.queue_family_indices)
            .pre_transform(plan.pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(plan.present_mode)
            .clipped(true)
            .old_swapchain(old.map_or(vk::SwapchainKHR::null(), |old| old.swapchain));

        let loader = device.swapchain_loader();
        // SAFETY: the surface outlives the swapchain.
        let swapchain = unsafe { loader.create_swapchain(&create_info, None)? };

        // SAFETY: `swapchain` was just created from this loader.
        let views = unsafe { loader.get_swapchain_images(swapchain) }
            .map_err(RhiError::from)
            .and_then(|images| {
                let views = create_image_views(&device, &images, plan.surface_format.format)?;
                Ok((images, views))
            });
        let (images, image_views) = match views {
            Ok(created) => created,
            Err(e) => {
                // SAFETY: no view of this swapchain survived.
                unsafe { loader.destroy_swapchain(swapchain, None) };
                return Err(e);
            }
        };

        debug!("Swapchain holds {} images", images.len());
        Ok(Self {
            device,
            swapchain,
            images,
            image_views,
            format: plan.surface_format.format,
            extent: plan.extent,
        })
    }

    /// Acquires the next image, signaling `semaphore` once it is usable. No timeout.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::VulkanError`] for any status other than success,
    /// suboptimal or out-of-date.
    pub fn acquire_next_image(&self, semaphore: vk::Semaphore) -> RhiResult<AcquireOutcome> {
        // SAFETY: the semaphore is unsignaled with no pending signal operation.
        let raw = unsafe {
            self.device.swapchain_loader().acquire_next_image(
                self.swapchain,
                u64::MAX,
                semaphore,
                vk::Fence::null(),
            )
        };
        AcquireOutcome::from_raw(raw)
    }

    /// Queues `image_index` for presentation once `wait_semaphore` is signaled.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::VulkanError`] for any status other than success,
    /// suboptimal or out-of-date.
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> RhiResult<PresentOutcome> {
        let wait_semaphores = [wait_semaphore];
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        // SAFETY: `image_index` was acquired from this swapchain and not yet presented.
        let raw = unsafe {
            self.device
                .swapchain_loader()
                .queue_present(queue, &present_info)
        };
        PresentOutcome::from_raw(raw)
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Number of live image views; zero after [`Swapchain::destroy_image_views`].
    #[inline]
    pub fn view_count(&self) -> usize {
        self.image_views.len()
    }

    #[inline]
    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    /// Destroys all image views ahead of the swapchain itself.
    ///
    /// No pending GPU work may use them.
    pub fn destroy_image_views(&mut self) {
        for view in self.image_views.drain(..) {
            // SAFETY: the caller guarantees no pending GPU work uses the view.
            unsafe { self.device.handle().destroy_image_view(view, None) };
        }
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        self.destroy_image_views();
        // SAFETY: images are owned by the swapchain and go away with it.
        unsafe {
            self.device
                .swapchain_loader()
                .destroy_swapchain(self.swapchain, None);
        }
        info!(
            "Swapchain destroyed ({}x{}, {} images)",
            self.extent.width,
            self.extent.height,
            self.images.len()
        );
    }
}

/// [`PREFERRED_SURFACE_FORMAT`] if offered, else the first reported format.
///
/// Returns `None` only if `formats` is empty.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    let preferred = formats.iter().copied().find(|f| {
        f.format == PREFERRED_SURFACE_FORMAT.format
            && f.color_space == PREFERRED_SURFACE_FORMAT.color_space
    });
    if preferred.is_some() {
        return preferred;
    }

    let fallback = formats.first().copied();
    if let Some(format) = fallback {
        warn!(
            "Preferred surface format unavailable, using {:?}/{:?}",
            format.format, format.color_space
        );
    }
    fallback
}

/// MAILBOX if offered, else FIFO, which every implementation supports.
pub fn choose_present_mode(present_modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if present_modes.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// The surface's current extent when it dictates one, otherwise `desired`
/// clamped to the supported range.
///
/// A current width of `u32::MAX` means the swapchain picks the size.
pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    desired: vk::Extent2D,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    let (min, max) = (capabilities.min_image_extent, capabilities.max_image_extent);
    vk::Extent2D {
        width: desired.width.clamp(min.width, max.width),
        height: desired.height.clamp(min.height, max.height),
    }
}

/// One more than the surface minimum, capped at its maximum (`0` means no maximum).
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let requested = capabilities.min_image_count + 1;
    match capabilities.max_image_count {
        0 => requested,
        max => requested.min(max),
    }
}

/// EXCLUSIVE when one family does both, else CONCURRENT over both families.
pub fn choose_sharing_mode(families: QueueFamilies) -> (vk::SharingMode, Vec<u32>) {
    if families.is_shared() {
        (vk::SharingMode::EXCLUSIVE, Vec::new())
    } else {
        (
            vk::SharingMode::CONCURRENT,
            vec![families.graphics, families.present],
        )
    }
}

/// One 2D color view per image. Either all views are created or none survive.
fn create_image_views(
    device: &Device,
    images: &[vk::Image],
    format: vk::Format,
) -> RhiResult<Vec<vk::ImageView>> {
    let color_range = vk::ImageSubresourceRange::default()
        .aspect_mask(vk::ImageAspectFlags::COLOR)
        .level_count(1)
        .layer_count(1);

    let mut views = Vec::with_capacity(images.len());
    for (index, &image) in images.iter().enumerate() {
        let create_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(color_range);

        // SAFETY: `image` belongs to a live swapchain on this device.
        match unsafe { device.handle().create_image_view(&create_info, None) } {
            Ok(view) => views.push(view),
            Err(e) => {
                for view in views {
                    // SAFETY: the views were created above and never used.
                    unsafe { device.handle().destroy_image_view(view, None) };
                }
                return Err(RhiError::SwapchainError(format!(
                    "image view {} of {}: {}",
                    index,
                    images.len(),
                    e
                )));
            }
        }
    }
    Ok(views)
}
