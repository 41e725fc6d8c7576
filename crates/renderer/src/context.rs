//! Instance, surface and device bring-up.

use std::mem::ManuallyDrop;
use std::sync::Arc;

use tracing::info;

use framepace_platform::{Surface, Window};
use framepace_rhi::device::Device;
use framepace_rhi::instance::Instance;
use framepace_rhi::physical_device::select_physical_device;
use framepace_rhi::swapchain::SurfaceContext;

use crate::error::RendererResult;

/// Vulkan objects created once at startup and kept for the process lifetime.
///
/// Dropped in the order device, surface, instance. Every other object holding
/// an `Arc<Device>` must be gone first.
pub struct GpuContext {
    device: ManuallyDrop<Arc<Device>>,
    surface: ManuallyDrop<Surface>,
    instance: ManuallyDrop<Instance>,
}

impl GpuContext {
    /// Creates the instance, a surface for `window`, and a logical device
    /// that can render and present to it.
    ///
    /// # Arguments
    ///
    /// * `window` - Window to present to
    /// * `app_name` - Application name reported to the driver
    /// * `enable_validation` - Enable the Khronos validation layer if installed
    ///
    /// # Errors
    ///
    /// Returns an error if the loader, surface, GPU selection or device
    /// creation fails.
    pub fn new(window: &Window, app_name: &str, enable_validation: bool) -> RendererResult<Self> {
        let extensions = window.instance_extensions()?;
        let instance = Instance::new(app_name, enable_validation, &extensions)?;

        let surface = Surface::create(window, instance.entry(), instance.handle())?;
        let surface_context = SurfaceContext {
            loader: surface.loader().clone(),
            surface: surface.handle(),
        };

        let physical_device = select_physical_device(instance.handle(), &surface_context)?;
        info!(
            "Using {} ({})",
            physical_device.device_name(),
            physical_device.device_type_name()
        );

        let device = Device::new(&instance, &physical_device)?;

        Ok(Self {
            device: ManuallyDrop::new(device),
            surface: ManuallyDrop::new(surface),
            instance: ManuallyDrop::new(instance),
        })
    }

    /// The logical device.
    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// The window surface together with its loader.
    pub fn surface_context(&self) -> SurfaceContext {
        SurfaceContext {
            loader: self.surface.loader().clone(),
            surface: self.surface.handle(),
        }
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        // SAFETY: each field is dropped exactly once, here.
        unsafe {
            ManuallyDrop::drop(&mut self.device);
            ManuallyDrop::drop(&mut self.surface);
            ManuallyDrop::drop(&mut self.instance);
        }
        info!("GPU context destroyed");
    }
}
