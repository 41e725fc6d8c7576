//! The application window and the Vulkan surface presenting into it.

use std::ffi::{CStr, c_char};
use std::sync::Arc;

use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawDisplayHandle, RawWindowHandle};
use winit::dpi::PhysicalSize;
use winit::event_loop::ActiveEventLoop;
use winit::window::{Window as WinitWindow, WindowAttributes};

use framepace_core::{Error, Result, WindowConfig};

fn window_attributes(config: &WindowConfig) -> WindowAttributes {
    WindowAttributes::default()
        .with_title(config.title.as_str())
        .with_inner_size(PhysicalSize::new(config.width, config.height))
        .with_resizable(true)
}

/// A resizable winit window.
pub struct Window {
    inner: Arc<WinitWindow>,
}

impl Window {
    /// # Errors
    ///
    /// Returns [`Error::Window`] if the event loop refuses to create the window.
    pub fn new(event_loop: &ActiveEventLoop, config: &WindowConfig) -> Result<Self> {
        let inner = event_loop
            .create_window(window_attributes(config))
            .map_err(|e| Error::Window(e.to_string()))?;
        tracing::info!(
            "Opened '{}' at {}x{}",
            config.title,
            config.width,
            config.height
        );
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// Drawable area in physical pixels. Zero in either dimension while minimized.
    pub fn drawable_size(&self) -> (u32, u32) {
        let PhysicalSize { width, height } = self.inner.inner_size();
        (width, height)
    }

    fn raw_handles(&self) -> Result<(RawDisplayHandle, RawWindowHandle)> {
        let display = self
            .inner
            .display_handle()
            .map_err(|e| Error::Window(format!("display handle unavailable: {}", e)))?;
        let window = self
            .inner
            .window_handle()
            .map_err(|e| Error::Window(format!("window handle unavailable: {}", e)))?;
        Ok((display.as_raw(), window.as_raw()))
    }

    /// Instance extensions needed to create a surface on this window's display.
    ///
    /// The pointers refer to static names and stay valid for the whole program.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Vulkan`] if the display server is not supported.
    pub fn instance_extensions(&self) -> Result<Vec<*const c_char>> {
        let (display, _) = self.raw_handles()?;
        let extensions = ash_window::enumerate_required_extensions(display)
            .map_err(|e| Error::Vulkan(format!("no surface extensions for this display: {}", e)))?;

        for &name in extensions {
            // SAFETY: ash-window returns pointers to static NUL-terminated names.
            tracing::debug!("Surface extension {:?}", unsafe { CStr::from_ptr(name) });
        }
        Ok(extensions.to_vec())
    }
}

/// A `VkSurfaceKHR`, destroyed on drop.
///
/// The instance must outlive the surface, and every swapchain created on it
/// must be destroyed first.
pub struct Surface {
    handle: vk::SurfaceKHR,
    loader: ash::khr::surface::Instance,
}

impl Surface {
    /// Creates a surface presenting into `window`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Window`] if the window handles are unavailable, or
    /// [`Error::Vulkan`] if surface creation fails.
    pub fn create(window: &Window, entry: &ash::Entry, instance: &ash::Instance) -> Result<Self> {
        let (display, window_handle) = window.raw_handles()?;

        // SAFETY: the handles come from a live window; the surface is
        // destroyed in `Drop`, before the instance.
        let handle = unsafe {
            ash_window::create_surface(entry, instance, display, window_handle, None)
        }
        .map_err(|e| Error::Vulkan(format!("surface creation failed: {}", e)))?;

        tracing::debug!("Vulkan surface created");
        Ok(Self {
            handle,
            loader: ash::khr::surface::Instance::new(entry, instance),
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.handle
    }

    /// Loader for surface queries.
    #[inline]
    pub fn loader(&self) -> &ash::khr::surface::Instance {
        &self.loader
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        // SAFETY: the surface was created from the loader's instance and is
        // destroyed only here.
        unsafe { self.loader.destroy_surface(self.handle, None) };
        tracing::debug!("Vulkan surface destroyed");
    }
}
