//! The frame loop entry point.
//!
//! [`Renderer`] wires a [`GpuContext`] to a [`FrameOrchestrator`] running on
//! a [`VulkanBackend`].
//!
//! # Example
//!
//! ```no_run
//! use framepace_core::RendererConfig;
//! use framepace_platform::{ResizeSignal, WinitHost};
//! use framepace_renderer::Renderer;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RendererConfig::default();
//! let resize = ResizeSignal::new();
//! let mut host = WinitHost::new(config.window.clone(), resize.clone())?;
//! let mut renderer = Renderer::new(host.wait_for_window()?, &config, resize)?;
//!
//! while host.pump()? {
//!     renderer.run_frame(&mut host)?;
//! }
//! renderer.shutdown()?;
//! # Ok(())
//! # }
//! ```

use ash::vk;
use tracing::info;

use framepace_core::RendererConfig;
use framepace_platform::{ResizeSignal, SurfaceHost, Window};

use crate::FRAMES_IN_FLIGHT;
use crate::backend::VulkanBackend;
use crate::context::GpuContext;
use crate::error::RendererResult;
use crate::orchestrator::{FrameOrchestrator, FrameReport};

/// Owns every Vulkan object and runs frames.
///
/// # Resource Destruction Order
///
/// The orchestrator and its backend go first (after a device-idle wait),
/// then the context: device, surface, instance.
pub struct Renderer {
    orchestrator: FrameOrchestrator<VulkanBackend>,
    context: GpuContext,
}

impl Renderer {
    /// Brings up Vulkan for `window` and builds all frame resources.
    ///
    /// # Arguments
    ///
    /// * `window` - Window to present to
    /// * `config` - Window and Vulkan settings
    /// * `resize` - Signal the host raises on resize
    ///
    /// # Errors
    ///
    /// Returns an error if any Vulkan object cannot be created.
    pub fn new(
        window: &Window,
        config: &RendererConfig,
        resize: ResizeSignal,
    ) -> RendererResult<Self> {
        let context = GpuContext::new(window, &config.window.title, config.vulkan.validation)?;

        let extent = match window.drawable_size() {
            (0, _) | (_, 0) => vk::Extent2D {
                width: config.window.width,
                height: config.window.height,
            },
            (width, height) => vk::Extent2D { width, height },
        };

        let backend = VulkanBackend::new(
            context.device().clone(),
            context.surface_context(),
            extent,
            FRAMES_IN_FLIGHT,
        )?;

        info!(
            "Renderer initialized at {}x{}",
            backend.extent().width,
            backend.extent().height
        );

        Ok(Self {
            orchestrator: FrameOrchestrator::new(backend, FRAMES_IN_FLIGHT, resize),
            context,
        })
    }

    /// Runs one frame. See [`FrameOrchestrator::run_frame`].
    ///
    /// # Errors
    ///
    /// Any error is fatal for the frame loop.
    pub fn run_frame(&mut self, host: &mut impl SurfaceHost) -> RendererResult<FrameReport> {
        self.orchestrator.run_frame(host)
    }

    /// Waits for all submitted work to finish.
    ///
    /// # Errors
    ///
    /// Returns an error if the device wait fails.
    pub fn shutdown(&mut self) -> RendererResult<()> {
        self.orchestrator.shutdown()?;
        info!(
            "Renderer shut down after {} surface rebuild(s)",
            self.orchestrator.rebuild_count()
        );
        Ok(())
    }

    /// Current swapchain extent.
    pub fn extent(&self) -> vk::Extent2D {
        self.orchestrator.backend().extent()
    }

    /// Slot the next frame will use.
    pub fn current_frame(&self) -> usize {
        self.orchestrator.current_frame()
    }

    /// The device, instance and surface.
    pub fn context(&self) -> &GpuContext {
        &self.context
    }
}
