//! Vulkan implementation of [`FrameBackend`].

use std::sync::Arc;

use ash::vk;
use tracing::{debug, error, info};

use framepace_core::Timer;
use framepace_rhi::RhiError;
use framepace_rhi::command::CommandPool;
use framepace_rhi::device::{Device, FrameSubmission};
use framepace_rhi::swapchain::{AcquireOutcome, PresentOutcome, SurfaceContext};

use crate::error::{RendererError, RendererResult};
use crate::frame_resources::{FrameResourceSet, FrameSlot};
use crate::mesh::QuadMesh;
use crate::orchestrator::FrameBackend;
use crate::recorder::{CommandRecorder, RecordTarget};
use crate::surface_resources::{SurfaceResources, surface_color_format};
use crate::ubo::TransformUbo;
use crate::uniforms::UniformSet;

/// Every GPU object the frame loop touches.
///
/// # Resource Destruction Order
///
/// Dropping waits for device idle, then releases:
/// 1. Surface resources (framebuffers, views, swapchain)
/// 2. Frame slots (semaphores, fences)
/// 3. Command pool
/// 4. Uniform buffers and descriptor pool
/// 5. Quad buffers
/// 6. Pipeline, layouts and render pass
pub struct VulkanBackend {
    surface: SurfaceResources,
    frames: FrameResourceSet,
    command_pool: CommandPool,
    uniforms: UniformSet,
    mesh: QuadMesh,
    recorder: CommandRecorder,
    clock: Timer,
    device: Arc<Device>,
}

impl VulkanBackend {
    /// Creates the render pass, pipeline, swapchain, frame slots and quad.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `surface` - Surface to present to; must outlive the backend
    /// * `desired_extent` - Initial drawable size
    /// * `frames_in_flight` - Number of frame slots
    ///
    /// # Errors
    ///
    /// Returns the first creation failure. Objects created before it are destroyed.
    pub fn new(
        device: Arc<Device>,
        surface: SurfaceContext,
        desired_extent: vk::Extent2D,
        frames_in_flight: usize,
    ) -> RendererResult<Self> {
        let color_format = surface_color_format(&device, &surface)?;
        let recorder = CommandRecorder::new(device.clone(), color_format)?;

        let surface = SurfaceResources::build(
            device.clone(),
            surface,
            recorder.render_pass(),
            desired_extent,
        )?;

        let command_pool = CommandPool::new(device.clone(), device.queue_families().graphics)
            .map_err(RendererError::creating("command pool"))?;
        let frames = FrameResourceSet::new(&device, &command_pool, frames_in_flight)?;

        let mesh = QuadMesh::new(device.clone(), &command_pool)?;
        let uniforms = UniformSet::new(
            device.clone(),
            recorder.descriptor_set_layout(),
            surface.image_count(),
        )?;

        info!(
            "Vulkan backend ready: {} frames in flight, {} swapchain images",
            frames.len(),
            surface.image_count()
        );

        Ok(Self {
            surface,
            frames,
            command_pool,
            uniforms,
            mesh,
            recorder,
            clock: Timer::new(),
            device,
        })
    }

    fn slot(&self, slot: usize) -> RendererResult<&FrameSlot> {
        self.frames
            .slot(slot)
            .ok_or_else(|| RhiError::InvalidHandle(format!("no frame slot {}", slot)).into())
    }

    /// Current swapchain extent.
    pub fn extent(&self) -> vk::Extent2D {
        self.surface.extent()
    }

    /// Number of presentable images.
    pub fn image_count(&self) -> usize {
        self.surface.image_count()
    }
}

impl FrameBackend for VulkanBackend {
    fn wait_for_slot(&mut self, slot: usize) -> RendererResult<()> {
        self.slot(slot)?.in_flight().wait()?;
        Ok(())
    }

    fn acquire(&mut self, slot: usize) -> RendererResult<AcquireOutcome> {
        let semaphore = self.slot(slot)?.image_available().handle();
        self.surface.acquire(semaphore)
    }

    fn reset_slot_fence(&mut self, slot: usize) -> RendererResult<()> {
        self.slot(slot)?.in_flight().reset()?;
        Ok(())
    }

    fn prepare_frame_data(&mut self, image_index: u32) -> RendererResult<()> {
        let ubo = TransformUbo::at(self.clock.elapsed_secs(), self.surface.extent());
        self.uniforms.write(image_index, &ubo)
    }

    fn record(&mut self, slot: usize, image_index: u32) -> RendererResult<()> {
        let frame = self.slot(slot)?;
        let framebuffer = self
            .surface
            .framebuffer(image_index as usize)
            .ok_or_else(|| RhiError::InvalidHandle(format!("no framebuffer for image {}", image_index)))?;
        let descriptor_set = self.uniforms.descriptor_set(image_index).ok_or_else(|| {
            RhiError::InvalidHandle(format!("no descriptor set for image {}", image_index))
        })?;

        let target = RecordTarget {
            framebuffer: framebuffer.handle(),
            extent: self.surface.extent(),
        };
        self.recorder.record(
            frame.command_buffer(),
            &target,
            &self.mesh.bindings(descriptor_set),
        )
    }

    fn submit(&mut self, slot: usize) -> RendererResult<()> {
        let frame = self.slot(slot)?;

        let submission = FrameSubmission {
            wait: frame.image_available().handle(),
            command_buffer: frame.command_buffer().handle(),
            signal: frame.render_finished().handle(),
            fence: frame.in_flight().handle(),
        };

        // SAFETY: the command buffer was just recorded, and the fence was reset
        // after the wait that proved its previous submission complete.
        unsafe { self.device.submit_frame(&submission) }.map_err(RendererError::SubmitFailed)
    }

    fn present(&mut self, slot: usize, image_index: u32) -> RendererResult<PresentOutcome> {
        let wait = self.slot(slot)?.render_finished().handle();
        self.surface
            .present(self.device.present_queue(), image_index, wait)
    }

    fn wait_idle(&mut self) -> RendererResult<()> {
        self.device.wait_idle()?;
        Ok(())
    }

    fn rebuild_surface(&mut self, extent: vk::Extent2D) -> RendererResult<()> {
        self.surface.rebuild(self.recorder.render_pass(), extent)?;
        self.uniforms
            .ensure_capacity(self.recorder.descriptor_set_layout(), self.surface.image_count())
    }
}

impl Drop for VulkanBackend {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            error!("Failed to wait for device idle during backend drop: {:?}", e);
        }

        debug!(
            "Releasing Vulkan backend ({} frame slots, {} images)",
            self.frames.len(),
            self.surface.image_count()
        );

        self.surface.teardown();
        self.frames.teardown();
    }
}
