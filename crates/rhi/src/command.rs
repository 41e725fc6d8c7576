//! Command pools, frame command buffers and one-time submissions.
//!
//! A [`CommandBuffer`] is recorded through a [`Recording`], which only exists
//! between `vkBeginCommandBuffer` and `vkEndCommandBuffer`. Draw commands are
//! therefore impossible to issue on a buffer that is not recording.
//! [`CommandPool::submit_once`] records setup work such as staging copies
//! into a temporary buffer and blocks until the GPU has run it.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use framepace_rhi::device::Device;
//! use framepace_rhi::command::{CommandPool, CommandBuffer};
//!
//! # fn example(device: Arc<Device>) -> Result<(), framepace_rhi::RhiError> {
//! let pool = CommandPool::new(device.clone(), device.queue_families().graphics)?;
//! let cmd = CommandBuffer::new(device, &pool)?;
//!
//! cmd.reset()?;
//! let recording = cmd.begin()?;
//! // ... render pass and draw calls ...
//! recording.finish()?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::buffer::Buffer;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::pipeline::{Pipeline, PipelineLayout};
use crate::render_pass::RenderPass;
use crate::sync::{Fence, FenceState};

/// Pool that frame command buffers are allocated from.
///
/// Buffers can be reset individually, so each frame slot re-records its own
/// buffer without touching the others.
pub struct CommandPool {
    device: Arc<Device>,
    pool: vk::CommandPool,
    queue_family_index: u32,
}

impl CommandPool {
    /// Creates a resettable pool for `queue_family_index`.
    ///
    /// # Errors
    ///
    /// Returns an error if command pool creation fails.
    pub fn new(device: Arc<Device>, queue_family_index: u32) -> RhiResult<Self> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family_index)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

        // SAFETY: plain object creation on a live device.
        let pool = unsafe { device.handle().create_command_pool(&create_info, None)? };
        debug!("Command pool created on queue family {}", queue_family_index);

        Ok(Self {
            device,
            pool,
            queue_family_index,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::CommandPool {
        self.pool
    }

    /// Records `record` into a temporary command buffer, submits it to the
    /// graphics queue and waits for it to complete.
    ///
    /// Only for setup work; the frame loop never calls this.
    ///
    /// # Errors
    ///
    /// Returns the Vulkan error of whichever step failed.
    pub fn submit_once<F>(&self, record: F) -> RhiResult<()>
    where
        F: FnOnce(&Recording<'_>),
    {
        let buffer = CommandBuffer::new(self.device.clone(), self)?;
        let fence = Fence::new(self.device.clone(), FenceState::Unsignaled)?;

        let submitted = buffer.begin().and_then(|recording| {
            record(&recording);
            recording.finish()
        });
        let submitted = submitted.and_then(|()| {
            // SAFETY: the buffer is fully recorded, was never submitted and
            // the fence is fresh.
            unsafe { self.device.submit_once(buffer.handle(), fence.handle()) }
        });
        if let Err(e) = submitted {
            self.free(&buffer);
            return Err(e);
        }

        // If the wait fails the buffer may still be pending; it stays with the pool.
        fence.wait()?;
        self.free(&buffer);
        debug!("One-time submission completed");
        Ok(())
    }

    fn free(&self, buffer: &CommandBuffer) {
        // SAFETY: the buffer came from this pool and is not pending.
        unsafe {
            self.device
                .handle()
                .free_command_buffers(self.pool, &[buffer.handle()]);
        }
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        // SAFETY: buffers allocated from the pool are freed with it; the owner
        // waits for device idle first.
        unsafe {
            self.device.handle().destroy_command_pool(self.pool, None);
        }
        debug!("Command pool on queue family {} destroyed", self.queue_family_index);
    }
}

/// A primary command buffer owned by one frame slot.
///
/// The handle is released together with its [`CommandPool`], which must
/// outlive this value.
pub struct CommandBuffer {
    device: Arc<Device>,
    buffer: vk::CommandBuffer,
}

impl CommandBuffer {
    /// Allocates one primary command buffer from `pool`.
    ///
    /// # Errors
    ///
    /// Returns an error if allocation fails.
    pub fn new(device: Arc<Device>, pool: &CommandPool) -> RhiResult<Self> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool.handle())
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        // SAFETY: the pool is only used from the frame thread.
        let buffer = unsafe { device.handle().allocate_command_buffers(&alloc_info)? }
            .into_iter()
            .next()
            .ok_or_else(|| RhiError::InvalidHandle("no command buffer allocated".to_string()))?;

        Ok(Self { device, buffer })
    }

    #[inline]
    pub fn handle(&self) -> vk::CommandBuffer {
        self.buffer
    }

    /// Returns the buffer to the initial state.
    ///
    /// The previous submission of this buffer must have completed.
    ///
    /// # Errors
    ///
    /// Returns an error if the reset fails.
    pub fn reset(&self) -> RhiResult<()> {
        // SAFETY: the pool was created with RESET_COMMAND_BUFFER and the
        // caller waited on the buffer's last submission.
        unsafe {
            self.device
                .handle()
                .reset_command_buffer(self.buffer, vk::CommandBufferResetFlags::empty())?;
        }
        Ok(())
    }

    /// Starts recording for a single submission.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer cannot enter the recording state.
    pub fn begin(&self) -> RhiResult<Recording<'_>> {
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        // SAFETY: the buffer is in the initial state after reset.
        unsafe {
            self.device
                .handle()
                .begin_command_buffer(self.buffer, &begin_info)?;
        }

        Ok(Recording {
            device: self.device.handle(),
            buffer: self.buffer,
        })
    }
}

/// A command buffer in the recording state.
///
/// Dropping a recording without calling [`Recording::finish`] leaves the
/// buffer unusable until its next reset.
pub struct Recording<'a> {
    device: &'a ash::Device,
    buffer: vk::CommandBuffer,
}

impl Recording<'_> {
    /// Begins `render_pass` on `framebuffer`, clearing its single color attachment.
    pub fn begin_render_pass(
        &self,
        render_pass: &RenderPass,
        framebuffer: vk::Framebuffer,
        area: vk::Rect2D,
        clear_color: [f32; 4],
    ) {
        let clear_values = [vk::ClearValue {
            color: vk::ClearColorValue {
                float32: clear_color,
            },
        }];
        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(render_pass.handle())
            .framebuffer(framebuffer)
            .render_area(area)
            .clear_values(&clear_values);

        // SAFETY: framebuffer and render pass are compatible by construction.
        unsafe {
            self.device
                .cmd_begin_render_pass(self.buffer, &begin_info, vk::SubpassContents::INLINE);
        }
    }

    pub fn end_render_pass(&self) {
        // SAFETY: paired with begin_render_pass.
        unsafe { self.device.cmd_end_render_pass(self.buffer) };
    }

    pub fn bind_pipeline(&self, pipeline: &Pipeline) {
        // SAFETY: the pipeline outlives the submission.
        unsafe {
            self.device
                .cmd_bind_pipeline(self.buffer, pipeline.bind_point(), pipeline.handle());
        }
    }

    /// Sets viewport 0 and scissor 0, both dynamic in every pipeline built here.
    pub fn set_viewport_and_scissor(&self, viewport: vk::Viewport, scissor: vk::Rect2D) {
        // SAFETY: dynamic state is declared by the bound pipeline.
        unsafe {
            self.device.cmd_set_viewport(self.buffer, 0, &[viewport]);
            self.device.cmd_set_scissor(self.buffer, 0, &[scissor]);
        }
    }

    /// Binds `buffer` at vertex binding 0.
    pub fn bind_vertex_buffer(&self, buffer: vk::Buffer) {
        // SAFETY: the buffer outlives the submission.
        unsafe {
            self.device
                .cmd_bind_vertex_buffers(self.buffer, 0, &[buffer], &[0]);
        }
    }

    pub fn bind_index_buffer(&self, buffer: vk::Buffer, index_type: vk::IndexType) {
        // SAFETY: the buffer outlives the submission.
        unsafe {
            self.device
                .cmd_bind_index_buffer(self.buffer, buffer, 0, index_type);
        }
    }

    /// Binds `set` as descriptor set 0 for graphics.
    pub fn bind_descriptor_set(&self, layout: &PipelineLayout, set: vk::DescriptorSet) {
        // SAFETY: the set was allocated with a layout compatible with `layout`.
        unsafe {
            self.device.cmd_bind_descriptor_sets(
                self.buffer,
                vk::PipelineBindPoint::GRAPHICS,
                layout.handle(),
                0,
                &[set],
                &[],
            );
        }
    }

    /// Copies the overlapping byte range of `src` into `dst`.
    pub fn copy_buffer(&self, src: &Buffer, dst: &Buffer) {
        let region = vk::BufferCopy::default().size(src.size().min(dst.size()));
        // SAFETY: both buffers outlive the submission; `src` carries
        // TRANSFER_SRC and `dst` TRANSFER_DST.
        unsafe {
            self.device
                .cmd_copy_buffer(self.buffer, src.handle(), dst.handle(), &[region]);
        }
    }

    /// Draws `index_count` indices of a single instance.
    pub fn draw_indexed(&self, index_count: u32) {
        // SAFETY: vertex and index buffers are bound.
        unsafe {
            self.device
                .cmd_draw_indexed(self.buffer, index_count, 1, 0, 0, 0);
        }
    }

    /// Ends recording; the buffer is ready to submit.
    ///
    /// # Errors
    ///
    /// Returns an error if any recorded command was invalid or memory ran out.
    pub fn finish(self) -> RhiResult<()> {
        // SAFETY: the buffer is in the recording state.
        unsafe { self.device.end_command_buffer(self.buffer)? };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_objects_move_between_threads() {
        fn assert_send<T: Send>() {}
        assert_send::<CommandPool>();
        assert_send::<CommandBuffer>();
    }
}
