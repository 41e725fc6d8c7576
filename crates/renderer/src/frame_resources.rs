//! Per-frame synchronization objects and command buffers.
//!
//! A [`FrameResourceSet`] is a fixed ring of [`FrameSlot`]s. Each slot is
//! reused only after its fence reports that the previous submission from the
//! slot has completed.

use std::sync::Arc;

use tracing::debug;

use framepace_rhi::RhiError;
use framepace_rhi::command::{CommandBuffer, CommandPool};
use framepace_rhi::device::Device;
use framepace_rhi::sync::{Fence, FenceState, Semaphore};

use crate::error::{RendererError, RendererResult};

/// Resources owned by one frame in flight.
pub struct FrameSlot {
    image_available: Semaphore,
    render_finished: Semaphore,
    in_flight: Fence,
    command_buffer: CommandBuffer,
}

impl FrameSlot {
    fn new(device: &Arc<Device>, pool: &CommandPool) -> RendererResult<Self> {
        Ok(Self {
            image_available: Semaphore::new(device.clone())
                .map_err(RendererError::creating("image-available semaphore"))?,
            render_finished: Semaphore::new(device.clone())
                .map_err(RendererError::creating("render-finished semaphore"))?,
            in_flight: Fence::new(device.clone(), FenceState::Signaled)
                .map_err(RendererError::creating("in-flight fence"))?,
            command_buffer: CommandBuffer::new(device.clone(), pool)
                .map_err(RendererError::creating("command buffer"))?,
        })
    }

    /// Signaled by acquisition, waited on by the submission.
    #[inline]
    pub fn image_available(&self) -> &Semaphore {
        &self.image_available
    }

    /// Signaled by the submission, waited on by presentation.
    #[inline]
    pub fn render_finished(&self) -> &Semaphore {
        &self.render_finished
    }

    /// Signaled when the slot's last submission completes.
    #[inline]
    pub fn in_flight(&self) -> &Fence {
        &self.in_flight
    }

    /// Primary command buffer recorded once per cycle.
    #[inline]
    pub fn command_buffer(&self) -> &CommandBuffer {
        &self.command_buffer
    }
}

/// Fixed-size ring of frame slots.
pub struct FrameResourceSet {
    slots: Vec<FrameSlot>,
}

impl FrameResourceSet {
    /// Creates `count` slots with command buffers allocated from `pool`.
    ///
    /// # Errors
    ///
    /// Returns [`RendererError::ResourceCreation`] if `count` is zero or any
    /// object cannot be created. Objects created before the failure are destroyed.
    pub fn new(device: &Arc<Device>, pool: &CommandPool, count: usize) -> RendererResult<Self> {
        if count == 0 {
            return Err(RendererError::ResourceCreation {
                resource: "frame resource set",
                source: RhiError::InvalidHandle("at least one frame slot is required".to_string()),
            });
        }

        let slots = (0..count)
            .map(|_| FrameSlot::new(device, pool))
            .collect::<RendererResult<Vec<_>>>()?;

        debug!("Created {} frame slots", slots.len());

        Ok(Self { slots })
    }

    /// Returns the slot at `index`.
    #[inline]
    pub fn slot(&self, index: usize) -> Option<&FrameSlot> {
        self.slots.get(index)
    }

    /// Number of slots.
    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the set has been torn down.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Destroys every semaphore and fence. The device must be idle.
    pub fn teardown(&mut self) {
        if !self.slots.is_empty() {
            debug!("Destroying {} frame slots", self.slots.len());
            self.slots.clear();
        }
    }
}
