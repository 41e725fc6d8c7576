//! Semaphores and fences for frame pacing.
//!
//! Binary semaphores order the queue operations of one frame: acquire
//! signals image-available, the submit waits on it and signals
//! render-finished, present waits on that. They are never waited on from the
//! host. A frame slot's [`Fence`] is the only point where the CPU blocks on
//! GPU progress.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use framepace_rhi::device::Device;
//! use framepace_rhi::sync::{Fence, FenceState, Semaphore};
//!
//! # fn example(device: Arc<Device>) -> Result<(), framepace_rhi::RhiError> {
//! let image_available = Semaphore::new(device.clone())?;
//! let in_flight = Fence::new(device, FenceState::Signaled)?;
//!
//! // Returns at once: nothing has been submitted yet
//! in_flight.wait()?;
//! in_flight.reset()?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;

use crate::device::Device;
use crate::error::RhiResult;

/// A binary semaphore, created unsignaled.
///
/// No pending queue operation may reference it when it drops.
pub struct Semaphore {
    device: Arc<Device>,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// # Errors
    ///
    /// Returns an error if semaphore creation fails.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        // SAFETY: plain object creation on a live device.
        let semaphore = unsafe {
            device
                .handle()
                .create_semaphore(&vk::SemaphoreCreateInfo::default(), None)?
        };
        Ok(Self { device, semaphore })
    }

    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        // SAFETY: owners drop semaphores only after the device is idle.
        unsafe { self.device.handle().destroy_semaphore(self.semaphore, None) };
    }
}

/// Initial state of a [`Fence`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FenceState {
    Unsignaled,
    /// The first wait returns immediately, as if a submission had completed.
    Signaled,
}

impl FenceState {
    fn create_flags(self) -> vk::FenceCreateFlags {
        match self {
            FenceState::Unsignaled => vk::FenceCreateFlags::empty(),
            FenceState::Signaled => vk::FenceCreateFlags::SIGNALED,
        }
    }
}

/// Host-visible completion signal for one submission.
pub struct Fence {
    device: Arc<Device>,
    fence: vk::Fence,
}

impl Fence {
    /// # Errors
    ///
    /// Returns an error if fence creation fails.
    pub fn new(device: Arc<Device>, initial: FenceState) -> RhiResult<Self> {
        let create_info = vk::FenceCreateInfo::default().flags(initial.create_flags());

        // SAFETY: plain object creation on a live device.
        let fence = unsafe { device.handle().create_fence(&create_info, None)? };
        Ok(Self { device, fence })
    }

    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }

    /// Blocks until the fence is signaled. There is no timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the device is lost while waiting.
    pub fn wait(&self) -> RhiResult<()> {
        // SAFETY: the fence belongs to this device.
        unsafe {
            self.device
                .handle()
                .wait_for_fences(&[self.fence], true, u64::MAX)?
        };
        Ok(())
    }

    /// Returns the fence to the unsignaled state.
    ///
    /// The fence must not be pending on any queue.
    ///
    /// # Errors
    ///
    /// Returns an error if the reset fails.
    pub fn reset(&self) -> RhiResult<()> {
        // SAFETY: the caller waited on the fence, so no submission holds it.
        unsafe { self.device.handle().reset_fences(&[self.fence])? };
        Ok(())
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        // SAFETY: owners drop fences only after the device is idle.
        unsafe { self.device.handle().destroy_fence(self.fence, None) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fence_state_flags() {
        assert_eq!(
            FenceState::Signaled.create_flags(),
            vk::FenceCreateFlags::SIGNALED
        );
        assert!(FenceState::Unsignaled.create_flags().is_empty());
    }

    #[test]
    fn test_sync_objects_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Semaphore>();
        assert_send_sync::<Fence>();
    }
}
