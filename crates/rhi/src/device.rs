//! The logical device, its queues and the GPU memory allocator.
//!
//! One queue is taken from each distinct family in [`QueueFamilies`]; when
//! graphics and presentation share a family both queue handles are the same.
//! The only device extension enabled is `VK_KHR_swapchain`.

use std::ffi::{CStr, c_char};
use std::mem::ManuallyDrop;
use std::sync::{Arc, Mutex, MutexGuard};

use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use tracing::{debug, error, info};

use crate::error::{RhiError, RhiResult};
use crate::instance::Instance;
use crate::physical_device::{PhysicalDeviceInfo, QueueFamilies};

const DEVICE_EXTENSIONS: [&CStr; 1] = [ash::khr::swapchain::NAME];

static QUEUE_PRIORITIES: [f32; 1] = [1.0];

/// One frame's work for the graphics queue.
///
/// The command buffer waits on `wait` before writing color output, signals
/// `signal` when done, and `fence` is signaled once the GPU has finished.
#[derive(Clone, Copy, Debug)]
pub struct FrameSubmission {
    pub wait: vk::Semaphore,
    pub command_buffer: vk::CommandBuffer,
    pub signal: vk::Semaphore,
    pub fence: vk::Fence,
}

/// Logical device shared through `Arc` by every object created from it.
pub struct Device {
    device: ash::Device,
    physical_device: vk::PhysicalDevice,
    swapchain_loader: ash::khr::swapchain::Device,
    /// Freed in `Drop` before the device is destroyed.
    allocator: ManuallyDrop<Mutex<Allocator>>,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    queue_families: QueueFamilies,
}

fn queue_create_infos(families: QueueFamilies) -> Vec<vk::DeviceQueueCreateInfo<'static>> {
    families
        .unique()
        .into_iter()
        .map(|family| {
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(family)
                .queue_priorities(&QUEUE_PRIORITIES)
        })
        .collect()
}

fn create_allocator(
    instance: &Instance,
    device: &ash::Device,
    physical_device: vk::PhysicalDevice,
) -> RhiResult<Allocator> {
    Ok(Allocator::new(&AllocatorCreateDesc {
        instance: instance.handle().clone(),
        device: device.clone(),
        physical_device,
        debug_settings: Default::default(),
        buffer_device_address: false,
        allocation_sizes: Default::default(),
    })?)
}

impl Device {
    /// Creates the logical device for `gpu`, fetches its queues and sets up
    /// the allocator.
    ///
    /// # Errors
    ///
    /// Returns the Vulkan error if device creation fails, or the allocator
    /// error if the allocator cannot be created.
    pub fn new(instance: &Instance, gpu: &PhysicalDeviceInfo) -> RhiResult<Arc<Self>> {
        let families = gpu.queue_families;
        let queue_infos = queue_create_infos(families);
        let extensions: Vec<*const c_char> =
            DEVICE_EXTENSIONS.iter().map(|name| name.as_ptr()).collect();
        let features = vk::PhysicalDeviceFeatures::default();

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extensions)
            .enabled_features(&features);

        // SAFETY: `gpu.device` was enumerated from `instance`.
        let device = unsafe {
            instance
                .handle()
                .create_device(gpu.device, &create_info, None)?
        };
        debug!("Logical device created with {} queue(s)", queue_infos.len());

        let allocator = match create_allocator(instance, &device, gpu.device) {
            Ok(allocator) => allocator,
            Err(e) => {
                // SAFETY: nothing else was created from the device.
                unsafe { device.destroy_device(None) };
                return Err(e);
            }
        };

        // SAFETY: queue 0 was requested from each of these families.
        let (graphics_queue, present_queue) = unsafe {
            (
                device.get_device_queue(families.graphics, 0),
                device.get_device_queue(families.present, 0),
            )
        };
        let swapchain_loader = ash::khr::swapchain::Device::new(instance.handle(), &device);

        info!(
            "Device ready: graphics family {}, present family {}",
            families.graphics, families.present
        );

        Ok(Arc::new(Self {
            device,
            physical_device: gpu.device,
            swapchain_loader,
            allocator: ManuallyDrop::new(Mutex::new(allocator)),
            graphics_queue,
            present_queue,
            queue_families: families,
        }))
    }

    #[inline]
    pub fn handle(&self) -> &ash::Device {
        &self.device
    }

    #[inline]
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    #[inline]
    pub fn swapchain_loader(&self) -> &ash::khr::swapchain::Device {
        &self.swapchain_loader
    }

    #[inline]
    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    #[inline]
    pub fn queue_families(&self) -> QueueFamilies {
        self.queue_families
    }

    /// Locks the allocator.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InvalidHandle`] if a previous holder panicked.
    pub fn allocator(&self) -> RhiResult<MutexGuard<'_, Allocator>> {
        self.allocator
            .lock()
            .map_err(|_| RhiError::InvalidHandle("allocator lock poisoned".to_string()))
    }

    /// Blocks until every queue of the device is idle.
    ///
    /// # Errors
    ///
    /// Returns the Vulkan error, typically device loss.
    pub fn wait_idle(&self) -> RhiResult<()> {
        // SAFETY: queues are only used from the frame thread, which is here.
        unsafe { self.device.device_wait_idle()? };
        Ok(())
    }

    /// Submits one frame's command buffer to the graphics queue.
    ///
    /// # Safety
    ///
    /// The command buffer must be fully recorded, `fence` must be unsignaled,
    /// and no earlier submission may still be using the command buffer.
    ///
    /// # Errors
    ///
    /// Returns the raw Vulkan status so callers can decide how fatal it is.
    pub unsafe fn submit_frame(&self, submission: &FrameSubmission) -> Result<(), vk::Result> {
        let wait = [submission.wait];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [submission.command_buffer];
        let signal = [submission.signal];
        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal);

        // SAFETY: upheld by the caller.
        unsafe {
            self.device
                .queue_submit(self.graphics_queue, &[submit_info], submission.fence)
        }
    }

    /// Submits a setup command buffer to the graphics queue without semaphores.
    ///
    /// # Safety
    ///
    /// The command buffer must be fully recorded and not pending, and
    /// `fence` must be unsignaled.
    ///
    /// # Errors
    ///
    /// Returns the Vulkan error if the queue rejects the submission.
    pub unsafe fn submit_once(
        &self,
        command_buffer: vk::CommandBuffer,
        fence: vk::Fence,
    ) -> RhiResult<()> {
        let command_buffers = [command_buffer];
        let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);
        // SAFETY: upheld by the caller.
        unsafe {
            self.device
                .queue_submit(self.graphics_queue, &[submit_info], fence)?;
        }
        Ok(())
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        // SAFETY: every object created from the device holds an `Arc` to it,
        // so they are all gone. Allocator memory is freed while the device
        // still exists.
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                error!("Device idle wait failed during teardown: {}", e);
            }
            ManuallyDrop::drop(&mut self.allocator);
            self.device.destroy_device(None);
        }
        info!("Logical device destroyed");
    }
}

// SAFETY: the ash tables are plain function pointers, queue handles are only
// used from the frame thread, and the allocator sits behind a Mutex.
unsafe impl Send for Device {}
unsafe impl Sync for Device {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_queue_per_distinct_family() {
        let shared = queue_create_infos(QueueFamilies {
            graphics: 0,
            present: 0,
        });
        assert_eq!(shared.len(), 1);
        assert_eq!(shared[0].queue_count, 1);

        let split = queue_create_infos(QueueFamilies {
            graphics: 0,
            present: 1,
        });
        let families: Vec<u32> = split.iter().map(|info| info.queue_family_index).collect();
        assert_eq!(families, vec![0, 1]);
    }

    #[test]
    fn test_only_swapchain_extension() {
        assert_eq!(DEVICE_EXTENSIONS, [ash::khr::swapchain::NAME]);
    }

    #[test]
    fn test_device_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Device>();
    }
}
