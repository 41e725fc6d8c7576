//! Vertex, index and uniform buffers.
//!
//! Host-visible buffers live in `CpuToGpu` memory from gpu-allocator and stay
//! mapped for their whole life; per-frame uniform updates are a
//! bounds-checked copy into the mapping. Static geometry goes to
//! device-local memory through [`Buffer::upload`], which fills a staging
//! buffer and copies it over with a one-time command buffer.
//!
//! ```no_run
//! use std::sync::Arc;
//! use framepace_rhi::buffer::{Buffer, BufferUsage};
//! use framepace_rhi::command::CommandPool;
//! # fn example(device: Arc<framepace_rhi::device::Device>, pool: &CommandPool) -> framepace_rhi::RhiResult<()> {
//! let indices: [u16; 6] = [0, 1, 2, 2, 3, 0];
//! let index_buffer =
//!     Buffer::upload(device, pool, BufferUsage::Index, bytemuck::cast_slice(&indices))?;
//! # Ok(())
//! # }
//! ```

use std::ops::Range;
use std::sync::Arc;

use ash::vk;
use bytemuck::Pod;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::{debug, error};

use crate::command::CommandPool;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// What the pipeline reads a buffer as.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferUsage {
    Vertex,
    Index,
    /// Rewritten by the host every frame.
    Uniform,
    /// Source of a copy into a device-local buffer.
    Staging,
}

impl BufferUsage {
    pub fn flags(self) -> vk::BufferUsageFlags {
        match self {
            Self::Vertex => vk::BufferUsageFlags::VERTEX_BUFFER,
            Self::Index => vk::BufferUsageFlags::INDEX_BUFFER,
            Self::Uniform => vk::BufferUsageFlags::UNIFORM_BUFFER,
            Self::Staging => vk::BufferUsageFlags::TRANSFER_SRC,
        }
    }

    /// Allocation name, also used in logs.
    pub fn label(self) -> &'static str {
        match self {
            Self::Vertex => "vertex buffer",
            Self::Index => "index buffer",
            Self::Uniform => "uniform buffer",
            Self::Staging => "staging buffer",
        }
    }
}

/// Where a buffer's memory lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Residency {
    /// Mapped for host writes, read by the device directly.
    HostVisible,
    /// Not mapped; filled by a transfer on the graphics queue.
    DeviceLocal,
}

impl Residency {
    fn location(self) -> MemoryLocation {
        match self {
            Self::HostVisible => MemoryLocation::CpuToGpu,
            Self::DeviceLocal => MemoryLocation::GpuOnly,
        }
    }
}

/// Usage flags of a buffer with `usage` placed in `residency`.
fn usage_flags(usage: BufferUsage, residency: Residency) -> vk::BufferUsageFlags {
    match residency {
        Residency::HostVisible => usage.flags(),
        Residency::DeviceLocal => usage.flags() | vk::BufferUsageFlags::TRANSFER_DST,
    }
}

/// Byte range covered by writing `len` bytes at `offset` into a buffer of
/// `size` bytes, or `None` if it would not fit.
fn write_range(size: vk::DeviceSize, offset: vk::DeviceSize, len: usize) -> Option<Range<usize>> {
    let end = offset.checked_add(len as vk::DeviceSize)?;
    (end <= size).then(|| offset as usize..end as usize)
}

/// A `VkBuffer` bound to memory from the device allocator.
pub struct Buffer {
    device: Arc<Device>,
    buffer: vk::Buffer,
    /// Taken in `Drop` to hand back to the allocator.
    allocation: Option<Allocation>,
    size: vk::DeviceSize,
    usage: BufferUsage,
    residency: Residency,
}

impl Buffer {
    /// Creates a host-visible buffer of `size` bytes with unspecified contents.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InvalidHandle`] for a zero size, otherwise the
    /// Vulkan or allocator error of whichever step failed.
    pub fn new(device: Arc<Device>, usage: BufferUsage, size: vk::DeviceSize) -> RhiResult<Self> {
        Self::create(device, usage, Residency::HostVisible, size)
    }

    /// Creates an unmapped device-local buffer of `size` bytes.
    ///
    /// # Errors
    ///
    /// Same as [`Buffer::new`].
    pub fn device_local(
        device: Arc<Device>,
        usage: BufferUsage,
        size: vk::DeviceSize,
    ) -> RhiResult<Self> {
        Self::create(device, usage, Residency::DeviceLocal, size)
    }

    fn create(
        device: Arc<Device>,
        usage: BufferUsage,
        residency: Residency,
        size: vk::DeviceSize,
    ) -> RhiResult<Self> {
        if size == 0 {
            return Err(RhiError::InvalidHandle(format!(
                "{} of zero bytes",
                usage.label()
            )));
        }

        let create_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage_flags(usage, residency))
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        // SAFETY: plain object creation on a live device.
        let buffer = unsafe { device.handle().create_buffer(&create_info, None)? };

        let allocation = match allocate_and_bind(&device, buffer, usage, residency) {
            Ok(allocation) => allocation,
            Err(e) => {
                // SAFETY: the buffer was never used and has no memory bound.
                unsafe { device.handle().destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        debug!("Created {:?} {} of {} bytes", residency, usage.label(), size);
        Ok(Self {
            device,
            buffer,
            allocation: Some(allocation),
            size,
            usage,
            residency,
        })
    }

    /// Creates a host-visible buffer exactly as large as `contents` and copies them in.
    ///
    /// # Errors
    ///
    /// Same as [`Buffer::new`].
    pub fn with_contents(
        device: Arc<Device>,
        usage: BufferUsage,
        contents: &[u8],
    ) -> RhiResult<Self> {
        let buffer = Self::new(device, usage, contents.len() as vk::DeviceSize)?;
        buffer.write(0, contents)?;
        Ok(buffer)
    }

    /// Creates a device-local buffer holding `contents`.
    ///
    /// The bytes go through a temporary staging buffer and a one-time copy
    /// on the graphics queue of `pool`. Returns once the copy has completed.
    ///
    /// # Errors
    ///
    /// Same as [`Buffer::new`], plus any error from the transfer submission.
    pub fn upload(
        device: Arc<Device>,
        pool: &CommandPool,
        usage: BufferUsage,
        contents: &[u8],
    ) -> RhiResult<Self> {
        let staging = Self::with_contents(device.clone(), BufferUsage::Staging, contents)?;
        let buffer = Self::device_local(device, usage, staging.size)?;

        pool.submit_once(|recording| recording.copy_buffer(&staging, &buffer))?;
        debug!("Uploaded {} bytes to {}", contents.len(), usage.label());
        Ok(buffer)
    }

    /// Copies `bytes` into the buffer starting at `offset`.
    ///
    /// No submission still in flight may read the written range.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InvalidHandle`] if the range does not fit or the
    /// buffer is device-local.
    pub fn write(&self, offset: vk::DeviceSize, bytes: &[u8]) -> RhiResult<()> {
        let range = write_range(self.size, offset, bytes.len()).ok_or_else(|| {
            RhiError::InvalidHandle(format!(
                "{} bytes at offset {} overrun a {}-byte {}",
                bytes.len(),
                offset,
                self.size,
                self.usage.label()
            ))
        })?;
        if range.is_empty() {
            return Ok(());
        }

        let mapped = self
            .allocation
            .as_ref()
            .and_then(Allocation::mapped_ptr)
            .ok_or_else(|| {
                RhiError::InvalidHandle(format!("{} is not mapped", self.usage.label()))
            })?;

        // SAFETY: `range` lies inside the allocation, which stays mapped and
        // host-coherent until the buffer is dropped.
        unsafe {
            let dst = mapped.as_ptr().cast::<u8>().add(range.start);
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), dst, range.len());
        }
        Ok(())
    }

    /// Writes `value` at offset zero.
    ///
    /// # Errors
    ///
    /// Same as [`Buffer::write`].
    pub fn write_value<T: Pod>(&self, value: &T) -> RhiResult<()> {
        self.write(0, bytemuck::bytes_of(value))
    }

    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    #[inline]
    pub fn residency(&self) -> Residency {
        self.residency
    }
}

/// Allocates memory for `buffer` and binds it. On error nothing is left
/// allocated.
fn allocate_and_bind(
    device: &Device,
    buffer: vk::Buffer,
    usage: BufferUsage,
    residency: Residency,
) -> RhiResult<Allocation> {
    // SAFETY: `buffer` was just created on this device.
    let requirements = unsafe { device.handle().get_buffer_memory_requirements(buffer) };

    let mut allocator = device.allocator()?;
    let allocation = allocator.allocate(&AllocationCreateDesc {
        name: usage.label(),
        requirements,
        location: residency.location(),
        linear: true,
        allocation_scheme: AllocationScheme::GpuAllocatorManaged,
    })?;

    // SAFETY: the allocation was sized and aligned from `requirements`.
    let bound = unsafe {
        device
            .handle()
            .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
    };
    if let Err(e) = bound {
        if let Err(free_error) = allocator.free(allocation) {
            error!("Failed to free {} memory: {}", usage.label(), free_error);
        }
        return Err(e.into());
    }
    Ok(allocation)
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take() {
            let freed = self
                .device
                .allocator()
                .and_then(|mut allocator| allocator.free(allocation).map_err(RhiError::from));
            if let Err(e) = freed {
                error!("Failed to free {} memory: {}", self.usage.label(), e);
            }
        }

        // SAFETY: owners drop buffers only once no submission reads them.
        unsafe { self.device.handle().destroy_buffer(self.buffer, None) };
        debug!("Destroyed {} of {} bytes", self.usage.label(), self.size);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_flags() {
        assert_eq!(
            BufferUsage::Vertex.flags(),
            vk::BufferUsageFlags::VERTEX_BUFFER
        );
        assert_eq!(BufferUsage::Index.flags(), vk::BufferUsageFlags::INDEX_BUFFER);
        assert_eq!(
            BufferUsage::Uniform.flags(),
            vk::BufferUsageFlags::UNIFORM_BUFFER
        );
        assert_eq!(BufferUsage::Staging.flags(), vk::BufferUsageFlags::TRANSFER_SRC);
    }

    #[test]
    fn test_device_local_buffers_accept_transfers() {
        assert_eq!(
            usage_flags(BufferUsage::Vertex, Residency::DeviceLocal),
            vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
        );
        assert_eq!(
            usage_flags(BufferUsage::Uniform, Residency::HostVisible),
            vk::BufferUsageFlags::UNIFORM_BUFFER
        );
        assert_eq!(
            usage_flags(BufferUsage::Staging, Residency::HostVisible),
            vk::BufferUsageFlags::TRANSFER_SRC
        );
    }

    #[test]
    fn test_residency_picks_memory_location() {
        assert_eq!(Residency::HostVisible.location(), MemoryLocation::CpuToGpu);
        assert_eq!(Residency::DeviceLocal.location(), MemoryLocation::GpuOnly);
    }

    #[test]
    fn test_write_range_inside_buffer() {
        assert_eq!(write_range(192, 0, 192), Some(0..192));
        assert_eq!(write_range(192, 64, 64), Some(64..128));
        assert_eq!(write_range(192, 192, 0), Some(192..192));
    }

    #[test]
    fn test_write_range_rejects_overrun() {
        assert_eq!(write_range(192, 1, 192), None);
        assert_eq!(write_range(192, 200, 0), None);
        assert_eq!(write_range(192, u64::MAX, 1), None);
    }
}
