//! Descriptor sets for per-image uniform buffers.
//!
//! The frame loop binds exactly one resource type, a uniform buffer per
//! swapchain image, so this module only deals with that case:
//! - [`uniform_binding`] describes the binding in a [`DescriptorSetLayout`]
//! - [`DescriptorPool::for_uniform_buffers`] sizes a pool for N such sets
//! - [`write_uniform_buffers`] points each set at its buffer
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ash::vk;
//! use framepace_rhi::device::Device;
//! use framepace_rhi::descriptor::{
//!     DescriptorPool, DescriptorSetLayout, uniform_binding, write_uniform_buffers,
//! };
//!
//! # fn example(device: Arc<Device>, buffers: &[vk::Buffer]) -> Result<(), framepace_rhi::RhiError> {
//! let layout = DescriptorSetLayout::new(
//!     device.clone(),
//!     &[uniform_binding(0, vk::ShaderStageFlags::VERTEX)],
//! )?;
//!
//! let pool = DescriptorPool::for_uniform_buffers(device.clone(), buffers.len() as u32)?;
//! let sets = pool.allocate(&layout, buffers.len())?;
//! write_uniform_buffers(&device, 0, &sets, buffers, 192);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::RhiResult;

/// A single uniform buffer at `binding`, visible to `stages`.
pub fn uniform_binding(
    binding: u32,
    stages: vk::ShaderStageFlags,
) -> vk::DescriptorSetLayoutBinding<'static> {
    vk::DescriptorSetLayoutBinding::default()
        .binding(binding)
        .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
        .descriptor_count(1)
        .stage_flags(stages)
}

/// Shape of the descriptor sets a pipeline layout expects.
pub struct DescriptorSetLayout {
    device: Arc<Device>,
    layout: vk::DescriptorSetLayout,
}

impl DescriptorSetLayout {
    /// # Errors
    ///
    /// Returns an error if layout creation fails.
    pub fn new(
        device: Arc<Device>,
        bindings: &[vk::DescriptorSetLayoutBinding],
    ) -> RhiResult<Self> {
        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(bindings);

        // SAFETY: plain object creation on a live device.
        let layout = unsafe {
            device
                .handle()
                .create_descriptor_set_layout(&create_info, None)?
        };

        Ok(Self { device, layout })
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        // SAFETY: pipeline layouts built from this layout keep their own copy.
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_set_layout(self.layout, None);
        }
    }
}

/// Pool sizes for `count` sets with one uniform buffer each.
fn uniform_pool_sizes(count: u32) -> [vk::DescriptorPoolSize; 1] {
    [vk::DescriptorPoolSize::default()
        .ty(vk::DescriptorType::UNIFORM_BUFFER)
        .descriptor_count(count)]
}

/// Owns descriptor sets; they are freed together when the pool drops.
pub struct DescriptorPool {
    device: Arc<Device>,
    pool: vk::DescriptorPool,
    capacity: u32,
}

impl DescriptorPool {
    /// Creates a pool holding `count` sets of one uniform buffer each.
    ///
    /// # Errors
    ///
    /// Returns an error if pool creation fails.
    pub fn for_uniform_buffers(device: Arc<Device>, count: u32) -> RhiResult<Self> {
        let sizes = uniform_pool_sizes(count);
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(count)
            .pool_sizes(&sizes);

        // SAFETY: plain object creation on a live device.
        let pool = unsafe { device.handle().create_descriptor_pool(&create_info, None)? };
        debug!("Descriptor pool created for {} uniform set(s)", count);

        Ok(Self {
            device,
            pool,
            capacity: count,
        })
    }

    /// Allocates `count` sets sharing `layout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool is exhausted.
    pub fn allocate(
        &self,
        layout: &DescriptorSetLayout,
        count: usize,
    ) -> RhiResult<Vec<vk::DescriptorSet>> {
        let layouts = vec![layout.handle(); count];
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(&layouts);

        // SAFETY: the pool is only used from the frame thread.
        let sets = unsafe { self.device.handle().allocate_descriptor_sets(&alloc_info)? };
        Ok(sets)
    }

    /// Number of sets the pool was sized for.
    #[inline]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        // SAFETY: no submission using the pool's sets is pending.
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_pool(self.pool, None);
        }
        debug!("Descriptor pool for {} set(s) destroyed", self.capacity);
    }
}

/// Whole-range buffer infos, one array per buffer so each write can borrow its own.
fn uniform_buffer_infos(
    buffers: &[vk::Buffer],
    range: vk::DeviceSize,
) -> Vec<[vk::DescriptorBufferInfo; 1]> {
    buffers
        .iter()
        .map(|&buffer| {
            [vk::DescriptorBufferInfo::default()
                .buffer(buffer)
                .offset(0)
                .range(range)]
        })
        .collect()
}

/// Points `sets[i]` at `buffers[i]` for the uniform at `binding`.
///
/// Pairs beyond the shorter slice are ignored. No set may be in use by a
/// pending submission.
pub fn write_uniform_buffers(
    device: &Device,
    binding: u32,
    sets: &[vk::DescriptorSet],
    buffers: &[vk::Buffer],
    range: vk::DeviceSize,
) {
    let infos = uniform_buffer_infos(buffers, range);
    let writes: Vec<vk::WriteDescriptorSet> = sets
        .iter()
        .zip(&infos)
        .map(|(&set, info)| {
            vk::WriteDescriptorSet::default()
                .dst_set(set)
                .dst_binding(binding)
                .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                .buffer_info(info)
        })
        .collect();

    if writes.is_empty() {
        return;
    }
    // SAFETY: the buffer infos outlive the call.
    unsafe { device.handle().update_descriptor_sets(&writes, &[]) };
}
