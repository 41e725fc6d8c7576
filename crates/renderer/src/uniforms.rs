//! Per-image uniform buffers and their descriptor sets.
//!
//! Uniform data is keyed by the acquired swapchain image index, so there is
//! one buffer and one descriptor set per presentable image. A rebuild that
//! yields more images grows the set; it never shrinks.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use framepace_rhi::RhiError;
use framepace_rhi::buffer::{Buffer, BufferUsage};
use framepace_rhi::descriptor::{DescriptorPool, DescriptorSetLayout, write_uniform_buffers};
use framepace_rhi::device::Device;

use crate::error::{RendererError, RendererResult};
use crate::ubo::TransformUbo;

/// Uniform buffers indexed by swapchain image.
pub struct UniformSet {
    device: Arc<Device>,
    // Sets are released with the pool, before the buffers they reference.
    pool: Option<DescriptorPool>,
    descriptor_sets: Vec<vk::DescriptorSet>,
    buffers: Vec<Buffer>,
}

impl UniformSet {
    /// Creates `image_count` buffers and descriptor sets.
    ///
    /// # Errors
    ///
    /// Returns [`RendererError::ResourceCreation`] if a buffer, the pool or
    /// the sets cannot be created.
    pub fn new(
        device: Arc<Device>,
        layout: &DescriptorSetLayout,
        image_count: usize,
    ) -> RendererResult<Self> {
        let mut uniforms = Self {
            device,
            pool: None,
            descriptor_sets: Vec::new(),
            buffers: Vec::new(),
        };
        uniforms.ensure_capacity(layout, image_count)?;
        Ok(uniforms)
    }

    /// Grows to at least `image_count` entries.
    ///
    /// Growing replaces the descriptor pool, so no set may be in use by the
    /// GPU. Rebuilds call this after waiting for device idle.
    ///
    /// # Errors
    ///
    /// Returns [`RendererError::ResourceCreation`] if a new buffer, the pool
    /// or the sets cannot be created.
    pub fn ensure_capacity(
        &mut self,
        layout: &DescriptorSetLayout,
        image_count: usize,
    ) -> RendererResult<()> {
        if image_count <= self.buffers.len() {
            return Ok(());
        }

        while self.buffers.len() < image_count {
            let buffer = Buffer::new(
                self.device.clone(),
                BufferUsage::Uniform,
                TransformUbo::SIZE as vk::DeviceSize,
            )
            .map_err(RendererError::creating("uniform buffer"))?;
            self.buffers.push(buffer);
        }

        let pool = DescriptorPool::for_uniform_buffers(self.device.clone(), image_count as u32)
            .map_err(RendererError::creating("descriptor pool"))?;
        let descriptor_sets = pool
            .allocate(layout, image_count)
            .map_err(RendererError::creating("descriptor sets"))?;

        let handles: Vec<vk::Buffer> = self.buffers.iter().map(Buffer::handle).collect();
        write_uniform_buffers(
            &self.device,
            0,
            &descriptor_sets,
            &handles,
            TransformUbo::SIZE as vk::DeviceSize,
        );

        debug!("Uniform set grown to {} images", pool.capacity());
        self.pool = Some(pool);
        self.descriptor_sets = descriptor_sets;
        Ok(())
    }

    /// Copies `ubo` into the buffer of `image_index`.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InvalidHandle`] if `image_index` has no buffer.
    pub fn write(&self, image_index: u32, ubo: &TransformUbo) -> RendererResult<()> {
        let buffer = self.buffers.get(image_index as usize).ok_or_else(|| {
            RhiError::InvalidHandle(format!("no uniform buffer for image {}", image_index))
        })?;
        buffer.write_value(ubo)?;
        Ok(())
    }

    /// Descriptor set bound when drawing into `image_index`.
    pub fn descriptor_set(&self, image_index: u32) -> Option<vk::DescriptorSet> {
        self.descriptor_sets.get(image_index as usize).copied()
    }

    /// Number of images covered.
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    /// Whether no image is covered.
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}
