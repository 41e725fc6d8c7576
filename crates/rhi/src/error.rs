//! Errors raised by the Vulkan layer.

use ash::vk;
use thiserror::Error;

/// Failure of a Vulkan object or command wrapped by this crate.
#[derive(Error, Debug)]
pub enum RhiError {
    /// A Vulkan call returned an error code.
    #[error("Vulkan call failed: {0}")]
    VulkanError(#[from] vk::Result),

    /// The Vulkan loader library could not be opened.
    #[error("Vulkan loader unavailable: {0}")]
    LoadingError(#[from] ash::LoadingError),

    #[error("GPU memory allocation failed: {0}")]
    AllocatorError(#[from] gpu_allocator::AllocationError),

    /// No physical device supports graphics and presentation to the surface.
    #[error("No GPU can render and present to this surface")]
    NoSuitableGpu,

    /// WGSL parsing, validation or SPIR-V generation failed.
    #[error("Shader compilation failed: {0}")]
    ShaderError(String),

    /// Surface negotiation or swapchain creation could not proceed.
    #[error("Swapchain setup failed: {0}")]
    SwapchainError(String),

    /// A handle, index or size did not refer to a usable object.
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    #[error("Pipeline creation failed: {0}")]
    PipelineError(String),
}

impl RhiError {
    /// The Vulkan result code, if this error came straight from a Vulkan call.
    pub fn vk_result(&self) -> Option<vk::Result> {
        match self {
            RhiError::VulkanError(result) => Some(*result),
            _ => None,
        }
    }
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;
