//! Renderer error types.

use ash::vk;
use thiserror::Error;

use framepace_rhi::RhiError;

/// Fatal conditions raised while building resources or running a frame.
///
/// Stale and suboptimal surfaces are not errors; they are handled inside
/// [`crate::FrameOrchestrator::run_frame`].
#[derive(Error, Debug)]
pub enum RendererError {
    /// Error from the RHI layer
    #[error(transparent)]
    Rhi(#[from] RhiError),

    /// Window or surface error from the platform layer
    #[error(transparent)]
    Platform(#[from] framepace_core::Error),

    /// A command could not be recorded; the frame is abandoned
    #[error("Command recording failed at {operation}: {result}")]
    RecordingFailed {
        operation: &'static str,
        result: vk::Result,
    },

    /// The graphics queue rejected a submission
    #[error("Queue submit failed: {0}")]
    SubmitFailed(vk::Result),

    /// Presentation failed with a non-recoverable status
    #[error("Present failed: {0}")]
    PresentFailed(vk::Result),

    /// Image acquisition failed with a non-recoverable status
    #[error("Swapchain image acquisition failed: {0}")]
    AcquireFailed(vk::Result),

    /// The window closed while a rebuild was waiting for a drawable area
    #[error("Window closed while waiting for a drawable area")]
    HostClosed,

    /// A GPU resource could not be created
    #[error("Failed to create {resource}: {source}")]
    ResourceCreation {
        resource: &'static str,
        #[source]
        source: RhiError,
    },
}

impl RendererError {
    /// Returns a mapper that wraps an RHI error as a creation failure of `resource`.
    ///
    /// # Example
    ///
    /// ```
    /// use framepace_renderer::RendererError;
    /// use framepace_rhi::RhiError;
    ///
    /// let err: Result<(), RhiError> = Err(RhiError::NoSuitableGpu);
    /// let err = err.map_err(RendererError::creating("swapchain")).unwrap_err();
    /// assert!(err.to_string().starts_with("Failed to create swapchain"));
    /// ```
    pub fn creating(resource: &'static str) -> impl FnOnce(RhiError) -> Self {
        move |source| Self::ResourceCreation { resource, source }
    }

    /// Wraps a failed recording step, keeping the Vulkan status when there is one.
    pub fn recording(operation: &'static str, error: RhiError) -> Self {
        match error.vk_result() {
            Some(result) => Self::RecordingFailed { operation, result },
            None => Self::Rhi(error),
        }
    }
}

/// Result type alias for renderer operations.
pub type RendererResult<T> = std::result::Result<T, RendererError>;
