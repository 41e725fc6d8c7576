//! Frame pacing and swapchain lifecycle.
//!
//! This crate runs the per-frame cycle on top of the RHI layer:
//! - [`surface_resources`]: swapchain, views and framebuffers, rebuilt on resize
//! - [`frame_resources`]: the ring of per-frame semaphores, fences and command buffers
//! - [`recorder`]: fills one command buffer for an acquired image
//! - [`orchestrator`]: acquire, record, submit, present and rebuild decisions
//!
//! [`Renderer`] ties them to a window.

mod error;

pub mod backend;
pub mod context;
pub mod frame_resources;
pub mod mesh;
pub mod orchestrator;
pub mod recorder;
pub mod renderer;
pub mod surface_resources;
pub mod ubo;
pub mod uniforms;

pub use error::{RendererError, RendererResult};
pub use orchestrator::{FrameBackend, FrameOrchestrator, FramePhase, FrameReport};
pub use renderer::Renderer;

/// Number of frames that can be in flight simultaneously.
pub const FRAMES_IN_FLIGHT: usize = 3;
