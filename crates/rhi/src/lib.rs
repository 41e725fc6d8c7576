//! Thin RAII wrappers over `ash` for the frame-paced renderer.
//!
//! Every object holds an `Arc<Device>` and destroys itself on drop; callers
//! are responsible for waiting until the GPU no longer uses it. Swapchain
//! negotiation is kept free of device calls so it can be tested directly.

mod error;

pub mod buffer;
pub mod command;
pub mod descriptor;
pub mod device;
pub mod framebuffer;
pub mod instance;
pub mod physical_device;
pub mod pipeline;
pub mod render_pass;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod vertex;

pub use error::{RhiError, RhiResult};

pub use ash::vk;
