//! Configuration, logging, timing and host-side errors shared by every
//! framepace crate.

mod config;
mod error;
mod logging;
mod timer;

pub use config::{LoggingConfig, RendererConfig, RunConfig, VulkanConfig, WindowConfig};
pub use error::{Error, Result};
pub use logging::{DEFAULT_LOG_FILTER, init_logging};
pub use timer::Timer;
