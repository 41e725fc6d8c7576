//! Error types shared by the host-facing crates.

use thiserror::Error;

/// Error type for window, surface and configuration failures.
#[derive(Error, Debug)]
pub enum Error {
    /// Vulkan-related errors raised outside the RHI layer (surface creation, extension lookup)
    #[error("Vulkan error: {0}")]
    Vulkan(String),

    /// Window creation or event loop errors
    #[error("Window error: {0}")]
    Window(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or unreadable configuration
    #[error("Config error: {0}")]
    Config(String),
}

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;
