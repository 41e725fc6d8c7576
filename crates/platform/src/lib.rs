//! Window, surface and event-loop glue between winit and the frame loop.
//!
//! The frame loop only sees [`SurfaceHost`] and [`ResizeSignal`]; everything
//! winit-specific stays in [`WinitHost`] and [`Window`].

mod host;
mod resize;
mod window;

pub use host::{SurfaceHost, WinitHost};
pub use resize::ResizeSignal;
pub use window::{Surface, Window};
