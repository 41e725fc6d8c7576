//! Event-loop hosting for the frame loop.
//!
//! The frame loop owns control flow: instead of handing the thread to
//! `EventLoop::run_app`, [`WinitHost`] pumps pending window events between
//! frames and blocks on the event queue only when asked to.

use std::time::Duration;

use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::platform::pump_events::{EventLoopExtPumpEvents, PumpStatus};
use winit::window::WindowId;

use framepace_core::{Error, Result, WindowConfig};

use crate::resize::ResizeSignal;
use crate::window::Window;

/// What the frame loop needs from the windowing system.
pub trait SurfaceHost {
    /// Current drawable size in pixels. Either dimension may be zero while minimized.
    fn drawable_size(&mut self) -> (u32, u32);

    /// Block until at least one window event has been processed.
    ///
    /// Returns `false` once the host has closed; no drawable area will
    /// appear after that.
    ///
    /// # Errors
    /// Propagates failures raised while processing events.
    fn wait_events(&mut self) -> Result<bool>;
}

/// Window state driven by winit callbacks.
struct HostState {
    config: WindowConfig,
    window: Option<Window>,
    resize: ResizeSignal,
    close_requested: bool,
    error: Option<Error>,
}

impl ApplicationHandler for HostState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        match Window::new(event_loop, &self.config) {
            Ok(window) => self.window = Some(window),
            Err(e) => {
                tracing::error!("Failed to create window: {}", e);
                self.error = Some(e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                tracing::info!("Close requested");
                self.close_requested = true;
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                tracing::debug!("Window resized: {}x{}", size.width, size.height);
                self.resize.raise();
            }
            _ => {}
        }
    }
}

/// A winit window whose events are pumped by the caller.
pub struct WinitHost {
    event_loop: EventLoop<()>,
    state: HostState,
    exited: bool,
}

impl WinitHost {
    /// Create the event loop. The window itself appears on the first pump.
    ///
    /// # Arguments
    /// * `config` - Initial window size and title
    /// * `resize` - Signal raised on every `Resized` event
    ///
    /// # Errors
    /// Returns [`Error::Window`] if the platform event loop cannot be created.
    pub fn new(config: WindowConfig, resize: ResizeSignal) -> Result<Self> {
        let event_loop = EventLoop::new().map_err(|e| Error::Window(e.to_string()))?;
        event_loop.set_control_flow(ControlFlow::Poll);

        Ok(Self {
            event_loop,
            state: HostState {
                config,
                window: None,
                resize,
                close_requested: false,
                error: None,
            },
            exited: false,
        })
    }

    /// Process pending events without blocking.
    ///
    /// Returns `false` once the event loop has exited.
    ///
    /// # Errors
    /// Propagates a window-creation failure raised inside the event callbacks.
    pub fn pump(&mut self) -> Result<bool> {
        self.pump_with_timeout(Some(Duration::ZERO))
    }

    fn pump_with_timeout(&mut self, timeout: Option<Duration>) -> Result<bool> {
        // The loop must not be pumped again once it has reported an exit
        if self.exited {
            return Ok(false);
        }

        let status = self.event_loop.pump_app_events(timeout, &mut self.state);
        if let Some(e) = self.state.error.take() {
            return Err(e);
        }
        match status {
            PumpStatus::Continue => Ok(!self.state.close_requested),
            PumpStatus::Exit(code) => {
                tracing::debug!("Event loop exited with code {}", code);
                self.exited = true;
                Ok(false)
            }
        }
    }

    /// Pump events until the window exists.
    ///
    /// # Errors
    /// Returns [`Error::Window`] if the event loop exits before a window is created.
    pub fn wait_for_window(&mut self) -> Result<&Window> {
        while self.state.window.is_none() {
            if !self.pump_with_timeout(None)? {
                return Err(Error::Window(
                    "event loop exited before the window was created".to_string(),
                ));
            }
        }
        self.state
            .window
            .as_ref()
            .ok_or_else(|| Error::Window("window missing after creation".to_string()))
    }

    /// The window, once created.
    pub fn window(&self) -> Option<&Window> {
        self.state.window.as_ref()
    }

    /// Whether the user asked to close the window.
    pub fn close_requested(&self) -> bool {
        self.state.close_requested
    }
}

impl SurfaceHost for WinitHost {
    fn drawable_size(&mut self) -> (u32, u32) {
        self.state
            .window
            .as_ref()
            .map_or((0, 0), Window::drawable_size)
    }

    fn wait_events(&mut self) -> Result<bool> {
        let open = self.pump_with_timeout(None)?;
        if !open {
            tracing::debug!("Host closed while waiting for events");
        }
        Ok(open)
    }
}
