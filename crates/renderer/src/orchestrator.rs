//! The per-frame acquire, record, submit and present cycle.
//!
//! [`FrameOrchestrator::run_frame`] drives one cycle through a
//! [`FrameBackend`] and decides when the presentation surface must be
//! rebuilt. The backend trait is the seam between the pacing logic and the
//! GPU: [`crate::backend::VulkanBackend`] implements it with real Vulkan
//! objects, tests implement it with scripted fakes.
//!
//! # Cycle
//!
//! For frame slot `f`:
//!
//! 1. Wait for slot `f`'s fence (the previous submission from `f` is done).
//! 2. Acquire an image. A stale surface rebuilds and ends the cycle without
//!    advancing the frame index.
//! 3. Reset the fence and write per-image uniform data.
//! 4. Record slot `f`'s command buffer for the acquired image.
//! 5. Submit, waiting on image-available at color output.
//! 6. Present. Rebuild once if presentation was stale or suboptimal, or a
//!    resize is pending. A suboptimal acquisition alone does not rebuild;
//!    the present that follows reports the same condition.
//! 7. Advance `f`.
//!
//! # Example
//!
//! ```no_run
//! use framepace_platform::{ResizeSignal, SurfaceHost};
//! use framepace_renderer::{FrameBackend, FrameOrchestrator, FRAMES_IN_FLIGHT};
//!
//! # fn example<B: FrameBackend>(backend: B, host: &mut impl SurfaceHost)
//! #     -> Result<(), framepace_renderer::RendererError> {
//! let mut orchestrator = FrameOrchestrator::new(backend, FRAMES_IN_FLIGHT, ResizeSignal::new());
//! for _ in 0..100 {
//!     orchestrator.run_frame(host)?;
//! }
//! orchestrator.shutdown()?;
//! # Ok(())
//! # }
//! ```

use std::fmt;

use ash::vk;
use tracing::{debug, info, trace};

use framepace_platform::{ResizeSignal, SurfaceHost};
use framepace_rhi::swapchain::{AcquireOutcome, PresentOutcome};

use crate::error::{RendererError, RendererResult};

/// GPU-side operations the orchestrator sequences.
///
/// `slot` is always below the frame count the orchestrator was created with.
pub trait FrameBackend {
    /// Blocks until the last submission from `slot` has completed.
    fn wait_for_slot(&mut self, slot: usize) -> RendererResult<()>;

    /// Acquires the next presentable image, signaling the slot's image-available semaphore.
    fn acquire(&mut self, slot: usize) -> RendererResult<AcquireOutcome>;

    /// Resets the slot's fence so the coming submission can signal it.
    fn reset_slot_fence(&mut self, slot: usize) -> RendererResult<()>;

    /// Writes per-frame data for the image about to be drawn.
    fn prepare_frame_data(&mut self, image_index: u32) -> RendererResult<()>;

    /// Records the slot's command buffer targeting `image_index`.
    fn record(&mut self, slot: usize, image_index: u32) -> RendererResult<()>;

    /// Submits the slot's command buffer, signaling render-finished and the slot's fence.
    fn submit(&mut self, slot: usize) -> RendererResult<()>;

    /// Presents `image_index` once the slot's render-finished semaphore is signaled.
    fn present(&mut self, slot: usize, image_index: u32) -> RendererResult<PresentOutcome>;

    /// Blocks until the device has no pending work.
    fn wait_idle(&mut self) -> RendererResult<()>;

    /// Replaces every extent-dependent resource. The device is idle.
    fn rebuild_surface(&mut self, extent: vk::Extent2D) -> RendererResult<()>;
}

/// Where the orchestrator is within a cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FramePhase {
    /// Between cycles.
    #[default]
    Idle,
    /// Waiting for the slot or acquiring an image.
    Acquiring,
    /// Writing frame data and recording commands.
    Recording,
    /// Submitting to the graphics queue.
    Submitting,
    /// Presenting and, if needed, rebuilding.
    Presenting,
}

impl fmt::Display for FramePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FramePhase::Idle => "idle",
            FramePhase::Acquiring => "acquiring",
            FramePhase::Recording => "recording",
            FramePhase::Submitting => "submitting",
            FramePhase::Presenting => "presenting",
        };
        f.write_str(name)
    }
}

/// What a completed call to [`FrameOrchestrator::run_frame`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameReport {
    /// The frame was presented.
    Presented,
    /// The frame was presented and the surface rebuilt afterwards.
    Rebuilt,
    /// Acquisition found the surface stale; it was rebuilt and nothing was drawn.
    Skipped,
}

/// Drives frames through a [`FrameBackend`].
pub struct FrameOrchestrator<B> {
    backend: B,
    frames_in_flight: usize,
    current_frame: usize,
    phase: FramePhase,
    resize: ResizeSignal,
    rebuilds: u64,
}

impl<B: FrameBackend> FrameOrchestrator<B> {
    /// Creates an orchestrator cycling through `frames_in_flight` slots.
    ///
    /// A count of zero is treated as one.
    ///
    /// # Arguments
    ///
    /// * `backend` - GPU operations to sequence
    /// * `frames_in_flight` - Number of frame slots the backend provides
    /// * `resize` - Signal raised by the host when the drawable area changes
    pub fn new(backend: B, frames_in_flight: usize, resize: ResizeSignal) -> Self {
        Self {
            backend,
            frames_in_flight: frames_in_flight.max(1),
            current_frame: 0,
            phase: FramePhase::Idle,
            resize,
            rebuilds: 0,
        }
    }

    /// Runs one frame cycle.
    ///
    /// Stale and suboptimal surfaces are handled here. The orchestrator is
    /// back in [`FramePhase::Idle`] when this returns, with or without error.
    ///
    /// # Errors
    ///
    /// Any error from the backend is fatal and returned unchanged. The frame
    /// index is not advanced.
    pub fn run_frame(&mut self, host: &mut impl SurfaceHost) -> RendererResult<FrameReport> {
        let result = self.cycle(host);
        self.phase = FramePhase::Idle;
        result
    }

    fn cycle(&mut self, host: &mut impl SurfaceHost) -> RendererResult<FrameReport> {
        let slot = self.current_frame;

        self.phase = FramePhase::Acquiring;
        self.backend.wait_for_slot(slot)?;

        let image_index = match self.backend.acquire(slot)? {
            AcquireOutcome::Ready {
                image_index,
                suboptimal,
            } => {
                if suboptimal {
                    trace!("Suboptimal acquire on slot {}, deferring to present", slot);
                }
                image_index
            }
            AcquireOutcome::Stale => {
                debug!("Swapchain out of date at acquire (slot {})", slot);
                self.rebuild(host)?;
                return Ok(FrameReport::Skipped);
            }
        };

        self.phase = FramePhase::Recording;
        self.backend.reset_slot_fence(slot)?;
        self.backend.prepare_frame_data(image_index)?;
        self.backend.record(slot, image_index)?;

        self.phase = FramePhase::Submitting;
        self.backend.submit(slot)?;

        self.phase = FramePhase::Presenting;
        let presented = self.backend.present(slot, image_index)?;
        let resized = self.resize.take();

        let report = if presented.needs_rebuild() || resized {
            debug!(
                "Rebuilding after present: {:?}, resize pending: {}",
                presented, resized
            );
            self.rebuild(host)?;
            FrameReport::Rebuilt
        } else {
            FrameReport::Presented
        };

        self.current_frame = (slot + 1) % self.frames_in_flight;
        trace!("Frame on slot {} done ({:?})", slot, report);

        Ok(report)
    }

    /// Waits for a drawable area, drains the device and rebuilds the surface.
    ///
    /// Fails with [`RendererError::HostClosed`] if the host closes before
    /// the drawable area becomes non-zero.
    fn rebuild(&mut self, host: &mut impl SurfaceHost) -> RendererResult<()> {
        let (mut width, mut height) = host.drawable_size();
        while width == 0 || height == 0 {
            debug!("Drawable area is {}x{}, waiting for events", width, height);
            if !host.wait_events()? {
                return Err(RendererError::HostClosed);
            }
            (width, height) = host.drawable_size();
        }

        self.backend.wait_idle()?;
        self.backend
            .rebuild_surface(vk::Extent2D { width, height })?;
        self.resize.clear();
        self.rebuilds += 1;

        info!("Surface rebuilt at {}x{}", width, height);
        Ok(())
    }

    /// Waits for the device to finish all submitted work.
    ///
    /// Call before tearing down the backend.
    ///
    /// # Errors
    ///
    /// Returns the backend's error if the wait fails.
    pub fn shutdown(&mut self) -> RendererResult<()> {
        debug!("Draining device before shutdown");
        self.backend.wait_idle()
    }

    /// Slot the next cycle will use.
    #[inline]
    pub fn current_frame(&self) -> usize {
        self.current_frame
    }

    /// Number of frame slots.
    #[inline]
    pub fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    /// Current phase; [`FramePhase::Idle`] outside `run_frame`.
    #[inline]
    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    /// Number of surface rebuilds performed so far.
    #[inline]
    pub fn rebuild_count(&self) -> u64 {
        self.rebuilds
    }

    /// The resize signal consumed by this orchestrator.
    #[inline]
    pub fn resize_signal(&self) -> &ResizeSignal {
        &self.resize
    }

    /// The backend.
    #[inline]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// The backend, mutably.
    #[inline]
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Backend that succeeds at everything unless told to fail recording.
    #[derive(Default)]
    struct PhaseBackend {
        fail_record: bool,
    }

    impl FrameBackend for PhaseBackend {
        fn wait_for_slot(&mut self, _slot: usize) -> RendererResult<()> {
            Ok(())
        }
        fn acquire(&mut self, _slot: usize) -> RendererResult<AcquireOutcome> {
            Ok(AcquireOutcome::Ready {
                image_index: 0,
                suboptimal: false,
            })
        }
        fn reset_slot_fence(&mut self, _slot: usize) -> RendererResult<()> {
            Ok(())
        }
        fn prepare_frame_data(&mut self, _image_index: u32) -> RendererResult<()> {
            Ok(())
        }
        fn record(&mut self, _slot: usize, _image_index: u32) -> RendererResult<()> {
            if self.fail_record {
                return Err(RendererError::RecordingFailed {
                    operation: "vkEndCommandBuffer",
                    result: vk::Result::ERROR_OUT_OF_DEVICE_MEMORY,
                });
            }
            Ok(())
        }
        fn submit(&mut self, _slot: usize) -> RendererResult<()> {
            Ok(())
        }
        fn present(&mut self, _slot: usize, _image_index: u32) -> RendererResult<PresentOutcome> {
            Ok(PresentOutcome::Presented)
        }
        fn wait_idle(&mut self) -> RendererResult<()> {
            Ok(())
        }
        fn rebuild_surface(&mut self, _extent: vk::Extent2D) -> RendererResult<()> {
            Ok(())
        }
    }

    struct FixedHost;

    impl SurfaceHost for FixedHost {
        fn drawable_size(&mut self) -> (u32, u32) {
            (640, 480)
        }
        fn wait_events(&mut self) -> framepace_core::Result<bool> {
            Ok(true)
        }
    }

    #[test]
    fn test_index_wraps_after_frames_in_flight() {
        let mut orchestrator = FrameOrchestrator::new(PhaseBackend::default(), 3, ResizeSignal::new());
        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.push(orchestrator.current_frame());
            orchestrator.run_frame(&mut FixedHost).unwrap();
        }
        assert_eq!(seen, vec![0, 1, 2, 0, 1]);
        assert_eq!(orchestrator.current_frame(), 2);
    }

    #[test]
    fn test_zero_frames_in_flight_acts_as_one() {
        let mut orchestrator = FrameOrchestrator::new(PhaseBackend::default(), 0, ResizeSignal::new());
        assert_eq!(orchestrator.frames_in_flight(), 1);
        orchestrator.run_frame(&mut FixedHost).unwrap();
        assert_eq!(orchestrator.current_frame(), 0);
    }

    #[test]
    fn test_phase_is_idle_after_error() {
        let backend = PhaseBackend { fail_record: true };
        let mut orchestrator = FrameOrchestrator::new(backend, 3, ResizeSignal::new());

        let err = orchestrator.run_frame(&mut FixedHost).unwrap_err();
        assert!(matches!(err, RendererError::RecordingFailed { .. }));
        assert_eq!(orchestrator.phase(), FramePhase::Idle);
        assert_eq!(orchestrator.current_frame(), 0);
    }

    #[test]
    fn test_resize_signal_is_shared_with_host() {
        let resize = ResizeSignal::new();
        let mut orchestrator = FrameOrchestrator::new(PhaseBackend::default(), 2, resize.clone());

        resize.raise();
        assert!(orchestrator.resize_signal().is_raised());

        let report = orchestrator.run_frame(&mut FixedHost).unwrap();
        assert_eq!(report, FrameReport::Rebuilt);
        assert!(!resize.is_raised());
        assert_eq!(orchestrator.rebuild_count(), 1);
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(FramePhase::Idle.to_string(), "idle");
        assert_eq!(FramePhase::Presenting.to_string(), "presenting");
    }
}
