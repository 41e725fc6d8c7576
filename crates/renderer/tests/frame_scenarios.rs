//! Frame pacing scenarios driven through scripted backend and host fakes.

use std::collections::VecDeque;

use ash::vk;
use framepace_platform::{ResizeSignal, SurfaceHost};
use framepace_renderer::{
    FrameBackend, FrameOrchestrator, FramePhase, FrameReport, RendererError, RendererResult,
};
use framepace_rhi::swapchain::{AcquireOutcome, PresentOutcome};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Call {
    Wait(usize),
    Acquire(usize),
    ResetFence(usize),
    Prepare(u32),
    Record(usize, u32),
    Submit(usize),
    Present(usize, u32),
    WaitIdle,
    Rebuild(u32, u32),
}

/// Backend whose GPU finishes a slot's work only when the CPU waits on it.
struct ScriptedBackend {
    calls: Vec<Call>,
    acquires: VecDeque<AcquireOutcome>,
    presents: VecDeque<PresentOutcome>,
    submit_error: Option<vk::Result>,
    image_count: u32,
    next_image: u32,
    pending: Vec<bool>,
    max_outstanding: usize,
}

impl ScriptedBackend {
    fn new(frames_in_flight: usize) -> Self {
        Self {
            calls: Vec::new(),
            acquires: VecDeque::new(),
            presents: VecDeque::new(),
            submit_error: None,
            image_count: 3,
            next_image: 0,
            pending: vec![false; frames_in_flight],
            max_outstanding: 0,
        }
    }

    fn count(&self, call: Call) -> usize {
        self.calls.iter().filter(|&&c| c == call).count()
    }

    fn waited_slots(&self) -> Vec<usize> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                Call::Wait(slot) => Some(*slot),
                _ => None,
            })
            .collect()
    }

    fn rebuilds(&self) -> Vec<Call> {
        self.calls
            .iter()
            .copied()
            .filter(|call| matches!(call, Call::Rebuild(..)))
            .collect()
    }
}

impl FrameBackend for ScriptedBackend {
    fn wait_for_slot(&mut self, slot: usize) -> RendererResult<()> {
        self.calls.push(Call::Wait(slot));
        self.pending[slot] = false;
        Ok(())
    }

    fn acquire(&mut self, slot: usize) -> RendererResult<AcquireOutcome> {
        self.calls.push(Call::Acquire(slot));
        Ok(self.acquires.pop_front().unwrap_or_else(|| {
            let image_index = self.next_image;
            self.next_image = (self.next_image + 1) % self.image_count;
            AcquireOutcome::Ready {
                image_index,
                suboptimal: false,
            }
        }))
    }

    fn reset_slot_fence(&mut self, slot: usize) -> RendererResult<()> {
        assert!(!self.pending[slot], "fence of slot {slot} reset while pending");
        self.calls.push(Call::ResetFence(slot));
        Ok(())
    }

    fn prepare_frame_data(&mut self, image_index: u32) -> RendererResult<()> {
        self.calls.push(Call::Prepare(image_index));
        Ok(())
    }

    fn record(&mut self, slot: usize, image_index: u32) -> RendererResult<()> {
        assert!(!self.pending[slot], "slot {slot} recorded while pending");
        self.calls.push(Call::Record(slot, image_index));
        Ok(())
    }

    fn submit(&mut self, slot: usize) -> RendererResult<()> {
        self.calls.push(Call::Submit(slot));
        if let Some(result) = self.submit_error {
            return Err(RendererError::SubmitFailed(result));
        }
        self.pending[slot] = true;
        let outstanding = self.pending.iter().filter(|&&p| p).count();
        self.max_outstanding = self.max_outstanding.max(outstanding);
        Ok(())
    }

    fn present(&mut self, slot: usize, image_index: u32) -> RendererResult<PresentOutcome> {
        self.calls.push(Call::Present(slot, image_index));
        Ok(self.presents.pop_front().unwrap_or(PresentOutcome::Presented))
    }

    fn wait_idle(&mut self) -> RendererResult<()> {
        self.calls.push(Call::WaitIdle);
        self.pending.iter_mut().for_each(|p| *p = false);
        Ok(())
    }

    fn rebuild_surface(&mut self, extent: vk::Extent2D) -> RendererResult<()> {
        assert!(
            self.pending.iter().all(|&p| !p),
            "surface rebuilt with work in flight"
        );
        self.calls.push(Call::Rebuild(extent.width, extent.height));
        Ok(())
    }
}

/// Host reporting scripted drawable sizes, then the last one forever.
struct ScriptedHost {
    sizes: VecDeque<(u32, u32)>,
    last: (u32, u32),
    polls: usize,
    waits: usize,
    /// Waits after which the host reports that it closed.
    close_after: Option<usize>,
}

impl ScriptedHost {
    fn fixed(width: u32, height: u32) -> Self {
        Self::scripted(&[], (width, height))
    }

    fn scripted(sizes: &[(u32, u32)], last: (u32, u32)) -> Self {
        Self {
            sizes: sizes.iter().copied().collect(),
            last,
            polls: 0,
            waits: 0,
            close_after: None,
        }
    }
}

impl SurfaceHost for ScriptedHost {
    fn drawable_size(&mut self) -> (u32, u32) {
        self.polls += 1;
        self.sizes.pop_front().unwrap_or(self.last)
    }

    fn wait_events(&mut self) -> framepace_core::Result<bool> {
        self.waits += 1;
        Ok(self.close_after.is_none_or(|limit| self.waits < limit))
    }
}

fn orchestrator(frames_in_flight: usize) -> FrameOrchestrator<ScriptedBackend> {
    FrameOrchestrator::new(
        ScriptedBackend::new(frames_in_flight),
        frames_in_flight,
        ResizeSignal::new(),
    )
}

#[test]
fn seven_cycles_rotate_through_three_slots() {
    let mut orchestrator = orchestrator(3);
    let mut host = ScriptedHost::fixed(800, 600);

    for _ in 0..7 {
        let report = orchestrator.run_frame(&mut host).unwrap();
        assert_eq!(report, FrameReport::Presented);
    }

    assert_eq!(orchestrator.current_frame(), 1);

    let backend = orchestrator.backend();
    assert_eq!(backend.waited_slots(), vec![0, 1, 2, 0, 1, 2, 0]);
    assert_eq!(backend.count(Call::Wait(0)), 3);
    assert_eq!(backend.count(Call::ResetFence(0)), 3);
    assert_eq!(backend.count(Call::Wait(1)), 2);
    assert_eq!(backend.count(Call::ResetFence(2)), 2);
    assert!(backend.rebuilds().is_empty());
}

#[test]
fn cycle_steps_run_in_protocol_order() {
    let mut orchestrator = orchestrator(3);
    orchestrator.run_frame(&mut ScriptedHost::fixed(800, 600)).unwrap();

    assert_eq!(
        orchestrator.backend().calls,
        vec![
            Call::Wait(0),
            Call::Acquire(0),
            Call::ResetFence(0),
            Call::Prepare(0),
            Call::Record(0, 0),
            Call::Submit(0),
            Call::Present(0, 0),
        ]
    );
}

#[test]
fn frame_data_is_keyed_by_acquired_image() {
    let mut orchestrator = orchestrator(3);
    orchestrator
        .backend_mut()
        .acquires
        .push_back(AcquireOutcome::Ready {
            image_index: 2,
            suboptimal: false,
        });

    orchestrator.run_frame(&mut ScriptedHost::fixed(800, 600)).unwrap();

    let backend = orchestrator.backend();
    assert_eq!(backend.count(Call::Prepare(2)), 1);
    assert_eq!(backend.count(Call::Record(0, 2)), 1);
    assert_eq!(backend.count(Call::Present(0, 2)), 1);
}

#[test]
fn stale_acquire_rebuilds_before_drawing_and_keeps_the_index() {
    let mut orchestrator = orchestrator(3);
    let mut host = ScriptedHost::fixed(1024, 768);

    for _ in 0..3 {
        orchestrator.run_frame(&mut host).unwrap();
    }
    let index_entering = orchestrator.current_frame();
    let calls_before = orchestrator.backend().calls.len();

    orchestrator
        .backend_mut()
        .acquires
        .push_back(AcquireOutcome::Stale);
    let report = orchestrator.run_frame(&mut host).unwrap();

    assert_eq!(report, FrameReport::Skipped);
    assert_eq!(orchestrator.current_frame(), index_entering);
    assert_eq!(
        orchestrator.backend().calls[calls_before..],
        [
            Call::Wait(0),
            Call::Acquire(0),
            Call::WaitIdle,
            Call::Rebuild(1024, 768),
        ]
    );

    // The next cycle retries the same slot
    orchestrator.run_frame(&mut host).unwrap();
    assert_eq!(orchestrator.current_frame(), 1);
}

#[test]
fn rebuild_waits_out_a_minimized_window() {
    let mut orchestrator = orchestrator(3);
    orchestrator
        .backend_mut()
        .presents
        .push_back(PresentOutcome::Stale);
    let mut host = ScriptedHost::scripted(&[(0, 0), (0, 0)], (800, 600));

    let report = orchestrator.run_frame(&mut host).unwrap();

    assert_eq!(report, FrameReport::Rebuilt);
    assert_eq!(host.polls, 3);
    assert_eq!(host.waits, 2);
    assert_eq!(orchestrator.backend().rebuilds(), vec![Call::Rebuild(800, 600)]);
}

#[test]
fn closing_while_minimized_ends_the_rebuild() {
    let mut orchestrator = orchestrator(3);
    orchestrator
        .backend_mut()
        .presents
        .push_back(PresentOutcome::Stale);
    let mut host = ScriptedHost::fixed(0, 0);
    host.close_after = Some(2);

    let err = orchestrator.run_frame(&mut host).unwrap_err();

    assert!(matches!(err, RendererError::HostClosed));
    assert_eq!(host.waits, 2);
    assert_eq!(orchestrator.phase(), FramePhase::Idle);
    assert_eq!(orchestrator.current_frame(), 0);
    let backend = orchestrator.backend();
    assert!(backend.rebuilds().is_empty());
    assert_eq!(backend.count(Call::WaitIdle), 0);
}

#[test]
fn one_zero_dimension_is_enough_to_wait() {
    let mut orchestrator = orchestrator(2);
    orchestrator
        .backend_mut()
        .acquires
        .push_back(AcquireOutcome::Stale);
    let mut host = ScriptedHost::scripted(&[(800, 0), (0, 600)], (640, 480));

    orchestrator.run_frame(&mut host).unwrap();

    assert_eq!(host.waits, 2);
    assert_eq!(orchestrator.backend().rebuilds(), vec![Call::Rebuild(640, 480)]);
}

#[test]
fn suboptimal_present_with_pending_resize_rebuilds_once() {
    let resize = ResizeSignal::new();
    let mut orchestrator = FrameOrchestrator::new(ScriptedBackend::new(3), 3, resize.clone());
    orchestrator
        .backend_mut()
        .presents
        .push_back(PresentOutcome::Suboptimal);
    resize.raise();

    let report = orchestrator.run_frame(&mut ScriptedHost::fixed(800, 600)).unwrap();

    assert_eq!(report, FrameReport::Rebuilt);
    assert_eq!(orchestrator.backend().rebuilds().len(), 1);
    assert_eq!(orchestrator.backend().count(Call::WaitIdle), 1);
    assert!(!resize.is_raised());
    assert_eq!(orchestrator.current_frame(), 1);
}

#[test]
fn suboptimal_acquire_alone_does_not_rebuild() {
    let mut orchestrator = orchestrator(3);
    orchestrator
        .backend_mut()
        .acquires
        .push_back(AcquireOutcome::Ready {
            image_index: 1,
            suboptimal: true,
        });

    let report = orchestrator.run_frame(&mut ScriptedHost::fixed(800, 600)).unwrap();

    assert_eq!(report, FrameReport::Presented);
    assert_eq!(orchestrator.backend().count(Call::Present(0, 1)), 1);
    assert!(orchestrator.backend().rebuilds().is_empty());
    assert_eq!(orchestrator.current_frame(), 1);
}

#[test]
fn suboptimal_acquire_rebuilds_when_present_agrees() {
    let mut orchestrator = orchestrator(3);
    {
        let backend = orchestrator.backend_mut();
        backend.acquires.push_back(AcquireOutcome::Ready {
            image_index: 1,
            suboptimal: true,
        });
        backend.presents.push_back(PresentOutcome::Suboptimal);
    }

    let report = orchestrator.run_frame(&mut ScriptedHost::fixed(800, 600)).unwrap();

    assert_eq!(report, FrameReport::Rebuilt);
    let calls = &orchestrator.backend().calls;
    let present = calls.iter().position(|&c| c == Call::Present(0, 1)).unwrap();
    let rebuild = calls.iter().position(|&c| c == Call::Rebuild(800, 600)).unwrap();
    assert!(present < rebuild);
    assert_eq!(orchestrator.backend().rebuilds().len(), 1);
}

#[test]
fn every_rebuild_follows_a_device_idle_wait() {
    let mut orchestrator = orchestrator(3);
    {
        let backend = orchestrator.backend_mut();
        backend.acquires.extend([
            AcquireOutcome::Stale,
            AcquireOutcome::Ready {
                image_index: 0,
                suboptimal: false,
            },
        ]);
        backend.presents.push_back(PresentOutcome::Stale);
    }
    let mut host = ScriptedHost::fixed(800, 600);

    for _ in 0..4 {
        orchestrator.run_frame(&mut host).unwrap();
    }

    let calls = &orchestrator.backend().calls;
    let mut rebuilds = 0;
    for (i, call) in calls.iter().enumerate() {
        if matches!(call, Call::Rebuild(..)) {
            assert_eq!(calls[i - 1], Call::WaitIdle);
            rebuilds += 1;
        }
    }
    assert_eq!(rebuilds, 2);
    assert_eq!(orchestrator.rebuild_count(), 2);
}

#[test]
fn outstanding_submissions_never_exceed_frames_in_flight() {
    for frames_in_flight in 1..=4 {
        let mut orchestrator = orchestrator(frames_in_flight);
        let mut host = ScriptedHost::fixed(800, 600);

        for _ in 0..25 {
            orchestrator.run_frame(&mut host).unwrap();
        }

        assert_eq!(orchestrator.backend().max_outstanding, frames_in_flight);
    }
}

#[test]
fn frame_index_counts_only_completed_cycles() {
    let mut orchestrator = orchestrator(3);
    {
        let backend = orchestrator.backend_mut();
        for i in 0..10u32 {
            if i % 4 == 1 {
                backend.acquires.push_back(AcquireOutcome::Stale);
            } else {
                backend.acquires.push_back(AcquireOutcome::Ready {
                    image_index: i % 3,
                    suboptimal: false,
                });
            }
        }
    }
    let mut host = ScriptedHost::fixed(800, 600);

    let mut completed = 0;
    for _ in 0..10 {
        if orchestrator.run_frame(&mut host).unwrap() != FrameReport::Skipped {
            completed += 1;
        }
    }

    assert_eq!(completed, 7);
    assert_eq!(orchestrator.current_frame(), completed % 3);
}

#[test]
fn submit_failure_is_fatal_and_nothing_is_presented() {
    let mut orchestrator = orchestrator(3);
    orchestrator.backend_mut().submit_error = Some(vk::Result::ERROR_DEVICE_LOST);

    let err = orchestrator
        .run_frame(&mut ScriptedHost::fixed(800, 600))
        .unwrap_err();

    assert!(matches!(
        err,
        RendererError::SubmitFailed(vk::Result::ERROR_DEVICE_LOST)
    ));
    assert!(err.to_string().contains("submit"));
    assert_eq!(orchestrator.phase(), FramePhase::Idle);
    assert_eq!(orchestrator.current_frame(), 0);
    assert!(
        !orchestrator
            .backend()
            .calls
            .iter()
            .any(|call| matches!(call, Call::Present(..)))
    );
}

#[test]
fn shutdown_drains_the_device() {
    let mut orchestrator = orchestrator(3);
    orchestrator.run_frame(&mut ScriptedHost::fixed(800, 600)).unwrap();

    orchestrator.shutdown().unwrap();

    assert_eq!(orchestrator.backend().calls.last(), Some(&Call::WaitIdle));
}
