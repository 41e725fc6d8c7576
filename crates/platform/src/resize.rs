//! Resize notification shared between the window callbacks and the frame loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A single-consumer "drawable area changed" flag.
///
/// Clones share the same flag. The window event handler raises it; the frame
/// orchestrator is the only party that consumes or clears it.
#[derive(Clone, Debug, Default)]
pub struct ResizeSignal {
    pending: Arc<AtomicBool>,
}

impl ResizeSignal {
    /// Create a lowered signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the drawable area as changed.
    pub fn raise(&self) {
        self.pending.store(true, Ordering::Release);
    }

    /// Returns whether a resize is pending without consuming it.
    pub fn is_raised(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Consume the pending flag, returning whether it was set.
    pub fn take(&self) -> bool {
        self.pending.swap(false, Ordering::AcqRel)
    }

    /// Lower the flag after the surface has been rebuilt.
    pub fn clear(&self) {
        self.pending.store(false, Ordering::Release);
    }
}
