//! Scheduler timer source
//!
//! Emulates the periodic compare-match interrupt that drives preemption.
//! `fire()` is the interrupt entry: while any critical section is open the
//! source is masked and the firing is latched; the latched firing is
//! delivered when the last critical section is left, the same way a latched
//! compare-match flag re-raises the interrupt once it is unmasked again.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::sched;

/// Compare-match interrupt enable. Cleared while a critical section is open.
static ENABLED: AtomicBool = AtomicBool::new(false);

/// Latched firing waiting for the source to be unmasked.
static PENDING: AtomicBool = AtomicBool::new(false);

/// Monotonic tick counter, masked or not.
static TICKS: AtomicU32 = AtomicU32::new(0);

/// Deliver one timer tick.
///
/// Runs the scheduler immediately when the source is enabled; otherwise the
/// firing is latched and delivered by the closing of the outermost critical
/// section.
pub fn fire() {
    TICKS.fetch_add(1, Ordering::Relaxed);
    if ENABLED.load(Ordering::Relaxed) {
        sched::tick();
    } else {
        PENDING.store(true, Ordering::Relaxed);
    }
}

/// Whether the compare-match source is currently enabled.
pub fn is_enabled() -> bool {
    ENABLED.load(Ordering::Relaxed)
}

/// Ticks fired since boot (including masked ones).
pub fn ticks() -> u32 {
    TICKS.load(Ordering::Relaxed)
}

/// Mask the compare-match source. Called on every critical-section entry.
pub(crate) fn mask() {
    ENABLED.store(false, Ordering::Relaxed);
}

/// Unmask the source and deliver a latched firing, if any.
///
/// Called when the critical-section depth returns to zero. The delivered
/// tick may switch away from the caller; execution continues here once the
/// scheduler picks the caller again.
pub(crate) fn unmask() {
    ENABLED.store(true, Ordering::Relaxed);
    if PENDING.swap(false, Ordering::Relaxed) {
        sched::tick();
    }
}

/// Reset the source to its boot state (masked, no latch).
pub(crate) fn reset() {
    ENABLED.store(false, Ordering::Relaxed);
    PENDING.store(false, Ordering::Relaxed);
    TICKS.store(0, Ordering::Relaxed);
}
