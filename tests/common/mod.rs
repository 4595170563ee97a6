//! Shared plumbing for the kernel integration tests.
//!
//! The kernel is process-global state, so every test boots it fresh and
//! holds a lock for its whole duration; the green stacks of one test must
//! never interleave with another's.

use std::sync::{Mutex, MutexGuard, OnceLock};

use mame::sched::{self, Program};

pub struct Kernel {
    _guard: MutexGuard<'static, ()>,
}

/// Boot a fresh kernel with the given auto-start programs and keep it
/// exclusive until the returned handle drops.
pub fn boot(autostart: &[Program]) -> Kernel {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let guard = LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poison| poison.into_inner());
    let _ = env_logger::builder().is_test(true).try_init();

    sched::init(autostart);
    mame::mem::init_heaps();
    sched::start();
    Kernel { _guard: guard }
}

/// Count non-free map entries over a heap's whole use area.
pub fn occupied_entries(heap: &'static mame::mem::HeapCell) -> u32 {
    let start = mame::mem::use_start(heap);
    let mut occupied = 0;
    for offset in 0..mame::mem::use_size(heap) {
        if mame::mem::map_entry(heap, start + offset) != 0 {
            occupied += 1;
        }
    }
    occupied
}
