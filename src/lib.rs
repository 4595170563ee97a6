//! mame -- a slot-based preemptive multitasking kernel
//!
//! Three cooperating cores on a fixed pool of statically allocated process
//! slots:
//!
//!   - a preemptive scheduler driven by a periodic timer source, with six
//!     interchangeable strategies including a four-level feedback queue,
//!   - a two-tier heap manager (internal RAM plus an external serial SRAM
//!     behind a byte-exchange bus) over a nibble-packed allocation map, with
//!     four fit strategies, in-place reallocation and per-process
//!     reclamation on termination,
//!   - a shared-memory layer granting multi-reader/single-writer access
//!     through states encoded in the same allocation map.
//!
//! The cores are inseparable: the shared-memory gate waits by yielding to
//! the scheduler, and killing a process reclaims its chunks on every heap.
//!
//! Getting started:
//!
//! ```no_run
//! fn worker() {
//!     let chunk = mame::mem::alloc(&mame::mem::INT_HEAP, 64);
//!     if chunk != 0 {
//!         // ... use the chunk, yield now and then ...
//!         mame::mem::free(&mame::mem::INT_HEAP, chunk).unwrap();
//!     }
//! }
//!
//! mame::sched::init(&[worker]);
//! mame::mem::init_heaps();
//! mame::sched::start();
//! mame::sched::run_until_idle();
//! ```

#![cfg_attr(not(test), no_std)]

pub mod arch;
pub mod config;
pub mod error;
pub mod mem;
pub mod rng;
pub mod sched;
pub mod timer;

#[cfg(test)]
pub(crate) mod testutil {
    use std::sync::{Mutex, MutexGuard, OnceLock};

    /// Serializes unit tests that touch kernel-global state.
    pub fn kernel_lock() -> MutexGuard<'static, ()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(()))
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }
}
