//! Shared-memory gate
//!
//! Multi-reader/single-writer coordination encoded directly in the head
//! nibble of a shared chunk; there is no separate lock table. State machine
//! of the head entry:
//!
//! ```text
//!             shared_read_open                shared_read_open
//!   closed(8) ----------------> R1(10) <---> R2..R5(11..14)
//!       ^                          |             shared_close decrements
//!       |        shared_close      |
//!       +--------------------------+
//!       |
//!       |  shared_write_open (only from closed)
//!       v
//!      W(9) --shared_close--> closed(8)
//! ```
//!
//! Every transition attempt is one atomic step inside a critical section.
//! On a busy state the caller yields and retries, so any runnable process
//! can make progress while a waiter loops; wake order is whatever the
//! scheduler picks. Transitions from invalid states are reported
//! diagnostics.

use crate::mem::MemError;
use crate::mem::drivers::{MemAddr, MemDriver};
use crate::mem::heap::{Heap, HeapCell};
use crate::mem::map::{CONTINUATION, FREE};
use crate::mem::strategies;
use crate::sched;

/// Shared chunk, nobody inside.
pub const SHARED_CLOSED: u8 = 0x8;
/// Shared chunk, writer inside.
pub const SHARED_WRITE_OPEN: u8 = 0x9;
/// Shared chunk, one reader inside; each further reader adds one.
pub const SHARED_READ_OPEN: u8 = 0xA;
/// Shared chunk at the reader cap (five readers).
pub const SHARED_READ_MAX: u8 = 0xE;

/// Outcome of one gate transition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GateStep {
    Opened(MemAddr),
    Busy,
    Fail(MemError),
}

// ============================================================================
// Public API
// ============================================================================

/// Allocate a shared chunk of `size` bytes.
///
/// The chunk starts closed, has no owning process and is never reclaimed by
/// process termination; it lives until [`shared_free`].
pub fn shared_alloc(heap: &HeapCell, size: u16) -> MemAddr {
    heap.with(|h| shared_alloc_in(h, size))
}

/// Release a shared chunk, waiting until every open handle is closed.
pub fn shared_free(heap: &HeapCell, addr: MemAddr) -> Result<(), MemError> {
    loop {
        let step = heap.with(|h| {
            if !h.contains_use_addr(addr) {
                log::error!("{} heap: shared free outside use area", h.name);
                return GateStep::Fail(MemError::OutOfRange);
            }
            let first = h.first_byte_of_chunk(addr);
            match h.map_entry(first) {
                SHARED_WRITE_OPEN..=SHARED_READ_MAX => GateStep::Busy,
                SHARED_CLOSED => {
                    let limit = h.use_limit() as u32;
                    h.set_map_entry(first, FREE);
                    let mut i = first as u32 + 1;
                    while i <= limit && h.map_entry(i as MemAddr) == CONTINUATION {
                        h.set_map_entry(i as MemAddr, FREE);
                        i += 1;
                    }
                    GateStep::Opened(first)
                }
                _ => {
                    log::error!("{} heap: shared free of a non-shared chunk", h.name);
                    GateStep::Fail(MemError::NotShared)
                }
            }
        });
        match step {
            GateStep::Opened(_) => return Ok(()),
            GateStep::Fail(e) => return Err(e),
            GateStep::Busy => sched::yield_now(),
        }
    }
}

/// Open a shared chunk for reading; waits while a writer is inside or the
/// reader cap is reached. Returns the chunk's first byte.
pub fn shared_read_open(heap: &HeapCell, addr: MemAddr) -> Result<MemAddr, MemError> {
    loop {
        match heap.with(|h| read_open_step(h, addr)) {
            GateStep::Opened(first) => return Ok(first),
            GateStep::Fail(e) => return Err(e),
            GateStep::Busy => sched::yield_now(),
        }
    }
}

/// Open a shared chunk for writing; waits until the chunk is closed.
/// Returns the chunk's first byte.
pub fn shared_write_open(heap: &HeapCell, addr: MemAddr) -> Result<MemAddr, MemError> {
    loop {
        match heap.with(|h| write_open_step(h, addr)) {
            GateStep::Opened(first) => return Ok(first),
            GateStep::Fail(e) => return Err(e),
            GateStep::Busy => sched::yield_now(),
        }
    }
}

/// Close one open handle of a shared chunk.
pub fn shared_close(heap: &HeapCell, addr: MemAddr) -> Result<(), MemError> {
    heap.with(|h| close_in(h, addr))
}

/// Read `buf.len()` bytes at `offset` into the shared chunk at `addr`.
///
/// Opens the chunk for reading, copies, and closes it again.
pub fn shared_read(
    heap: &HeapCell,
    addr: MemAddr,
    offset: u16,
    buf: &mut [u8],
) -> Result<(), MemError> {
    let first = shared_read_open(heap, addr)?;
    let (driver, size) = heap.with(|h| (h.driver, h.chunk_size(first)));
    if offset as u32 + buf.len() as u32 > size as u32 {
        log::error!("shared read beyond the chunk");
        let _ = shared_close(heap, first);
        return Err(MemError::TooSmall);
    }
    copy_out(driver, first + offset, buf);
    shared_close(heap, first)
}

/// Write `data` at `offset` into the shared chunk at `addr`.
///
/// Opens the chunk for writing, copies, and closes it again.
pub fn shared_write(
    heap: &HeapCell,
    addr: MemAddr,
    offset: u16,
    data: &[u8],
) -> Result<(), MemError> {
    let first = shared_write_open(heap, addr)?;
    let (driver, size) = heap.with(|h| (h.driver, h.chunk_size(first)));
    if offset as u32 + data.len() as u32 > size as u32 {
        log::error!("shared write beyond the chunk");
        let _ = shared_close(heap, first);
        return Err(MemError::TooSmall);
    }
    copy_in(driver, first + offset, data);
    shared_close(heap, first)
}

// The copies run outside the heap borrow: the gate state already guards the
// chunk, and each driver access is atomic on its own.

fn copy_out(driver: &'static dyn MemDriver, from: MemAddr, buf: &mut [u8]) {
    for (i, slot) in buf.iter_mut().enumerate() {
        *slot = driver.read(from + i as u16);
    }
}

fn copy_in(driver: &'static dyn MemDriver, to: MemAddr, data: &[u8]) {
    for (i, value) in data.iter().enumerate() {
        driver.write(to + i as u16, *value);
    }
}

// ============================================================================
// Gate steps
// ============================================================================

/// Allocate a shared chunk on an already-borrowed heap.
pub(crate) fn shared_alloc_in(heap: &mut Heap, size: u16) -> MemAddr {
    if size == 0 || size > heap.use_size {
        return 0;
    }
    let addr = strategies::select(heap, size);
    if addr == 0 {
        return 0;
    }
    debug_assert!(heap.contains_use_addr(addr));
    heap.set_map_entry(addr, SHARED_CLOSED);
    for i in 1..size {
        heap.set_map_entry(addr + i, CONTINUATION);
    }
    addr
}

pub(crate) fn read_open_step(heap: &mut Heap, addr: MemAddr) -> GateStep {
    if !heap.contains_use_addr(addr) {
        log::error!("{} heap: shared read open outside use area", heap.name);
        return GateStep::Fail(MemError::OutOfRange);
    }
    let first = heap.first_byte_of_chunk(addr);
    match heap.map_entry(first) {
        SHARED_CLOSED => {
            heap.set_map_entry(first, SHARED_READ_OPEN);
            GateStep::Opened(first)
        }
        state @ SHARED_READ_OPEN..SHARED_READ_MAX => {
            heap.set_map_entry(first, state + 1);
            GateStep::Opened(first)
        }
        SHARED_WRITE_OPEN | SHARED_READ_MAX => GateStep::Busy,
        _ => {
            log::error!("{} heap: shared read open of a non-shared chunk", heap.name);
            GateStep::Fail(MemError::NotShared)
        }
    }
}

pub(crate) fn write_open_step(heap: &mut Heap, addr: MemAddr) -> GateStep {
    if !heap.contains_use_addr(addr) {
        log::error!("{} heap: shared write open outside use area", heap.name);
        return GateStep::Fail(MemError::OutOfRange);
    }
    let first = heap.first_byte_of_chunk(addr);
    match heap.map_entry(first) {
        SHARED_CLOSED => {
            heap.set_map_entry(first, SHARED_WRITE_OPEN);
            GateStep::Opened(first)
        }
        SHARED_WRITE_OPEN..=SHARED_READ_MAX => GateStep::Busy,
        _ => {
            log::error!("{} heap: shared write open of a non-shared chunk", heap.name);
            GateStep::Fail(MemError::NotShared)
        }
    }
}

pub(crate) fn close_in(heap: &mut Heap, addr: MemAddr) -> Result<(), MemError> {
    if !heap.contains_use_addr(addr) {
        log::error!("{} heap: shared close outside use area", heap.name);
        return Err(MemError::OutOfRange);
    }
    let first = heap.first_byte_of_chunk(addr);
    match heap.map_entry(first) {
        SHARED_WRITE_OPEN | SHARED_READ_OPEN => {
            heap.set_map_entry(first, SHARED_CLOSED);
            Ok(())
        }
        state if state > SHARED_READ_OPEN && state <= SHARED_READ_MAX => {
            heap.set_map_entry(first, state - 1);
            Ok(())
        }
        SHARED_CLOSED => {
            log::error!("{} heap: shared close of a closed chunk", heap.name);
            Err(MemError::AlreadyClosed)
        }
        _ => {
            log::error!("{} heap: shared close of a non-shared chunk", heap.name);
            Err(MemError::NotShared)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem::testsupport::test_heap;

    #[test]
    fn shared_chunk_starts_closed_and_unowned() {
        let mut h = test_heap(64);
        let a = shared_alloc_in(&mut h, 8);
        assert_eq!(a, h.use_start);
        assert_eq!(h.map_entry(a), SHARED_CLOSED);
        assert_eq!(h.chunk_size(a), 8);
        // No allocation frame covers it.
        for frame in &h.frames {
            assert_eq!(*frame, crate::mem::heap::AllocFrame::EMPTY);
        }
    }

    #[test]
    fn readers_stack_up_to_five() {
        let mut h = test_heap(64);
        let a = shared_alloc_in(&mut h, 8);
        for expected in [0xA, 0xB, 0xC, 0xD, 0xE] {
            assert_eq!(read_open_step(&mut h, a), GateStep::Opened(a));
            assert_eq!(h.map_entry(a), expected);
        }
        // The sixth reader waits.
        assert_eq!(read_open_step(&mut h, a), GateStep::Busy);

        for expected in [0xD, 0xC, 0xB, 0xA, 0x8] {
            close_in(&mut h, a).unwrap();
            assert_eq!(h.map_entry(a), expected);
        }
    }

    #[test]
    fn writer_excludes_everyone() {
        let mut h = test_heap(64);
        let a = shared_alloc_in(&mut h, 8);
        assert_eq!(write_open_step(&mut h, a), GateStep::Opened(a));
        assert_eq!(h.map_entry(a), SHARED_WRITE_OPEN);
        assert_eq!(write_open_step(&mut h, a), GateStep::Busy);
        assert_eq!(read_open_step(&mut h, a), GateStep::Busy);

        close_in(&mut h, a).unwrap();
        assert_eq!(h.map_entry(a), SHARED_CLOSED);
        assert_eq!(read_open_step(&mut h, a), GateStep::Opened(a));
    }

    #[test]
    fn writer_must_wait_for_readers() {
        let mut h = test_heap(64);
        let a = shared_alloc_in(&mut h, 8);
        assert_eq!(read_open_step(&mut h, a), GateStep::Opened(a));
        assert_eq!(write_open_step(&mut h, a), GateStep::Busy);
        close_in(&mut h, a).unwrap();
        assert_eq!(write_open_step(&mut h, a), GateStep::Opened(a));
    }

    #[test]
    fn gate_rejects_private_and_free_chunks() {
        let mut h = test_heap(64);
        let private = h.alloc_for(2, 8);
        assert_eq!(
            read_open_step(&mut h, private),
            GateStep::Fail(MemError::NotShared)
        );
        let addr = h.use_start + 20;
        assert_eq!(
            write_open_step(&mut h, addr),
            GateStep::Fail(MemError::NotShared)
        );
        assert_eq!(close_in(&mut h, private), Err(MemError::NotShared));
    }

    #[test]
    fn close_of_a_closed_chunk_is_a_diagnostic() {
        let mut h = test_heap(64);
        let a = shared_alloc_in(&mut h, 8);
        assert_eq!(close_in(&mut h, a), Err(MemError::AlreadyClosed));
    }

    #[test]
    fn interior_addresses_resolve_to_the_head() {
        let mut h = test_heap(64);
        let a = shared_alloc_in(&mut h, 8);
        assert_eq!(read_open_step(&mut h, a + 5), GateStep::Opened(a));
        close_in(&mut h, a + 7).unwrap();
        assert_eq!(h.map_entry(a), SHARED_CLOSED);
    }

    #[test]
    fn private_free_rejects_shared_chunks() {
        // A shared chunk has no pid owner; freeing it privately must fail.
        let mut h = test_heap(64);
        let a = shared_alloc_in(&mut h, 8);
        assert_eq!(h.free_for(2, a), Err(crate::mem::MemError::NotOwner));
        assert_eq!(h.map_entry(a), SHARED_CLOSED);
    }
}
