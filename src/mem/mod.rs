//! Two-tier heap manager
//!
//! Private and shared allocation on top of the nibble-packed allocation map,
//! with four fit strategies, in-place reallocation and per-process
//! reclamation on termination. Submodules:
//!
//!   bus        -- serial SRAM device + byte-exchange bus emulation
//!   drivers    -- uniform byte access to the two memory media
//!   heap       -- heap descriptors and the heap list
//!   map        -- 4-bit allocation map codec
//!   strategies -- first/next/best/worst fit
//!   shared     -- multi-reader/single-writer shared-memory gate
//!
//! Every public operation runs inside a kernel critical section; ownership
//! is bound to the calling process.

pub mod bus;
pub mod drivers;
pub mod heap;
pub mod map;
pub mod shared;
pub mod strategies;

use crate::config::N_SLOTS;
use crate::sched::{self, Pid};

pub use drivers::{MemAddr, MemDriver, MemValue};
pub use heap::{EXT_HEAP, HeapCell, INT_HEAP, heap_list_length, heap_name, init_heaps,
    lookup_heap, lookup_heap_index};
pub use shared::{shared_alloc, shared_close, shared_free, shared_read, shared_read_open,
    shared_write, shared_write_open};
pub use strategies::AllocStrategy;

use heap::{AllocFrame, Heap};
use map::{CONTINUATION, FREE};

// ============================================================================
// Errors
// ============================================================================

/// Diagnostic failure of a heap operation. The heap is left unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemError {
    /// Address outside the heap's use area.
    OutOfRange,
    /// The chunk does not belong to the calling process.
    NotOwner,
    /// The address does not name a shared chunk.
    NotShared,
    /// Close of a shared chunk that is not open.
    AlreadyClosed,
    /// Access beyond the end of a shared chunk.
    TooSmall,
}

impl core::fmt::Display for MemError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            MemError::OutOfRange => write!(f, "address outside the use area"),
            MemError::NotOwner => write!(f, "chunk belongs to another process"),
            MemError::NotShared => write!(f, "not a shared chunk"),
            MemError::AlreadyClosed => write!(f, "shared chunk already closed"),
            MemError::TooSmall => write!(f, "access beyond the chunk"),
        }
    }
}

// ============================================================================
// Public API
// ============================================================================

/// Allocate `size` bytes of private memory for the calling process.
///
/// Returns the first use-area address of the new chunk, or 0 when `size` is
/// zero, exceeds the use area, or no free run fits.
pub fn alloc(heap: &HeapCell, size: u16) -> MemAddr {
    let owner = sched::current_process();
    heap.with(|h| h.alloc_for(owner, size))
}

/// Release a private chunk of the calling process.
pub fn free(heap: &HeapCell, addr: MemAddr) -> Result<(), MemError> {
    let owner = sched::current_process();
    heap.with(|h| h.free_for(owner, addr))
}

/// Resize a private chunk of the calling process.
///
/// Shrinks in place; grows in place when free space follows the chunk;
/// otherwise slides the chunk backward into adjacent free space or moves it
/// to a freshly allocated chunk. Returns the (possibly new) chunk head, or 0
/// when nothing fits.
pub fn realloc(heap: &HeapCell, addr: MemAddr, new_size: u16) -> MemAddr {
    let owner = sched::current_process();
    heap.with(|h| h.realloc_for(owner, addr, new_size))
}

/// Release every chunk owned by `pid` on this heap.
///
/// Invoked by process termination; shared chunks have no owner and are left
/// alone.
pub fn free_process_memory(heap: &HeapCell, pid: Pid) {
    heap.with(|h| h.free_process_chunks(pid));
}

/// Size of the heap's allocation map in bytes.
pub fn map_size(heap: &HeapCell) -> u16 {
    heap.with(|h| h.map_size)
}

/// Size of the heap's use area in bytes.
pub fn use_size(heap: &HeapCell) -> u16 {
    heap.with(|h| h.use_size)
}

/// First address of the heap's allocation map.
pub fn map_start(heap: &HeapCell) -> MemAddr {
    heap.with(|h| h.map_start)
}

/// First address of the heap's use area.
pub fn use_start(heap: &HeapCell) -> MemAddr {
    heap.with(|h| h.use_start)
}

/// Size of the chunk containing `addr`; 0 for a free byte.
pub fn chunk_size(heap: &HeapCell, addr: MemAddr) -> u16 {
    heap.with(|h| if h.contains_use_addr(addr) { h.chunk_size(addr) } else { 0 })
}

/// Raw map entry associated with use-area byte `addr`.
pub fn map_entry(heap: &HeapCell, addr: MemAddr) -> MemValue {
    heap.with(|h| if h.contains_use_addr(addr) { h.map_entry(addr) } else { 0 })
}

/// Read one use-area byte.
///
/// The hosted counterpart of dereferencing an allocated address; reads
/// outside the use area answer 0.
pub fn read_byte(heap: &HeapCell, addr: MemAddr) -> MemValue {
    heap.with(|h| if h.contains_use_addr(addr) { h.driver.read(addr) } else { 0 })
}

/// Write one use-area byte.
///
/// The hosted counterpart of storing through an allocated address; writes
/// outside the use area are reported and dropped.
pub fn write_byte(heap: &HeapCell, addr: MemAddr, value: MemValue) {
    heap.with(|h| {
        if h.contains_use_addr(addr) {
            h.driver.write(addr, value);
        } else {
            log::error!("{} heap: byte write outside use area ({:#06x})", h.name, addr);
        }
    });
}

/// Switch the heap's fit strategy.
pub fn set_allocation_strategy(heap: &HeapCell, strategy: AllocStrategy) {
    heap.with(|h| h.strategy = strategy);
}

/// Current fit strategy of the heap.
pub fn get_allocation_strategy(heap: &HeapCell) -> AllocStrategy {
    heap.with(|h| h.strategy)
}

// ============================================================================
// Owner-explicit internals
// ============================================================================

impl Heap {
    /// Allocate a private chunk for `owner`.
    ///
    /// The idle slot cannot own private memory: its id is the map entry for
    /// "free", so such a request is refused.
    pub(crate) fn alloc_for(&mut self, owner: Pid, size: u16) -> MemAddr {
        if size == 0 || size > self.use_size {
            return 0;
        }
        if owner == 0 || owner as usize >= N_SLOTS {
            log::error!("{} heap: allocation for invalid owner {}", self.name, owner);
            return 0;
        }
        let addr = strategies::select(self, size);
        if addr == 0 {
            return 0;
        }
        debug_assert!(self.contains_use_addr(addr));
        self.widen_frame(owner, addr);
        self.set_map_entry(addr, owner);
        for i in 1..size {
            self.set_map_entry(addr + i, CONTINUATION);
        }
        addr
    }

    /// Release the chunk containing `addr`, checking it belongs to `owner`.
    pub(crate) fn free_for(&mut self, owner: Pid, addr: MemAddr) -> Result<(), MemError> {
        if !self.contains_use_addr(addr) {
            log::error!("{} heap: free outside use area ({:#06x})", self.name, addr);
            return Err(MemError::OutOfRange);
        }
        let first = self.first_byte_of_chunk(addr);
        if self.map_entry(first) != owner {
            log::error!(
                "{} heap: process {} releasing foreign chunk at {:#06x}",
                self.name,
                owner,
                first
            );
            return Err(MemError::NotOwner);
        }
        let limit = self.use_limit() as u32;
        let mut i = first as u32;
        self.set_map_entry(first, FREE);
        i += 1;
        while i <= limit && self.map_entry(i as MemAddr) == CONTINUATION {
            self.set_map_entry(i as MemAddr, FREE);
            i += 1;
        }
        self.shrink_frame(owner, first);
        Ok(())
    }

    /// Resize the chunk containing `addr` to `new_size` bytes for `owner`.
    pub(crate) fn realloc_for(&mut self, owner: Pid, addr: MemAddr, new_size: u16) -> MemAddr {
        if !self.contains_use_addr(addr) {
            log::error!("{} heap: realloc outside use area ({:#06x})", self.name, addr);
            return 0;
        }
        if self.map_entry(addr) == FREE {
            return 0;
        }
        if self.chunk_owner(addr) != owner {
            log::error!("{} heap: process {} resizing foreign chunk", self.name, owner);
            return 0;
        }
        if new_size == 0 {
            log::error!("{} heap: realloc to zero", self.name);
            return 0;
        }

        let first = self.first_byte_of_chunk(addr);
        let old_size = self.chunk_size(first);
        let limit = self.use_limit() as u32;

        if new_size <= old_size {
            // Trim in place.
            for i in new_size..old_size {
                self.set_map_entry(first + i, FREE);
            }
            return first;
        }

        // Count free bytes immediately after the chunk.
        let mut behind: u32 = 0;
        let mut i = first as u32 + old_size as u32;
        while i <= limit && self.map_entry(i as MemAddr) == FREE {
            behind += 1;
            i += 1;
        }
        if new_size as u32 <= old_size as u32 + behind {
            // Extend in place.
            for i in old_size..new_size {
                self.set_map_entry(first + i, CONTINUATION);
            }
            return first;
        }

        // Add free bytes immediately before the chunk.
        let mut front: u32 = 0;
        let mut i = first as i32 - 1;
        while i >= self.use_start as i32 && self.map_entry(i as MemAddr) == FREE {
            front += 1;
            i -= 1;
        }
        if new_size as u32 <= old_size as u32 + behind + front {
            // Slide backward into the leading free run.
            let new_first = first - front as u16;
            self.move_chunk(first, old_size, new_first);
            self.set_map_entry(new_first, owner);
            for i in 1..new_size {
                self.set_map_entry(new_first + i, CONTINUATION);
            }
            let mut i = new_first as u32 + new_size as u32;
            while i < first as u32 + old_size as u32 {
                self.set_map_entry(i as MemAddr, FREE);
                i += 1;
            }
            self.widen_frame(owner, new_first);
            return new_first;
        }

        // Relocate to a fresh chunk.
        let new_first = self.alloc_for(owner, new_size);
        if new_first == 0 {
            return 0;
        }
        self.move_chunk(first, old_size, new_first);
        let _ = self.free_for(owner, first);
        new_first
    }

    /// Copy `len` use-area bytes from `old_first` to `new_first`.
    ///
    /// Regions may overlap only when sliding backward (`new_first` below
    /// `old_first`); the ascending copy keeps that case safe.
    fn move_chunk(&mut self, old_first: MemAddr, len: u16, new_first: MemAddr) {
        for i in 0..len {
            let value = self.driver.read(old_first + i);
            self.driver.write(new_first + i, value);
        }
    }

    /// Release every chunk owned by `pid`, scanning only the pid's
    /// allocation frame.
    pub(crate) fn free_process_chunks(&mut self, pid: Pid) {
        if pid == 0 || pid as usize >= N_SLOTS {
            return;
        }
        let mut i = self.frames[pid as usize].lo as u32;
        while i <= self.frames[pid as usize].hi as u32 {
            if self.map_entry(i as MemAddr) == pid {
                let _ = self.free_for(pid, i as MemAddr);
            }
            i += 1;
        }
    }

    /// Widen the pid's allocation frame to cover a new chunk head.
    pub(crate) fn widen_frame(&mut self, pid: Pid, first: MemAddr) {
        let frame = &mut self.frames[pid as usize];
        if first < frame.lo {
            frame.lo = first;
        }
        if first > frame.hi {
            frame.hi = first;
        }
    }

    /// Shrink the pid's allocation frame after the chunk at `first` was
    /// freed: when the chunk sat at an edge, scan toward the interior for
    /// the next chunk head; when none remains, reset to the empty sentinel.
    fn shrink_frame(&mut self, pid: Pid, first: MemAddr) {
        let frame = self.frames[pid as usize];
        if first <= frame.lo {
            let mut found = false;
            let mut i = first as u32;
            while i <= frame.hi as u32 {
                if self.map_entry(i as MemAddr) == pid {
                    self.frames[pid as usize].lo = i as MemAddr;
                    found = true;
                    break;
                }
                i += 1;
            }
            if found {
                return;
            }
            self.frames[pid as usize].lo = AllocFrame::EMPTY.lo;
        }
        let frame = self.frames[pid as usize];
        if first >= frame.hi {
            let mut i = first as i32;
            while i >= frame.lo as i32 {
                if self.map_entry(i as MemAddr) == pid {
                    self.frames[pid as usize].hi = i as MemAddr;
                    return;
                }
                i -= 1;
            }
            self.frames[pid as usize].hi = AllocFrame::EMPTY.hi;
        }
    }
}

// ============================================================================
// Test support
// ============================================================================


#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::heap::AllocFrame;
    use super::map::FREE;
    use super::testsupport::{map_image, test_heap, use_image};
    use super::*;

    // ------------------------------------------------------------------
    // Allocation and release
    // ------------------------------------------------------------------

    #[test]
    fn full_size_alloc_round_trip() {
        // Allocate the whole use area as process 2, then free it: the head
        // map byte reads (pid << 4) | 0xF, every later byte 0xFF, and the
        // release returns the map to all zeroes.
        let mut h = test_heap(64);
        let use_size = h.use_size;
        let addr = h.alloc_for(2, use_size);
        assert_eq!(addr, h.use_start);

        let image = map_image(&h);
        assert_eq!(image[0], 0x2F);
        assert!(image[1..].iter().all(|&b| b == 0xFF));

        h.free_for(2, addr).unwrap();
        assert!(map_image(&h).iter().all(|&b| b == 0));
    }

    #[test]
    fn alloc_rejects_degenerate_sizes() {
        let mut h = test_heap(64);
        assert_eq!(h.alloc_for(2, 0), 0);
        assert_eq!(h.alloc_for(2, h.use_size + 1), 0);
        assert_eq!(h.alloc_for(0, 8), 0, "the idle slot cannot own memory");
    }

    #[test]
    fn alloc_never_returns_zero_as_an_address() {
        let mut h = test_heap(64);
        for _ in 0..8 {
            let a = h.alloc_for(3, 8);
            assert_ne!(a, 0);
            assert!(a >= h.use_start);
        }
        assert_eq!(h.alloc_for(3, 8), 0);
    }

    #[test]
    fn hand_crafted_chunk_at_the_top_is_freed_exactly() {
        // Build a chunk by hand in the last SIZE use bytes, fill those bytes
        // with 0xFF, then free it: the map tail returns to zero while the
        // use bytes stay untouched.
        const SIZE: u16 = 16;
        let mut h = test_heap(64);
        let use_addr = h.use_start + h.use_size - SIZE;

        h.driver.write(h.map_start + h.map_size - SIZE / 2, 0x2F);
        for i in 0..(SIZE / 2 - 1) {
            h.driver.write(h.map_start + h.map_size - SIZE / 2 + 1 + i, 0xFF);
        }
        for i in 0..SIZE {
            h.driver.write(use_addr + i, 0xFF);
        }
        h.frames[2] = AllocFrame { lo: use_addr, hi: use_addr };

        h.free_for(2, use_addr).unwrap();

        let map = map_image(&h);
        let tail = h.map_size - SIZE / 2;
        assert!(map[..tail as usize].iter().all(|&b| b == 0));
        assert!(map[tail as usize..].iter().all(|&b| b == 0));
        let used = use_image(&h);
        assert!(used[(h.use_size - SIZE) as usize..].iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn free_of_a_foreign_chunk_changes_nothing() {
        let mut h = test_heap(64);
        let addr = h.alloc_for(2, 8);
        let before = map_image(&h);
        assert_eq!(h.free_for(3, addr), Err(MemError::NotOwner));
        assert_eq!(map_image(&h), before);
    }

    #[test]
    fn double_free_is_rejected() {
        let mut h = test_heap(64);
        let addr = h.alloc_for(2, 8);
        h.free_for(2, addr).unwrap();
        assert_eq!(h.free_for(2, addr), Err(MemError::NotOwner));
        assert!(map_image(&h).iter().all(|&b| b == 0));
    }

    #[test]
    fn free_outside_the_use_area_is_rejected() {
        let mut h = test_heap(64);
        assert_eq!(h.free_for(2, h.use_start - 1), Err(MemError::OutOfRange));
        assert_eq!(h.free_for(2, h.use_limit() + 1), Err(MemError::OutOfRange));
    }

    #[test]
    fn free_via_an_interior_address() {
        let mut h = test_heap(64);
        let addr = h.alloc_for(2, 8);
        h.free_for(2, addr + 5).unwrap();
        assert!(map_image(&h).iter().all(|&b| b == 0));
    }

    #[test]
    fn freeing_one_chunk_leaves_the_neighbours_alone() {
        let mut h = test_heap(64);
        let a = h.alloc_for(2, 8);
        let b = h.alloc_for(2, 8);
        let c = h.alloc_for(2, 8);
        h.free_for(2, b).unwrap();
        assert_eq!(h.chunk_size(a), 8);
        assert_eq!(h.chunk_size(c), 8);
        assert_eq!(h.map_entry(b), FREE);
    }

    // ------------------------------------------------------------------
    // Allocation frames
    // ------------------------------------------------------------------

    #[test]
    fn frame_tracks_the_outermost_chunks() {
        let mut h = test_heap(64);
        let a = h.alloc_for(2, 4);
        let b = h.alloc_for(2, 4);
        let c = h.alloc_for(2, 4);
        assert_eq!(h.frames[2], AllocFrame { lo: a, hi: c });

        h.free_for(2, a).unwrap();
        assert_eq!(h.frames[2], AllocFrame { lo: b, hi: c });

        h.free_for(2, c).unwrap();
        assert_eq!(h.frames[2], AllocFrame { lo: b, hi: b });

        h.free_for(2, b).unwrap();
        assert_eq!(h.frames[2], AllocFrame::EMPTY);
    }

    #[test]
    fn frame_survives_freeing_an_interior_chunk() {
        let mut h = test_heap(64);
        let a = h.alloc_for(2, 4);
        let b = h.alloc_for(2, 4);
        let c = h.alloc_for(2, 4);
        h.free_for(2, b).unwrap();
        assert_eq!(h.frames[2], AllocFrame { lo: a, hi: c });
    }

    #[test]
    fn frames_are_tracked_per_process() {
        let mut h = test_heap(64);
        let a = h.alloc_for(2, 4);
        let b = h.alloc_for(3, 4);
        assert_eq!(h.frames[2], AllocFrame { lo: a, hi: a });
        assert_eq!(h.frames[3], AllocFrame { lo: b, hi: b });
    }

    #[test]
    fn termination_sweep_releases_only_the_dead_process() {
        let mut h = test_heap(64);
        let a = h.alloc_for(2, 4);
        let b = h.alloc_for(3, 4);
        let c = h.alloc_for(2, 4);
        h.free_process_chunks(2);

        assert_eq!(h.map_entry(a), FREE);
        assert_eq!(h.map_entry(c), FREE);
        assert_eq!(h.chunk_size(b), 4);
        assert_eq!(h.frames[2], AllocFrame::EMPTY);

        // The survivor still owns a working heap.
        h.free_process_chunks(3);
        assert!(map_image(&h).iter().all(|&b| b == 0));
        assert_eq!(h.alloc_for(2, h.use_size), h.use_start);
    }

    #[test]
    fn termination_sweep_spares_shared_chunks() {
        let mut h = test_heap(64);
        let sh = shared::shared_alloc_in(&mut h, 8);
        let a = h.alloc_for(2, 8);
        h.free_process_chunks(2);
        assert_eq!(h.map_entry(a), FREE);
        assert_eq!(h.chunk_size(sh), 8);
    }

    // ------------------------------------------------------------------
    // Realloc
    // ------------------------------------------------------------------

    fn fill_pattern(h: &mut super::heap::Heap, addr: MemAddr, len: u16, seed: u8) {
        for i in 0..len {
            h.driver.write(addr + i, seed.wrapping_add(i as u8));
        }
    }

    fn check_pattern(h: &super::heap::Heap, addr: MemAddr, len: u16, seed: u8) {
        for i in 0..len {
            assert_eq!(h.driver.read(addr + i), seed.wrapping_add(i as u8));
        }
    }

    #[test]
    fn realloc_shrink_trims_in_place() {
        let mut h = test_heap(64);
        let a = h.alloc_for(2, 16);
        fill_pattern(&mut h, a, 16, 0x40);
        let r = h.realloc_for(2, a, 10);
        assert_eq!(r, a);
        assert_eq!(h.chunk_size(a), 10);
        check_pattern(&h, a, 10, 0x40);
        for i in 10..16 {
            assert_eq!(h.map_entry(a + i), FREE);
        }
    }

    #[test]
    fn realloc_grows_in_place_on_the_right() {
        let mut h = test_heap(64);
        let a = h.alloc_for(2, 8);
        fill_pattern(&mut h, a, 8, 0x11);
        let r = h.realloc_for(2, a, 20);
        assert_eq!(r, a, "free space on the right must not move the chunk");
        assert_eq!(h.chunk_size(a), 20);
        check_pattern(&h, a, 8, 0x11);
    }

    #[test]
    fn realloc_slides_backward_into_the_leading_run() {
        let mut h = test_heap(64);
        // [pad 8][hole 8][victim 8][blocker to the end]
        let pad = h.alloc_for(2, 8);
        let hole = h.alloc_for(2, 8);
        let victim = h.alloc_for(2, 8);
        let tail = h.use_size - 24;
        let blocker = h.alloc_for(3, tail);
        assert_ne!(blocker, 0);
        h.free_for(2, hole).unwrap();

        fill_pattern(&mut h, victim, 8, 0x80);
        let r = h.realloc_for(2, victim, 12);
        assert_eq!(r, hole, "chunk must slide into the hole on its left");
        assert!(r < victim);
        assert_eq!(h.chunk_size(r), 12);
        check_pattern(&h, r, 8, 0x80);
        // The vacated tail is free again.
        for a in r + 12..victim + 8 {
            assert_eq!(h.map_entry(a), FREE);
        }
        let _ = pad;
    }

    #[test]
    fn realloc_slide_keeps_the_frame_covering_the_new_head() {
        let mut h = test_heap(64);
        let hole = h.alloc_for(2, 8);
        let victim = h.alloc_for(2, 8);
        let blocker = h.alloc_for(3, h.use_size - 16);
        assert_ne!(blocker, 0);
        h.free_for(2, hole).unwrap();

        let r = h.realloc_for(2, victim, 12);
        assert_eq!(r, hole);
        assert!(h.frames[2].lo <= r, "termination sweep must still find the chunk");

        h.free_process_chunks(2);
        assert_eq!(h.map_entry(r), FREE);
    }

    #[test]
    fn realloc_relocates_when_the_neighbourhood_is_full() {
        let mut h = test_heap(64);
        // [victim 8][blocker 8] ... rest free
        let victim = h.alloc_for(2, 8);
        let blocker = h.alloc_for(3, 8);
        fill_pattern(&mut h, victim, 8, 0xA0);

        let r = h.realloc_for(2, victim, 24);
        assert_ne!(r, 0);
        assert_ne!(r, victim);
        assert_eq!(h.chunk_size(r), 24);
        check_pattern(&h, r, 8, 0xA0);
        // The old region is free map-wise.
        for a in victim..victim + 8 {
            assert_eq!(h.map_entry(a), FREE);
        }
        assert_eq!(h.chunk_size(blocker), 8);
    }

    #[test]
    fn realloc_returns_zero_when_nothing_fits() {
        let mut h = test_heap(64);
        let a = h.alloc_for(2, 8);
        let b = h.alloc_for(3, h.use_size - 8);
        assert_ne!(b, 0);
        assert_eq!(h.realloc_for(2, a, 16), 0);
        assert_eq!(h.chunk_size(a), 8, "failed realloc must leave the chunk");
    }

    #[test]
    fn realloc_rejects_bad_requests() {
        let mut h = test_heap(64);
        let a = h.alloc_for(2, 8);
        assert_eq!(h.realloc_for(2, a, 0), 0, "zero size");
        assert_eq!(h.realloc_for(3, a, 12), 0, "foreign owner");
        assert_eq!(h.realloc_for(2, h.use_start + 40, 12), 0, "free byte");
        assert_eq!(h.realloc_for(2, h.use_limit() + 1, 12), 0, "out of range");
        assert_eq!(h.chunk_size(a), 8);
    }

    #[test]
    fn realloc_via_an_interior_address_resolves_the_head() {
        let mut h = test_heap(64);
        let a = h.alloc_for(2, 8);
        let r = h.realloc_for(2, a + 3, 4);
        assert_eq!(r, a);
        assert_eq!(h.chunk_size(a), 4);
    }

    // ------------------------------------------------------------------
    // Strategy plumbing
    // ------------------------------------------------------------------

    #[test]
    fn next_fit_cursor_persists_across_allocations() {
        let mut h = test_heap(64);
        h.strategy = AllocStrategy::NextFit;
        let a = h.alloc_for(2, 8);
        assert_eq!(a, h.use_start);
        assert_eq!(h.last_alloc, a + 8);

        h.free_for(2, a).unwrap();
        // The cursor is deliberately not rewound by the release.
        let b = h.alloc_for(2, 8);
        assert_eq!(b, a + 8);
    }
}
