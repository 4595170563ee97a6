//! Heap descriptors
//!
//! A heap pairs a memory driver with an allocation map region and a use
//! region. The map holds one 4-bit entry per use byte, so the use region is
//! always exactly twice the map (`use_size == 2 * map_size`) and follows it
//! immediately. Two heaps exist: one on the internal RAM and one on the
//! external serial SRAM.

use core::cell::RefCell;

use critical_section::Mutex;

use crate::config::{
    EXT_ADDR_SPACE, INT_HEAP_RESERVE, INT_RAM_SIZE, INT_RAM_START, N_SLOTS,
};
use crate::mem::drivers::{EXT_SRAM, INT_SRAM, MemAddr, MemDriver};
use crate::mem::strategies::AllocStrategy;

// Internal heap geometry: a small reserve gap, then map and use regions
// splitting the rest of the medium 1:2.
const INT_MAP_START: MemAddr = INT_RAM_START + INT_HEAP_RESERVE;
const INT_MAP_SIZE: u16 = (INT_RAM_SIZE - INT_HEAP_RESERVE) / 3;

// External heap geometry: the map starts at address zero and takes one
// third of the medium (floor); the use region covers the other two thirds.
const EXT_MAP_SIZE: u16 = EXT_ADDR_SPACE / 3;

/// Optimistic inclusive bounds of one process's chunks on a heap.
///
/// Widened on allocation; shrunk toward the interior only when an edge chunk
/// is freed. Bounds the cleanup scan on process termination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct AllocFrame {
    pub lo: MemAddr,
    pub hi: MemAddr,
}

impl AllocFrame {
    /// Sentinel for "no chunks": lo above every address, hi below every one.
    pub const EMPTY: AllocFrame = AllocFrame { lo: 0xFFFF, hi: 0 };
}

/// One heap: driver, map/use geometry, fit strategy and per-process state.
pub struct Heap {
    pub(crate) driver: &'static dyn MemDriver,
    pub(crate) map_start: MemAddr,
    pub(crate) map_size: u16,
    pub(crate) use_start: MemAddr,
    pub(crate) use_size: u16,
    pub(crate) strategy: AllocStrategy,
    /// Next-fit cursor: the byte just after the most recent allocation.
    pub(crate) last_alloc: MemAddr,
    pub(crate) frames: [AllocFrame; N_SLOTS],
    pub(crate) name: &'static str,
}

impl Heap {
    pub(crate) const fn new(
        driver: &'static dyn MemDriver,
        map_start: MemAddr,
        map_size: u16,
        name: &'static str,
    ) -> Self {
        Self {
            driver,
            map_start,
            map_size,
            use_start: map_start + map_size,
            use_size: map_size * 2,
            strategy: AllocStrategy::FirstFit,
            last_alloc: map_start + map_size,
            frames: [AllocFrame::EMPTY; N_SLOTS],
            name,
        }
    }

    /// Highest valid use-area address.
    pub(crate) fn use_limit(&self) -> MemAddr {
        self.use_start + self.use_size - 1
    }

    /// Whether `addr` lies inside the use area.
    pub(crate) fn contains_use_addr(&self, addr: MemAddr) -> bool {
        addr >= self.use_start && addr <= self.use_limit()
    }

    /// Reset the heap to its boot state: driver initialized, map zeroed,
    /// frames empty, cursor at the start of the use area.
    pub(crate) fn reset(&mut self) {
        self.driver.init();
        for i in 0..self.map_size {
            self.driver.write(self.map_start + i, 0);
        }
        self.strategy = AllocStrategy::FirstFit;
        self.last_alloc = self.use_start;
        self.frames = [AllocFrame::EMPTY; N_SLOTS];
    }
}

/// A heap shared across processes, guarded by the kernel critical section.
pub struct HeapCell(pub(crate) Mutex<RefCell<Heap>>);

impl HeapCell {
    /// Run `f` on the heap inside a critical section.
    ///
    /// Must not yield inside `f`; the blocking shared-memory operations
    /// re-enter per retry instead.
    pub(crate) fn with<R>(&self, f: impl FnOnce(&mut Heap) -> R) -> R {
        critical_section::with(|cs| f(&mut self.0.borrow_ref_mut(cs)))
    }
}

/// The heap on the internal RAM medium.
pub static INT_HEAP: HeapCell = HeapCell(Mutex::new(RefCell::new(Heap::new(
    &INT_SRAM,
    INT_MAP_START,
    INT_MAP_SIZE,
    "internal",
))));

/// The heap on the external serial SRAM medium.
pub static EXT_HEAP: HeapCell = HeapCell(Mutex::new(RefCell::new(Heap::new(
    &EXT_SRAM,
    0,
    EXT_MAP_SIZE,
    "external",
))));

/// Number of configured heaps.
pub fn heap_list_length() -> usize {
    2
}

/// Heap at `index` in the fixed heap list, if any.
pub fn lookup_heap(index: usize) -> Option<&'static HeapCell> {
    match index {
        0 => Some(&INT_HEAP),
        1 => Some(&EXT_HEAP),
        _ => None,
    }
}

/// Index of `heap` in the heap list.
pub fn lookup_heap_index(heap: &HeapCell) -> Option<usize> {
    (0..heap_list_length()).find(|&i| {
        lookup_heap(i).is_some_and(|h| core::ptr::eq(h, heap))
    })
}

/// Name of the heap's backing medium.
pub fn heap_name(heap: &HeapCell) -> &'static str {
    heap.with(|h| h.name)
}

/// Initialize every configured heap: bring the drivers up and zero the maps.
pub fn init_heaps() {
    for i in 0..heap_list_length() {
        if let Some(heap) = lookup_heap(i) {
            heap.with(|h| h.reset());
        }
    }
}
