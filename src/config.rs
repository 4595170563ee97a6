//! Kernel configuration constants
//!
//! This module contains the tunable parameters for the kernel: process table
//! geometry, stack pool sizing, and the dimensions of the two memory media
//! backing the heaps.

#![allow(dead_code)]

/// Number of process slots in the process table.
///
/// Slot 0 is reserved for the idle process (the boot context).
/// Actual usable processes = N_SLOTS - 1.
pub const N_SLOTS: usize = 8;

/// Process id of the idle slot.
pub const IDLE: crate::sched::Pid = 0;

/// Priority given to auto-start programs and the idle slot.
///
/// Sits in the middle of the 0..255 range (255 most favourable), which maps
/// to feedback queue 1 and gives round-robin a sane initial slice.
pub const DEFAULT_PRIORITY: u8 = 128;

/// Per-slot stack size (64KB)
///
/// Each non-idle slot owns a fixed, disjoint region of this size in the
/// static stack pool. The idle slot runs on the boot stack and owns none.
pub const STACK_SIZE: usize = 64 * 1024;

/// First byte of the internal RAM medium.
///
/// The address space below this value is off limits to the heap; on the
/// modelled hardware it belongs to the register file and the I/O window.
pub const INT_RAM_START: u16 = 0x100;

/// Size of the internal RAM medium in bytes.
pub const INT_RAM_SIZE: u16 = 4096;

/// Gap between the start of internal RAM and the internal heap map.
pub const INT_HEAP_RESERVE: u16 = 32;

/// Size of the external serial SRAM medium in bytes (64KB).
///
/// The device is addressed through a 24-bit frame whose high byte is always
/// zero, so only the low 16 bits of an address ever reach it.
pub const EXT_MEDIUM_SIZE: usize = 0x10000;

/// Addressable size the external memory driver advertises.
///
/// One short of the medium: addresses are 16-bit and 0xFFFF is the highest
/// one that can be expressed.
pub const EXT_ADDR_SPACE: u16 = 0xFFFF;

/// Number of feedback-queue priority classes.
pub const N_QUEUES: usize = 4;

/// Default time slices per feedback queue, highest class first.
pub const MLFQ_SLICES: [u8; N_QUEUES] = [1, 2, 4, 8];
