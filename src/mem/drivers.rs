//! Memory drivers
//!
//! A driver provides uniform byte-addressed access to one memory medium plus
//! a descriptor of its addressable range. Two media exist: the internal RAM
//! (direct access) and the external serial SRAM reached over the byte
//! exchange bus.

use core::cell::UnsafeCell;

use crate::config::{EXT_ADDR_SPACE, INT_RAM_SIZE, INT_RAM_START};
use crate::mem::bus::{CMD_READ, CMD_WRITE, CMD_WRMR, EXT_BUS, MODE_BYTE};

/// A byte address on a memory medium.
pub type MemAddr = u16;
/// One stored byte.
pub type MemValue = u8;

/// Uniform byte access to a memory medium.
///
/// Drivers do not validate addresses beyond a debug assertion; the heap
/// layer never hands out addresses outside the medium.
pub trait MemDriver: Sync {
    /// First addressable byte.
    fn start(&self) -> MemAddr;
    /// Number of addressable bytes.
    fn size(&self) -> u16;
    /// Bring the medium into a usable state.
    fn init(&self);
    fn read(&self, addr: MemAddr) -> MemValue;
    fn write(&self, addr: MemAddr, value: MemValue);
}

// ============================================================================
// Internal RAM
// ============================================================================

/// The internal RAM medium: a flat cell array accessed by pointer.
pub struct IntSram {
    cells: UnsafeCell<[u8; INT_RAM_SIZE as usize]>,
}

// SAFETY: all heap traffic to the medium happens inside kernel critical
// sections, and execution is single-core; accesses are never concurrent.
unsafe impl Sync for IntSram {}

impl IntSram {
    const fn new() -> Self {
        Self { cells: UnsafeCell::new([0; INT_RAM_SIZE as usize]) }
    }
}

impl MemDriver for IntSram {
    fn start(&self) -> MemAddr {
        INT_RAM_START
    }

    fn size(&self) -> u16 {
        INT_RAM_SIZE
    }

    fn init(&self) {}

    fn read(&self, addr: MemAddr) -> MemValue {
        debug_assert!(addr >= INT_RAM_START && addr - INT_RAM_START < INT_RAM_SIZE);
        let index = (addr - INT_RAM_START) as usize;
        // SAFETY: serialized by the critical-section discipline (see Sync).
        unsafe { (*self.cells.get())[index] }
    }

    fn write(&self, addr: MemAddr, value: MemValue) {
        debug_assert!(addr >= INT_RAM_START && addr - INT_RAM_START < INT_RAM_SIZE);
        let index = (addr - INT_RAM_START) as usize;
        // SAFETY: serialized by the critical-section discipline (see Sync).
        unsafe { (*self.cells.get())[index] = value }
    }
}

/// The internal RAM medium.
pub static INT_SRAM: IntSram = IntSram::new();

// ============================================================================
// External serial SRAM
// ============================================================================

/// Driver for the external SRAM behind the serial bus.
///
/// Every call performs one complete bus transaction inside a critical
/// section, making each byte transfer atomic with respect to preemption.
pub struct ExtSram;

/// Send the 24-bit address frame. The high byte is always zero: the medium
/// is addressed through a 16-bit space.
fn transfer_address(dev: &mut crate::mem::bus::SerialSram, addr: MemAddr) {
    dev.exchange(0x00);
    dev.exchange((addr >> 8) as u8);
    dev.exchange(addr as u8);
}

impl MemDriver for ExtSram {
    fn start(&self) -> MemAddr {
        0
    }

    fn size(&self) -> u16 {
        EXT_ADDR_SPACE
    }

    fn init(&self) {
        critical_section::with(|cs| {
            let mut dev = EXT_BUS.borrow_ref_mut(cs);
            dev.select();
            dev.exchange(CMD_WRMR);
            dev.exchange(MODE_BYTE);
            dev.deselect();
        });
    }

    fn read(&self, addr: MemAddr) -> MemValue {
        critical_section::with(|cs| {
            let mut dev = EXT_BUS.borrow_ref_mut(cs);
            dev.select();
            dev.exchange(CMD_READ);
            transfer_address(&mut dev, addr);
            let value = dev.exchange(0xFF);
            dev.deselect();
            value
        })
    }

    fn write(&self, addr: MemAddr, value: MemValue) {
        critical_section::with(|cs| {
            let mut dev = EXT_BUS.borrow_ref_mut(cs);
            dev.select();
            dev.exchange(CMD_WRITE);
            transfer_address(&mut dev, addr);
            dev.exchange(value);
            dev.deselect();
        });
    }
}

/// The external SRAM medium.
pub static EXT_SRAM: ExtSram = ExtSram;
