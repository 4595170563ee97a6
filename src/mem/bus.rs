//! Serial SRAM device behind a byte-exchange bus
//!
//! Emulates a 23LC-class serial SRAM on the slave side of a bit-serial bus.
//! The master drives a select line and exchanges one byte at a time; the
//! device answers through a small state machine:
//!
//!   idle -> command -> address (3 bytes, high first) -> data
//!
//! Commands: `WRMR` (write mode register), `RDMR` (read mode register),
//! `READ` and `WRITE`. In byte mode a transfer carries a single data byte;
//! in sequential mode the address auto-increments until deselect. The device
//! shifts out 0xFF whenever it has nothing to say. Deselecting aborts any
//! half-framed transfer.

use core::cell::RefCell;

use critical_section::Mutex;

use crate::config::EXT_MEDIUM_SIZE;

/// Write mode register.
pub const CMD_WRMR: u8 = 0x01;
/// Write one or more data bytes.
pub const CMD_WRITE: u8 = 0x02;
/// Read one or more data bytes.
pub const CMD_READ: u8 = 0x03;
/// Read mode register.
pub const CMD_RDMR: u8 = 0x05;

/// One data byte per transfer.
pub const MODE_BYTE: u8 = 0x00;
/// Auto-incrementing address until deselect.
pub const MODE_SEQUENTIAL: u8 = 0x40;

/// Idle line level; shifted out when the device has nothing to answer.
const IDLE_BYTE: u8 = 0xFF;

/// Transfer phase of the current (selected) transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Waiting for a command byte.
    Command,
    /// Collecting the 24-bit address frame.
    Address { cmd: u8, remaining: u8 },
    /// Exchanging data bytes.
    Data { cmd: u8 },
    /// Transfer finished; further exchanges are ignored until deselect.
    Done,
}

/// The emulated serial SRAM device.
pub struct SerialSram {
    selected: bool,
    phase: Phase,
    addr: u32,
    mode: u8,
    cells: [u8; EXT_MEDIUM_SIZE],
}

impl SerialSram {
    pub const fn new() -> Self {
        Self {
            selected: false,
            phase: Phase::Command,
            addr: 0,
            mode: MODE_BYTE,
            cells: [0; EXT_MEDIUM_SIZE],
        }
    }

    /// Drive the select line low: the device starts a fresh transaction.
    pub fn select(&mut self) {
        self.selected = true;
        self.phase = Phase::Command;
        self.addr = 0;
    }

    /// Release the select line; aborts a half-framed transfer.
    pub fn deselect(&mut self) {
        self.selected = false;
        self.phase = Phase::Command;
    }

    /// Exchange one byte with the device.
    pub fn exchange(&mut self, out: u8) -> u8 {
        if !self.selected {
            return IDLE_BYTE;
        }
        match self.phase {
            Phase::Command => {
                match out {
                    CMD_READ | CMD_WRITE => {
                        self.phase = Phase::Address { cmd: out, remaining: 3 };
                    }
                    CMD_WRMR => self.phase = Phase::Data { cmd: CMD_WRMR },
                    CMD_RDMR => self.phase = Phase::Data { cmd: CMD_RDMR },
                    _ => self.phase = Phase::Done,
                }
                IDLE_BYTE
            }
            Phase::Address { cmd, remaining } => {
                self.addr = (self.addr << 8) | out as u32;
                if remaining == 1 {
                    self.phase = Phase::Data { cmd };
                } else {
                    self.phase = Phase::Address { cmd, remaining: remaining - 1 };
                }
                IDLE_BYTE
            }
            Phase::Data { cmd } => match cmd {
                CMD_WRMR => {
                    self.mode = out;
                    self.phase = Phase::Done;
                    IDLE_BYTE
                }
                CMD_RDMR => {
                    self.phase = Phase::Done;
                    self.mode
                }
                CMD_WRITE => {
                    self.cells[self.addr as usize % EXT_MEDIUM_SIZE] = out;
                    self.advance();
                    IDLE_BYTE
                }
                CMD_READ => {
                    let value = self.cells[self.addr as usize % EXT_MEDIUM_SIZE];
                    self.advance();
                    value
                }
                _ => IDLE_BYTE,
            },
            Phase::Done => IDLE_BYTE,
        }
    }

    fn advance(&mut self) {
        if self.mode == MODE_SEQUENTIAL {
            self.addr = self.addr.wrapping_add(1);
        } else {
            self.phase = Phase::Done;
        }
    }
}

/// The one external SRAM device of the system.
///
/// Shared by every process and the kernel; the external memory driver keeps
/// each transaction inside a critical section, so a transfer is never torn
/// by preemption.
pub(crate) static EXT_BUS: Mutex<RefCell<SerialSram>> = Mutex::new(RefCell::new(SerialSram::new()));

#[cfg(test)]
mod tests {
    use super::*;

    fn write_byte(dev: &mut SerialSram, addr: u16, value: u8) {
        dev.select();
        dev.exchange(CMD_WRITE);
        dev.exchange(0x00);
        dev.exchange((addr >> 8) as u8);
        dev.exchange(addr as u8);
        dev.exchange(value);
        dev.deselect();
    }

    fn read_byte(dev: &mut SerialSram, addr: u16) -> u8 {
        dev.select();
        dev.exchange(CMD_READ);
        dev.exchange(0x00);
        dev.exchange((addr >> 8) as u8);
        dev.exchange(addr as u8);
        let value = dev.exchange(IDLE_BYTE);
        dev.deselect();
        value
    }

    #[test]
    fn byte_write_then_read() {
        let mut dev = SerialSram::new();
        write_byte(&mut dev, 0x1234, 0xA5);
        assert_eq!(read_byte(&mut dev, 0x1234), 0xA5);
        assert_eq!(read_byte(&mut dev, 0x1235), 0x00);
    }

    #[test]
    fn byte_mode_stops_after_one_data_byte() {
        let mut dev = SerialSram::new();
        dev.select();
        dev.exchange(CMD_WRITE);
        dev.exchange(0x00);
        dev.exchange(0x00);
        dev.exchange(0x10);
        dev.exchange(0x11);
        dev.exchange(0x22); // ignored in byte mode
        dev.deselect();
        assert_eq!(read_byte(&mut dev, 0x0010), 0x11);
        assert_eq!(read_byte(&mut dev, 0x0011), 0x00);
    }

    #[test]
    fn sequential_mode_auto_increments() {
        let mut dev = SerialSram::new();
        dev.select();
        dev.exchange(CMD_WRMR);
        dev.exchange(MODE_SEQUENTIAL);
        dev.deselect();

        dev.select();
        dev.exchange(CMD_WRITE);
        dev.exchange(0x00);
        dev.exchange(0x00);
        dev.exchange(0x40);
        for v in [1u8, 2, 3, 4] {
            dev.exchange(v);
        }
        dev.deselect();

        dev.select();
        dev.exchange(CMD_WRMR);
        dev.exchange(MODE_BYTE);
        dev.deselect();

        for (i, v) in [1u8, 2, 3, 4].iter().enumerate() {
            assert_eq!(read_byte(&mut dev, 0x0040 + i as u16), *v);
        }
    }

    #[test]
    fn mode_register_roundtrip() {
        let mut dev = SerialSram::new();
        dev.select();
        dev.exchange(CMD_WRMR);
        dev.exchange(MODE_SEQUENTIAL);
        dev.deselect();

        dev.select();
        dev.exchange(CMD_RDMR);
        assert_eq!(dev.exchange(IDLE_BYTE), MODE_SEQUENTIAL);
        dev.deselect();
    }

    #[test]
    fn deselect_aborts_half_framed_transfer() {
        let mut dev = SerialSram::new();
        dev.select();
        dev.exchange(CMD_WRITE);
        dev.exchange(0x00);
        dev.deselect(); // address frame incomplete; nothing written

        // Sampling the low range is enough.
        for addr in 0..0x200u16 {
            if read_byte(&mut dev, addr) != 0 {
                panic!("aborted transfer mutated cell {}", addr);
            }
        }
    }

    #[test]
    fn unselected_device_stays_silent() {
        let mut dev = SerialSram::new();
        assert_eq!(dev.exchange(CMD_READ), IDLE_BYTE);
        assert_eq!(dev.exchange(0x00), IDLE_BYTE);
    }
}
