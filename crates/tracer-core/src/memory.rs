//! Flat 64 KiB memory image for the emulated CPU.

use crate::{AccessHandler, CycleFlags};

/// Size of the Z80 memory address space.
pub const MEMORY_IMAGE_LEN: usize = 0x1_0000;

/// Value returned for IO reads when no device answers (pulled-up data bus).
const FLOATING_BUS: u8 = 0xFF;

/// Plain RAM covering the whole address space, with a floating IO bus.
///
/// Used as the oracle's memory when the tracer keeps its own copy of target
/// memory rather than forwarding to a machine model.
#[derive(Clone)]
pub struct MemoryImage {
    ram: Box<[u8]>,
    io_read_value: u8,
}

impl MemoryImage {
    #[must_use]
    pub fn new() -> Self {
        Self {
            ram: vec![0; MEMORY_IMAGE_LEN].into_boxed_slice(),
            io_read_value: FLOATING_BUS,
        }
    }

    /// Value returned by every IO read.
    #[must_use]
    pub fn with_io_read_value(mut self, value: u8) -> Self {
        self.io_read_value = value;
        self
    }

    /// Copy `data` in starting at `address`, wrapping at the top of memory.
    pub fn load(&mut self, address: u16, data: &[u8]) {
        let mut addr = address;
        for &byte in data {
            self.ram[addr as usize] = byte;
            addr = addr.wrapping_add(1);
        }
    }

    #[must_use]
    pub fn peek(&self, address: u16) -> u8 {
        self.ram[address as usize]
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.ram
    }
}

impl Default for MemoryImage {
    fn default() -> Self {
        Self::new()
    }
}

impl AccessHandler for MemoryImage {
    fn handle_access(&mut self, address: u16, data: u8, flags: CycleFlags) -> u8 {
        match (flags.contains(CycleFlags::IO), flags.is_write()) {
            (false, false) => self.ram[address as usize],
            (false, true) => {
                self.ram[address as usize] = data;
                data
            }
            (true, false) => self.io_read_value,
            (true, true) => data,
        }
    }
}
