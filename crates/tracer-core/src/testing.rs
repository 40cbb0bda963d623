//! Test doubles for the collaborator traits.
//!
//! Only available with the `test-utils` feature.

use crate::{BusControl, BusError, CpuCore, CpuHooks, MEMORY_IMAGE_LEN};

/// One call made on a [`RecordingBusControl`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusCall {
    WaitInterrupts(bool),
    RequestOwnership,
    ReleaseOwnership,
    RequestReset,
    WaitGeneration { memory: bool, io: bool },
    Hold(bool),
    BlockRead { address: u16, len: usize },
}

/// Bus control that records every call and tracks the resulting line state.
///
/// Ownership is treated as granted as soon as it is requested; the test
/// delivers the acknowledgement to the session itself.
#[derive(Debug, Clone)]
pub struct RecordingBusControl {
    pub calls: Vec<BusCall>,
    pub wait_interrupts: bool,
    pub wait_on_memory: bool,
    pub wait_on_io: bool,
    pub bus_held: bool,
    pub owns_bus: bool,
    /// Contents returned by `block_read`.
    pub target_memory: Vec<u8>,
    /// Error to return from the next `block_read`.
    pub block_read_error: Option<BusError>,
}

impl RecordingBusControl {
    #[must_use]
    pub fn new() -> Self {
        Self {
            calls: Vec::new(),
            wait_interrupts: false,
            wait_on_memory: false,
            wait_on_io: false,
            bus_held: false,
            owns_bus: false,
            target_memory: vec![0; MEMORY_IMAGE_LEN],
            block_read_error: None,
        }
    }

    /// True if any line or resource is still claimed.
    #[must_use]
    pub fn holds_anything(&self) -> bool {
        self.wait_interrupts || self.wait_on_memory || self.wait_on_io || self.bus_held || self.owns_bus
    }

    /// Number of times a hold was asserted.
    #[must_use]
    pub fn hold_assertions(&self) -> usize {
        self.calls.iter().filter(|c| **c == BusCall::Hold(true)).count()
    }

    #[must_use]
    pub fn count(&self, call: &BusCall) -> usize {
        self.calls.iter().filter(|c| *c == call).count()
    }
}

impl Default for RecordingBusControl {
    fn default() -> Self {
        Self::new()
    }
}

impl BusControl for RecordingBusControl {
    fn enable_wait_interrupts(&mut self, enable: bool) {
        self.wait_interrupts = enable;
        self.calls.push(BusCall::WaitInterrupts(enable));
    }

    fn request_bus_ownership(&mut self) {
        self.owns_bus = true;
        self.calls.push(BusCall::RequestOwnership);
    }

    fn release_bus_ownership(&mut self) {
        self.owns_bus = false;
        self.calls.push(BusCall::ReleaseOwnership);
    }

    fn request_target_reset(&mut self) {
        self.calls.push(BusCall::RequestReset);
    }

    fn enable_wait_generation(&mut self, memory: bool, io: bool) {
        self.wait_on_memory = memory;
        self.wait_on_io = io;
        self.calls.push(BusCall::WaitGeneration { memory, io });
    }

    fn set_bus_hold(&mut self, hold: bool) {
        self.bus_held = hold;
        self.calls.push(BusCall::Hold(hold));
    }

    fn block_read(&mut self, address: u16, dest: &mut [u8]) -> Result<(), BusError> {
        self.calls.push(BusCall::BlockRead {
            address,
            len: dest.len(),
        });
        if let Some(err) = self.block_read_error.take() {
            return Err(err);
        }
        if !self.owns_bus {
            return Err(BusError::Busy);
        }
        let mut addr = address;
        for byte in dest.iter_mut() {
            *byte = self.target_memory.get(addr as usize).copied().unwrap_or(0xFF);
            addr = addr.wrapping_add(1);
        }
        Ok(())
    }
}

/// One bus access performed by a [`ScriptedCore`] instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedAccess {
    Fetch(u16),
    Read(u16),
    Write(u16, u8),
    In(u16),
    Out(u16, u8),
}

/// CPU core that replays a fixed list of instructions, each a list of bus
/// accesses, looping back to the start when it runs out.
#[derive(Debug, Clone, Default)]
pub struct ScriptedCore {
    program: Vec<Vec<ScriptedAccess>>,
    next: usize,
    pc: u16,
    /// Number of `reset` calls.
    pub resets: u32,
    /// Values returned to the core by read hooks, oldest first.
    pub reads: Vec<u8>,
}

impl ScriptedCore {
    #[must_use]
    pub fn new(program: Vec<Vec<ScriptedAccess>>) -> Self {
        Self {
            program,
            ..Self::default()
        }
    }
}

impl CpuCore for ScriptedCore {
    fn reset(&mut self) {
        self.next = 0;
        self.pc = 0;
        self.resets += 1;
        self.reads.clear();
    }

    fn execute_instruction<H: CpuHooks>(&mut self, hooks: &mut H) {
        if self.program.is_empty() {
            return;
        }
        let index = self.next % self.program.len();
        self.next += 1;
        for access in &self.program[index] {
            match *access {
                ScriptedAccess::Fetch(address) => {
                    self.pc = address;
                    self.reads.push(hooks.mem_read(address, true));
                }
                ScriptedAccess::Read(address) => self.reads.push(hooks.mem_read(address, false)),
                ScriptedAccess::Write(address, value) => hooks.mem_write(address, value),
                ScriptedAccess::In(port) => self.reads.push(hooks.io_read(port)),
                ScriptedAccess::Out(port, value) => hooks.io_write(port, value),
            }
        }
    }

    fn pc(&self) -> u16 {
        self.pc
    }
}
