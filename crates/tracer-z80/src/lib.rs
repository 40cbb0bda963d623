//! Z80 oracle core.
//!
//! Wraps the NMOS flavour of the `z80emu` CPU and reports every memory and
//! IO access through [`CpuHooks`], one call per machine cycle, in the order
//! the real chip puts them on the bus.

use std::cell::RefCell;
use std::num::NonZeroU16;

use tracer_core::{CpuCore, CpuHooks};
use z80emu::host::TsCounter;
use z80emu::{Clock, Cpu, CpuDebug, Io, Memory, Z80NMOS};

type TsClock = TsCounter<i32>;

/// Z80 CPU stepped one instruction at a time.
pub struct Z80Core {
    cpu: Z80NMOS,
    clock: TsClock,
}

impl Z80Core {
    #[must_use]
    pub fn new() -> Self {
        let mut cpu = Z80NMOS::default();
        cpu.reset();
        Self {
            cpu,
            clock: TsClock::default(),
        }
    }

    /// T-states elapsed since the last reset.
    #[must_use]
    pub fn t_states(&self) -> i32 {
        self.clock.as_timestamp()
    }

    /// True while the CPU sits in a HALT.
    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.cpu.is_halt()
    }
}

impl Default for Z80Core {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuCore for Z80Core {
    fn reset(&mut self) {
        self.cpu.reset();
        self.clock = TsClock::default();
    }

    fn execute_instruction<H: CpuHooks>(&mut self, hooks: &mut H) {
        // `z80emu` idles a halted CPU without touching the bus, but the real
        // chip keeps running M1 cycles at the address after the HALT.
        if self.cpu.is_halt() {
            hooks.mem_read(self.pc(), true);
        }
        let mut bus = HookBus {
            hooks: RefCell::new(hooks),
        };
        // No OUT or RETI break is ever requested; a HALT break is visible
        // through `is_halt`.
        let _ = self
            .cpu
            .execute_next(&mut bus, &mut self.clock, None::<fn(CpuDebug)>);
    }

    // `z80emu` parks its PC on the HALT opcode itself.
    fn pc(&self) -> u16 {
        if self.cpu.is_halt() {
            self.cpu.get_pc().wrapping_add(1)
        } else {
            self.cpu.get_pc()
        }
    }
}

/// Adapts [`CpuHooks`] to the `z80emu` memory and IO traits.
///
/// `z80emu` reads data memory through `&self`, so the hooks sit in a
/// `RefCell`. The CPU never re-enters the bus while a hook runs.
struct HookBus<'a, H> {
    hooks: RefCell<&'a mut H>,
}

impl<H: CpuHooks> Io for HookBus<'_, H> {
    type Timestamp = i32;
    type WrIoBreak = ();
    type RetiBreak = ();

    fn read_io(&mut self, port: u16, _ts: i32) -> (u8, Option<NonZeroU16>) {
        (self.hooks.get_mut().io_read(port), None)
    }

    fn write_io(&mut self, port: u16, data: u8, _ts: i32) -> (Option<()>, Option<NonZeroU16>) {
        self.hooks.get_mut().io_write(port, data);
        (None, None)
    }
}

impl<H: CpuHooks> Memory for HookBus<'_, H> {
    type Timestamp = i32;

    fn read_mem(&self, address: u16, _ts: i32) -> u8 {
        self.hooks.borrow_mut().mem_read(address, false)
    }

    // The real CPU performs two separate read cycles, low byte first.
    fn read_mem16(&self, address: u16, _ts: i32) -> u16 {
        let mut hooks = self.hooks.borrow_mut();
        let lo = hooks.mem_read(address, false);
        let hi = hooks.mem_read(address.wrapping_add(1), false);
        u16::from_le_bytes([lo, hi])
    }

    fn read_opcode(&mut self, pc: u16, _ir: u16, _ts: i32) -> u8 {
        self.hooks.get_mut().mem_read(pc, true)
    }

    fn write_mem(&mut self, address: u16, value: u8, _ts: i32) {
        self.hooks.get_mut().mem_write(address, value);
    }

    // Debugger peeks must not show up as bus cycles.
    fn read_debug(&self, _address: u16) -> u8 {
        0xFF
    }
}
