//! CPU emulation core interface.

/// Bus callbacks installed into a CPU core.
///
/// The core calls these synchronously, in program order, for every bus
/// cycle it performs while executing an instruction.
pub trait CpuHooks {
    /// Memory read. `opcode_fetch` is set for M1 cycles.
    fn mem_read(&mut self, address: u16, opcode_fetch: bool) -> u8;

    /// Memory write.
    fn mem_write(&mut self, address: u16, value: u8);

    /// IO read from a 16-bit port address.
    fn io_read(&mut self, port: u16) -> u8;

    /// IO write to a 16-bit port address.
    fn io_write(&mut self, port: u16, value: u8);
}

/// An instruction-stepping CPU emulator.
///
/// Unlike a per-T-state core, this steps whole instructions. The hooks are
/// passed in, not owned, so the caller decides where bus traffic goes.
pub trait CpuCore {
    /// Put the CPU into its power-on state.
    fn reset(&mut self);

    /// Execute exactly one instruction, reporting every bus cycle through
    /// `hooks`.
    fn execute_instruction<H: CpuHooks>(&mut self, hooks: &mut H);

    /// Returns the current program counter.
    fn pc(&self) -> u16;
}
