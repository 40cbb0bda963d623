//! Emulated CPU wrapper that turns one instruction into its expected bus
//! cycles.

use tracer_core::{AccessHandler, CpuCore, CpuHooks, CycleFlags, ExpectedCycle};

/// Most bus cycles a single Z80 instruction performs (the longest block and
/// indexed instructions, prefixes included).
pub const MAX_CYCLES_PER_INSTRUCTION: usize = 10;

const EMPTY: ExpectedCycle = ExpectedCycle::new(0, 0, CycleFlags::empty());

/// Expected cycles of one instruction, consumed front to back.
#[derive(Debug, Clone)]
pub struct ExpectedCycleQueue {
    cycles: [ExpectedCycle; MAX_CYCLES_PER_INSTRUCTION],
    len: u8,
    pos: u8,
}

impl Default for ExpectedCycleQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl ExpectedCycleQueue {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            cycles: [EMPTY; MAX_CYCLES_PER_INSTRUCTION],
            len: 0,
            pos: 0,
        }
    }

    pub fn clear(&mut self) {
        self.len = 0;
        self.pos = 0;
    }

    /// Append a cycle. Returns false, leaving the queue unchanged, when it is
    /// already full.
    pub fn push(&mut self, cycle: ExpectedCycle) -> bool {
        let Some(slot) = self.cycles.get_mut(self.len as usize) else {
            return false;
        };
        *slot = cycle;
        self.len += 1;
        true
    }

    /// Take the next cycle in program order.
    pub fn pop(&mut self) -> Option<ExpectedCycle> {
        let cycle = self.peek()?;
        self.pos += 1;
        Some(cycle)
    }

    #[must_use]
    pub fn peek(&self) -> Option<ExpectedCycle> {
        (self.pos < self.len).then(|| self.cycles[self.pos as usize])
    }

    /// True once every queued cycle has been consumed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pos >= self.len
    }

    /// Cycles not yet consumed.
    #[must_use]
    pub fn len(&self) -> usize {
        usize::from(self.len - self.pos)
    }

    /// The unconsumed cycles, oldest first.
    #[must_use]
    pub fn pending(&self) -> &[ExpectedCycle] {
        &self.cycles[self.pos as usize..self.len as usize]
    }
}

/// Result of stepping one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StepOutcome {
    /// Cycles queued.
    pub cycles: usize,
    /// Cycles lost because the queue was full.
    pub dropped: u32,
}

/// Oracle CPU plus the queue its hooks fill.
#[derive(Debug, Clone, Default)]
pub struct EmulatedCpu<C> {
    core: C,
    queue: ExpectedCycleQueue,
}

impl<C: CpuCore> EmulatedCpu<C> {
    pub fn new(core: C) -> Self {
        Self {
            core,
            queue: ExpectedCycleQueue::new(),
        }
    }

    /// Power-on the core and forget any pending expectations.
    pub fn reset(&mut self) {
        self.core.reset();
        self.queue.clear();
    }

    /// Execute exactly one instruction against `memory`.
    ///
    /// The queue is replaced with that instruction's cycles in program
    /// order. Any cycles still pending from the previous instruction are
    /// discarded.
    pub fn step_instruction<M: AccessHandler>(&mut self, memory: &mut M) -> StepOutcome {
        self.queue.clear();
        let mut recorder = CycleRecorder {
            memory,
            queue: &mut self.queue,
            dropped: 0,
        };
        self.core.execute_instruction(&mut recorder);
        let dropped = recorder.dropped;
        StepOutcome {
            cycles: self.queue.len(),
            dropped,
        }
    }

    /// Take the next expected cycle, if the current instruction has any left.
    pub fn next_expected(&mut self) -> Option<ExpectedCycle> {
        self.queue.pop()
    }

    #[must_use]
    pub fn queue(&self) -> &ExpectedCycleQueue {
        &self.queue
    }

    #[must_use]
    pub fn core(&self) -> &C {
        &self.core
    }
}

/// Hooks handed to the core for one instruction. Reads are answered by the
/// memory collaborator; every access is queued as it happens.
struct CycleRecorder<'a, M> {
    memory: &'a mut M,
    queue: &'a mut ExpectedCycleQueue,
    dropped: u32,
}

impl<M: AccessHandler> CycleRecorder<'_, M> {
    fn record(&mut self, cycle: ExpectedCycle) {
        if !self.queue.push(cycle) {
            self.dropped = self.dropped.wrapping_add(1);
        }
    }
}

impl<M: AccessHandler> CpuHooks for CycleRecorder<'_, M> {
    fn mem_read(&mut self, address: u16, opcode_fetch: bool) -> u8 {
        let flags = if opcode_fetch {
            CycleFlags::FETCH
        } else {
            CycleFlags::MEM_READ
        };
        let value = self.memory.handle_access(address, 0, flags);
        self.record(ExpectedCycle::new(address, value, flags));
        value
    }

    fn mem_write(&mut self, address: u16, value: u8) {
        self.record(ExpectedCycle::mem_write(address, value));
        self.memory.handle_access(address, value, CycleFlags::MEM_WRITE);
    }

    fn io_read(&mut self, port: u16) -> u8 {
        let value = self.memory.handle_access(port, 0, CycleFlags::IO_READ);
        self.record(ExpectedCycle::io_read(port, value));
        value
    }

    fn io_write(&mut self, port: u16, value: u8) {
        self.record(ExpectedCycle::io_write(port, value));
        self.memory.handle_access(port, value, CycleFlags::IO_WRITE);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracer_core::MemoryImage;
    use tracer_core::testing::{ScriptedAccess, ScriptedCore};

    #[test]
    fn queue_refuses_past_capacity() {
        let mut queue = ExpectedCycleQueue::new();
        for i in 0..MAX_CYCLES_PER_INSTRUCTION {
            assert!(queue.push(ExpectedCycle::fetch(i as u16, 0)));
        }
        assert!(!queue.push(ExpectedCycle::fetch(0xFFFF, 0)));
        assert_eq!(queue.len(), MAX_CYCLES_PER_INSTRUCTION);
        assert_eq!(queue.pop(), Some(ExpectedCycle::fetch(0, 0)));
        assert_eq!(queue.len(), MAX_CYCLES_PER_INSTRUCTION - 1);
    }

    #[test]
    fn step_queues_cycles_in_program_order() {
        let core = ScriptedCore::new(vec![vec![
            ScriptedAccess::Fetch(0x0000),
            ScriptedAccess::Read(0x0001),
            ScriptedAccess::Write(0x8000, 0x12),
            ScriptedAccess::Out(0x00FE, 0x07),
            ScriptedAccess::In(0x00FE),
        ]]);
        let mut memory = MemoryImage::new().with_io_read_value(0x5A);
        memory.load(0, &[0x3E, 0x99]);
        let mut cpu = EmulatedCpu::new(core);

        let outcome = cpu.step_instruction(&mut memory);

        assert_eq!(outcome, StepOutcome { cycles: 5, dropped: 0 });
        assert_eq!(
            cpu.queue().pending(),
            &[
                ExpectedCycle::fetch(0x0000, 0x3E),
                ExpectedCycle::mem_read(0x0001, 0x99),
                ExpectedCycle::mem_write(0x8000, 0x12),
                ExpectedCycle::io_write(0x00FE, 0x07),
                ExpectedCycle::io_read(0x00FE, 0x5A),
            ]
        );
        assert_eq!(memory.peek(0x8000), 0x12);
        assert_eq!(cpu.core().reads, vec![0x3E, 0x99, 0x5A]);
    }

    #[test]
    fn overflow_is_counted_not_queued() {
        let accesses = (0..12).map(ScriptedAccess::Read).collect();
        let mut cpu = EmulatedCpu::new(ScriptedCore::new(vec![accesses]));
        let mut memory = MemoryImage::new();

        let outcome = cpu.step_instruction(&mut memory);

        assert_eq!(outcome.cycles, MAX_CYCLES_PER_INSTRUCTION);
        assert_eq!(outcome.dropped, 2);
        // Reads past capacity were still answered.
        assert_eq!(cpu.core().reads.len(), 12);
    }

    #[test]
    fn reset_clears_pending_cycles() {
        let mut cpu = EmulatedCpu::new(ScriptedCore::new(vec![vec![
            ScriptedAccess::Fetch(0),
            ScriptedAccess::Read(1),
        ]]));
        let mut memory = MemoryImage::new();
        cpu.step_instruction(&mut memory);
        assert!(cpu.next_expected().is_some());

        cpu.reset();

        assert!(cpu.queue().is_empty());
        assert_eq!(cpu.next_expected(), None);
        assert_eq!(cpu.core().resets, 1);
    }
}
