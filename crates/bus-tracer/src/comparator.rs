//! Checks each observed bus cycle against the oracle CPU.

use tracer_core::{AccessHandler, BusCycleRecord, CpuCore, CycleFlags, ExpectedCycle};

use crate::adapter::EmulatedCpu;
use crate::stats::TracerStats;

/// Instructions tried when a step produces no cycles before the observed
/// cycle is compared against an empty expectation.
const MAX_EMPTY_STEPS: usize = 4;

const NOTHING_EXPECTED: ExpectedCycle = ExpectedCycle::new(0, 0, CycleFlags::empty());

/// A bus cycle that differed from what the oracle predicted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionRecord {
    /// `isr_calls` when the cycle was seen.
    pub sequence: u32,
    pub actual_address: u16,
    pub expected_address: u16,
    pub actual_data: u8,
    pub expected_data: u8,
    pub data_driven_to_target: Option<u8>,
    pub actual_flags: CycleFlags,
    pub expected_flags: CycleFlags,
}

impl ExceptionRecord {
    fn new(sequence: u32, actual: &BusCycleRecord, expected: ExpectedCycle) -> Self {
        Self {
            sequence,
            actual_address: actual.address(),
            expected_address: expected.address,
            actual_data: actual.data(),
            expected_data: expected.data,
            data_driven_to_target: actual.data_driven_to_target(),
            actual_flags: actual.flags(),
            expected_flags: expected.flags,
        }
    }
}

/// Owns the oracle and pairs its predictions with the real bus, one cycle
/// at a time.
#[derive(Debug, Clone, Default)]
pub struct CycleComparator<C> {
    cpu: EmulatedCpu<C>,
}

impl<C: CpuCore> CycleComparator<C> {
    pub fn new(core: C) -> Self {
        Self {
            cpu: EmulatedCpu::new(core),
        }
    }

    pub fn reset(&mut self) {
        self.cpu.reset();
    }

    #[must_use]
    pub fn cpu(&self) -> &EmulatedCpu<C> {
        &self.cpu
    }

    /// Compare one observed cycle with the next predicted one.
    ///
    /// Steps the oracle when its queue is drained. Address, flags (wait
    /// masked) and the direction's data byte must all match; otherwise an
    /// exception stamped with the current `isr_calls` is returned and
    /// counted. The oracle is never rolled back.
    pub fn compare<M: AccessHandler>(
        &mut self,
        actual: &BusCycleRecord,
        memory: &mut M,
        stats: &mut TracerStats,
    ) -> Option<ExceptionRecord> {
        let expected = self.next_expected(memory, stats);
        let matches = actual.address() == expected.address
            && actual.flags().without_wait() == expected.flags
            && actual.data() == expected.data;
        if matches {
            return None;
        }
        stats.error_count = stats.error_count.wrapping_add(1);
        Some(ExceptionRecord::new(stats.isr_calls, actual, expected))
    }

    fn next_expected<M: AccessHandler>(&mut self, memory: &mut M, stats: &mut TracerStats) -> ExpectedCycle {
        for _ in 0..MAX_EMPTY_STEPS {
            if let Some(cycle) = self.cpu.next_expected() {
                return cycle;
            }
            let outcome = self.cpu.step_instruction(memory);
            stats.instructions_executed = stats.instructions_executed.wrapping_add(1);
            stats.error_count = stats.error_count.wrapping_add(outcome.dropped);
        }
        self.cpu.next_expected().unwrap_or(NOTHING_EXPECTED)
    }
}
