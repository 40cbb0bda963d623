//! Session counters.

/// Counters maintained by the interrupt path.
///
/// Written only from interrupt context; the polled side reads them for
/// reporting. All counters wrap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TracerStats {
    /// Wait-state interrupts handled while active.
    pub isr_calls: u32,
    /// Instructions executed by the emulated CPU.
    pub instructions_executed: u32,
    /// Mismatches plus expected-queue overflows.
    pub error_count: u32,
    /// Trace records lost to a full ring.
    pub dropped_traces: u32,
    /// Exception records lost to a full ring.
    pub dropped_exceptions: u32,
}

impl TracerStats {
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
