//! Tracer session: the lifecycle around the wait-state interrupt.
//!
//! ```text
//! Idle ─start(prime)──▶ AwaitingBusGrant ─grant──▶ Priming ─┐
//!  │                                                         │
//!  └──start(no prime)──────────────▶ AwaitingResetAck ◀──────┘
//!                                          │ reset ack
//!                                          ▼
//!                                        Active
//! ```
//!
//! `stop()` returns to `Idle` from anywhere. Both contexts reach the session
//! through `&mut self`: the interrupt entry point is
//! [`TracerSession::on_wait_interrupt`], everything else is polled. The
//! interrupt path only pushes through the rings' writer half; the polled
//! path only pops through the reader half.

use serde::Serialize;
use tracing::{debug, info, warn};
use tracer_core::{
    AccessHandler, BusControl, BusCycleRecord, BusError, BusSnapshot, CpuCore, CycleFlags, MEMORY_IMAGE_LEN,
};

use crate::capture::{CaptureReader, CaptureWriter, EXCEPTION_CAPACITY, TRACE_CAPACITY, capture_rings};
use crate::comparator::{CycleComparator, ExceptionRecord};
use crate::config::TracerConfig;
use crate::error::TracerError;
use crate::report::{ELEMENT_LEN, TraceFrame, TraceReport, exception_line, flag_string, frame_overhead};
use crate::stats::TracerStats;

/// Lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    #[default]
    Idle,
    AwaitingBusGrant,
    Priming,
    AwaitingResetAck,
    Active,
}

/// Mode flags chosen at start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// Push every cycle into the trace ring.
    pub record_all: bool,
    /// Check every cycle against the oracle.
    pub compare_to_emulated: bool,
    /// Log each exception as it is drained.
    pub verbose_logging: bool,
    /// Copy target memory into the oracle's image before the reset.
    pub prime_from_memory: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            record_all: true,
            compare_to_emulated: true,
            verbose_logging: false,
            prime_from_memory: true,
        }
    }
}

/// How `service` hands trace records to the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportMode {
    /// One human-readable record per call.
    #[default]
    Long,
    /// As many packed records as fit one transport frame.
    Binary,
}

/// Destination for drained records.
pub trait ReportSink {
    fn exception(&mut self, exception: &ExceptionRecord);

    fn trace_record(&mut self, report: &TraceReport);

    /// Bytes the transport can accept right now.
    fn available(&self) -> usize;

    fn send_frame(&mut self, frame: &TraceFrame);

    /// True when the sink logs every exception it receives; verbose mode then
    /// adds no line of its own.
    fn logs_exceptions(&self) -> bool {
        false
    }
}

/// Sink that writes everything to the `tracing` log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink {
    /// Space reported to binary framing.
    pub frame_space: usize,
}

impl ReportSink for LogSink {
    fn exception(&mut self, exception: &ExceptionRecord) {
        warn!("{}", exception_line(exception));
    }

    fn trace_record(&mut self, report: &TraceReport) {
        info!(
            "{:07} {:04x} {:02x} {}",
            report.sequence,
            report.address,
            report.data,
            flag_string(report.flags, '.')
        );
    }

    fn available(&self) -> usize {
        self.frame_space
    }

    fn send_frame(&mut self, frame: &TraceFrame) {
        info!(first = frame.first_sequence(), elements = frame.len(), "trace frame");
    }

    fn logs_exceptions(&self) -> bool {
        true
    }
}

/// Counters and queue depths for the status command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TracerStatus {
    pub state: SessionState,
    pub isr_calls: u32,
    pub instructions_executed: u32,
    pub error_count: u32,
    pub dropped_traces: u32,
    pub dropped_exceptions: u32,
    pub traces_pending: usize,
    pub exceptions_pending: usize,
    pub holding_target: bool,
}

/// One tracing session against one target.
///
/// `B` drives the interposer hardware, `M` is the oracle's memory and IO,
/// `C` is the oracle CPU. `TRACE` and `EXCEPTIONS` size the capture rings.
pub struct TracerSession<
    B,
    M,
    C,
    const TRACE: usize = TRACE_CAPACITY,
    const EXCEPTIONS: usize = EXCEPTION_CAPACITY,
> {
    bus: B,
    memory: M,
    comparator: CycleComparator<C>,
    writer: CaptureWriter<TRACE, EXCEPTIONS>,
    reader: CaptureReader<TRACE, EXCEPTIONS>,
    config: TracerConfig,
    state: SessionState,
    options: SessionOptions,
    stats: TracerStats,
    /// A bus hold is asserted on our behalf.
    holding_target: bool,
    /// Bus ownership has been requested and not yet released.
    bus_requested: bool,
}

impl<B, M, C, const TRACE: usize, const EXCEPTIONS: usize> TracerSession<B, M, C, TRACE, EXCEPTIONS>
where
    B: BusControl,
    M: AccessHandler,
    C: CpuCore,
{
    /// Build an idle session. Fails if `config` does not suit the trace ring.
    pub fn new(bus: B, memory: M, core: C, config: TracerConfig) -> Result<Self, TracerError> {
        config.validate(TRACE)?;
        let (writer, reader) = capture_rings();
        Ok(Self {
            bus,
            memory,
            comparator: CycleComparator::new(core),
            writer,
            reader,
            config,
            state: SessionState::Idle,
            options: SessionOptions::default(),
            stats: TracerStats::default(),
            holding_target: false,
            bus_requested: false,
        })
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[must_use]
    pub fn options(&self) -> SessionOptions {
        self.options
    }

    #[must_use]
    pub fn stats(&self) -> TracerStats {
        self.stats
    }

    #[must_use]
    pub fn config(&self) -> &TracerConfig {
        &self.config
    }

    #[must_use]
    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    #[must_use]
    pub fn memory(&self) -> &M {
        &self.memory
    }

    #[must_use]
    pub fn comparator(&self) -> &CycleComparator<C> {
        &self.comparator
    }

    /// Polled side of the capture rings.
    #[must_use]
    pub fn captured(&self) -> &CaptureReader<TRACE, EXCEPTIONS> {
        &self.reader
    }

    #[must_use]
    pub fn is_holding_target(&self) -> bool {
        self.holding_target
    }

    #[must_use]
    pub fn status(&self) -> TracerStatus {
        TracerStatus {
            state: self.state,
            isr_calls: self.stats.isr_calls,
            instructions_executed: self.stats.instructions_executed,
            error_count: self.stats.error_count,
            dropped_traces: self.stats.dropped_traces,
            dropped_exceptions: self.stats.dropped_exceptions,
            traces_pending: self.reader.traces_pending(),
            exceptions_pending: self.reader.exceptions_pending(),
            holding_target: self.holding_target,
        }
    }

    // -----------------------------------------------------------------------
    // Control
    // -----------------------------------------------------------------------

    /// Begin a session. A running session is stopped first.
    pub fn start(&mut self, options: SessionOptions) {
        if self.state != SessionState::Idle {
            self.stop();
        }
        self.options = options;
        info!(
            record = options.record_all,
            compare = options.compare_to_emulated,
            prime = options.prime_from_memory,
            "tracer starting"
        );
        self.bus.enable_wait_interrupts(true);
        if options.prime_from_memory {
            self.state = SessionState::AwaitingBusGrant;
            self.bus_requested = true;
            self.bus.request_bus_ownership();
        } else {
            self.bus.enable_wait_generation(true, true);
            self.state = SessionState::AwaitingResetAck;
            self.bus.request_target_reset();
        }
    }

    /// Tear down from any state, releasing every hardware resource.
    pub fn stop(&mut self) {
        if self.state != SessionState::Idle {
            info!(
                isr_calls = self.stats.isr_calls,
                errors = self.stats.error_count,
                instructions = self.stats.instructions_executed,
                "tracer stopped"
            );
        }
        self.bus.enable_wait_interrupts(false);
        self.bus.enable_wait_generation(false, false);
        self.bus.set_bus_hold(false);
        self.holding_target = false;
        if self.bus_requested {
            self.bus.release_bus_ownership();
            self.bus_requested = false;
        }
        self.reader.clear();
        self.stats.clear();
        self.state = SessionState::Idle;
    }

    /// Bus ownership answer. On success primes the oracle's memory from the
    /// target and moves on to the reset.
    pub fn on_bus_granted(&mut self, result: Result<(), BusError>) -> Result<(), TracerError> {
        self.expect_state(SessionState::AwaitingBusGrant, "bus grant")?;
        if let Err(err) = result {
            warn!(%err, "bus grant failed");
            self.stop();
            return Err(TracerError::BusGrant(err));
        }

        self.state = SessionState::Priming;
        if let Err(err) = self.prime() {
            warn!(%err, "priming failed");
            self.stop();
            return Err(TracerError::Priming(err));
        }

        self.bus.enable_wait_generation(true, true);
        self.bus.set_bus_hold(false);
        self.holding_target = false;
        self.bus.release_bus_ownership();
        self.bus_requested = false;
        self.state = SessionState::AwaitingResetAck;
        self.bus.request_target_reset();
        Ok(())
    }

    /// Target reset answer. On success the session goes live.
    pub fn on_reset_acknowledged(&mut self, result: Result<(), BusError>) -> Result<(), TracerError> {
        self.expect_state(SessionState::AwaitingResetAck, "reset")?;
        if let Err(err) = result {
            warn!(%err, "target reset failed");
            self.stop();
            return Err(TracerError::Reset(err));
        }
        self.reader.clear();
        self.stats.clear();
        self.comparator.reset();
        self.state = SessionState::Active;
        info!("tracer active");
        Ok(())
    }

    fn expect_state(&self, expected: SessionState, ack: &'static str) -> Result<(), TracerError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(TracerError::UnexpectedAcknowledge { ack, state: self.state })
        }
    }

    fn prime(&mut self) -> Result<(), BusError> {
        let mut image = vec![0u8; MEMORY_IMAGE_LEN];
        self.bus.block_read(0, &mut image)?;
        for (address, &byte) in (0..=u16::MAX).zip(image.iter()) {
            self.memory.handle_access(address, byte, CycleFlags::MEM_WRITE);
        }
        debug!(bytes = image.len(), "oracle memory primed from target");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Interrupt context
    // -----------------------------------------------------------------------

    /// Wait-state interrupt: one target bus cycle. Ignored unless active.
    pub fn on_wait_interrupt(&mut self, snapshot: BusSnapshot) {
        if self.state != SessionState::Active {
            return;
        }
        let record = BusCycleRecord::capture(self.stats.isr_calls, snapshot);

        if self.options.compare_to_emulated
            && let Some(exception) = self.comparator.compare(&record, &mut self.memory, &mut self.stats)
            && !self.writer.push_exception(exception)
        {
            self.stats.dropped_exceptions = self.stats.dropped_exceptions.wrapping_add(1);
        }

        if self.options.record_all && !self.writer.push_trace(record) {
            self.stats.dropped_traces = self.stats.dropped_traces.wrapping_add(1);
        }

        if !self.holding_target && self.writer.needs_hold(self.config.trace_headroom) {
            self.holding_target = true;
            self.bus.set_bus_hold(true);
        }

        self.stats.isr_calls = self.stats.isr_calls.wrapping_add(1);
    }

    // -----------------------------------------------------------------------
    // Polled context
    // -----------------------------------------------------------------------

    /// Drain at most one exception and one trace record (or frame) into
    /// `sink`.
    pub fn service<S: ReportSink>(&mut self, mode: ReportMode, sink: &mut S) {
        if let Some(exception) = self.reader.pop_exception() {
            if let Some(line) = self.verbose_line(&exception, sink.logs_exceptions()) {
                debug!("{line}");
            }
            sink.exception(&exception);
        }
        match mode {
            ReportMode::Long => {
                if let Some(report) = self.get_trace_record() {
                    sink.trace_record(&report);
                }
            }
            ReportMode::Binary => {
                if let Some(frame) = self.get_trace_frame(sink.available()) {
                    sink.send_frame(&frame);
                }
            }
        }
        self.release_hold_if_drained();
    }

    /// Take the oldest trace record.
    pub fn get_trace_record(&mut self) -> Option<TraceReport> {
        let record = self.reader.pop_trace()?;
        self.release_hold_if_drained();
        Some(TraceReport::from(&record))
    }

    /// Take as many trace records as fit in `available` transport bytes.
    ///
    /// Returns `None`, consuming nothing, when the ring is empty or the
    /// space cannot hold the header and one element.
    pub fn get_trace_frame(&mut self, available: usize) -> Option<TraceFrame> {
        let first = self.reader.peek_trace()?;
        if available < self.config.min_frame_space {
            return None;
        }
        let fits = available.saturating_sub(frame_overhead(available)) / ELEMENT_LEN;
        let count = fits
            .min(self.config.max_frame_elements)
            .min(self.reader.traces_pending());
        if count == 0 {
            return None;
        }
        let mut frame = TraceFrame::with_capacity(first.sequence(), count);
        for _ in 0..count {
            if let Some(record) = self.reader.pop_trace() {
                frame.push(&record);
            }
        }
        self.release_hold_if_drained();
        Some(frame)
    }

    /// Take the oldest exception.
    pub fn get_exception(&mut self) -> Option<ExceptionRecord> {
        self.reader.pop_exception()
    }

    fn verbose_line(&self, exception: &ExceptionRecord, sink_logs: bool) -> Option<String> {
        (self.options.verbose_logging && !sink_logs).then(|| exception_line(exception))
    }

    /// Let the target run again once the trace ring has room.
    pub fn release_hold_if_drained(&mut self) {
        if self.holding_target && self.reader.can_release(self.config.trace_headroom) {
            self.holding_target = false;
            self.bus.set_bus_hold(false);
            debug!(free = self.reader.trace_vacant_len(), "bus hold released");
        }
    }
}
