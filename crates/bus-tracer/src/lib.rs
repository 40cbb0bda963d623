//! Cycle-accurate bus tracer and emulation comparator.
//!
//! A [`TracerSession`] sits behind the interposer's wait-state interrupt.
//! Every target bus cycle arrives through
//! [`TracerSession::on_wait_interrupt`], is optionally checked against an
//! emulated Z80 running the same program, and is optionally recorded. A
//! lower-priority loop calls [`TracerSession::service`] to drain what was
//! captured. When the trace ring runs short of space the target is frozen
//! with a bus hold until the drain catches up.

mod adapter;
mod capture;
mod command;
mod comparator;
mod config;
mod error;
mod report;
mod session;
mod stats;

pub use adapter::{EmulatedCpu, ExpectedCycleQueue, MAX_CYCLES_PER_INSTRUCTION, StepOutcome};
pub use capture::{
    CaptureConsumer, CaptureProducer, CaptureReader, CaptureWriter, EXCEPTION_CAPACITY, TRACE_CAPACITY, capture_rings,
};
pub use command::CommandReply;
pub use comparator::{CycleComparator, ExceptionRecord};
pub use config::{ConfigError, TracerConfig};
pub use error::TracerError;
pub use report::{ELEMENT_LEN, TraceFrame, TraceReport, exception_line, flag_string};
pub use session::{LogSink, ReportMode, ReportSink, SessionOptions, SessionState, TracerSession, TracerStatus};
pub use stats::TracerStats;

pub use tracer_core::{
    AccessHandler, BusControl, BusCycleRecord, BusError, BusSnapshot, CpuCore, CycleFlags, ExpectedCycle,
    MemoryImage,
};
pub use tracer_z80::Z80Core;

/// Session checking the target against the `z80emu` oracle.
pub type Z80Tracer<B, M = MemoryImage> = TracerSession<B, M, Z80Core>;
