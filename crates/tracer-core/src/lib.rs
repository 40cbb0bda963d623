//! Core types and collaborator traits for cycle-accurate bus tracing.
//!
//! One bus transaction of the target CPU is one [`BusCycleRecord`]. The
//! tracer talks to the hardware through [`BusControl`], to the emulated
//! memory/IO space through [`AccessHandler`], and to the oracle CPU through
//! [`CpuCore`].

mod bus;
mod cpu;
mod cycle;
mod memory;

#[cfg(feature = "test-utils")]
pub mod testing;

pub use bus::{AccessHandler, BusControl, BusError};
pub use cpu::{CpuCore, CpuHooks};
pub use cycle::{BusCycleRecord, BusSnapshot, CycleFlags, ExpectedCycle};
pub use memory::{MEMORY_IMAGE_LEN, MemoryImage};
