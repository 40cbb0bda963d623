//! Hardware and memory collaborator interfaces.

use thiserror::Error;

use crate::CycleFlags;

/// Failure reported by the bus-control layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    /// The target never released the bus (BUSACK not seen).
    #[error("bus request not acknowledged by target")]
    NotAcknowledged,
    /// Reset was requested but the target did not come out of reset.
    #[error("target reset failed")]
    ResetFailed,
    /// A block transfer could not be completed.
    #[error("block access failed at {address:#06x}")]
    BlockAccess { address: u16 },
    /// The bus is claimed by another client.
    #[error("bus busy")]
    Busy,
}

/// Control surface of the physical bus interposer.
///
/// Ownership and reset requests are asynchronous: the driver answers them
/// later through the tracer session's acknowledgement handlers, and is
/// expected to do so within a bounded time.
pub trait BusControl {
    /// Route wait-state interrupts for this client on or off.
    fn enable_wait_interrupts(&mut self, enable: bool);

    /// Ask the target to release the bus (BUSRQ).
    fn request_bus_ownership(&mut self);

    /// Hand the bus back to the target.
    fn release_bus_ownership(&mut self);

    /// Pulse the target's reset line.
    fn request_target_reset(&mut self);

    /// Generate a wait state on memory and/or IO cycles.
    fn enable_wait_generation(&mut self, memory: bool, io: bool);

    /// Keep the target frozen in its current wait state, or let it run.
    fn set_bus_hold(&mut self, hold: bool);

    /// Read target memory starting at `address` into `dest`. Only valid while
    /// this client owns the bus.
    fn block_read(&mut self, address: u16, dest: &mut [u8]) -> Result<(), BusError>;
}

/// Emulated memory and IO space.
///
/// One call per access. For writes `data` is the value written and the
/// result is ignored; for reads `data` is unused and the result is the value
/// read.
pub trait AccessHandler {
    fn handle_access(&mut self, address: u16, data: u8, flags: CycleFlags) -> u8;
}
