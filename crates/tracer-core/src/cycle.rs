//! Bus cycle representation.

use bitflags::bitflags;

bitflags! {
    /// Control signals of one bus cycle.
    ///
    /// Bit positions follow the interposer's control-bus register, so raw
    /// hardware values convert with `from_bits_truncate`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CycleFlags: u8 {
        /// RD strobe.
        const READ = 0x01;
        /// WR strobe.
        const WRITE = 0x02;
        /// MREQ: memory address space.
        const MEMORY = 0x04;
        /// IORQ: IO address space.
        const IO = 0x08;
        /// M1: opcode fetch.
        const OPCODE_FETCH = 0x10;
        /// Wait line held by the interposer. Has no software-visible meaning.
        const WAIT = 0x20;
        /// RFSH: DRAM refresh.
        const REFRESH = 0x40;
    }
}

impl CycleFlags {
    /// Memory read.
    pub const MEM_READ: Self = Self::READ.union(Self::MEMORY);
    /// Memory write.
    pub const MEM_WRITE: Self = Self::WRITE.union(Self::MEMORY);
    /// IO read.
    pub const IO_READ: Self = Self::READ.union(Self::IO);
    /// IO write.
    pub const IO_WRITE: Self = Self::WRITE.union(Self::IO);
    /// M1 opcode fetch.
    pub const FETCH: Self = Self::MEM_READ.union(Self::OPCODE_FETCH);

    /// Flags with the transient wait indicator removed, as used for
    /// comparison.
    #[must_use]
    pub fn without_wait(self) -> Self {
        self.difference(Self::WAIT)
    }

    /// Normalise a raw control snapshot so that exactly one direction and
    /// exactly one address space are set.
    ///
    /// WR wins over RD, IORQ wins over MREQ. M1 survives only on memory
    /// reads; an interrupt acknowledge (M1 + IORQ) becomes a plain IO read.
    #[must_use]
    pub fn normalized(raw: Self) -> Self {
        let mut flags = if raw.contains(Self::WRITE) {
            Self::WRITE
        } else {
            Self::READ
        };
        flags |= if raw.contains(Self::IO) {
            Self::IO
        } else {
            Self::MEMORY
        };
        if raw.contains(Self::OPCODE_FETCH) && flags == Self::MEM_READ {
            flags |= Self::OPCODE_FETCH;
        }
        flags | raw.intersection(Self::WAIT | Self::REFRESH)
    }

    /// True when exactly one direction and one address space are set, and
    /// an opcode fetch is a memory read.
    #[must_use]
    pub fn is_well_formed(self) -> bool {
        let one_direction = self.contains(Self::READ) != self.contains(Self::WRITE);
        let one_space = self.contains(Self::MEMORY) != self.contains(Self::IO);
        let fetch_ok = !self.contains(Self::OPCODE_FETCH) || self.contains(Self::MEM_READ);
        one_direction && one_space && fetch_ok
    }

    #[must_use]
    pub fn is_write(self) -> bool {
        self.contains(Self::WRITE)
    }
}

/// Raw signal snapshot latched by the bus-control layer when it raises the
/// wait-state interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusSnapshot {
    pub address: u16,
    /// Byte latched from the data bus.
    pub data: u8,
    /// Control lines as read from the hardware.
    pub flags: CycleFlags,
    /// Value this system drove onto the bus for a read, if it answered one.
    pub driven: Option<u8>,
}

impl BusSnapshot {
    #[must_use]
    pub const fn new(address: u16, data: u8, flags: CycleFlags) -> Self {
        Self {
            address,
            data,
            flags,
            driven: None,
        }
    }

    /// Same snapshot, with the value the interposer drove for a read.
    #[must_use]
    pub const fn with_driven(mut self, value: u8) -> Self {
        self.driven = Some(value);
        self
    }
}

/// One observed bus transaction.
///
/// Built in interrupt context from a [`BusSnapshot`] and never modified
/// afterwards. The flags always carry exactly one direction and one address
/// space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusCycleRecord {
    sequence: u32,
    address: u16,
    data_from_target: u8,
    data_driven_to_target: Option<u8>,
    flags: CycleFlags,
}

impl BusCycleRecord {
    /// Decode a snapshot, stamping it with `sequence`.
    #[must_use]
    pub fn capture(sequence: u32, snapshot: BusSnapshot) -> Self {
        let flags = CycleFlags::normalized(snapshot.flags);
        Self {
            sequence,
            address: snapshot.address,
            data_from_target: snapshot.data,
            // A driven value on a write cycle never reached the target.
            data_driven_to_target: if flags.is_write() {
                None
            } else {
                snapshot.driven
            },
            flags,
        }
    }

    #[must_use]
    pub const fn sequence(&self) -> u32 {
        self.sequence
    }

    #[must_use]
    pub const fn address(&self) -> u16 {
        self.address
    }

    #[must_use]
    pub const fn data_from_target(&self) -> u8 {
        self.data_from_target
    }

    #[must_use]
    pub const fn data_driven_to_target(&self) -> Option<u8> {
        self.data_driven_to_target
    }

    #[must_use]
    pub const fn flags(&self) -> CycleFlags {
        self.flags
    }

    /// The byte that matters for this cycle's direction.
    ///
    /// Writes carry the target's byte. Reads carry the byte this system
    /// drove, or the latched bus byte when some other device answered.
    #[must_use]
    pub fn data(&self) -> u8 {
        if self.flags.is_write() {
            self.data_from_target
        } else {
            self.data_driven_to_target.unwrap_or(self.data_from_target)
        }
    }

    /// True when [`data`](Self::data) is known to be meaningful: a write, or
    /// a read this system answered.
    #[must_use]
    pub fn data_is_valid(&self) -> bool {
        self.flags.is_write() || self.data_driven_to_target.is_some()
    }
}

/// A bus cycle predicted by the emulated CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpectedCycle {
    pub address: u16,
    pub data: u8,
    pub flags: CycleFlags,
}

impl ExpectedCycle {
    #[must_use]
    pub const fn new(address: u16, data: u8, flags: CycleFlags) -> Self {
        Self {
            address,
            data,
            flags,
        }
    }

    #[must_use]
    pub const fn fetch(address: u16, data: u8) -> Self {
        Self::new(address, data, CycleFlags::FETCH)
    }

    #[must_use]
    pub const fn mem_read(address: u16, data: u8) -> Self {
        Self::new(address, data, CycleFlags::MEM_READ)
    }

    #[must_use]
    pub const fn mem_write(address: u16, data: u8) -> Self {
        Self::new(address, data, CycleFlags::MEM_WRITE)
    }

    #[must_use]
    pub const fn io_read(port: u16, data: u8) -> Self {
        Self::new(port, data, CycleFlags::IO_READ)
    }

    #[must_use]
    pub const fn io_write(port: u16, data: u8) -> Self {
        Self::new(port, data, CycleFlags::IO_WRITE)
    }
}
