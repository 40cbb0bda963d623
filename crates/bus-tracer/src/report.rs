//! Wire and log representations of captured cycles.

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use tracer_core::{BusCycleRecord, CycleFlags};

use crate::comparator::ExceptionRecord;

/// Bytes per packed trace element.
pub const ELEMENT_LEN: usize = 4;

/// Flag letters, lowest bit first.
const FLAG_CHARS: [(CycleFlags, char); 7] = [
    (CycleFlags::READ, 'R'),
    (CycleFlags::WRITE, 'W'),
    (CycleFlags::MEMORY, 'M'),
    (CycleFlags::IO, 'I'),
    (CycleFlags::OPCODE_FETCH, '1'),
    (CycleFlags::WAIT, 'T'),
    (CycleFlags::REFRESH, 'F'),
];

/// Element flag bit set when the data byte is meaningful.
const ELEMENT_DATA_VALID: u8 = 0x80;

/// Element flag bits carried straight from the cycle flags.
const ELEMENT_FLAG_MASK: CycleFlags = CycleFlags::READ
    .union(CycleFlags::WRITE)
    .union(CycleFlags::MEMORY)
    .union(CycleFlags::IO)
    .union(CycleFlags::OPCODE_FETCH);

/// Fixed-width flag column: one letter per set bit, `clear` otherwise.
#[must_use]
pub fn flag_string(flags: CycleFlags, clear: char) -> String {
    FLAG_CHARS
        .iter()
        .map(|&(flag, c)| if flags.contains(flag) { c } else { clear })
        .collect()
}

/// One exception as a log line.
#[must_use]
pub fn exception_line(exception: &ExceptionRecord) -> String {
    let driven = exception
        .data_driven_to_target
        .map_or_else(|| "--".to_string(), |v| format!("{v:02x}"));
    format!(
        "{:07} got {:04x} {:02x} {} exp {:04x} {:02x} {} ToZ80 {driven}",
        exception.sequence,
        exception.actual_address,
        exception.actual_data,
        flag_string(exception.actual_flags, ' '),
        exception.expected_address,
        exception.expected_data,
        flag_string(exception.expected_flags, ' '),
    )
}

/// Human-readable form of one trace record.
///
/// Serializes as `{"step":N,"addr":"hhhh","data":"hh","flags":"R.M.1.."}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceReport {
    pub sequence: u32,
    pub address: u16,
    pub data: u8,
    pub flags: CycleFlags,
}

impl From<&BusCycleRecord> for TraceReport {
    fn from(record: &BusCycleRecord) -> Self {
        Self {
            sequence: record.sequence(),
            address: record.address(),
            data: record.data(),
            flags: record.flags(),
        }
    }
}

impl Serialize for TraceReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("TraceReport", 4)?;
        s.serialize_field("step", &self.sequence)?;
        s.serialize_field("addr", &format!("{:04x}", self.address))?;
        s.serialize_field("data", &format!("{:02x}", self.data))?;
        s.serialize_field("flags", &flag_string(self.flags, '.'))?;
        s.end()
    }
}

/// Pack a record as address (LE), data, flags.
#[must_use]
pub fn pack_element(record: &BusCycleRecord) -> [u8; ELEMENT_LEN] {
    let [lo, hi] = record.address().to_le_bytes();
    let mut flags = record.flags().intersection(ELEMENT_FLAG_MASK).bits();
    if record.data_is_valid() {
        flags |= ELEMENT_DATA_VALID;
    }
    [lo, hi, record.data(), flags]
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FrameHeader {
    cmd_name: &'static str,
    trace_count: u32,
    data_len: usize,
}

impl FrameHeader {
    fn new(trace_count: u32, data_len: usize) -> Self {
        Self {
            cmd_name: "tracerGetBinData",
            trace_count,
            data_len,
        }
    }

    fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Header plus terminator bytes a frame needs when at most `available`
/// bytes of payload could follow. Never less than the real overhead.
#[must_use]
pub(crate) fn frame_overhead(available: usize) -> usize {
    FrameHeader::new(u32::MAX, available).to_json().len() + 1
}

/// A batch of packed trace elements for the binary transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceFrame {
    first_sequence: u32,
    elements: Vec<u8>,
}

impl TraceFrame {
    pub(crate) fn with_capacity(first_sequence: u32, elements: usize) -> Self {
        Self {
            first_sequence,
            elements: Vec::with_capacity(elements * ELEMENT_LEN),
        }
    }

    pub(crate) fn push(&mut self, record: &BusCycleRecord) {
        self.elements.extend_from_slice(&pack_element(record));
    }

    /// Sequence of the first element.
    #[must_use]
    pub fn first_sequence(&self) -> u32 {
        self.first_sequence
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len() / ELEMENT_LEN
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Packed elements without the header.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.elements
    }

    /// JSON header announcing the payload.
    #[must_use]
    pub fn header(&self) -> String {
        FrameHeader::new(self.first_sequence, self.elements.len()).to_json()
    }

    /// Header, NUL, payload.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let header = self.header();
        let mut bytes = Vec::with_capacity(header.len() + 1 + self.elements.len());
        bytes.extend_from_slice(header.as_bytes());
        bytes.push(0);
        bytes.extend_from_slice(&self.elements);
        bytes
    }
}
