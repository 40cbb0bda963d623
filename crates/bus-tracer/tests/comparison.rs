//! Real bus cycles checked against the Z80 oracle.
//!
//! The "target" here is a second `Z80Core` running the same program over
//! its own memory image, so its cycle stream is what real hardware would
//! put on the bus.

use bus_tracer::{
    BusSnapshot, CpuCore, CycleFlags, ExceptionRecord, MemoryImage, ReportMode, ReportSink, SessionOptions,
    TraceFrame, TraceReport, TracerConfig, TracerSession, Z80Core, Z80Tracer,
};
use tracer_core::testing::{RecordingBusControl, ScriptedAccess, ScriptedCore};
use tracer_core::{AccessHandler, CpuHooks};

/// LD A,42h / LD (8000h),A / OUT (FEh),A / IN A,(FEh) / INC A / JR 0
const PROGRAM: [u8; 12] = [
    0x3E, 0x42, 0x32, 0x00, 0x80, 0xD3, 0xFE, 0xDB, 0xFE, 0x3C, 0x18, 0xF4,
];

struct Target {
    mem: MemoryImage,
    cycles: Vec<BusSnapshot>,
}

impl Target {
    fn access(&mut self, address: u16, data: u8, flags: CycleFlags) -> u8 {
        let value = self.mem.handle_access(address, data, flags);
        self.cycles.push(BusSnapshot::new(address, value, flags));
        value
    }
}

impl CpuHooks for Target {
    fn mem_read(&mut self, address: u16, opcode_fetch: bool) -> u8 {
        let flags = if opcode_fetch {
            CycleFlags::FETCH | CycleFlags::WAIT
        } else {
            CycleFlags::MEM_READ | CycleFlags::WAIT
        };
        self.access(address, 0, flags)
    }

    fn mem_write(&mut self, address: u16, value: u8) {
        self.access(address, value, CycleFlags::MEM_WRITE);
    }

    fn io_read(&mut self, port: u16) -> u8 {
        self.access(port, 0, CycleFlags::IO_READ)
    }

    fn io_write(&mut self, port: u16, value: u8) {
        self.access(port, value, CycleFlags::IO_WRITE);
    }
}

fn target_cycles(program: &[u8], count: usize) -> Vec<BusSnapshot> {
    let mut mem = MemoryImage::new();
    mem.load(0, program);
    let mut target = Target {
        mem,
        cycles: Vec::new(),
    };
    let mut cpu = Z80Core::new();
    while target.cycles.len() < count {
        cpu.execute_instruction(&mut target);
    }
    target.cycles.truncate(count);
    target.cycles
}

fn z80_session(program: &[u8]) -> Z80Tracer<RecordingBusControl> {
    let mut bus = RecordingBusControl::new();
    bus.target_memory[..program.len()].copy_from_slice(program);
    let mut session =
        Z80Tracer::new(bus, MemoryImage::new(), Z80Core::new(), TracerConfig::default()).unwrap();
    session.start(SessionOptions {
        record_all: false,
        ..SessionOptions::default()
    });
    session.on_bus_granted(Ok(())).unwrap();
    session.on_reset_acknowledged(Ok(())).unwrap();
    session
}

fn drain_exceptions<B, M, C>(session: &mut TracerSession<B, M, C>) -> Vec<ExceptionRecord>
where
    B: bus_tracer::BusControl,
    M: AccessHandler,
    C: CpuCore,
{
    std::iter::from_fn(|| session.get_exception()).collect()
}

#[derive(Default)]
struct Collector {
    exceptions: Vec<ExceptionRecord>,
}

impl ReportSink for Collector {
    fn exception(&mut self, exception: &ExceptionRecord) {
        self.exceptions.push(*exception);
    }

    fn trace_record(&mut self, _report: &TraceReport) {}

    fn available(&self) -> usize {
        0
    }

    fn send_frame(&mut self, _frame: &TraceFrame) {}
}

#[test]
fn nop_fetch_matches() {
    let mut session = z80_session(&[]);

    session.on_wait_interrupt(BusSnapshot::new(0x0000, 0x00, CycleFlags::FETCH).with_driven(0x00));

    assert!(drain_exceptions(&mut session).is_empty());
    assert_eq!(session.stats().instructions_executed, 1);
    assert_eq!(session.stats().error_count, 0);
    assert_eq!(session.stats().isr_calls, 1);
}

#[test]
fn nop_fetch_with_wrong_data_raises_one_exception() {
    let mut session = z80_session(&[]);

    session.on_wait_interrupt(BusSnapshot::new(0x0000, 0x01, CycleFlags::FETCH).with_driven(0x01));

    let mut sink = Collector::default();
    session.service(ReportMode::Long, &mut sink);
    assert_eq!(sink.exceptions.len(), 1);
    let exception = sink.exceptions[0];
    assert_eq!(exception.sequence, 0);
    assert_eq!(exception.expected_address, 0x0000);
    assert_eq!(exception.expected_data, 0x00);
    assert_eq!(exception.expected_flags, CycleFlags::FETCH);
    assert_eq!(exception.actual_data, 0x01);
    assert_eq!(exception.data_driven_to_target, Some(0x01));
    assert_eq!(session.stats().error_count, 1);
}

#[test]
fn faithful_target_raises_nothing() {
    let cycles = target_cycles(&PROGRAM, 300);
    let mut session = z80_session(&PROGRAM);

    for snapshot in &cycles {
        session.on_wait_interrupt(*snapshot);
    }

    assert!(drain_exceptions(&mut session).is_empty());
    assert_eq!(session.stats().error_count, 0);
    assert!(session.stats().instructions_executed > 30);
    assert_eq!(session.memory().peek(0x8000), 0x42);
}

#[test]
fn every_corrupted_cycle_is_reported() {
    let corruptions: [(usize, fn(&mut BusSnapshot)); 4] = [
        (0, |s: &mut BusSnapshot| s.data ^= 0xFF),
        (3, |s: &mut BusSnapshot| s.address ^= 0x0100),
        // Cycle 17 is the opcode fetch of the second LD (nn),A.
        (17, |s: &mut BusSnapshot| s.flags = s.flags.difference(CycleFlags::OPCODE_FETCH)),
        (42, |s: &mut BusSnapshot| s.data = s.data.wrapping_add(1)),
    ];

    for (index, corrupt) in corruptions {
        let mut cycles = target_cycles(&PROGRAM, 100);
        let before = cycles[index];
        corrupt(&mut cycles[index]);
        assert_ne!(before, cycles[index]);
        let mut session = z80_session(&PROGRAM);

        for snapshot in &cycles {
            session.on_wait_interrupt(*snapshot);
        }

        let exceptions = drain_exceptions(&mut session);
        assert_eq!(exceptions.len(), 1, "corruption at {index}: {exceptions:?}");
        assert_eq!(exceptions[0].sequence, index as u32);
        assert_eq!(exceptions[0].actual_address, cycles[index].address);
        assert_eq!(exceptions[0].expected_address, before.address);
    }
}

#[test]
fn identical_sessions_agree() {
    let mut cycles = target_cycles(&PROGRAM, 200);
    for i in (5..200).step_by(37) {
        cycles[i].data ^= 0x10;
    }

    let run = || {
        let mut session = z80_session(&PROGRAM);
        for snapshot in &cycles {
            session.on_wait_interrupt(*snapshot);
        }
        (drain_exceptions(&mut session), session.stats())
    };

    let (first, first_stats) = run();
    let (second, second_stats) = run();
    assert!(!first.is_empty());
    assert_eq!(first, second);
    assert_eq!(first_stats, second_stats);
}

#[test]
fn interrupt_acknowledge_is_compared_against_queue_head() {
    let mut session = z80_session(&[]);

    session.on_wait_interrupt(BusSnapshot::new(0x0000, 0xFF, CycleFlags::OPCODE_FETCH | CycleFlags::IO));

    let exceptions = drain_exceptions(&mut session);
    assert_eq!(exceptions.len(), 1);
    assert_eq!(exceptions[0].actual_flags, CycleFlags::IO_READ);
    assert_eq!(exceptions[0].expected_flags, CycleFlags::FETCH);
}

#[test]
fn expected_queue_overflow_counts_as_errors() {
    let long_instruction = (0..12).map(ScriptedAccess::Read).collect();
    let core = ScriptedCore::new(vec![long_instruction]);
    let mut session: TracerSession<RecordingBusControl, MemoryImage, ScriptedCore> =
        TracerSession::new(RecordingBusControl::new(), MemoryImage::new(), core, TracerConfig::default()).unwrap();
    session.start(SessionOptions {
        prime_from_memory: false,
        ..SessionOptions::default()
    });
    session.on_reset_acknowledged(Ok(())).unwrap();

    session.on_wait_interrupt(BusSnapshot::new(0, 0, CycleFlags::MEM_READ));

    assert!(drain_exceptions(&mut session).is_empty());
    assert_eq!(session.stats().error_count, 2);
    assert_eq!(session.stats().instructions_executed, 1);
}

#[test]
fn halted_target_matches_repeated_fetches() {
    let mut session = z80_session(&[0x76]);

    session.on_wait_interrupt(BusSnapshot::new(0x0000, 0x76, CycleFlags::FETCH));
    for _ in 0..3 {
        session.on_wait_interrupt(BusSnapshot::new(0x0001, 0x00, CycleFlags::FETCH | CycleFlags::WAIT));
    }

    assert!(drain_exceptions(&mut session).is_empty());
    assert_eq!(session.stats().error_count, 0);
    assert_eq!(session.stats().instructions_executed, 4);
    assert!(session.comparator().cpu().core().is_halted());
}

#[test]
fn program_ending_in_halt_runs_clean() {
    // LD A,42h / LD (8000h),A / HALT
    let program = [0x3E, 0x42, 0x32, 0x00, 0x80, 0x76];
    let cycles = target_cycles(&program, 40);
    assert!(cycles[7..].iter().all(|c| c.address == 0x0006));
    let mut session = z80_session(&program);

    for snapshot in &cycles {
        session.on_wait_interrupt(*snapshot);
    }

    assert!(drain_exceptions(&mut session).is_empty());
    assert_eq!(session.stats().error_count, 0);
    assert_eq!(session.stats().instructions_executed, 3 + 33);
}
