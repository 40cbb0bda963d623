//! Fixed-capacity capture rings.
//!
//! Each ring is a `ringbuf` SPSC buffer split once at session creation. The
//! interrupt path owns the [`CaptureWriter`] (producer halves) and the
//! polled path owns the [`CaptureReader`] (consumer halves), so neither side
//! ever moves the other side's index.

use std::sync::Arc;

use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{CachingCons, CachingProd, StaticRb};
use tracer_core::BusCycleRecord;

use crate::comparator::ExceptionRecord;

/// Trace ring slots.
pub const TRACE_CAPACITY: usize = 1024;

/// Exception ring slots.
pub const EXCEPTION_CAPACITY: usize = 32;

pub type CaptureProducer<T, const N: usize> = CachingProd<Arc<StaticRb<T, N>>>;
pub type CaptureConsumer<T, const N: usize> = CachingCons<Arc<StaticRb<T, N>>>;

/// Build the trace and exception rings of one session.
#[must_use]
pub fn capture_rings<const TRACE: usize, const EXCEPTIONS: usize>()
-> (CaptureWriter<TRACE, EXCEPTIONS>, CaptureReader<TRACE, EXCEPTIONS>) {
    let (trace_producer, trace_consumer) = StaticRb::<BusCycleRecord, TRACE>::default().split();
    let (exception_producer, exception_consumer) = StaticRb::<ExceptionRecord, EXCEPTIONS>::default().split();
    (
        CaptureWriter {
            traces: trace_producer,
            exceptions: exception_producer,
        },
        CaptureReader {
            traces: trace_consumer,
            exceptions: exception_consumer,
        },
    )
}

/// Interrupt side of the rings.
pub struct CaptureWriter<const TRACE: usize = TRACE_CAPACITY, const EXCEPTIONS: usize = EXCEPTION_CAPACITY> {
    traces: CaptureProducer<BusCycleRecord, TRACE>,
    exceptions: CaptureProducer<ExceptionRecord, EXCEPTIONS>,
}

impl<const TRACE: usize, const EXCEPTIONS: usize> CaptureWriter<TRACE, EXCEPTIONS> {
    /// False when the ring is full. Unread records are never overwritten.
    pub fn push_trace(&mut self, record: BusCycleRecord) -> bool {
        self.traces.try_push(record).is_ok()
    }

    /// False when the ring is full.
    pub fn push_exception(&mut self, exception: ExceptionRecord) -> bool {
        self.exceptions.try_push(exception).is_ok()
    }

    #[must_use]
    pub fn trace_vacant_len(&self) -> usize {
        self.traces.vacant_len()
    }

    /// Free trace slots have dropped below `headroom`: the target must be
    /// held before another instruction's worth of cycles arrives.
    #[must_use]
    pub fn needs_hold(&self, headroom: usize) -> bool {
        self.trace_vacant_len() < headroom
    }
}

/// Polled side of the rings.
pub struct CaptureReader<const TRACE: usize = TRACE_CAPACITY, const EXCEPTIONS: usize = EXCEPTION_CAPACITY> {
    traces: CaptureConsumer<BusCycleRecord, TRACE>,
    exceptions: CaptureConsumer<ExceptionRecord, EXCEPTIONS>,
}

impl<const TRACE: usize, const EXCEPTIONS: usize> CaptureReader<TRACE, EXCEPTIONS> {
    pub fn pop_trace(&mut self) -> Option<BusCycleRecord> {
        self.traces.try_pop()
    }

    /// Oldest unread trace record, left in place.
    #[must_use]
    pub fn peek_trace(&self) -> Option<BusCycleRecord> {
        self.traces.try_peek().copied()
    }

    pub fn pop_exception(&mut self) -> Option<ExceptionRecord> {
        self.exceptions.try_pop()
    }

    #[must_use]
    pub fn traces_pending(&self) -> usize {
        self.traces.occupied_len()
    }

    #[must_use]
    pub fn exceptions_pending(&self) -> usize {
        self.exceptions.occupied_len()
    }

    #[must_use]
    pub fn trace_vacant_len(&self) -> usize {
        self.traces.vacant_len()
    }

    #[must_use]
    pub fn is_trace_full(&self) -> bool {
        self.traces.is_full()
    }

    /// Enough trace slots are free again to let the target run.
    #[must_use]
    pub fn can_release(&self, headroom: usize) -> bool {
        self.trace_vacant_len() > headroom
    }

    /// Discard everything unread in both rings.
    pub fn clear(&mut self) {
        self.traces.clear();
        self.exceptions.clear();
    }
}
