//! Interrupt fast path.
//!
//! Everything reachable from [`IrqContext`] is an atomic or a non-blocking
//! `try_send`; there is no lock and no logging on this path. Anything that
//! needs either is deferred to the drain worker.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Sender, TrySendError};

use crate::models::diagnostics::CaptureDiagnostics;

/// Request sent from the interrupt path to the drain worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Work {
    Drain,
}

#[derive(Debug, Default)]
pub(crate) struct DrainCounters {
    pub interrupts: AtomicU64,
    pub ignored: AtomicU64,
    pub overruns: AtomicU64,
    /// Overruns the worker has not logged yet.
    pub unreported_overruns: AtomicU64,
    pub transport_errors: AtomicU64,
    pub periods: AtomicU64,
    pub aborted: AtomicU64,
}

impl DrainCounters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CaptureDiagnostics {
        CaptureDiagnostics {
            interrupts: self.interrupts.load(Ordering::Relaxed),
            ignored_interrupts: self.ignored.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
            transport_errors: self.transport_errors.load(Ordering::Relaxed),
            periods_elapsed: self.periods.load(Ordering::Relaxed),
            aborted_drains: self.aborted.load(Ordering::Relaxed),
        }
    }
}

/// Flags shared between the interrupt path, the drain worker and the control path.
#[derive(Debug, Default)]
pub(crate) struct IrqFlags {
    /// A session owns the engine.
    pub attached: AtomicBool,
    /// Capture has been started. Set with `Release` after the position reset,
    /// cleared with `Release` under the drain lock.
    pub running: AtomicBool,
    /// A fragment transfer is scheduled or being read. Set only by
    /// [`IrqContext::handle`], cleared only by the worker once its read returns.
    pub in_flight: AtomicBool,
    pub counters: DrainCounters,
}

/// What [`IrqContext::handle`] did with an interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqOutcome {
    /// No session attached; not ours.
    Unclaimed,
    /// Session attached but capture not running; acknowledged and dropped.
    Ignored,
    /// The previous transfer has not finished; no second transfer was started.
    Overrun,
    /// A drain cycle was handed to the worker.
    Scheduled,
}

/// Handle given to an [`InterruptLine`](crate::traits::interrupt_line::InterruptLine).
///
/// Cheap to clone. Safe to call from any thread, including contexts that must
/// not block.
#[derive(Clone)]
pub struct IrqContext {
    flags: Arc<IrqFlags>,
    work: Sender<Work>,
}

impl IrqContext {
    pub(crate) fn new(flags: Arc<IrqFlags>, work: Sender<Work>) -> Self {
        Self { flags, work }
    }

    /// Acknowledge one hardware interrupt.
    pub fn handle(&self) -> IrqOutcome {
        let flags = &*self.flags;

        if !flags.attached.load(Ordering::Acquire) {
            return IrqOutcome::Unclaimed;
        }
        DrainCounters::bump(&flags.counters.interrupts);

        // The device free-runs; software is the only gate.
        if !flags.running.load(Ordering::Acquire) {
            DrainCounters::bump(&flags.counters.ignored);
            return IrqOutcome::Ignored;
        }

        // Set before the request is sent; cleared only after the worker's read returns.
        if flags.in_flight.swap(true, Ordering::AcqRel) {
            Self::record_overrun(flags);
            return IrqOutcome::Overrun;
        }

        match self.work.try_send(Work::Drain) {
            Ok(()) => IrqOutcome::Scheduled,
            // A request is still queued; the worker will clear in_flight when it runs.
            Err(TrySendError::Full(_)) => {
                Self::record_overrun(flags);
                IrqOutcome::Overrun
            }
            Err(TrySendError::Disconnected(_)) => {
                flags.in_flight.store(false, Ordering::Release);
                IrqOutcome::Unclaimed
            }
        }
    }

    fn record_overrun(flags: &IrqFlags) {
        DrainCounters::bump(&flags.counters.overruns);
        DrainCounters::bump(&flags.counters.unreported_overruns);
    }
}

impl fmt::Debug for IrqContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IrqContext")
            .field("attached", &self.flags.attached.load(Ordering::Relaxed))
            .field("running", &self.flags.running.load(Ordering::Relaxed))
            .field("in_flight", &self.flags.in_flight.load(Ordering::Relaxed))
            .finish()
    }
}
