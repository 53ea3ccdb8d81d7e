//! Deferred half of the drain cycle.
//!
//! Runs on its own thread, woken through the single-slot work channel. Owns
//! the fragment buffer outright; the ring buffer and write position are shared
//! with the control path through [`DrainShared`].

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::Receiver;
use parking_lot::Mutex;

use crate::engine::irq::{DrainCounters, IrqFlags, Work};
use crate::hardware::{regs, FRAGMENT_BYTES_MAX, PERIOD_FRAMES};
use crate::models::error::CaptureError;
use crate::processing::interleave::interleave_fragment;
use crate::processing::ring_buffer::RingBuffer;
use crate::traits::capture_delegate::CaptureDelegate;
use crate::traits::transport::Transport;

/// Drain-side state shared with the control path.
#[derive(Debug, Default)]
pub(crate) struct DrainShared {
    /// The drain lock. Held for the running check, the ring write and the
    /// position update; `stop()` takes it to wait out a write in progress.
    pub ring: Mutex<Option<RingBuffer>>,
    /// Write position in frames. Written under `ring`; read lock-free.
    pub position: AtomicUsize,
    /// Bytes to read per fragment for the installed ring buffer.
    pub fragment_bytes: AtomicUsize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DrainOutcome {
    Delivered(usize),
    ReadFailed,
    Stopped,
    NoBuffer,
    /// Buffer replaced while the read was in flight.
    GeometryChanged,
}

pub(crate) struct DrainWorker<T> {
    transport: Arc<T>,
    flags: Arc<IrqFlags>,
    shared: Arc<DrainShared>,
    delegate: Option<Arc<dyn CaptureDelegate>>,
    fragment: Box<[u8]>,
}

impl<T: Transport + 'static> DrainWorker<T> {
    pub fn new(
        transport: Arc<T>,
        flags: Arc<IrqFlags>,
        shared: Arc<DrainShared>,
        delegate: Option<Arc<dyn CaptureDelegate>>,
    ) -> Self {
        Self {
            transport,
            flags,
            shared,
            delegate,
            fragment: vec![0u8; FRAGMENT_BYTES_MAX].into_boxed_slice(),
        }
    }

    /// Run until `shutdown` is disconnected or every work sender is dropped.
    pub fn spawn(self, work: Receiver<Work>, shutdown: Receiver<()>) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("micarray-drain".into())
            .spawn(move || self.run(work, shutdown))
    }

    fn run(mut self, work: Receiver<Work>, shutdown: Receiver<()>) {
        log::debug!("drain worker started");
        loop {
            crossbeam_channel::select! {
                recv(work) -> msg => match msg {
                    Ok(Work::Drain) => {
                        self.drain_once();
                    }
                    Err(_) => {
                        self.report_lost_line();
                        break;
                    }
                },
                recv(shutdown) -> _ => break,
            }
        }
        log::debug!("drain worker exiting");
    }

    /// One deferred drain: read a fragment, then interleave it into the ring.
    pub fn drain_once(&mut self) -> DrainOutcome {
        let len = self
            .shared
            .fragment_bytes
            .load(Ordering::Acquire)
            .min(self.fragment.len());

        let read = self.transport.read(regs::CAPTURE_FIFO, &mut self.fragment[..len]);

        // From here on the interrupt path may schedule the next transfer.
        self.flags.in_flight.store(false, Ordering::Release);
        self.report_overruns();

        if let Err(e) = read {
            DrainCounters::bump(&self.flags.counters.transport_errors);
            let error = CaptureError::transport("fragment read failed", &e);
            log::error!("{error}");
            self.notify_error(&error);
            return DrainOutcome::ReadFailed;
        }

        let outcome = {
            let mut ring = self.shared.ring.lock();
            if !self.flags.running.load(Ordering::Acquire) {
                DrainOutcome::Stopped
            } else {
                match ring.as_mut() {
                    None => {
                        log::error!("ring buffer missing while capture is running");
                        DrainOutcome::NoBuffer
                    }
                    Some(ring) if ring.period_bytes() != len => DrainOutcome::GeometryChanged,
                    Some(ring) => {
                        let position = self.shared.position.load(Ordering::Acquire);
                        interleave_fragment(
                            &self.fragment[..len],
                            usize::from(ring.channels()),
                            PERIOD_FRAMES,
                            ring.period_mut(position),
                        );
                        let next = (position + PERIOD_FRAMES) % ring.capacity_frames();
                        self.shared.position.store(next, Ordering::Release);
                        DrainOutcome::Delivered(next)
                    }
                }
            }
        };

        // Notifications go out after the lock is released; the host may call back in.
        match outcome {
            DrainOutcome::Delivered(position) => {
                DrainCounters::bump(&self.flags.counters.periods);
                if let Some(ref delegate) = self.delegate {
                    delegate.on_period_elapsed(position);
                }
            }
            other => {
                DrainCounters::bump(&self.flags.counters.aborted);
                log::debug!("drain discarded: {other:?}");
            }
        }
        outcome
    }

    fn report_overruns(&self) {
        let missed = self
            .flags
            .counters
            .unreported_overruns
            .swap(0, Ordering::AcqRel);
        if missed > 0 {
            log::warn!(
                "{missed} capture interrupt(s) arrived before the previous fragment was drained, drain worker not keeping up"
            );
            self.notify_error(&CaptureError::Overrun);
        }
    }

    /// Every interrupt context was dropped. While capturing, no more periods will arrive.
    fn report_lost_line(&self) {
        if !self.flags.running.load(Ordering::Acquire) {
            return;
        }
        DrainCounters::bump(&self.flags.counters.transport_errors);
        let error = CaptureError::TransportError(
            "interrupt line disconnected while capture was running".into(),
        );
        log::error!("{error}");
        self.notify_error(&error);
    }

    fn notify_error(&self, error: &CaptureError) {
        if let Some(ref delegate) = self.delegate {
            delegate.on_error(error);
        }
    }
}
