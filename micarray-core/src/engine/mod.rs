//! Capture engine: the interrupt/worker handshake and the ring position counter.
//!
//! ```text
//! [InterruptLine] ─▶ IrqContext::handle ──try_send──▶ [bounded(1)] ─▶ DrainWorker
//!                       (atomics only)                                  │ Transport::read
//!                                                                       ▼
//!                      stop() ───────────── drain lock ──────────▶ RingBuffer + position
//!                                                                       │
//!                                                      CaptureDelegate::on_period_elapsed
//! ```

mod irq;
mod worker;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::Sender;

pub use irq::{IrqContext, IrqOutcome};

use crate::models::diagnostics::CaptureDiagnostics;
use crate::models::error::CaptureError;
use crate::models::state::EngineState;
use crate::processing::ring_buffer::RingBuffer;
use crate::traits::capture_delegate::CaptureDelegate;
use crate::traits::transport::Transport;
use irq::IrqFlags;
use worker::{DrainShared, DrainWorker};

/// Drives one session's capture: owns the drain worker thread, the shared
/// flags, the ring buffer and the write position.
///
/// Normally owned by a [`CaptureSession`](crate::session::CaptureSession);
/// usable on its own by hosts that do their own session bookkeeping.
pub struct CaptureEngine<T: Transport + 'static> {
    transport: Arc<T>,
    flags: Arc<IrqFlags>,
    shared: Arc<DrainShared>,
    delegate: Option<Arc<dyn CaptureDelegate>>,
    shutdown: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl<T: Transport + 'static> CaptureEngine<T> {
    pub fn new(transport: Arc<T>, delegate: Option<Arc<dyn CaptureDelegate>>) -> Self {
        Self {
            transport,
            flags: Arc::new(IrqFlags::default()),
            shared: Arc::new(DrainShared::default()),
            delegate,
            shutdown: None,
            worker: None,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn state(&self) -> EngineState {
        if !self.flags.attached.load(Ordering::Acquire) {
            EngineState::Idle
        } else if self.flags.running.load(Ordering::Acquire) {
            EngineState::Running
        } else {
            EngineState::Armed
        }
    }

    /// Idle → Armed. Spawns the drain worker and returns the context the
    /// interrupt line should call.
    pub fn arm(&mut self) -> Result<IrqContext, CaptureError> {
        if !self.state().is_idle() {
            return Err(CaptureError::InvalidState("engine already armed".into()));
        }

        let (work_tx, work_rx) = crossbeam_channel::bounded(1);
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded(0);
        let worker = DrainWorker::new(
            Arc::clone(&self.transport),
            Arc::clone(&self.flags),
            Arc::clone(&self.shared),
            self.delegate.clone(),
        )
        .spawn(work_rx, shutdown_rx)
        .map_err(|e| CaptureError::AllocationFailure(format!("failed to spawn drain worker: {e}")))?;

        // Running must read clear before the line can deliver anything.
        self.flags.running.store(false, Ordering::Release);
        self.flags.in_flight.store(false, Ordering::Release);
        self.flags.attached.store(true, Ordering::Release);

        self.shutdown = Some(shutdown_tx);
        self.worker = Some(worker);
        self.notify_state(EngineState::Armed);
        Ok(IrqContext::new(Arc::clone(&self.flags), work_tx))
    }

    /// Armed → Idle. Stops and joins the drain worker.
    ///
    /// Waits for a transport read in progress to return. Must not be called
    /// from a delegate callback (that runs on the worker being joined).
    pub fn disarm(&mut self) -> Result<(), CaptureError> {
        match self.state() {
            EngineState::Idle => return Ok(()),
            EngineState::Running => {
                return Err(CaptureError::InvalidState("stop capture before disarming".into()))
            }
            EngineState::Armed => {}
        }

        self.flags.attached.store(false, Ordering::Release);
        self.shutdown.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("drain worker panicked");
            }
        }
        self.notify_state(EngineState::Idle);
        Ok(())
    }

    /// Install the ring buffer drains write into. Resets the position.
    pub fn install_buffer(&self, ring: RingBuffer) -> Result<(), CaptureError> {
        self.ensure_stopped("replace the ring buffer")?;
        let mut slot = self.shared.ring.lock();
        self.shared
            .fragment_bytes
            .store(ring.period_bytes(), Ordering::Release);
        self.shared.position.store(0, Ordering::Release);
        *slot = Some(ring);
        Ok(())
    }

    pub fn release_buffer(&self) -> Result<Option<RingBuffer>, CaptureError> {
        self.ensure_stopped("release the ring buffer")?;
        let mut slot = self.shared.ring.lock();
        self.shared.fragment_bytes.store(0, Ordering::Release);
        self.shared.position.store(0, Ordering::Release);
        Ok(slot.take())
    }

    pub fn has_buffer(&self) -> bool {
        self.shared.ring.lock().is_some()
    }

    /// Rewind to frame 0 and fill the ring buffer with silence.
    pub fn reset_position(&self) -> Result<(), CaptureError> {
        self.ensure_stopped("reset the position")?;
        let mut ring = self.shared.ring.lock();
        if let Some(ring) = ring.as_mut() {
            ring.clear();
        }
        self.shared.position.store(0, Ordering::Release);
        Ok(())
    }

    /// Armed → Running.
    pub fn start(&self) -> Result<(), CaptureError> {
        match self.state() {
            EngineState::Idle => return Err(CaptureError::InvalidState("no session".into())),
            EngineState::Running => {
                return Err(CaptureError::InvalidState("capture already running".into()))
            }
            EngineState::Armed => {}
        }
        if !self.has_buffer() {
            return Err(CaptureError::InvalidState("no ring buffer allocated".into()));
        }

        self.shared.position.store(0, Ordering::Release);
        // Release publishes the position reset to any drain that observes running.
        self.flags.running.store(true, Ordering::Release);
        log::debug!("capture started");
        self.notify_state(EngineState::Running);
        Ok(())
    }

    /// Running → Armed. Idempotent.
    ///
    /// Returns only once no drain is writing to the ring buffer; drains that
    /// finish their read afterwards discard the fragment.
    pub fn stop(&self) -> Result<(), CaptureError> {
        if self.state().is_idle() {
            return Err(CaptureError::InvalidState("no session".into()));
        }

        let was_running = {
            let _ring = self.shared.ring.lock();
            self.flags.running.swap(false, Ordering::AcqRel)
        };
        if was_running {
            log::debug!("capture stopped");
            self.notify_state(EngineState::Armed);
        }
        Ok(())
    }

    /// Current write position in frames. Lock-free.
    pub fn position(&self) -> usize {
        self.shared.position.load(Ordering::Acquire)
    }

    pub fn diagnostics(&self) -> CaptureDiagnostics {
        self.flags.counters.snapshot()
    }

    /// Consumer-side copy out of the ring buffer.
    pub fn copy_frames(&self, position: usize, out: &mut [u8]) -> Result<usize, CaptureError> {
        self.shared
            .ring
            .lock()
            .as_ref()
            .map(|ring| ring.copy_frames(position, out))
            .ok_or_else(|| CaptureError::InvalidState("no ring buffer allocated".into()))
    }

    fn ensure_stopped(&self, action: &str) -> Result<(), CaptureError> {
        if self.state().is_running() {
            return Err(CaptureError::InvalidState(format!(
                "cannot {action} while capture is running"
            )));
        }
        Ok(())
    }

    fn notify_state(&self, state: EngineState) {
        if let Some(ref delegate) = self.delegate {
            delegate.on_state_changed(state);
        }
    }
}

impl<T: Transport + 'static> Drop for CaptureEngine<T> {
    fn drop(&mut self) {
        if !self.state().is_idle() {
            let _ = self.stop();
            let _ = self.disarm();
        }
    }
}
