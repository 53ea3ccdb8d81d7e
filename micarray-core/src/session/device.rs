use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::engine::CaptureEngine;
use crate::models::config::HardwareCapabilities;
use crate::models::error::CaptureError;
use crate::session::capture::CaptureSession;
use crate::traits::capture_delegate::CaptureDelegate;
use crate::traits::interrupt_line::InterruptLine;
use crate::traits::transport::Transport;

/// Occupancy of the device's single session slot. Frees the slot on drop.
#[derive(Debug)]
pub(crate) struct SessionSlot(Arc<AtomicBool>);

impl SessionSlot {
    fn claim(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(Arc::clone(flag)))
    }
}

impl Drop for SessionSlot {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// A microphone array: its transport, its interrupt line and the capability
/// block it advertises.
///
/// At most one [`CaptureSession`] exists per device; a second
/// [`open`](CaptureDevice::open) fails with [`CaptureError::Busy`] until the
/// first session is closed or dropped.
///
/// ```ignore
/// let device = CaptureDevice::new(transport, line);
/// let mut session = device.open()?;
/// session.configure(48000, 8)?;
/// session.allocate_buffer(2048, 8)?;
/// session.start()?;
/// ```
pub struct CaptureDevice<T: Transport + 'static, L: InterruptLine> {
    transport: Arc<T>,
    line: Arc<Mutex<L>>,
    capabilities: HardwareCapabilities,
    delegate: Option<Arc<dyn CaptureDelegate>>,
    slot: Arc<AtomicBool>,
}

impl<T: Transport + 'static, L: InterruptLine> CaptureDevice<T, L> {
    pub fn new(transport: T, line: L) -> Self {
        Self {
            transport: Arc::new(transport),
            line: Arc::new(Mutex::new(line)),
            capabilities: HardwareCapabilities::default(),
            delegate: None,
            slot: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Advertise a narrower capability block than the physical limits.
    pub fn with_capabilities(mut self, capabilities: HardwareCapabilities) -> Result<Self, CaptureError> {
        capabilities
            .validate()
            .map_err(CaptureError::InvalidParameter)?;
        self.capabilities = capabilities;
        Ok(self)
    }

    /// Delegate handed to every session opened after this call.
    pub fn set_delegate(&mut self, delegate: Arc<dyn CaptureDelegate>) {
        self.delegate = Some(delegate);
    }

    pub fn capabilities(&self) -> &HardwareCapabilities {
        &self.capabilities
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn is_busy(&self) -> bool {
        self.slot.load(Ordering::Acquire)
    }

    /// Create the session: arm the engine and request the interrupt line.
    pub fn open(&self) -> Result<CaptureSession<T, L>, CaptureError> {
        let slot = SessionSlot::claim(&self.slot).ok_or(CaptureError::Busy)?;

        let mut engine = CaptureEngine::new(Arc::clone(&self.transport), self.delegate.clone());
        let context = engine.arm()?;
        if let Err(e) = self.line.lock().request(context) {
            log::error!("failed to request capture interrupt: {e}");
            // The engine is still armed; dropping it joins the worker, dropping the slot frees it.
            return Err(e);
        }

        let session = CaptureSession::new(
            engine,
            Arc::clone(&self.line),
            self.capabilities.clone(),
            slot,
        );
        log::info!("opened capture session {}", session.id());
        Ok(session)
    }
}
