use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::engine::CaptureEngine;
use crate::hardware::regs;
use crate::models::config::{BufferLayout, HardwareCapabilities, StreamParams};
use crate::models::diagnostics::{CaptureDiagnostics, SessionInfo};
use crate::models::error::CaptureError;
use crate::models::state::EngineState;
use crate::processing::rate_table::{self, RateConfig, RateEntry};
use crate::processing::ring_buffer::RingBuffer;
use crate::session::device::SessionSlot;
use crate::traits::interrupt_line::InterruptLine;
use crate::traits::transport::Transport;

/// The single open capture session of a [`CaptureDevice`](crate::session::CaptureDevice).
///
/// Typical host sequence:
/// ```text
/// open → configure → allocate_buffer → prepare → start ⇄ stop → close
///        └──────── hw_params ────────┘
/// ```
///
/// Dropping the session tears it down as if `stop` and `close` had been called.
pub struct CaptureSession<T: Transport + 'static, L: InterruptLine> {
    id: Uuid,
    opened_at: DateTime<Utc>,
    engine: CaptureEngine<T>,
    line: Arc<Mutex<L>>,
    capabilities: HardwareCapabilities,
    rate: Option<RateConfig>,
    channels: Option<u16>,
    layout: Option<BufferLayout>,
    slot: Option<SessionSlot>,
}

impl<T: Transport + 'static, L: InterruptLine> CaptureSession<T, L> {
    pub(crate) fn new(
        engine: CaptureEngine<T>,
        line: Arc<Mutex<L>>,
        capabilities: HardwareCapabilities,
        slot: SessionSlot,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            opened_at: Utc::now(),
            engine,
            line,
            capabilities,
            rate: None,
            channels: None,
            layout: None,
            slot: Some(slot),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    pub fn state(&self) -> EngineState {
        self.engine.state()
    }

    pub fn is_closed(&self) -> bool {
        self.slot.is_none()
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id,
            opened_at: self.opened_at,
            state: self.state(),
            rate: self.rate.map(|c| c.entry.rate),
            channels: self.channels,
            layout: self.layout,
        }
    }

    pub fn rate_entry(&self) -> Option<RateEntry> {
        self.rate.map(|c| c.entry)
    }

    pub fn layout(&self) -> Option<BufferLayout> {
        self.layout
    }

    pub fn diagnostics(&self) -> CaptureDiagnostics {
        self.engine.diagnostics()
    }

    /// Program the decimator, gain and FIR filter for `rate`.
    ///
    /// Nothing is written unless the rate has an exact table entry and the
    /// channel count is within the capability block.
    pub fn configure(&mut self, rate: u32, channels: u16) -> Result<RateEntry, CaptureError> {
        self.ensure_open()?;
        self.ensure_stopped("configure")?;
        let config = self.check_rate(rate, channels)?;
        self.apply_rate(config, channels)?;
        Ok(config.entry)
    }

    /// Rate and channel validation. No side effects.
    fn check_rate(&self, rate: u32, channels: u16) -> Result<RateConfig, CaptureError> {
        if !self.capabilities.channel_range.contains(channels) {
            return Err(CaptureError::InvalidParameter(format!(
                "{} channels outside {}..={}",
                channels, self.capabilities.channel_range.min, self.capabilities.channel_range.max
            )));
        }
        if !self.capabilities.rate_range.contains(rate) {
            return Err(CaptureError::UnsupportedRate(rate));
        }
        rate_table::lookup(rate).ok_or(CaptureError::UnsupportedRate(rate))
    }

    fn apply_rate(&mut self, config: RateConfig, channels: u16) -> Result<(), CaptureError> {
        // Until every register is written the hardware is in an unknown state.
        self.rate = None;
        self.write_rate_registers(&config)?;

        if self.channels.is_some_and(|c| c != channels) && self.layout.is_some() {
            log::debug!("channel count changed to {channels}, releasing ring buffer");
            self.engine.release_buffer()?;
            self.layout = None;
        }

        log::info!(
            "session {}: {} Hz x {} ch (decimation {}, gain {})",
            self.id,
            config.entry.rate,
            channels,
            config.entry.decimation,
            config.entry.gain
        );
        self.rate = Some(config);
        self.channels = Some(channels);
        Ok(())
    }

    fn write_rate_registers(&self, config: &RateConfig) -> Result<(), CaptureError> {
        let transport = self.engine.transport();
        transport
            .write(regs::DECIMATION, &config.entry.decimation.to_le_bytes())
            .map_err(|e| CaptureError::transport("decimation write failed", &e))?;
        transport
            .write(regs::GAIN, &config.entry.gain.to_le_bytes())
            .map_err(|e| CaptureError::transport("gain write failed", &e))?;
        transport
            .write(regs::FIR_COEFFS, &config.fir.to_le_bytes())
            .map_err(|e| CaptureError::transport("FIR coefficient write failed", &e))?;
        Ok(())
    }

    /// Reserve the ring buffer. Requires a prior [`configure`](Self::configure).
    pub fn allocate_buffer(
        &mut self,
        period_bytes: usize,
        period_count: usize,
    ) -> Result<BufferLayout, CaptureError> {
        self.ensure_open()?;
        self.ensure_stopped("allocate a buffer")?;
        let channels = self
            .channels
            .ok_or_else(|| CaptureError::InvalidState("configure before allocating a buffer".into()))?;

        let layout = BufferLayout::negotiate(&self.capabilities, channels, period_bytes, period_count)?;
        let ring = RingBuffer::try_new(channels, period_count)?;
        self.install(layout, ring)
    }

    fn install(&mut self, layout: BufferLayout, ring: RingBuffer) -> Result<BufferLayout, CaptureError> {
        self.engine.install_buffer(ring)?;
        log::debug!(
            "session {}: ring buffer {} x {} bytes ({} frames)",
            self.id,
            layout.period_count,
            layout.period_bytes,
            layout.buffer_frames()
        );
        self.layout = Some(layout);
        Ok(layout)
    }

    /// Rate, channels and buffer geometry in one step.
    ///
    /// The whole request is validated and the buffer reserved before any
    /// register is written; a rejected request leaves the session as it was.
    pub fn hw_params(&mut self, params: &StreamParams) -> Result<BufferLayout, CaptureError> {
        self.ensure_open()?;
        self.ensure_stopped("negotiate parameters")?;

        let config = self.check_rate(params.rate, params.channels)?;
        let layout = BufferLayout::negotiate(
            &self.capabilities,
            params.channels,
            params.period_bytes,
            params.period_count,
        )?;
        let ring = RingBuffer::try_new(params.channels, params.period_count)?;

        self.apply_rate(config, params.channels)?;
        self.install(layout, ring)
    }

    /// Release the ring buffer.
    pub fn hw_free(&mut self) -> Result<(), CaptureError> {
        self.ensure_open()?;
        self.ensure_stopped("free the buffer")?;
        self.engine.release_buffer()?;
        self.layout = None;
        Ok(())
    }

    /// Rewind the write position to the start of the buffer and silence it.
    pub fn prepare(&mut self) -> Result<(), CaptureError> {
        self.ensure_open()?;
        self.ensure_stopped("prepare")?;
        if self.layout.is_none() {
            return Err(CaptureError::InvalidState("no buffer allocated".into()));
        }
        self.engine.reset_position()
    }

    pub fn start(&mut self) -> Result<(), CaptureError> {
        self.ensure_open()?;
        if self.rate.is_none() {
            return Err(CaptureError::InvalidState("not configured".into()));
        }
        if self.layout.is_none() {
            return Err(CaptureError::InvalidState("no buffer allocated".into()));
        }
        self.engine.start()?;
        log::info!("session {}: capture started", self.id);
        Ok(())
    }

    /// Stop capture. Returns once no drain is mid-write. No-op when already stopped.
    pub fn stop(&mut self) -> Result<(), CaptureError> {
        self.ensure_open()?;
        let was_running = self.state().is_running();
        self.engine.stop()?;
        if was_running {
            log::info!("session {}: capture stopped", self.id);
        }
        Ok(())
    }

    /// Write position in frames, lock-free.
    pub fn position(&self) -> usize {
        self.engine.position()
    }

    /// Copy frames out of the ring buffer starting at `position`.
    pub fn copy_frames(&self, position: usize, out: &mut [u8]) -> Result<usize, CaptureError> {
        self.ensure_open()?;
        self.engine.copy_frames(position, out)
    }

    /// Release the interrupt line and the session slot. Capture must be stopped.
    pub fn close(&mut self) -> Result<(), CaptureError> {
        self.ensure_open()?;
        self.ensure_stopped("close")?;
        self.teardown();
        Ok(())
    }

    fn teardown(&mut self) {
        if self.state().is_running() {
            let _ = self.engine.stop();
        }
        self.line.lock().release();
        if let Err(e) = self.engine.disarm() {
            log::warn!("session {}: disarm failed: {e}", self.id);
        }
        let _ = self.engine.release_buffer();
        self.layout = None;
        self.slot = None;
        log::info!("closed capture session {}", self.id);
    }

    fn ensure_open(&self) -> Result<(), CaptureError> {
        if self.is_closed() {
            return Err(CaptureError::InvalidState("session closed".into()));
        }
        Ok(())
    }

    fn ensure_stopped(&self, action: &str) -> Result<(), CaptureError> {
        if self.state().is_running() {
            return Err(CaptureError::InvalidState(format!(
                "cannot {action} while capture is running"
            )));
        }
        Ok(())
    }
}

impl<T: Transport + 'static, L: InterruptLine> Drop for CaptureSession<T, L> {
    fn drop(&mut self) {
        if !self.is_closed() {
            self.teardown();
        }
    }
}
