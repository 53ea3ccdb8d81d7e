//! # micarray-core
//!
//! Platform-agnostic capture core for a register-mapped microphone array.
//!
//! The array free-runs: it raises an interrupt every 128 frames and exposes a
//! channel-major fragment over a slow peripheral bus. This crate turns that
//! into a gap-free interleaved ring buffer for a host audio framework.
//! Platform backends implement `Transport` and `InterruptLine` and plug into
//! the generic `CaptureDevice`.
//!
//! ## Architecture
//!
//! ```text
//! micarray-core (this crate)
//! ├── hardware      ← register map, fixed period geometry
//! ├── traits/       ← Transport, InterruptLine, CaptureDelegate
//! ├── models/       ← CaptureError, EngineState, HardwareCapabilities, diagnostics
//! ├── processing/   ← rate table, FIR sets, fragment interleaving, RingBuffer
//! ├── engine/       ← CaptureEngine (IRQ fast path + drain worker)
//! └── session/      ← CaptureDevice, CaptureSession (lifecycle controller)
//! ```

pub mod engine;
pub mod hardware;
pub mod models;
pub mod processing;
pub mod session;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use engine::{CaptureEngine, IrqContext, IrqOutcome};
pub use models::config::{BufferLayout, HardwareCapabilities, StreamParams, ValueRange};
pub use models::diagnostics::{CaptureDiagnostics, SessionInfo};
pub use models::error::CaptureError;
pub use models::state::EngineState;
pub use processing::fir::FirCoefficients;
pub use processing::rate_table::{RateConfig, RateEntry};
pub use processing::ring_buffer::RingBuffer;
pub use session::{CaptureDevice, CaptureSession};
pub use traits::capture_delegate::CaptureDelegate;
pub use traits::interrupt_line::InterruptLine;
pub use traits::transport::Transport;
