use crate::engine::IrqContext;
use crate::models::error::CaptureError;

/// Source of the array's capture interrupt.
///
/// Implemented by:
/// - `UioInterruptLine` (Linux UIO node, `micarray-linux`)
/// - Test doubles that fire on demand
///
/// The array interrupts at a fixed cadence whether or not anyone is capturing.
/// Between [`request`](InterruptLine::request) and
/// [`release`](InterruptLine::release) the line must call
/// [`IrqContext::handle`] once per interrupt. `handle` never blocks.
pub trait InterruptLine: Send {
    /// Start routing interrupts to `context`.
    fn request(&mut self, context: IrqContext) -> Result<(), CaptureError>;

    /// Stop routing interrupts and drop the context. After this returns no
    /// further `handle` calls may be in progress.
    fn release(&mut self);
}
