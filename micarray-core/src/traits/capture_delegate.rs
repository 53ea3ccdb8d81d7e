use crate::models::error::CaptureError;
use crate::models::state::EngineState;

/// Host framework notifications for a capture session.
///
/// `on_period_elapsed` and `on_error` are called from the drain worker thread,
/// never with the drain lock held, so implementations may call back into the
/// session (e.g. to read [`position`](crate::session::CaptureSession::position)).
/// `on_state_changed` is called from whichever thread drove the transition.
pub trait CaptureDelegate: Send + Sync {
    /// One more period is in the ring buffer; `position` is the new write position.
    fn on_period_elapsed(&self, position: usize);

    /// A drain cycle failed (`TransportError`) or fell behind (`Overrun`).
    /// The stream keeps running.
    fn on_error(&self, error: &CaptureError);

    fn on_state_changed(&self, _state: EngineState) {}
}
