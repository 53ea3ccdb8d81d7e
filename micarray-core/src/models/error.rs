use std::io;

use thiserror::Error;

/// Errors that can occur during capture operations.
///
/// Configuration errors (`UnsupportedRate`, `InvalidParameter`, `InvalidState`)
/// are returned synchronously and leave the session untouched. Drain errors
/// (`TransportError`, `Overrun`) are only ever delivered through
/// [`CaptureDelegate::on_error`](crate::traits::capture_delegate::CaptureDelegate::on_error)
/// and never stop the stream.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("capture session already open")]
    Busy,

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("unsupported sample rate: {0} Hz")]
    UnsupportedRate(u32),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("transport error: {0}")]
    TransportError(String),

    #[error("overrun: capture interrupt arrived before the previous fragment was drained")]
    Overrun,

    #[error("allocation failure: {0}")]
    AllocationFailure(String),
}

impl CaptureError {
    pub(crate) fn transport(context: &str, err: &io::Error) -> Self {
        Self::TransportError(format!("{context}: {err}"))
    }
}
