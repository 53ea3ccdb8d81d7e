use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::config::BufferLayout;
use super::state::EngineState;

/// Drain-cycle counters for debugging capture sessions.
///
/// Snapshot of the engine's atomic counters; values are read independently and
/// may be off by one cycle relative to each other.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CaptureDiagnostics {
    /// Interrupts claimed while a session was attached.
    pub interrupts: u64,
    /// Interrupts dropped because capture was not running.
    pub ignored_interrupts: u64,
    /// Interrupts that arrived while a transfer was still in flight.
    pub overruns: u64,
    pub transport_errors: u64,
    pub periods_elapsed: u64,
    /// Drains that read a fragment but discarded it (stopped, no buffer, geometry changed).
    pub aborted_drains: u64,
}

/// Descriptive view of an open session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionInfo {
    pub id: Uuid,
    pub opened_at: DateTime<Utc>,
    pub state: EngineState,
    pub rate: Option<u32>,
    pub channels: Option<u16>,
    pub layout: Option<BufferLayout>,
}
