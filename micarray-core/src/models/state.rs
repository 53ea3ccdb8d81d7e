use std::fmt;

use serde::Serialize;

/// Capture engine state machine.
///
/// State transitions:
/// ```text
/// idle ──open──▶ armed ──start──▶ running
///   ▲              │  ◀──stop───────┘
///   └────close─────┘
/// ```
///
/// The array raises interrupts in every state; only `Running` drains them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    Idle,
    Armed,
    Running,
}

impl EngineState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_armed(&self) -> bool {
        matches!(self, Self::Armed)
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Armed => "armed",
            Self::Running => "running",
        }
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
