use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use micarray_core::{CaptureError, HardwareCapabilities};

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed backend config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid backend config: {0}")]
    Invalid(String),
}

impl From<BackendError> for CaptureError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Io { .. } => CaptureError::TransportError(err.to_string()),
            BackendError::Parse(_) | BackendError::Invalid(_) => {
                CaptureError::InvalidParameter(err.to_string())
            }
        }
    }
}

/// Where the array lives on this board and how to talk to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackendConfig {
    /// Register-file character device.
    pub regmap_path: PathBuf,

    /// UIO node carrying the period interrupt.
    pub uio_path: PathBuf,

    /// Write `1u32` to the UIO node after each interrupt (default: true).
    pub unmask: bool,

    /// Sleep between polls of the UIO node when no event is pending.
    pub poll_interval_us: u64,

    /// Narrower capability block than the physical limits, if any.
    pub capabilities: Option<HardwareCapabilities>,
}

impl BackendConfig {
    pub fn from_json(json: &str) -> Result<Self, BackendError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, BackendError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| BackendError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> Result<(), BackendError> {
        if self.regmap_path.as_os_str().is_empty() {
            return Err(BackendError::Invalid("regmap_path is empty".into()));
        }
        if self.uio_path.as_os_str().is_empty() {
            return Err(BackendError::Invalid("uio_path is empty".into()));
        }
        // One period at 96 kHz is about 1.3 ms.
        if self.poll_interval_us == 0 || self.poll_interval_us > 1000 {
            return Err(BackendError::Invalid(format!(
                "poll_interval_us {} outside 1..=1000",
                self.poll_interval_us
            )));
        }
        if let Some(ref caps) = self.capabilities {
            caps.validate().map_err(BackendError::Invalid)?;
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_micros(self.poll_interval_us)
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            regmap_path: PathBuf::from("/dev/micarray-regs"),
            uio_path: PathBuf::from("/dev/uio0"),
            unmask: true,
            poll_interval_us: 250,
            capabilities: None,
        }
    }
}
