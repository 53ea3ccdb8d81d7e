//! # micarray-linux
//!
//! Linux backend for micarray-core.
//!
//! Provides:
//! - `RegmapTransport`: register access through the bus driver's register file
//! - `UioInterruptLine`: period interrupt from a UIO node, polled on its own thread
//! - `BackendConfig`: JSON description of where both live
//!
//! ## Usage
//! ```ignore
//! use micarray_linux::{open_device, BackendConfig};
//!
//! let config = BackendConfig::load("/etc/micarray.json")?;
//! let device = open_device(&config)?;
//! let mut session = device.open()?;
//! session.configure(48000, 8)?;
//! ```

pub mod config;
#[cfg(target_os = "linux")]
pub mod regmap;
#[cfg(target_os = "linux")]
pub mod uio;

pub use config::{BackendConfig, BackendError};
#[cfg(target_os = "linux")]
pub use regmap::RegmapTransport;
#[cfg(target_os = "linux")]
pub use uio::UioInterruptLine;

#[cfg(target_os = "linux")]
pub type LinuxCaptureDevice = micarray_core::CaptureDevice<RegmapTransport, UioInterruptLine>;

/// Open the register file and interrupt node named by `config`.
#[cfg(target_os = "linux")]
pub fn open_device(config: &BackendConfig) -> Result<LinuxCaptureDevice, BackendError> {
    config.validate()?;

    let transport = RegmapTransport::open(&config.regmap_path).map_err(|source| BackendError::Io {
        path: config.regmap_path.clone(),
        source,
    })?;
    let line = UioInterruptLine::open(&config.uio_path, config.unmask, config.poll_interval())
        .map_err(|source| BackendError::Io {
            path: config.uio_path.clone(),
            source,
        })?;

    let device = micarray_core::CaptureDevice::new(transport, line);
    let device = match config.capabilities {
        Some(ref caps) => device
            .with_capabilities(caps.clone())
            .map_err(|e| BackendError::Invalid(e.to_string()))?,
        None => device,
    };
    log::info!(
        "micarray on {} (irq {})",
        config.regmap_path.display(),
        config.uio_path.display()
    );
    Ok(device)
}
