//! Register-file transport.
//!
//! The bus driver exposes the array's register space as a character device
//! of 16-bit registers: register `n` lives at file position `2 * n`, and a
//! block transfer covers consecutive registers. Every access is a single
//! positioned read or write, so the handle can be shared between the control
//! path and the drain worker without a lock.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use micarray_core::Transport;

/// Width of one register in the file.
pub const REGISTER_BYTES: u64 = 2;

fn position(offset: u16) -> u64 {
    u64::from(offset) * REGISTER_BYTES
}

pub struct RegmapTransport {
    file: File,
    path: PathBuf,
}

impl RegmapTransport {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        log::debug!("opened register file {}", path.display());
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Transport for RegmapTransport {
    fn read(&self, offset: u16, buf: &mut [u8]) -> io::Result<()> {
        self.file.read_exact_at(buf, position(offset))
    }

    fn write(&self, offset: u16, data: &[u8]) -> io::Result<()> {
        self.file.write_all_at(data, position(offset))
    }
}

impl std::fmt::Debug for RegmapTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegmapTransport")
            .field("path", &self.path)
            .finish()
    }
}
