use std::io;
use std::sync::Arc;

/// Register access to the array over its peripheral bus.
///
/// Implemented by:
/// - `RegmapTransport` (Linux register-file character device, `micarray-linux`)
/// - Test doubles that synthesise fragments
///
/// Reads may be slow (a full fragment is up to 2 KiB over SPI); the engine only
/// calls [`Transport::read`] from its drain worker, never from the interrupt path.
pub trait Transport: Send + Sync {
    /// Fill `buf` from the register window starting at `offset`.
    fn read(&self, offset: u16, buf: &mut [u8]) -> io::Result<()>;

    /// Write `data` to the register window starting at `offset`.
    fn write(&self, offset: u16, data: &[u8]) -> io::Result<()>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn read(&self, offset: u16, buf: &mut [u8]) -> io::Result<()> {
        (**self).read(offset, buf)
    }

    fn write(&self, offset: u16, data: &[u8]) -> io::Result<()> {
        (**self).write(offset, data)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn read(&self, offset: u16, buf: &mut [u8]) -> io::Result<()> {
        (**self).read(offset, buf)
    }

    fn write(&self, offset: u16, data: &[u8]) -> io::Result<()> {
        (**self).write(offset, data)
    }
}
