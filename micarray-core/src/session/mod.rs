pub mod capture;
pub mod device;

pub use capture::CaptureSession;
pub use device::CaptureDevice;
