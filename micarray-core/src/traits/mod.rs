pub mod capture_delegate;
pub mod interrupt_line;
pub mod transport;
