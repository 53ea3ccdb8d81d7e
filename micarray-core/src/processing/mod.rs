pub mod fir;
pub mod interleave;
pub mod rate_table;
pub mod ring_buffer;
