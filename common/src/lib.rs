//! Shared building blocks for the coadd2d workspace.
//!
//! - [`buffer2::Buffer2`]: row-major 2D pixel buffer
//! - [`bit_buffer2::BitBuffer2`]: bit-packed 2D mask
//! - [`log_setup`]: tracing subscriber initialization for binaries
//! - [`file_utils`]: directory scans used to discover input products

pub mod bit_buffer2;
pub mod buffer2;
pub mod file_utils;
pub mod log_setup;
pub mod test_utils;

pub use bit_buffer2::BitBuffer2;
pub use buffer2::Buffer2;
