//! Utility functions and supporting infrastructure.
//!
//! Provides bitstream I/O, RBSP emulation prevention handling, and error
//! types shared by the processing stages.

pub mod bitstream_io;
pub mod errors;
pub mod rbsp;
