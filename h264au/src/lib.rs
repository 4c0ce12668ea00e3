//! Access unit reconstruction and decoder hand-off for H.264 Annex-B streams.
//!
//! ## Technical Overview
//!
//! Demultiplexers deliver H.264 in packets whose boundaries need not match
//! picture boundaries. Accelerated decoders, on the other hand, want exactly
//! one coded picture per submission, starting at an IDR picture with its
//! parameter sets in front.
//!
//! ### Pipeline
//!
//! packet bytes → NAL splitting → access unit assembly → stream gate →
//! decoder backend → decoded frame.
//!
//! ### Access Unit Boundaries
//!
//! A new access unit starts at every access unit delimiter, or, in streams
//! without delimiters, at a coded slice whose `first_mb_in_slice` is zero
//! once the current unit already holds a slice. Frame number and picture
//! order count are not compared.
//!
//! ### Backend Fallback
//!
//! A hardware backend that stops producing frames or keeps rejecting input
//! is replaced by a software backend once per session; the stream restarts
//! from the beginning.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use h264au::process::{assemble::Assembler, gate::{GateOutcome, StreamGate}, EXAMPLE_DATA};
//!
//! let mut assembler = Assembler::default();
//! let mut gate = StreamGate::default();
//!
//! assembler.push_bytes(EXAMPLE_DATA)?;
//! assembler.finish()?;
//!
//! for unit in assembler {
//!     if let GateOutcome::Forward(unit) = gate.push(unit)? {
//!         // hand `unit.into_bytes()` to a decoder
//!         println!("{} bytes, key: {}", unit.len(), unit.flags.is_key);
//!     }
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

/// Processing stages from packet bytes to decoded frames.
///
/// 1. **Splitting** ([`process::split`]): Annex-B start code scanning.
///
/// 2. **Assembly** ([`process::assemble`]): Regrouping NAL units into access
///    units.
///
/// 3. **Gating** ([`process::gate`]): Synchronization on the first IDR.
///
/// 4. **Session** ([`process::session`]): Backend feeding, stall detection and
///    software fallback.
pub mod process;

/// Data structures representing H.264 stream components.
///
/// - **NAL Units** ([`structs::nal`]): Borrowed NAL views and type codes
/// - **Access Units** ([`structs::access_unit`]): Finalized pictures and the assembly buffer
/// - **Slice Headers** ([`structs::slice`]): Leading slice header fields
/// - **Packets** ([`structs::packet`]): Demultiplexer input
/// - **Frames** ([`structs::frame`]): Decoder output
pub mod structs;

/// Utility functions and supporting infrastructure.
///
/// - **Bitstream I/O** ([`utils::bitstream_io`]): Bit-level reading and Exp-Golomb codes
/// - **RBSP** ([`utils::rbsp`]): Emulation prevention
/// - **Error Handling** ([`utils::errors`]): Error types
pub mod utils;
