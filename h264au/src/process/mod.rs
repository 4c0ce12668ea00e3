/// Annex-B NAL unit splitting.
///
/// Provides the [`NalSplitter`](split::NalSplitter) iterator yielding borrowed
/// [`NalUnit`](crate::structs::nal::NalUnit) views over packet bytes.
pub mod split;

/// Access unit assembly.
///
/// Provides the [`Assembler`](assemble::Assembler) regrouping NAL units from
/// arbitrarily framed packets into one [`AccessUnit`](crate::structs::access_unit::AccessUnit)
/// per coded picture.
pub mod assemble;

/// Decoder synchronization.
///
/// Provides the [`StreamGate`](gate::StreamGate), which withholds access units
/// until a decodable IDR picture arrives.
pub mod gate;

/// Decoder backend interfaces.
pub mod backend;

/// Decode session with hardware to software fallback.
///
/// Provides the [`DecodeSession`](session::DecodeSession) driving a
/// [`PacketSource`](backend::PacketSource) through assembly and gating into a
/// [`DecoderBackend`](backend::DecoderBackend).
pub mod session;

pub mod negotiate;

pub mod handoff;

/// Three delimited access units with 4-byte start codes:
/// `[AUD, SPS, PPS]`, `[AUD, IDR]`, `[AUD, P]`.
pub const EXAMPLE_DATA: &[u8] = &[
    0x00, 0x00, 0x00, 0x01, 0x09, 0xF0, // AUD
    0x00, 0x00, 0x00, 0x01, 0x67, 0x42, 0xC0, 0x1E, 0xDA, 0x02, 0x80, 0xBF, 0xE5, 0x84, 0x00, 0x00,
    0x03, 0x00, 0x04, 0x00, 0x00, 0x03, 0x00, 0xF0, 0x3C, 0x58, 0xBA, 0x80, // SPS
    0x00, 0x00, 0x00, 0x01, 0x68, 0xCE, 0x3C, 0x80, // PPS
    0x00, 0x00, 0x00, 0x01, 0x09, 0xF0, // AUD
    0x00, 0x00, 0x00, 0x01, 0x65, 0x88, 0x84, 0x00, 0x33, 0xFF, 0xFE, 0xF6, 0xF0, 0xFE, 0x05, 0x36,
    0x56, 0x04, 0x50, // IDR, first_mb_in_slice = 0
    0x00, 0x00, 0x00, 0x01, 0x09, 0xF0, // AUD
    0x00, 0x00, 0x00, 0x01, 0x41, 0x9A, 0x02, 0x11, 0x7F, 0xE2, 0x40, 0x80, // P, first_mb_in_slice = 0
];
