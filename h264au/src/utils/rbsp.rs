//! Emulation prevention handling.
//!
//! Inside a NAL payload the encoder inserts `0x03` after any `00 00` pair that
//! would otherwise be followed by a byte `<= 0x03`. The raw byte sequence
//! payload (RBSP) is recovered by deleting those bytes.

/// Removes emulation prevention bytes: every `00 00 03` becomes `00 00`.
pub fn unescape_rbsp(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    unescape_into(data, &mut out);
    out
}

/// De-emulates into a caller-provided buffer, returning the number of bytes
/// written. Stops once `out` is full.
pub fn unescape_rbsp_prefix(data: &[u8], out: &mut [u8]) -> usize {
    let mut zeros = 0usize;
    let mut written = 0usize;

    for &byte in data {
        if written == out.len() {
            break;
        }
        if zeros >= 2 && byte == 0x03 {
            zeros = 0;
            continue;
        }

        out[written] = byte;
        written += 1;
        zeros = if byte == 0 { zeros + 1 } else { 0 };
    }

    written
}

fn unescape_into(data: &[u8], out: &mut Vec<u8>) {
    let mut zeros = 0usize;

    for &byte in data {
        if zeros >= 2 && byte == 0x03 {
            zeros = 0;
            continue;
        }

        out.push(byte);
        zeros = if byte == 0 { zeros + 1 } else { 0 };
    }
}

/// Inserts emulation prevention bytes so the payload contains no start code.
pub fn escape_rbsp(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + data.len() / 64);
    let mut zeros = 0usize;

    for &byte in data {
        if zeros >= 2 && byte <= 0x03 {
            out.push(0x03);
            zeros = 0;
        }

        out.push(byte);
        zeros = if byte == 0 { zeros + 1 } else { 0 };
    }

    out
}
