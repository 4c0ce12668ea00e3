//! Bitstream I/O utilities for slice header parsing.
//!
//! Wraps a big-endian [`bitstream_io::BitReader`] with bounds-checked fixed
//! width reads and the Exp-Golomb codes used throughout H.264 headers.

use std::io;

use bitstream_io::{BigEndian, BitRead, BitReader, UnsignedInteger};

use crate::utils::errors::BitstreamError;

/// Longest prefix of zero bits accepted in a `ue(v)` code.
pub const MAX_EXP_GOLOMB_LEADING_ZEROS: u32 = 31;

#[derive(Debug)]
pub struct BitstreamIoReader<R: io::Read + io::Seek> {
    bs: BitReader<R, BigEndian>,
    len: u64,
}

pub type BsIoSliceReader<'a> = BitstreamIoReader<io::Cursor<&'a [u8]>>;

impl<R> BitstreamIoReader<R>
where
    R: io::Read + io::Seek,
{
    pub fn new(read: R, len_bytes: u64) -> Self {
        Self {
            bs: BitReader::new(read),
            len: len_bytes << 3,
        }
    }

    #[inline(always)]
    pub fn get(&mut self) -> io::Result<bool> {
        self.bs.read_bit()
    }

    #[inline(always)]
    pub fn get_n<I: UnsignedInteger>(&mut self, n: u32) -> io::Result<I> {
        let avail = self.available()?;
        if n as u64 > avail {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "get_n({}): out of bounds bits at {}",
                    n,
                    self.bs.position_in_bits().unwrap_or(0)
                ),
            ));
        }

        self.bs.read_unsigned_var(n)
    }

    /// Reads an unsigned Exp-Golomb code, `ue(v)`.
    ///
    /// value = 2^leading_zeros - 1 + suffix, where the suffix is
    /// `leading_zeros` bits wide.
    pub fn get_ue(&mut self) -> Result<u32, BitstreamError> {
        let start = self.position().map_err(truncated)?;

        let mut leading_zeros = 0u32;
        while !self.get().map_err(truncated)? {
            leading_zeros += 1;
            if leading_zeros > MAX_EXP_GOLOMB_LEADING_ZEROS {
                return Err(BitstreamError::MalformedExpGolomb(start));
            }
        }

        let suffix: u64 = if leading_zeros > 0 {
            self.get_n(leading_zeros).map_err(truncated)?
        } else {
            0
        };
        let value = (1u64 << leading_zeros) - 1 + suffix;

        u32::try_from(value).map_err(|_| BitstreamError::MalformedExpGolomb(start))
    }

    /// Reads a signed Exp-Golomb code, `se(v)`.
    pub fn get_se(&mut self) -> Result<i32, BitstreamError> {
        let code = self.get_ue()? as i64;
        let value = if code & 1 == 1 {
            (code + 1) >> 1
        } else {
            -(code >> 1)
        };

        Ok(value as i32)
    }

    #[inline(always)]
    pub fn available(&mut self) -> io::Result<u64> {
        self.bs
            .position_in_bits()
            .map(|pos| self.len.saturating_sub(pos))
    }

    #[inline(always)]
    pub fn position(&mut self) -> io::Result<u64> {
        self.bs.position_in_bits()
    }
}

impl<'a> BsIoSliceReader<'a> {
    pub fn from_slice(buf: &'a [u8]) -> Self {
        let len = buf.len() as u64;
        let read = io::Cursor::new(buf);

        Self::new(read, len)
    }
}

impl Default for BsIoSliceReader<'_> {
    fn default() -> Self {
        Self::from_slice(&[])
    }
}

fn truncated(e: io::Error) -> BitstreamError {
    BitstreamError::Truncated(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal MSB-first bit packer for building test vectors.
    #[derive(Default)]
    struct BitPacker {
        bytes: Vec<u8>,
        bit: u32,
    }

    impl BitPacker {
        fn put(&mut self, value: u64, bits: u32) {
            for i in (0..bits).rev() {
                if self.bit % 8 == 0 {
                    self.bytes.push(0);
                }
                if (value >> i) & 1 == 1 {
                    let last = self.bytes.len() - 1;
                    self.bytes[last] |= 0x80 >> (self.bit % 8);
                }
                self.bit += 1;
            }
        }

        fn put_ue(&mut self, value: u32) {
            let code = value as u64 + 1;
            let len = 64 - code.leading_zeros();
            self.put(0, len - 1);
            self.put(code, len);
        }

        fn finish(mut self) -> Vec<u8> {
            // rbsp_stop_one_bit keeps the tail from reading as zeros
            self.put(1, 1);
            self.bytes
        }
    }

    #[test]
    fn exp_golomb_round_trip() {
        let mut packer = BitPacker::default();
        for v in 0..=1000u32 {
            packer.put_ue(v);
        }
        let bytes = packer.finish();

        let mut reader = BsIoSliceReader::from_slice(&bytes);
        for v in 0..=1000u32 {
            assert_eq!(reader.get_ue().unwrap(), v);
        }
    }

    #[test]
    fn exp_golomb_known_codes() {
        // 1 | 010 | 011 | 00100 -> 0, 1, 2, 3
        let bytes = [0b1010_0110, 0b0100_0000];
        let mut reader = BsIoSliceReader::from_slice(&bytes);
        assert_eq!(reader.get_ue().unwrap(), 0);
        assert_eq!(reader.get_ue().unwrap(), 1);
        assert_eq!(reader.get_ue().unwrap(), 2);
        assert_eq!(reader.get_ue().unwrap(), 3);
    }

    #[test]
    fn signed_exp_golomb() {
        let mut packer = BitPacker::default();
        for code in 0..7 {
            packer.put_ue(code);
        }
        let bytes = packer.finish();

        let mut reader = BsIoSliceReader::from_slice(&bytes);
        let decoded = (0..7).map(|_| reader.get_se().unwrap()).collect::<Vec<_>>();
        assert_eq!(decoded, [0, 1, -1, 2, -2, 3, -3]);
    }

    #[test]
    fn too_many_leading_zeros() {
        let bytes = [0u8; 8];
        let mut reader = BsIoSliceReader::from_slice(&bytes);
        assert_eq!(
            reader.get_ue(),
            Err(BitstreamError::MalformedExpGolomb(0))
        );
    }

    #[test]
    fn truncated_suffix() {
        // eight leading zeros then the end of the buffer
        let bytes = [0x00, 0x80];
        let mut reader = BsIoSliceReader::from_slice(&bytes);
        assert!(matches!(
            reader.get_ue(),
            Err(BitstreamError::Truncated(_))
        ));
    }

    #[test]
    fn maximum_code_fits_u32() {
        let mut packer = BitPacker::default();
        packer.put_ue(u32::MAX - 1);
        let bytes = packer.finish();

        let mut reader = BsIoSliceReader::from_slice(&bytes);
        assert_eq!(reader.get_ue().unwrap(), u32::MAX - 1);
    }
}
