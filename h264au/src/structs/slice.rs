//! Slice header prefix parsing.
//!
//! Only the leading fields needed for picture boundary detection are read.
//! The payload is de-emulated up to [`SLICE_HEADER_PREFIX`] bytes, which is
//! enough for `first_mb_in_slice`, `slice_type` and `pic_parameter_set_id`
//! at their maximum coded widths.

use std::fmt::{Display, Formatter};

use crate::structs::nal::NalUnit;
use crate::utils::bitstream_io::BsIoSliceReader;
use crate::utils::errors::BitstreamError;
use crate::utils::rbsp::unescape_rbsp_prefix;

pub const SLICE_HEADER_PREFIX: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceType {
    P,
    B,
    I,
    Sp,
    Si,
}

impl SliceType {
    fn from_code(code: u32) -> Option<Self> {
        // values 5..=9 signal that all slices of the picture share the type
        match code {
            0 | 5 => Some(Self::P),
            1 | 6 => Some(Self::B),
            2 | 7 => Some(Self::I),
            3 | 8 => Some(Self::Sp),
            4 | 9 => Some(Self::Si),
            _ => None,
        }
    }
}

impl Display for SliceType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::P => "P",
            Self::B => "B",
            Self::I => "I",
            Self::Sp => "SP",
            Self::Si => "SI",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceHeader {
    pub first_mb_in_slice: u32,
    pub slice_type: SliceType,
    pub pic_parameter_set_id: u32,
}

impl SliceHeader {
    pub fn read(nal: &NalUnit) -> Result<Self, BitstreamError> {
        let mut buf = [0u8; SLICE_HEADER_PREFIX];
        let mut reader = prefix_reader(nal, &mut buf)?;

        let first_mb_in_slice = reader.get_ue()?;
        let code = reader.get_ue()?;
        let slice_type = SliceType::from_code(code).ok_or_else(|| {
            BitstreamError::Truncated(format!("slice_type {code} out of range"))
        })?;
        let pic_parameter_set_id = reader.get_ue()?;

        Ok(Self {
            first_mb_in_slice,
            slice_type,
            pic_parameter_set_id,
        })
    }

    /// A slice beginning at macroblock 0 starts a new picture.
    pub fn starts_picture(&self) -> bool {
        self.first_mb_in_slice == 0
    }
}

/// Reads the first Exp-Golomb field of a coded slice.
pub fn first_mb_in_slice(nal: &NalUnit) -> Result<u32, BitstreamError> {
    let mut buf = [0u8; SLICE_HEADER_PREFIX];
    let mut reader = prefix_reader(nal, &mut buf)?;

    reader.get_ue()
}

fn prefix_reader<'a>(
    nal: &NalUnit,
    buf: &'a mut [u8; SLICE_HEADER_PREFIX],
) -> Result<BsIoSliceReader<'a>, BitstreamError> {
    let Some((&header, body)) = nal.payload.split_first() else {
        return Err(BitstreamError::EmptyNal);
    };
    if !nal.kind.is_slice() {
        return Err(BitstreamError::NotASlice(header & 0x1F));
    }

    let len = unescape_rbsp_prefix(body, buf);
    Ok(BsIoSliceReader::from_slice(&buf[..len]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structs::nal::NalType;

    fn nal(payload: &[u8]) -> NalUnit<'_> {
        NalUnit {
            kind: NalType::from(payload.first().copied().unwrap_or(0)),
            offset: 0,
            start_code_len: 4,
            payload,
        }
    }

    #[test]
    fn first_mb_zero() {
        // ue(0)=1, ue(7)=0001000 (I, all slices), ue(0)=1
        let payload = [0x65, 0b1000_1000, 0b1000_0000];
        assert_eq!(first_mb_in_slice(&nal(&payload)), Ok(0));

        let header = SliceHeader::read(&nal(&payload)).unwrap();
        assert!(header.starts_picture());
        assert_eq!(header.slice_type, SliceType::I);
        assert_eq!(header.pic_parameter_set_id, 0);
    }

    #[test]
    fn first_mb_nonzero() {
        // ue(3)=00100, ue(0)=1, ue(1)=010
        let payload = [0x41, 0b0010_0101, 0b0000_0000];
        let header = SliceHeader::read(&nal(&payload)).unwrap();
        assert_eq!(header.first_mb_in_slice, 3);
        assert_eq!(header.slice_type, SliceType::P);
        assert_eq!(header.pic_parameter_set_id, 1);
        assert!(!header.starts_picture());
    }

    #[test]
    fn header_through_emulation_prevention() {
        // raw body 00 00 01 80 00 00: 23 zeros, a one, then a suffix of 2^22
        let payload = [0x41, 0x00, 0x00, 0x03, 0x01, 0x80, 0x00, 0x00];
        assert_eq!(
            first_mb_in_slice(&nal(&payload)),
            Ok((1 << 23) - 1 + (1 << 22))
        );
    }

    #[test]
    fn rejects_non_slice() {
        let payload = [0x67, 0x42];
        assert_eq!(
            first_mb_in_slice(&nal(&payload)),
            Err(BitstreamError::NotASlice(7))
        );
        assert_eq!(first_mb_in_slice(&nal(&[])), Err(BitstreamError::EmptyNal));
    }
}
