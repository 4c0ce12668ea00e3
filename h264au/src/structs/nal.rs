//! NAL unit views
//!
//! A [`NalUnit`] borrows its bytes from the packet or access unit it was
//! split from. It is never stored past the call that produced it.

use std::fmt::{Display, Formatter};

pub const START_CODE_3: [u8; 3] = [0x00, 0x00, 0x01];
pub const START_CODE_4: [u8; 4] = [0x00, 0x00, 0x00, 0x01];

/// NAL unit type, the low 5 bits of the NAL header byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NalType {
    Slice,
    SliceIdr,
    Sei,
    Sps,
    Pps,
    AccessUnitDelimiter,
    EndOfSequence,
    EndOfStream,
    Filler,
    Other(u8),
}

impl From<u8> for NalType {
    fn from(header: u8) -> Self {
        match header & 0x1F {
            1 => Self::Slice,
            5 => Self::SliceIdr,
            6 => Self::Sei,
            7 => Self::Sps,
            8 => Self::Pps,
            9 => Self::AccessUnitDelimiter,
            10 => Self::EndOfSequence,
            11 => Self::EndOfStream,
            12 => Self::Filler,
            other => Self::Other(other),
        }
    }
}

impl NalType {
    pub fn type_id(self) -> u8 {
        match self {
            Self::Slice => 1,
            Self::SliceIdr => 5,
            Self::Sei => 6,
            Self::Sps => 7,
            Self::Pps => 8,
            Self::AccessUnitDelimiter => 9,
            Self::EndOfSequence => 10,
            Self::EndOfStream => 11,
            Self::Filler => 12,
            Self::Other(id) => id,
        }
    }

    pub fn is_slice(self) -> bool {
        matches!(self, Self::Slice | Self::SliceIdr)
    }

    pub fn is_parameter_set(self) -> bool {
        matches!(self, Self::Sps | Self::Pps)
    }
}

impl Display for NalType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Slice => write!(f, "Slice"),
            Self::SliceIdr => write!(f, "IDR"),
            Self::Sei => write!(f, "SEI"),
            Self::Sps => write!(f, "SPS"),
            Self::Pps => write!(f, "PPS"),
            Self::AccessUnitDelimiter => write!(f, "AUD"),
            Self::EndOfSequence => write!(f, "EndOfSeq"),
            Self::EndOfStream => write!(f, "EndOfStream"),
            Self::Filler => write!(f, "Filler"),
            Self::Other(id) => write!(f, "Other({id})"),
        }
    }
}

/// A borrowed view of one NAL unit inside an Annex-B buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NalUnit<'a> {
    pub kind: NalType,

    /// Offset of the start code within the scanned buffer.
    pub offset: usize,

    /// Length of the start code preceding the payload (3 or 4).
    pub start_code_len: u8,

    /// NAL header byte followed by the escaped payload, up to the next
    /// start code or the end of the buffer.
    pub payload: &'a [u8],
}

impl NalUnit<'_> {
    pub fn start_code(&self) -> &'static [u8] {
        if self.start_code_len == 4 {
            &START_CODE_4
        } else {
            &START_CODE_3
        }
    }

    /// Length of the unit including its start code.
    pub fn encoded_len(&self) -> usize {
        self.start_code_len as usize + self.payload.len()
    }

    pub fn header(&self) -> u8 {
        self.payload[0]
    }

    pub fn nal_ref_idc(&self) -> u8 {
        (self.header() >> 5) & 0x03
    }
}

#[test]
fn nal_type_from_header() {
    assert_eq!(NalType::from(0x67), NalType::Sps);
    assert_eq!(NalType::from(0x68), NalType::Pps);
    assert_eq!(NalType::from(0x65), NalType::SliceIdr);
    assert_eq!(NalType::from(0x41), NalType::Slice);
    assert_eq!(NalType::from(0x09), NalType::AccessUnitDelimiter);
    assert_eq!(NalType::from(0x14), NalType::Other(20));
    assert_eq!(NalType::from(0x14).type_id(), 20);
    assert_eq!(format!("{}", NalType::SliceIdr), "IDR");

    let disposable = NalUnit {
        kind: NalType::Slice,
        offset: 0,
        start_code_len: 3,
        payload: &[0x01, 0x9A],
    };
    assert_eq!(disposable.nal_ref_idc(), 0);
    assert_eq!(disposable.encoded_len(), 5);
    assert_eq!(disposable.start_code(), START_CODE_3);
}
