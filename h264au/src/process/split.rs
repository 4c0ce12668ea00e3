//! Annex-B NAL unit splitting.
//!
//! [`NalSplitter`] walks a buffer and yields borrowed [`NalUnit`] views
//! without copying or allocating. Bytes before the first start code are not
//! a NAL unit; they are exposed through [`NalSplitter::leading`].
//!
//! The last unit of a buffer runs to its end, so callers feeding packets
//! should hold it back until the next start code is seen.

use crate::structs::nal::{NalType, NalUnit};

/// Most NAL units yielded from one packet. Once reached, the last unit
/// extends to the end of the buffer.
pub const MAX_NAL_UNITS: usize = 128;

#[derive(Debug, Clone)]
pub struct NalSplitter<'a> {
    data: &'a [u8],
    first: Option<(usize, u8)>,
    next: Option<(usize, u8)>,
    emitted: usize,
    limit: usize,
}

impl<'a> NalSplitter<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_limit(data, MAX_NAL_UNITS)
    }

    /// Splitter without a unit cap, for buffers the crate built itself.
    pub fn unbounded(data: &'a [u8]) -> Self {
        Self::with_limit(data, usize::MAX)
    }

    pub fn with_limit(data: &'a [u8], limit: usize) -> Self {
        let first = find_start_code(data, 0);

        Self {
            data,
            first,
            next: first,
            emitted: 0,
            limit: limit.max(1),
        }
    }

    /// Bytes preceding the first start code, or the whole buffer if it has none.
    pub fn leading(&self) -> &'a [u8] {
        match self.first {
            Some((pos, _)) => &self.data[..pos],
            None => self.data,
        }
    }
}

impl<'a> Iterator for NalSplitter<'a> {
    type Item = NalUnit<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.emitted >= self.limit {
                return None;
            }

            let (offset, start_code_len) = self.next?;
            let payload_start = offset + start_code_len as usize;

            let following = if self.emitted + 1 == self.limit {
                None
            } else {
                find_start_code(self.data, payload_start)
            };
            let end = following.map_or(self.data.len(), |(pos, _)| pos);
            self.next = following;

            // adjacent start codes carry nothing
            if payload_start >= end {
                continue;
            }

            self.emitted += 1;
            let payload = &self.data[payload_start..end];

            return Some(NalUnit {
                kind: NalType::from(payload[0]),
                offset,
                start_code_len,
                payload,
            });
        }
    }
}

/// Finds the next start code at or after `from`, returning its position and
/// length. A zero byte directly before `00 00 01` is taken as part of a
/// four-byte start code.
fn find_start_code(data: &[u8], from: usize) -> Option<(usize, u8)> {
    let mut i = from;
    while i + 3 <= data.len() {
        match data[i + 2] {
            0x01 if data[i] == 0 && data[i + 1] == 0 => {
                return if i > from && data[i - 1] == 0 {
                    Some((i - 1, 4))
                } else {
                    Some((i, 3))
                };
            }
            0x00 => i += 1,
            // data[i + 2] can't end a start code, nor sit inside one
            _ => i += 3,
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic payload bytes that never contain a zero.
    fn payload(seed: u32, len: usize) -> Vec<u8> {
        let mut state = seed.wrapping_mul(2654435761).wrapping_add(1);
        (0..len)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                (state % 255) as u8 + 1
            })
            .collect()
    }

    #[test]
    fn split_mixed_start_codes() {
        let data = [
            0x00, 0x00, 0x00, 0x01, 0x67, 0x42, 0x00, 0x1E, //
            0x00, 0x00, 0x01, 0x68, 0xCE, //
            0x00, 0x00, 0x00, 0x01, 0x65, 0x88, 0x84,
        ];
        let nals = NalSplitter::new(&data).collect::<Vec<_>>();

        assert_eq!(nals.len(), 3);
        assert_eq!(nals[0].kind, NalType::Sps);
        assert_eq!(nals[0].payload, [0x67, 0x42, 0x00, 0x1E]);
        assert_eq!(nals[0].start_code_len, 4);
        assert_eq!(nals[1].kind, NalType::Pps);
        assert_eq!(nals[1].offset, 8);
        assert_eq!(nals[1].start_code_len, 3);
        assert_eq!(nals[2].kind, NalType::SliceIdr);
        assert_eq!(nals[2].offset, 13);
        assert_eq!(nals[2].start_code_len, 4);
    }

    #[test]
    fn reconstruct_exactly() {
        let mut data = Vec::new();
        for seed in 0..40u32 {
            let start_code: &[u8] = if seed % 3 == 0 {
                &[0, 0, 1]
            } else {
                &[0, 0, 0, 1]
            };
            data.extend_from_slice(start_code);
            data.extend(payload(seed, 1 + (seed as usize * 7) % 50));
        }

        let mut rebuilt = Vec::new();
        for nal in NalSplitter::new(&data) {
            rebuilt.extend_from_slice(nal.start_code());
            rebuilt.extend_from_slice(nal.payload);
        }
        assert_eq!(rebuilt, data);
        assert!(NalSplitter::new(&data).leading().is_empty());
    }

    #[test]
    fn leading_continuation_bytes() {
        let data = [0xAB, 0xCD, 0x00, 0x00, 0x01, 0x41, 0x9A];
        let splitter = NalSplitter::new(&data);
        assert_eq!(splitter.leading(), [0xAB, 0xCD]);

        let nals = splitter.collect::<Vec<_>>();
        assert_eq!(nals.len(), 1);
        assert_eq!(nals[0].payload, [0x41, 0x9A]);

        let no_start = [0x12, 0x34, 0x56];
        let splitter = NalSplitter::new(&no_start);
        assert_eq!(splitter.leading(), no_start);
        assert_eq!(splitter.count(), 0);
    }

    #[test]
    fn empty_units_are_dropped() {
        let data = [0x00, 0x00, 0x01, 0x00, 0x00, 0x01, 0x09, 0xF0, 0x00, 0x00, 0x01];
        let nals = NalSplitter::new(&data).collect::<Vec<_>>();
        assert_eq!(nals.len(), 1);
        assert_eq!(nals[0].kind, NalType::AccessUnitDelimiter);
        assert_eq!(nals[0].payload, [0x09, 0xF0]);
    }

    #[test]
    fn cap_extends_last_unit() {
        let mut data = Vec::new();
        for _ in 0..MAX_NAL_UNITS + 10 {
            data.extend_from_slice(&[0x00, 0x00, 0x01, 0x41, 0x9A]);
        }

        let nals = NalSplitter::new(&data).collect::<Vec<_>>();
        assert_eq!(nals.len(), MAX_NAL_UNITS);

        let last = nals[MAX_NAL_UNITS - 1];
        assert_eq!(last.offset + 3 + last.payload.len(), data.len());
        assert_eq!(last.payload.len(), 2 + 5 * 10);
    }

    #[test]
    fn empty_input() {
        assert_eq!(NalSplitter::new(&[]).count(), 0);
        assert!(NalSplitter::new(&[]).leading().is_empty());
    }
}
