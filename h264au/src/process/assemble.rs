use std::collections::VecDeque;

use log::{Level, trace};

use crate::log_or_err;
use crate::process::split::NalSplitter;
use crate::structs::access_unit::{AccessUnit, AccessUnitBuffer};
use crate::structs::nal::{NalType, NalUnit};
use crate::structs::packet::Packet;
use crate::structs::slice::first_mb_in_slice;
use crate::structs::timestamp::Timestamp;
use crate::utils::errors::AssembleError;

/// Regroups NAL units from arbitrary packets into complete access units.
///
/// Boundaries are found from NAL content alone:
///
/// - An access unit delimiter closes the unit in progress and opens a new one.
/// - A coded slice with `first_mb_in_slice == 0` opens a new picture when the
///   current unit already has a slice and no delimiter marks its bounds.
///
/// # Example
///
/// ```rust,no_run
/// use h264au::process::EXAMPLE_DATA;
/// use h264au::process::assemble::Assembler;
///
/// let mut assembler = Assembler::default();
/// assembler.push_bytes(EXAMPLE_DATA)?;
/// assembler.finish()?;
///
/// for unit in assembler {
///     println!("{} bytes, NAL content {}", unit.len(), unit.meta);
/// }
/// # Ok::<(), h264au::utils::errors::AssembleError>(())
/// ```
#[derive(Debug)]
pub struct Assembler {
    current: AccessUnitBuffer,
    /// Bytes of a NAL unit that may continue in the next packet.
    pending: Vec<u8>,
    pending_timestamp: Option<Timestamp>,
    pending_key_hint: bool,
    /// Stream position of `pending[0]`.
    consumed: usize,
    ready: VecDeque<AccessUnit>,
    units_emitted: usize,
    nal_units_seen: usize,
    slice_parse_failures: usize,
    pub fail_level: Level,
}

impl Default for Assembler {
    fn default() -> Self {
        Self {
            current: AccessUnitBuffer::default(),
            pending: Vec::new(),
            pending_timestamp: None,
            pending_key_hint: false,
            consumed: 0,
            ready: VecDeque::new(),
            units_emitted: 0,
            nal_units_seen: 0,
            slice_parse_failures: 0,
            fail_level: Level::Error,
        }
    }
}

impl Assembler {
    pub fn set_fail_level(&mut self, level: Level) {
        self.fail_level = level;
    }

    pub fn push_packet(&mut self, packet: &Packet) -> Result<(), AssembleError> {
        self.push_data(packet.as_ref(), packet.timestamp, packet.key_hint)
    }

    /// Pushes bytes without side data.
    pub fn push_bytes(&mut self, data: &[u8]) -> Result<(), AssembleError> {
        self.push_data(data, None, false)
    }

    fn push_data(
        &mut self,
        data: &[u8],
        timestamp: Option<Timestamp>,
        key_hint: bool,
    ) -> Result<(), AssembleError> {
        let carried = self.pending.len();
        self.pending
            .try_reserve(data.len())
            .map_err(|_| AssembleError::AllocationFailure {
                requested: carried + data.len(),
            })?;
        self.pending.extend_from_slice(data);

        self.scan_pending(carried, timestamp, key_hint, false)
    }

    /// Pushes every NAL unit of the pending bytes known to be complete.
    ///
    /// The first `carried` bytes arrived with an earlier packet and keep that
    /// packet's side data. Unless `at_end`, the last unit is held back since
    /// the next packet may continue it, as are trailing zeros with no start
    /// code before them.
    fn scan_pending(
        &mut self,
        carried: usize,
        timestamp: Option<Timestamp>,
        key_hint: bool,
        at_end: bool,
    ) -> Result<(), AssembleError> {
        let mut buffer = std::mem::take(&mut self.pending);
        let splitter = if at_end {
            NalSplitter::unbounded(&buffer)
        } else {
            NalSplitter::new(&buffer)
        };

        let leading = splitter.leading().len();
        let orphan = if leading == buffer.len() && !at_end {
            // no start code yet, but one may be forming at the tail
            let zeros = buffer.iter().rev().take(3).take_while(|&&b| b == 0).count();
            leading - zeros
        } else {
            leading
        };
        if orphan > 0 {
            log_or_err!(self, Level::Debug, AssembleError::OrphanContinuation(orphan));
        }

        let mut keep_from = orphan;
        let mut nals = splitter.peekable();
        while let Some(nal) = nals.next() {
            if !at_end && nals.peek().is_none() {
                keep_from = nal.offset;
                break;
            }

            if nal.offset < carried {
                self.push_nal(&nal, self.pending_timestamp, self.pending_key_hint)?;
            } else {
                self.push_nal(&nal, timestamp, key_hint)?;
            }
        }

        if at_end {
            keep_from = buffer.len();
        }
        if keep_from >= carried {
            self.pending_timestamp = timestamp;
            self.pending_key_hint = key_hint;
        }

        buffer.drain(..keep_from);
        self.pending = buffer;
        self.consumed += keep_from;

        Ok(())
    }

    /// Adds one NAL unit, finalizing the unit in progress first if `nal`
    /// begins a new one.
    pub fn push_nal(
        &mut self,
        nal: &NalUnit,
        timestamp: Option<Timestamp>,
        key_hint: bool,
    ) -> Result<(), AssembleError> {
        self.nal_units_seen += 1;

        let boundary = match nal.kind {
            NalType::AccessUnitDelimiter => !self.current.is_empty(),
            NalType::Slice | NalType::SliceIdr => {
                let meta = self.current.meta();
                meta.has_slice && !meta.has_aud && self.starts_new_picture(nal)?
            }
            _ => false,
        };

        if boundary {
            self.finalize()?;
        }

        self.current.note_packet(timestamp, key_hint);
        self.current.push_nal(nal)
    }

    /// Finalizes whatever is buffered, e.g. at end of stream.
    pub fn finish(&mut self) -> Result<(), AssembleError> {
        if !self.pending.is_empty() {
            let carried = self.pending.len();
            self.scan_pending(carried, None, false, true)?;
        }
        if !self.current.is_empty() {
            self.finalize()?;
        }

        Ok(())
    }

    /// Discards buffered and finalized units, keeping the buffer allocation.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.consumed = 0;
        self.current.clear();
        self.ready.clear();
    }

    pub fn units_emitted(&self) -> usize {
        self.units_emitted
    }

    pub fn nal_units_seen(&self) -> usize {
        self.nal_units_seen
    }

    pub fn slice_parse_failures(&self) -> usize {
        self.slice_parse_failures
    }

    /// Capacity of the assembly buffer.
    pub fn buffer_capacity(&self) -> usize {
        self.current.capacity()
    }

    fn starts_new_picture(&mut self, nal: &NalUnit) -> Result<bool, AssembleError> {
        match first_mb_in_slice(nal) {
            Ok(first_mb) => Ok(first_mb == 0),
            Err(source) => {
                self.slice_parse_failures += 1;
                log_or_err!(
                    self,
                    Level::Warn,
                    AssembleError::MalformedSlice {
                        offset: self.consumed + nal.offset,
                        source,
                    }
                );
                Ok(false)
            }
        }
    }

    fn finalize(&mut self) -> Result<(), AssembleError> {
        let unit = self.current.finalize()?;
        trace!(
            "Access unit {}: {} NAL units, {} bytes, {}",
            self.units_emitted,
            unit.nal_count,
            unit.len(),
            unit.meta
        );

        self.units_emitted += 1;
        self.ready.push_back(unit);

        Ok(())
    }
}

impl Iterator for Assembler {
    type Item = AccessUnit;

    fn next(&mut self) -> Option<Self::Item> {
        self.ready.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::EXAMPLE_DATA;

    const AUD: &[u8] = &[0x00, 0x00, 0x00, 0x01, 0x09, 0xF0];
    const SPS: &[u8] = &[0x00, 0x00, 0x00, 0x01, 0x67, 0x42, 0xC0, 0x1E];
    const PPS: &[u8] = &[0x00, 0x00, 0x00, 0x01, 0x68, 0xCE, 0x3C, 0x80];
    // first_mb_in_slice = 0
    const IDR: &[u8] = &[0x00, 0x00, 0x00, 0x01, 0x65, 0x88, 0x84, 0x21];
    const P0: &[u8] = &[0x00, 0x00, 0x00, 0x01, 0x41, 0x9A, 0x02, 0x11];
    // first_mb_in_slice = 3
    const P3: &[u8] = &[0x00, 0x00, 0x00, 0x01, 0x41, 0x25, 0x02, 0x11];

    fn collect(assembler: &mut Assembler) -> Vec<AccessUnit> {
        assembler.by_ref().collect()
    }

    #[test]
    fn delimited_stream() {
        let mut assembler = Assembler::default();
        assembler.push_bytes(EXAMPLE_DATA).unwrap();
        assembler.finish().unwrap();
        let units = collect(&mut assembler);

        assert_eq!(units.len(), 3);
        assert!(units[0].meta.is_parameter_set_only());
        assert!(units[0].meta.has_aud);
        assert!(units[1].meta.has_idr);
        assert!(units[1].flags.is_key);
        assert!(units[2].meta.has_slice && !units[2].meta.has_idr);
    }

    #[test]
    fn slice_boundary_without_delimiters() {
        let data = [SPS, PPS, IDR, P0, P3, P0].concat();
        let mut assembler = Assembler::default();
        assembler.push_bytes(&data).unwrap();
        assembler.finish().unwrap();
        let units = collect(&mut assembler);

        assert_eq!(units.len(), 3);
        assert_eq!(units[0].as_ref(), [SPS, PPS, IDR].concat().as_slice());
        assert_eq!(units[1].as_ref(), [P0, P3].concat().as_slice());
        assert_eq!(units[2].as_ref(), P0);
    }

    #[test]
    fn delimiter_suppresses_slice_split() {
        let data = [AUD, P0, P0, AUD, P0].concat();
        let mut assembler = Assembler::default();
        assembler.push_bytes(&data).unwrap();
        assembler.finish().unwrap();
        let units = collect(&mut assembler);

        assert_eq!(units.len(), 2);
        assert_eq!(units[0].nal_count, 3);
        assert_eq!(units[1].nal_count, 2);
    }

    #[test]
    fn nal_split_across_packets() {
        let data = [SPS, PPS, IDR, P0].concat();
        let mut assembler = Assembler::default();

        // cut through the middle of the PPS payload
        let (a, b) = data.split_at(SPS.len() + 6);
        assembler.push_bytes(a).unwrap();
        assembler.push_bytes(b).unwrap();
        assembler.finish().unwrap();
        let units = collect(&mut assembler);

        assert_eq!(units.len(), 2);
        assert_eq!(units[0].as_ref(), [SPS, PPS, IDR].concat().as_slice());
        assert_eq!(units[0].nal_count, 3);
    }

    #[test]
    fn orphan_bytes_are_discarded() {
        let mut assembler = Assembler::default();
        assembler.push_bytes(&[0x12, 0x34]).unwrap();
        assembler.push_bytes(IDR).unwrap();
        assembler.finish().unwrap();

        let units = collect(&mut assembler);
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].as_ref(), IDR);
    }

    #[test]
    fn first_packet_timestamp_wins() {
        let mut assembler = Assembler::default();
        let ts = |pts| Some(Timestamp::new(pts, None));
        assembler
            .push_packet(&Packet {
                data: [AUD, SPS].concat(),
                timestamp: ts(0),
                key_hint: true,
            })
            .unwrap();
        assembler
            .push_packet(&Packet {
                data: [PPS, IDR].concat(),
                timestamp: ts(3003),
                key_hint: true,
            })
            .unwrap();
        assembler
            .push_packet(&Packet {
                data: [AUD, P0].concat(),
                timestamp: ts(6006),
                key_hint: false,
            })
            .unwrap();
        assembler.finish().unwrap();
        let units = collect(&mut assembler);

        assert_eq!(units.len(), 2);
        assert_eq!(units[0].timestamp, ts(0));
        assert_eq!(units[1].timestamp, ts(6006));
    }

    #[test]
    fn malformed_slice_header() {
        // 32 zero bits after the header byte: Exp-Golomb prefix too long
        let bad_slice: &[u8] = &[0x00, 0x00, 0x00, 0x01, 0x41, 0x00, 0x00, 0x00, 0x00, 0x80];
        let data = [IDR, bad_slice].concat();

        let mut assembler = Assembler::default();
        assembler.push_bytes(&data).unwrap();
        assembler.finish().unwrap();
        assert_eq!(assembler.slice_parse_failures(), 1);
        assert_eq!(collect(&mut assembler).len(), 1);

        // the slice ends the packet, so it is only judged once the stream ends
        let mut strict = Assembler::default();
        strict.set_fail_level(Level::Warn);
        strict.push_bytes(&data).unwrap();
        assert!(matches!(
            strict.finish(),
            Err(AssembleError::MalformedSlice { offset: 8, .. })
        ));
    }

    #[test]
    fn reset_keeps_capacity() {
        let mut assembler = Assembler::default();
        let big = [&[0x00, 0x00, 0x00, 0x01, 0x65][..], &vec![0x88; 200_000][..], AUD].concat();
        assembler.push_bytes(&big).unwrap();
        let capacity = assembler.buffer_capacity();
        assert!(capacity >= big.len() - AUD.len());

        assembler.reset();
        assert_eq!(assembler.buffer_capacity(), capacity);
        assembler.finish().unwrap();
        assert_eq!(assembler.count(), 0);
    }

    #[test]
    fn every_packet_cut_is_reassembled() {
        let data = [SPS, PPS, IDR, P0].concat();
        let first = [SPS, PPS, IDR].concat();

        for cut in 0..=data.len() {
            let mut assembler = Assembler::default();
            assembler.push_bytes(&data[..cut]).unwrap();
            assembler.push_bytes(&data[cut..]).unwrap();
            assembler.finish().unwrap();
            let units = collect(&mut assembler);

            assert_eq!(units.len(), 2, "cut at {cut}");
            assert_eq!(units[0].as_ref(), first.as_slice(), "cut at {cut}");
            assert_eq!(units[0].nal_count, 3, "cut at {cut}");
            let meta = units[0].meta;
            assert!(meta.has_sps && meta.has_pps && meta.has_idr, "cut at {cut}: {meta}");
            assert_eq!(units[1].as_ref(), P0, "cut at {cut}");
        }
    }

    #[test]
    fn start_code_split_across_packets() {
        let data = [SPS, PPS, IDR, P0].concat();
        let idr_at = SPS.len() + PPS.len();

        // 00 00 | 00 01 65 ..
        let mut assembler = Assembler::default();
        assembler.push_bytes(&data[..idr_at + 2]).unwrap();
        assembler.push_bytes(&data[idr_at + 2..]).unwrap();
        assembler.finish().unwrap();
        let units = collect(&mut assembler);

        assert_eq!(units.len(), 2);
        assert!(units[0].meta.has_idr);
        assert!(units[0].flags.is_key);
    }

    #[test]
    fn one_byte_packets() {
        let mut assembler = Assembler::default();
        for byte in EXAMPLE_DATA {
            assembler.push_bytes(std::slice::from_ref(byte)).unwrap();
        }
        assembler.finish().unwrap();
        let units = collect(&mut assembler);

        assert_eq!(units.len(), 3);
        assert!(units[1].meta.has_idr);
        assert_eq!(units.iter().map(|u| u.nal_count).sum::<usize>(), 7);
        assert_eq!(
            units.iter().flat_map(|u| u.as_ref().iter().copied()).collect::<Vec<_>>(),
            EXAMPLE_DATA
        );
    }

    #[test]
    fn held_unit_keeps_its_packet_timestamp() {
        let mut assembler = Assembler::default();
        let ts = |pts| Some(Timestamp::new(pts, None));

        // the packet ends right after the IDR start code
        let data = [AUD, SPS, PPS, IDR].concat();
        let cut = data.len() - 4;
        assembler
            .push_packet(
                &Packet::new(data[..cut].to_vec())
                    .with_timestamp(Timestamp::new(0, None))
                    .with_key_hint(true),
            )
            .unwrap();
        assembler
            .push_packet(&Packet::new(data[cut..].to_vec()).with_timestamp(Timestamp::new(3003, None)))
            .unwrap();
        assembler
            .push_packet(&Packet::new([AUD, P0].concat()).with_timestamp(Timestamp::new(6006, None)))
            .unwrap();
        assembler.finish().unwrap();
        let units = collect(&mut assembler);

        assert_eq!(units.len(), 2);
        assert_eq!(units[0].as_ref(), data.as_slice());
        assert_eq!(units[0].timestamp, ts(0));
        assert_eq!(units[1].timestamp, ts(6006));
    }
}
