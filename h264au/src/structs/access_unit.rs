//! Access units and the growable buffer they are assembled in.

use std::fmt::{Display, Formatter};

use log::trace;

use crate::process::split::NalSplitter;
use crate::structs::nal::{NalType, NalUnit};
use crate::structs::timestamp::Timestamp;
use crate::utils::errors::AssembleError;

/// Initial capacity of an assembly buffer.
pub const DEFAULT_AU_CAPACITY: usize = 64 * 1024;

/// Summary of which NAL categories an access unit contains.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AuMeta {
    pub has_aud: bool,
    pub has_sps: bool,
    pub has_pps: bool,
    pub has_sei: bool,
    pub has_idr: bool,
    pub has_slice: bool,
}

impl AuMeta {
    pub fn observe(&mut self, kind: NalType) {
        match kind {
            NalType::AccessUnitDelimiter => self.has_aud = true,
            NalType::Sps => self.has_sps = true,
            NalType::Pps => self.has_pps = true,
            NalType::Sei => self.has_sei = true,
            NalType::SliceIdr => {
                self.has_idr = true;
                self.has_slice = true;
            }
            NalType::Slice => self.has_slice = true,
            _ => {}
        }
    }

    pub fn has_parameter_sets(&self) -> bool {
        self.has_sps && self.has_pps
    }

    /// True when the unit carries SPS or PPS but no coded slice.
    pub fn is_parameter_set_only(&self) -> bool {
        (self.has_sps || self.has_pps) && !self.has_slice
    }
}

impl Display for AuMeta {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let flags = [
            (self.has_aud, "AUD"),
            (self.has_sps, "SPS"),
            (self.has_pps, "PPS"),
            (self.has_sei, "SEI"),
            (self.has_idr, "IDR"),
            (self.has_slice, "Slice"),
        ];
        let mut first = true;
        write!(f, "[")?;
        for (set, name) in flags {
            if set {
                if !first {
                    write!(f, "+")?;
                }
                write!(f, "{name}")?;
                first = false;
            }
        }
        write!(f, "]")
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AuFlags {
    /// Derived from NAL content, never from container hints.
    pub is_key: bool,
}

/// A finalized access unit: the Annex-B bytes of every NAL unit belonging to
/// one picture, start codes included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessUnit {
    data: Vec<u8>,
    pub timestamp: Option<Timestamp>,
    pub flags: AuFlags,
    pub meta: AuMeta,
    pub nal_count: usize,
}

impl AccessUnit {
    /// Builds an access unit from complete Annex-B bytes, scanning them for
    /// metadata.
    pub fn from_annexb(data: Vec<u8>, timestamp: Option<Timestamp>) -> Self {
        let mut meta = AuMeta::default();
        let mut nal_count = 0;
        for nal in NalSplitter::unbounded(&data) {
            meta.observe(nal.kind);
            nal_count += 1;
        }

        Self {
            data,
            timestamp,
            flags: AuFlags { is_key: meta.has_idr },
            meta,
            nal_count,
        }
    }

    pub(crate) fn from_raw_parts(
        data: Vec<u8>,
        timestamp: Option<Timestamp>,
        meta: AuMeta,
        nal_count: usize,
    ) -> Self {
        Self {
            data,
            timestamp,
            flags: AuFlags { is_key: meta.has_idr },
            meta,
            nal_count,
        }
    }

    /// Joins two units, `front` first. Timestamp and flags follow `back`,
    /// which carries the picture.
    pub fn concat(front: AccessUnit, back: AccessUnit) -> Result<Self, AssembleError> {
        let mut data = front.data;
        let requested = data.len() + back.data.len();
        data.try_reserve_exact(back.data.len())
            .map_err(|_| AssembleError::AllocationFailure { requested })?;
        data.extend_from_slice(&back.data);

        let mut meta = front.meta;
        for nal in NalSplitter::unbounded(&back.data) {
            meta.observe(nal.kind);
        }

        Ok(Self {
            data,
            timestamp: back.timestamp.or(front.timestamp),
            flags: AuFlags { is_key: meta.has_idr },
            meta,
            nal_count: front.nal_count + back.nal_count,
        })
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn nal_units(&self) -> NalSplitter<'_> {
        NalSplitter::unbounded(&self.data)
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

impl AsRef<[u8]> for AccessUnit {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

/// Growable buffer holding the access unit currently being assembled.
///
/// Capacity only grows; finalizing copies the bytes out and keeps the
/// allocation for the next unit.
#[derive(Debug)]
pub struct AccessUnitBuffer {
    bytes: Vec<u8>,
    meta: AuMeta,
    timestamp: Option<Timestamp>,
    key_hint: Option<bool>,
    nal_count: usize,
}

impl Default for AccessUnitBuffer {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_AU_CAPACITY)
    }
}

impl AccessUnitBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity),
            meta: AuMeta::default(),
            timestamp: None,
            key_hint: None,
            nal_count: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nal_count == 0
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn capacity(&self) -> usize {
        self.bytes.capacity()
    }

    pub fn meta(&self) -> AuMeta {
        self.meta
    }

    pub fn nal_count(&self) -> usize {
        self.nal_count
    }

    /// Records packet side data. The first value seen for the unit wins.
    pub fn note_packet(&mut self, timestamp: Option<Timestamp>, key_hint: bool) {
        if self.timestamp.is_none() {
            self.timestamp = timestamp;
        }
        if self.key_hint.is_none() {
            self.key_hint = Some(key_hint);
        }
    }

    /// Appends a NAL unit with its original start code.
    pub fn push_nal(&mut self, nal: &NalUnit) -> Result<(), AssembleError> {
        self.reserve(nal.encoded_len())?;
        self.bytes.extend_from_slice(nal.start_code());
        self.bytes.extend_from_slice(nal.payload);
        self.meta.observe(nal.kind);
        self.nal_count += 1;

        Ok(())
    }

    /// Moves the buffered unit out, leaving the buffer empty.
    pub fn finalize(&mut self) -> Result<AccessUnit, AssembleError> {
        let mut data = Vec::new();
        data.try_reserve_exact(self.bytes.len())
            .map_err(|_| AssembleError::AllocationFailure {
                requested: self.bytes.len(),
            })?;
        data.extend_from_slice(&self.bytes);

        if self.key_hint.is_some_and(|hint| hint != self.meta.has_idr) {
            trace!("Container key hint disagrees with NAL content {}", self.meta);
        }

        let unit = AccessUnit::from_raw_parts(data, self.timestamp, self.meta, self.nal_count);
        self.clear();

        Ok(unit)
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
        self.meta = AuMeta::default();
        self.timestamp = None;
        self.key_hint = None;
        self.nal_count = 0;
    }

    fn reserve(&mut self, additional: usize) -> Result<(), AssembleError> {
        let requested = self
            .bytes
            .len()
            .checked_add(additional)
            .ok_or(AssembleError::AllocationFailure { requested: usize::MAX })?;
        if requested <= self.bytes.capacity() {
            return Ok(());
        }

        let target = requested.max(self.bytes.capacity().saturating_mul(2));
        self.bytes
            .try_reserve_exact(target - self.bytes.len())
            .or_else(|_| self.bytes.try_reserve_exact(additional))
            .map_err(|_| AssembleError::AllocationFailure { requested })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nal(payload: &[u8]) -> NalUnit<'_> {
        NalUnit {
            kind: NalType::from(payload[0]),
            offset: 0,
            start_code_len: 4,
            payload,
        }
    }

    #[test]
    fn buffer_grows_and_keeps_capacity() {
        let mut buffer = AccessUnitBuffer::with_capacity(8);
        let payload = vec![0x65; 100];
        buffer.push_nal(&nal(&payload)).unwrap();
        assert!(buffer.capacity() >= 104);
        let grown = buffer.capacity();

        let unit = buffer.finalize().unwrap();
        assert_eq!(unit.len(), 104);
        assert!(unit.flags.is_key);
        assert!(buffer.is_empty());
        assert_eq!(buffer.len(), 0);
        assert_eq!(buffer.capacity(), grown);
    }

    #[test]
    fn first_timestamp_wins() {
        let mut buffer = AccessUnitBuffer::default();
        buffer.note_packet(None, false);
        buffer.note_packet(Some(Timestamp::new(10, None)), true);
        buffer.note_packet(Some(Timestamp::new(20, None)), true);
        buffer.push_nal(&nal(&[0x41, 0x80])).unwrap();

        let unit = buffer.finalize().unwrap();
        assert_eq!(unit.timestamp, Some(Timestamp::new(10, None)));
        assert!(!unit.flags.is_key);
    }

    #[test]
    fn from_annexb_scans_meta() {
        let unit = AccessUnit::from_annexb(
            vec![0, 0, 0, 1, 0x67, 0x42, 0, 0, 1, 0x68, 0xCE, 0, 0, 1, 0x65, 0x88],
            None,
        );
        assert_eq!(unit.nal_count, 3);
        assert!(unit.meta.has_parameter_sets());
        assert!(unit.meta.has_idr);
        assert!(!unit.meta.is_parameter_set_only());
        assert_eq!(format!("{}", unit.meta), "[SPS+PPS+IDR+Slice]");
    }

    #[test]
    fn concat_merges_meta() {
        let ps = AccessUnit::from_annexb(vec![0, 0, 0, 1, 0x67, 0x42, 0, 0, 0, 1, 0x68, 0xCE], None);
        assert!(ps.meta.is_parameter_set_only());

        let idr = AccessUnit::from_annexb(
            vec![0, 0, 0, 1, 0x65, 0x88],
            Some(Timestamp::new(0, Some(0))),
        );
        let joined = AccessUnit::concat(ps, idr).unwrap();
        assert_eq!(joined.nal_count, 3);
        assert!(joined.meta.has_parameter_sets());
        assert!(joined.flags.is_key);
        assert_eq!(joined.timestamp, Some(Timestamp::new(0, Some(0))));
        assert_eq!(joined.len(), 18);
    }
}
