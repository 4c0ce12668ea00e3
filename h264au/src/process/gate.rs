//! Synchronization gate between the assembler and a decoder backend.
//!
//! Accelerated decoders tend to fail hard on a stream that does not begin at
//! an IDR picture with parameter sets in front of it. The gate withholds
//! every access unit until one it can start from arrives, then forwards
//! everything after it.

use log::{debug, info, trace};

use crate::process::split::NalSplitter;
use crate::structs::access_unit::AccessUnit;
use crate::structs::nal::NalType;
use crate::utils::errors::{AssembleError, GateDrop};

#[derive(Debug)]
pub enum GateOutcome {
    Forward(AccessUnit),
    /// Parameter sets kept back to be prefixed onto a following unit.
    Hold,
    Drop(GateDrop),
}

#[derive(Debug, Default)]
pub struct StreamGate {
    first_idr_seen: bool,
    first_au_reordered: bool,
    saved_parameter_sets: Option<AccessUnit>,
    dropped: usize,
    forwarded: usize,
}

impl StreamGate {
    pub fn push(&mut self, unit: AccessUnit) -> Result<GateOutcome, AssembleError> {
        let meta = unit.meta;

        if meta.is_parameter_set_only() {
            if self.saved_parameter_sets.is_some() {
                debug!("Replacing saved parameter sets with {}", meta);
            }
            self.saved_parameter_sets = Some(unit);
            return Ok(GateOutcome::Hold);
        }

        if !self.first_idr_seen {
            if !meta.has_idr {
                return Ok(self.drop_unit(GateDrop::AwaitingIdr));
            }
            if !meta.has_sps && !meta.has_pps && self.saved_parameter_sets.is_none() {
                return Ok(self.drop_unit(GateDrop::MissingParameterSets));
            }

            if meta.has_parameter_sets() && self.saved_parameter_sets.take().is_some() {
                debug!("IDR access unit carries its own parameter sets, discarding saved ones");
            }

            self.first_idr_seen = true;
            info!(
                "Synchronized on IDR access unit after dropping {} access units",
                self.dropped
            );
        }

        let unit = match self.saved_parameter_sets.take() {
            Some(saved) => prefix_parameter_sets(saved, unit)?,
            None => unit,
        };

        let unit = if self.first_au_reordered {
            unit
        } else {
            self.first_au_reordered = true;
            canonicalize(unit)?
        };

        self.forwarded += 1;
        Ok(GateOutcome::Forward(unit))
    }

    /// Releases parameter sets still held at end of stream.
    ///
    /// Before synchronization they have no picture to apply to and are dropped.
    pub fn finish(&mut self) -> Option<AccessUnit> {
        let saved = self.saved_parameter_sets.take()?;
        if !self.first_idr_seen {
            debug!("Dropping saved parameter sets, no IDR access unit was found");
            return None;
        }

        self.forwarded += 1;
        Some(saved)
    }

    /// Returns to the unsynchronized state, as after a seek or restart.
    pub fn reset(&mut self) {
        self.first_idr_seen = false;
        self.first_au_reordered = false;
        self.saved_parameter_sets = None;
    }

    pub fn first_idr_seen(&self) -> bool {
        self.first_idr_seen
    }

    pub fn first_au_reordered(&self) -> bool {
        self.first_au_reordered
    }

    pub fn saved_parameter_sets(&self) -> Option<&AccessUnit> {
        self.saved_parameter_sets.as_ref()
    }

    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn forwarded(&self) -> usize {
        self.forwarded
    }

    fn drop_unit(&mut self, reason: GateDrop) -> GateOutcome {
        self.dropped += 1;
        // first few, then at powers of two
        if self.dropped <= 8 || self.dropped.is_power_of_two() {
            debug!("Dropped access unit #{}: {}", self.dropped, reason);
        }

        GateOutcome::Drop(reason)
    }
}

fn order_rank(kind: NalType) -> u8 {
    match kind {
        NalType::AccessUnitDelimiter => 0,
        NalType::Sps => 1,
        NalType::Pps => 2,
        NalType::Sei => 3,
        NalType::SliceIdr => 4,
        _ => 5,
    }
}

/// Prefixes held parameter sets onto `unit`. Only the first delimiter is
/// kept, so the result still reads as a single access unit.
fn prefix_parameter_sets(saved: AccessUnit, unit: AccessUnit) -> Result<AccessUnit, AssembleError> {
    if !(saved.meta.has_aud && unit.meta.has_aud) {
        return AccessUnit::concat(saved, unit);
    }

    let requested = saved.len() + unit.len();
    let mut data = Vec::new();
    data.try_reserve_exact(requested)
        .map_err(|_| AssembleError::AllocationFailure { requested })?;

    let mut seen_aud = false;
    for nal in saved.nal_units().chain(unit.nal_units()) {
        if nal.kind == NalType::AccessUnitDelimiter {
            if seen_aud {
                continue;
            }
            seen_aud = true;
        }
        data.extend_from_slice(nal.start_code());
        data.extend_from_slice(nal.payload);
    }

    Ok(AccessUnit::from_annexb(data, unit.timestamp.or(saved.timestamp)))
}

/// Reorders NAL units into delimiter, SPS, PPS, SEI, IDR, others. Relative
/// order within a category is kept and repeated delimiters are collapsed.
pub fn canonicalize(unit: AccessUnit) -> Result<AccessUnit, AssembleError> {
    let nals = NalSplitter::unbounded(unit.as_ref()).collect::<Vec<_>>();

    let mut order = Vec::with_capacity(nals.len());
    let mut seen_aud = false;
    for (i, nal) in nals.iter().enumerate() {
        if nal.kind == NalType::AccessUnitDelimiter {
            if seen_aud {
                continue;
            }
            seen_aud = true;
        }
        order.push(i);
    }
    order.sort_by_key(|&i| order_rank(nals[i].kind));

    let unchanged = order.len() == nals.len() && order.iter().enumerate().all(|(a, &b)| a == b);
    if unchanged {
        return Ok(unit);
    }

    let mut data = Vec::new();
    data.try_reserve_exact(unit.len())
        .map_err(|_| AssembleError::AllocationFailure {
            requested: unit.len(),
        })?;
    for &i in &order {
        data.extend_from_slice(nals[i].start_code());
        data.extend_from_slice(nals[i].payload);
    }
    trace!("Reordered first access unit into canonical NAL order");

    Ok(AccessUnit::from_annexb(data, unit.timestamp))
}

#[cfg(test)]
mod tests {
    use super::*;

    const AUD: &[u8] = &[0x00, 0x00, 0x00, 0x01, 0x09, 0xF0];
    const SPS: &[u8] = &[0x00, 0x00, 0x00, 0x01, 0x67, 0x42, 0xC0, 0x1E];
    const PPS: &[u8] = &[0x00, 0x00, 0x00, 0x01, 0x68, 0xCE, 0x3C, 0x80];
    const SEI: &[u8] = &[0x00, 0x00, 0x00, 0x01, 0x06, 0x05, 0x01, 0x80];
    const IDR: &[u8] = &[0x00, 0x00, 0x00, 0x01, 0x65, 0x88, 0x84, 0x21];
    const P0: &[u8] = &[0x00, 0x00, 0x00, 0x01, 0x41, 0x9A, 0x02, 0x11];

    fn unit(parts: &[&[u8]]) -> AccessUnit {
        AccessUnit::from_annexb(parts.concat(), None)
    }

    fn forwarded(outcome: GateOutcome) -> AccessUnit {
        match outcome {
            GateOutcome::Forward(unit) => unit,
            other => panic!("expected forward, got {other:?}"),
        }
    }

    #[test]
    fn drops_until_idr() {
        let mut gate = StreamGate::default();
        assert!(matches!(
            gate.push(unit(&[AUD, P0])).unwrap(),
            GateOutcome::Drop(GateDrop::AwaitingIdr)
        ));
        assert!(matches!(
            gate.push(unit(&[AUD, IDR])).unwrap(),
            GateOutcome::Drop(GateDrop::MissingParameterSets)
        ));
        assert!(!gate.first_idr_seen());

        let first = forwarded(gate.push(unit(&[SPS, PPS, IDR])).unwrap());
        assert_eq!(first.as_ref(), [SPS, PPS, IDR].concat().as_slice());
        assert!(gate.first_idr_seen());
        assert_eq!(gate.dropped(), 2);

        // anything goes once synchronized
        let next = forwarded(gate.push(unit(&[P0])).unwrap());
        assert_eq!(next.as_ref(), P0);
    }

    #[test]
    fn prefixes_saved_parameter_sets() {
        let mut gate = StreamGate::default();
        assert!(matches!(
            gate.push(unit(&[AUD, SPS, PPS])).unwrap(),
            GateOutcome::Hold
        ));
        assert!(gate.saved_parameter_sets().is_some());

        let first = forwarded(gate.push(unit(&[AUD, IDR])).unwrap());
        // saved AUD+SPS+PPS then AUD+IDR, canonicalized with one delimiter
        assert_eq!(first.as_ref(), [AUD, SPS, PPS, IDR].concat().as_slice());
        assert!(gate.saved_parameter_sets().is_none());
        assert!(gate.first_au_reordered());
    }

    #[test]
    fn canonical_order_applied_once() {
        let mut gate = StreamGate::default();
        let first = forwarded(gate.push(unit(&[SEI, IDR, PPS, AUD, SPS])).unwrap());
        assert_eq!(first.as_ref(), [AUD, SPS, PPS, SEI, IDR].concat().as_slice());

        let second = forwarded(gate.push(unit(&[SEI, IDR, PPS, SPS])).unwrap());
        assert_eq!(second.as_ref(), [SEI, IDR, PPS, SPS].concat().as_slice());
    }

    #[test]
    fn holds_parameter_sets_after_sync() {
        let mut gate = StreamGate::default();
        forwarded(gate.push(unit(&[SPS, PPS, IDR])).unwrap());

        assert!(matches!(gate.push(unit(&[SPS, PPS])).unwrap(), GateOutcome::Hold));
        let next = forwarded(gate.push(unit(&[P0])).unwrap());
        assert_eq!(next.as_ref(), [SPS, PPS, P0].concat().as_slice());

        assert!(matches!(gate.push(unit(&[PPS])).unwrap(), GateOutcome::Hold));
        let tail = gate.finish().unwrap();
        assert_eq!(tail.as_ref(), PPS);
        assert!(gate.finish().is_none());
    }

    #[test]
    fn periodic_parameter_sets_keep_one_delimiter() {
        let mut gate = StreamGate::default();
        let expected = [AUD, SPS, PPS, IDR].concat();

        for _ in 0..3 {
            assert!(matches!(gate.push(unit(&[AUD, SPS, PPS])).unwrap(), GateOutcome::Hold));
            let idr = forwarded(gate.push(unit(&[AUD, IDR])).unwrap());
            assert_eq!(idr.as_ref(), expected.as_slice());
            assert_eq!(idr.nal_count, 4);
            assert!(idr.meta.has_aud && idr.meta.has_parameter_sets() && idr.meta.has_idr);

            let p = forwarded(gate.push(unit(&[AUD, P0])).unwrap());
            assert_eq!(p.as_ref(), [AUD, P0].concat().as_slice());
        }
        assert_eq!(gate.dropped(), 0);
    }

    #[test]
    fn no_drop_after_sync() {
        let mut gate = StreamGate::default();
        forwarded(gate.push(unit(&[SPS, PPS, IDR])).unwrap());

        let sequence: [&[&[u8]]; 6] = [
            &[P0],
            &[AUD, P0],
            &[SEI, P0],
            &[AUD, IDR],
            &[IDR],
            &[P0, P0],
        ];
        for parts in sequence {
            let before = gate.forwarded();
            forwarded(gate.push(unit(parts)).unwrap());
            assert_eq!(gate.forwarded(), before + 1);
        }
        assert_eq!(gate.dropped(), 0);
    }

    #[test]
    fn first_idr_seen_is_monotonic() {
        let mut gate = StreamGate::default();
        let pool: [&[&[u8]]; 5] = [&[P0], &[SPS, PPS], &[AUD, IDR], &[SEI], &[SPS, PPS, IDR]];

        let mut was_seen = false;
        for step in 0..200usize {
            let parts = pool[(step * 7 + step / 3) % pool.len()];
            gate.push(unit(parts)).unwrap();
            assert!(!was_seen || gate.first_idr_seen());
            was_seen = gate.first_idr_seen();
        }
        assert!(was_seen);

        gate.reset();
        assert!(!gate.first_idr_seen());
        assert!(!gate.first_au_reordered());
    }

    #[test]
    fn finish_before_sync_drops() {
        let mut gate = StreamGate::default();
        gate.push(unit(&[SPS, PPS])).unwrap();
        assert!(gate.finish().is_none());
    }
}
