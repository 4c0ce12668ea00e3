//! Presentation/decode timestamps carried alongside packets and access units.

use std::fmt::{Display, Formatter};

/// Presentation/decode time pair in stream time-base ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp {
    pub pts: i64,
    pub dts: Option<i64>,
}

impl Timestamp {
    pub fn new(pts: i64, dts: Option<i64>) -> Self {
        Self { pts, dts }
    }

    /// Decode time, falling back to presentation time when absent.
    pub fn decode_time(&self) -> i64 {
        self.dts.unwrap_or(self.pts)
    }
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.dts {
            Some(dts) => write!(f, "pts={} dts={}", self.pts, dts),
            None => write!(f, "pts={}", self.pts),
        }
    }
}

#[test]
fn print_timestamp() {
    assert_eq!(format!("{}", Timestamp::new(3003, Some(0))), "pts=3003 dts=0");
    assert_eq!(format!("{}", Timestamp::new(90000, None)), "pts=90000");
    assert_eq!(Timestamp::new(90000, None).decode_time(), 90000);
}
