use crate::structs::timestamp::Timestamp;

/// An opaque packet delivered by the demultiplexer.
///
/// May hold zero or more complete or partial NAL units. `key_hint` is the
/// container's keyframe flag and is advisory only; keyframe status of an
/// access unit is derived from its NAL content.
#[derive(Debug, Clone, Default)]
pub struct Packet {
    pub data: Vec<u8>,
    pub timestamp: Option<Timestamp>,
    pub key_hint: bool,
}

impl Packet {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            ..Default::default()
        }
    }

    pub fn with_timestamp(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_key_hint(mut self, key_hint: bool) -> Self {
        self.key_hint = key_hint;
        self
    }
}

impl AsRef<[u8]> for Packet {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}
