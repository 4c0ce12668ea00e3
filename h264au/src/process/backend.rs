//! Collaborator traits seen by a [`DecodeSession`](crate::process::session::DecodeSession).

use std::fmt::{Display, Formatter};

use anyhow::Result;

use crate::structs::frame::{DecodedFrame, PixelFormat};
use crate::structs::packet::Packet;
use crate::structs::timestamp::Timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Hardware,
    Software,
}

impl Display for BackendKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hardware => write!(f, "hardware"),
            Self::Software => write!(f, "software"),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum SendStatus {
    Accepted,
    /// Output must be drained before more input fits. The buffer is handed
    /// back untouched so it can be resent.
    NeedsDrain(Vec<u8>),
    Rejected(String),
}

#[derive(Debug)]
pub enum DrainStatus {
    FrameReady(DecodedFrame),
    NoFrameYet,
    EndOfStream,
}

pub trait DecoderBackend {
    fn kind(&self) -> BackendKind;

    fn name(&self) -> &str;

    fn output_formats(&self) -> &[PixelFormat];

    fn set_output_format(&mut self, _format: PixelFormat) -> Result<()> {
        Ok(())
    }

    fn send_access_unit(&mut self, data: Vec<u8>, timestamp: Option<Timestamp>) -> SendStatus;

    fn drain_frame(&mut self) -> DrainStatus;

    /// Discards queued input and reference pictures.
    fn flush(&mut self);

    /// No more input follows; buffered pictures may now be drained.
    fn end_of_stream(&mut self) {}
}

pub trait BackendFactory {
    fn open(&mut self, kind: BackendKind) -> Result<Box<dyn DecoderBackend>>;
}

/// Upstream demultiplexer delivering packets in decode order.
pub trait PacketSource {
    /// `Ok(None)` marks the end of the stream.
    fn next_packet(&mut self) -> Result<Option<Packet>>;

    /// Repositions to the first packet of the stream.
    fn rewind(&mut self) -> Result<()>;
}

/// In-memory packet list.
#[derive(Debug, Clone, Default)]
pub struct VecSource {
    packets: Vec<Packet>,
    position: usize,
    rewinds: usize,
}

impl VecSource {
    pub fn new(packets: Vec<Packet>) -> Self {
        Self {
            packets,
            position: 0,
            rewinds: 0,
        }
    }

    pub fn rewinds(&self) -> usize {
        self.rewinds
    }
}

impl PacketSource for VecSource {
    fn next_packet(&mut self) -> Result<Option<Packet>> {
        let packet = self.packets.get(self.position).cloned();
        if packet.is_some() {
            self.position += 1;
        }

        Ok(packet)
    }

    fn rewind(&mut self) -> Result<()> {
        self.position = 0;
        self.rewinds += 1;

        Ok(())
    }
}
