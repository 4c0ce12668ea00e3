use std::collections::VecDeque;

use anyhow::{Context, Result, bail};
use log::{Level, debug, error, info, trace, warn};

use crate::process::assemble::Assembler;
use crate::process::backend::{
    BackendFactory, BackendKind, DecoderBackend, DrainStatus, PacketSource, SendStatus,
};
use crate::process::gate::{GateOutcome, StreamGate};
use crate::process::negotiate::negotiate;
use crate::structs::access_unit::AccessUnit;
use crate::structs::frame::{DecodedFrame, PixelFormat};
use crate::utils::errors::{AssembleError, SessionError};

pub const DEFAULT_HARDWARE_STALL_THRESHOLD: u32 = 45;
pub const DEFAULT_SOFTWARE_STALL_THRESHOLD: u32 = 3;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Access units a hardware backend may consume without producing a
    /// frame before it is abandoned.
    pub hardware_stall_threshold: u32,
    pub software_stall_threshold: u32,
    pub prefer_hardware: bool,
    /// Formats the renderer can consume.
    pub renderer_formats: Vec<PixelFormat>,
    pub fail_level: Level,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            hardware_stall_threshold: DEFAULT_HARDWARE_STALL_THRESHOLD,
            software_stall_threshold: DEFAULT_SOFTWARE_STALL_THRESHOLD,
            prefer_hardware: true,
            renderer_formats: vec![PixelFormat::Nv12, PixelFormat::Yuv420p],
            fail_level: Level::Error,
        }
    }
}

impl SessionConfig {
    pub fn with_hardware_stall_threshold(mut self, units: u32) -> Self {
        self.hardware_stall_threshold = units;
        self
    }

    pub fn with_software_stall_threshold(mut self, units: u32) -> Self {
        self.software_stall_threshold = units;
        self
    }

    pub fn with_prefer_hardware(mut self, prefer: bool) -> Self {
        self.prefer_hardware = prefer;
        self
    }

    pub fn with_renderer_formats(mut self, formats: Vec<PixelFormat>) -> Self {
        self.renderer_formats = formats;
        self
    }

    pub fn with_fail_level(mut self, level: Level) -> Self {
        self.fail_level = level;
        self
    }

    pub fn stall_threshold(&self, kind: BackendKind) -> u32 {
        match kind {
            BackendKind::Hardware => self.hardware_stall_threshold,
            BackendKind::Software => self.software_stall_threshold,
        }
    }
}

#[derive(Debug)]
pub enum SessionPoll {
    Frame(DecodedFrame),
    /// Input was consumed but no frame is ready yet.
    Pending,
    EndOfStream,
}

/// Snapshot of the per-playback state.
#[derive(Debug, Clone, Copy)]
pub struct SessionState<'a> {
    pub backend: BackendKind,
    pub first_idr_seen: bool,
    pub first_au_reordered: bool,
    pub saved_parameter_sets: Option<&'a AccessUnit>,
    pub consecutive_reject_count: u32,
    pub units_since_frame: u32,
    pub fallback_count: u32,
}

/// Drives packets from a [`PacketSource`] through assembly and gating into a
/// decoder backend.
///
/// The session starts on a hardware backend when one can be opened. If that
/// backend stalls or keeps rejecting input it is torn down once, the source
/// is rewound, and decoding restarts in software. A software backend failing
/// the same way ends the session with [`SessionError::Undecodable`].
///
/// # Example
///
/// ```rust,no_run
/// use h264au::process::backend::{BackendFactory, VecSource};
/// use h264au::process::session::{DecodeSession, SessionConfig};
/// # struct Factory;
/// # impl BackendFactory for Factory {
/// #     fn open(&mut self, _: h264au::process::backend::BackendKind)
/// #         -> anyhow::Result<Box<dyn h264au::process::backend::DecoderBackend>> { unimplemented!() }
/// # }
/// # fn factory() -> impl BackendFactory { Factory }
///
/// let source = VecSource::new(Vec::new());
/// let mut session = DecodeSession::open(source, factory(), SessionConfig::default())?;
///
/// while let Some(frame) = session.next_frame()? {
///     println!("{}x{} {}", frame.width, frame.height, frame.format);
/// }
/// # Ok::<(), anyhow::Error>(())
/// ```
pub struct DecodeSession<S, F> {
    config: SessionConfig,
    source: S,
    factory: F,
    backend: Option<Box<dyn DecoderBackend>>,
    kind: BackendKind,
    format: PixelFormat,
    assembler: Assembler,
    gate: StreamGate,
    pending: VecDeque<AccessUnit>,
    source_done: bool,
    eos_signalled: bool,
    eos_polls: u32,
    finished: bool,
    units_since_frame: u32,
    consecutive_reject_count: u32,
    fallback_count: u32,
    backend_units: u64,
    backend_frames: u64,
    frames_decoded: u64,
    packets_read: u64,
}

impl<S, F> DecodeSession<S, F>
where
    S: PacketSource,
    F: BackendFactory,
{
    pub fn open(source: S, mut factory: F, config: SessionConfig) -> Result<Self> {
        let backend = open_initial(&mut factory, config.prefer_hardware)?;

        let mut assembler = Assembler::default();
        assembler.set_fail_level(config.fail_level);

        let mut session = Self {
            kind: backend.kind(),
            config,
            source,
            factory,
            backend: None,
            format: PixelFormat::Yuv420p,
            assembler,
            gate: StreamGate::default(),
            pending: VecDeque::new(),
            source_done: false,
            eos_signalled: false,
            eos_polls: 0,
            finished: false,
            units_since_frame: 0,
            consecutive_reject_count: 0,
            fallback_count: 0,
            backend_units: 0,
            backend_frames: 0,
            frames_decoded: 0,
            packets_read: 0,
        };
        session.install(backend)?;

        Ok(session)
    }

    /// Advances the session by at most one access unit.
    pub fn poll(&mut self) -> Result<SessionPoll> {
        loop {
            if self.finished {
                return Ok(SessionPoll::EndOfStream);
            }

            if let Some(unit) = self.pending.pop_front() {
                if self.feed(unit)? {
                    continue;
                }
                if let Some(frame) = self.drain()? {
                    return Ok(SessionPoll::Frame(frame));
                }
                if self.check_stall()? {
                    continue;
                }
                return Ok(SessionPoll::Pending);
            }

            if !self.source_done {
                self.pull()?;
                continue;
            }

            return self.poll_end_of_stream();
        }
    }

    /// Polls until a frame is available, `Ok(None)` at end of stream.
    pub fn next_frame(&mut self) -> Result<Option<DecodedFrame>> {
        loop {
            match self.poll()? {
                SessionPoll::Frame(frame) => return Ok(Some(frame)),
                SessionPoll::Pending => {}
                SessionPoll::EndOfStream => return Ok(None),
            }
        }
    }

    /// Drops all in-flight state so decoding can resume from wherever the
    /// source has been repositioned to. Resynchronizes on the next IDR.
    pub fn seek(&mut self) -> Result<()> {
        self.backend_mut()?.flush();
        self.reset_pipeline();
        debug!("Session flushed, waiting for IDR access unit");

        Ok(())
    }

    /// Rewinds the source and starts over on the current backend.
    pub fn restart(&mut self) -> Result<()> {
        self.source
            .rewind()
            .context("Failed to rewind packet source")?;
        self.seek()
    }

    pub fn state(&self) -> SessionState<'_> {
        SessionState {
            backend: self.kind,
            first_idr_seen: self.gate.first_idr_seen(),
            first_au_reordered: self.gate.first_au_reordered(),
            saved_parameter_sets: self.gate.saved_parameter_sets(),
            consecutive_reject_count: self.consecutive_reject_count,
            units_since_frame: self.units_since_frame,
            fallback_count: self.fallback_count,
        }
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.kind
    }

    pub fn output_format(&self) -> PixelFormat {
        self.format
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn gate(&self) -> &StreamGate {
        &self.gate
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// The source, for repositioning before [`seek`](Self::seek).
    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded
    }

    pub fn packets_read(&self) -> u64 {
        self.packets_read
    }

    fn install(&mut self, mut backend: Box<dyn DecoderBackend>) -> Result<()> {
        let format = negotiate(backend.output_formats(), &self.config.renderer_formats);
        backend
            .set_output_format(format)
            .with_context(|| format!("Failed to select {format} output on {}", backend.name()))?;

        info!(
            "Decoding with {} backend {}, output {}",
            backend.kind(),
            backend.name(),
            format
        );

        self.kind = backend.kind();
        self.format = format;
        self.backend_units = 0;
        self.backend_frames = 0;
        self.backend = Some(backend);

        Ok(())
    }

    fn backend_mut(&mut self) -> Result<&mut (dyn DecoderBackend + 'static)> {
        match self.backend.as_deref_mut() {
            Some(backend) => Ok(backend),
            None => bail!(SessionError::Undecodable),
        }
    }

    fn pull(&mut self) -> Result<()> {
        let Some(packet) = self.source.next_packet()? else {
            debug!("Packet source exhausted after {} packets", self.packets_read);
            self.source_done = true;
            self.assembler.finish().map_err(assemble_error)?;
            self.collect_units()?;
            if let Some(saved) = self.gate.finish() {
                self.pending.push_back(saved);
            }
            return Ok(());
        };

        self.packets_read += 1;
        self.assembler
            .push_packet(&packet)
            .map_err(assemble_error)?;
        self.collect_units()
    }

    fn collect_units(&mut self) -> Result<()> {
        while let Some(unit) = self.assembler.next() {
            match self.gate.push(unit).map_err(assemble_error)? {
                GateOutcome::Forward(unit) => self.pending.push_back(unit),
                GateOutcome::Hold | GateOutcome::Drop(_) => {}
            }
        }

        Ok(())
    }

    /// Sends one unit to the backend. Returns true if the backend was
    /// replaced as a consequence.
    fn feed(&mut self, unit: AccessUnit) -> Result<bool> {
        let timestamp = unit.timestamp;
        let meta = unit.meta;
        let nal_count = unit.nal_count;

        let status = self.backend_mut()?.send_access_unit(unit.into_bytes(), timestamp);
        match status {
            SendStatus::Accepted => {
                trace!("Fed access unit {meta} to {} backend", self.kind);
                self.units_since_frame += 1;
                self.backend_units += 1;
                Ok(false)
            }
            SendStatus::NeedsDrain(data) => {
                // a refused send still counts toward the stall budget
                self.pending
                    .push_front(AccessUnit::from_raw_parts(data, timestamp, meta, nal_count));
                self.units_since_frame += 1;
                Ok(false)
            }
            SendStatus::Rejected(reason) => {
                self.consecutive_reject_count += 1;
                warn!(
                    "{}",
                    SessionError::BackendReject {
                        backend: self.kind.to_string(),
                        reason,
                    }
                );

                if self.consecutive_reject_count > self.config.stall_threshold(self.kind) {
                    self.backend_failed(SessionError::SustainedReject {
                        backend: self.kind.to_string(),
                        count: self.consecutive_reject_count,
                    })?;
                    return Ok(true);
                }
                Ok(false)
            }
        }
    }

    fn drain(&mut self) -> Result<Option<DecodedFrame>> {
        match self.backend_mut()?.drain_frame() {
            DrainStatus::FrameReady(frame) => {
                self.frame_drained();
                Ok(Some(frame))
            }
            DrainStatus::NoFrameYet => Ok(None),
            DrainStatus::EndOfStream => {
                debug!("{} backend signalled end of stream early", self.kind);
                Ok(None)
            }
        }
    }

    fn frame_drained(&mut self) {
        self.units_since_frame = 0;
        self.consecutive_reject_count = 0;
        self.backend_frames += 1;
        self.frames_decoded += 1;
    }

    /// Returns true if the backend was replaced.
    fn check_stall(&mut self) -> Result<bool> {
        if self.units_since_frame <= self.config.stall_threshold(self.kind) {
            return Ok(false);
        }

        self.backend_failed(SessionError::BackendStall {
            backend: self.kind.to_string(),
            units: self.units_since_frame,
        })?;
        Ok(true)
    }

    fn poll_end_of_stream(&mut self) -> Result<SessionPoll> {
        if !self.eos_signalled {
            self.backend_mut()?.end_of_stream();
            self.eos_signalled = true;
        }

        let exhausted = match self.backend_mut()?.drain_frame() {
            DrainStatus::FrameReady(frame) => {
                self.frame_drained();
                return Ok(SessionPoll::Frame(frame));
            }
            DrainStatus::EndOfStream => true,
            DrainStatus::NoFrameYet => {
                self.eos_polls += 1;
                self.eos_polls > self.config.stall_threshold(self.kind)
            }
        };
        if !exhausted {
            return Ok(SessionPoll::Pending);
        }

        // a backend that swallowed the whole stream without output never worked
        if self.backend_frames == 0 && self.backend_units > 0 {
            self.backend_failed(SessionError::BackendStall {
                backend: self.kind.to_string(),
                units: self.units_since_frame,
            })?;
            return Ok(SessionPoll::Pending);
        }

        info!(
            "End of stream: {} frames decoded from {} packets",
            self.frames_decoded, self.packets_read
        );
        self.finished = true;
        Ok(SessionPoll::EndOfStream)
    }

    fn backend_failed(&mut self, err: SessionError) -> Result<()> {
        match self.kind {
            BackendKind::Hardware => {
                warn!("{err}, falling back to software decoding");
                self.fall_back()
            }
            BackendKind::Software => {
                error!("{err}");
                self.backend = None;
                bail!(SessionError::Undecodable)
            }
        }
    }

    fn fall_back(&mut self) -> Result<()> {
        if let Some(mut hardware) = self.backend.take() {
            hardware.flush();
        }
        self.kind = BackendKind::Software;
        self.fallback_count += 1;

        self.source
            .rewind()
            .context("Failed to rewind packet source for software decoding")?;
        self.reset_pipeline();

        let backend = self
            .factory
            .open(BackendKind::Software)
            .context(SessionError::BackendOpen(BackendKind::Software.to_string()))?;
        self.install(backend)?;

        info!("Restarted stream from the first packet in software");
        Ok(())
    }

    fn reset_pipeline(&mut self) {
        self.gate.reset();
        self.assembler.reset();
        self.pending.clear();
        self.source_done = false;
        self.eos_signalled = false;
        self.eos_polls = 0;
        self.finished = false;
        self.units_since_frame = 0;
        self.consecutive_reject_count = 0;
    }
}

fn open_initial<F: BackendFactory>(
    factory: &mut F,
    prefer_hardware: bool,
) -> Result<Box<dyn DecoderBackend>> {
    if prefer_hardware {
        match factory.open(BackendKind::Hardware) {
            Ok(backend) => return Ok(backend),
            Err(e) => warn!("Hardware backend unavailable, starting in software: {e:#}"),
        }
    }

    factory
        .open(BackendKind::Software)
        .context(SessionError::BackendOpen(BackendKind::Software.to_string()))
}

fn assemble_error(err: AssembleError) -> anyhow::Error {
    match err {
        AssembleError::AllocationFailure { .. } => {
            anyhow::Error::new(err).context(SessionError::AllocationFailure)
        }
        other => other.into(),
    }
}
