use super::backend::HostBackendFactory;
use crate::input::ChunkSource;
use anyhow::Result;
use h264au::process::backend::BackendKind;
use h264au::process::session::{DecodeSession, SessionConfig};
use h264au::structs::frame::DecodedFrame;
use indicatif::ProgressBar;
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;

pub struct DecoderThreadConfig {
    pub input_path: PathBuf,
    pub chunk_size: usize,
    pub max_frames: Option<u64>,
    pub session: SessionConfig,
    pub tx: mpsc::Sender<Result<DecodedFrame>>,
    pub pb_clone: Option<ProgressBar>,
}

#[derive(Debug, Clone, Copy)]
pub struct DecodeSummary {
    pub frames: u64,
    pub packets: u64,
    pub bytes: u64,
    pub backend: BackendKind,
    pub fallbacks: u32,
    pub dropped_units: usize,
}

pub fn spawn_decoder_thread(config: DecoderThreadConfig) -> thread::JoinHandle<Result<DecodeSummary>> {
    thread::spawn(move || -> Result<DecodeSummary> {
        let DecoderThreadConfig {
            input_path,
            chunk_size,
            max_frames,
            session,
            tx,
            pb_clone,
        } = config;

        let source = ChunkSource::new(&input_path, chunk_size)?;
        let mut session = DecodeSession::open(source, HostBackendFactory, session)?;
        let mut backend = session.backend_kind();

        if let Some(ref pb) = pb_clone {
            pb.set_message(format!("{backend} decoder"));
        }

        loop {
            if max_frames.is_some_and(|max| session.frames_decoded() >= max) {
                log::info!("Reached frame limit, stopping");
                break;
            }

            let frame = match session.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) => {
                    // the receiver reports the failure; ignore a closed channel
                    let _ = tx.send(Err(e));
                    break;
                }
            };

            if session.backend_kind() != backend {
                backend = session.backend_kind();
                if let Some(ref pb) = pb_clone {
                    pb.set_message(format!("{backend} decoder (fallback)"));
                }
            }

            if tx.send(Ok(frame)).is_err() {
                log::debug!("Frame receiver closed, stopping decoder");
                break;
            }
        }

        let summary = DecodeSummary {
            frames: session.frames_decoded(),
            packets: session.packets_read(),
            bytes: session.source().bytes_read(),
            backend: session.backend_kind(),
            fallbacks: session.state().fallback_count,
            dropped_units: session.gate().dropped(),
        };

        log::debug!(
            "Decoder finished: {} frames from {} packets",
            summary.frames,
            summary.packets
        );
        Ok(summary)
    })
}
