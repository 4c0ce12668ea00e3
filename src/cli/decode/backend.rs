use anyhow::{Result, bail};
use h264au::process::backend::{BackendFactory, BackendKind, DecoderBackend};

/// Opens the decoders compiled into this binary.
///
/// No hardware accelerator is wired up, so every session starts in software.
#[derive(Debug, Default)]
pub struct HostBackendFactory;

impl BackendFactory for HostBackendFactory {
    fn open(&mut self, kind: BackendKind) -> Result<Box<dyn DecoderBackend>> {
        match kind {
            BackendKind::Hardware => bail!("No hardware H.264 decoder available"),
            BackendKind::Software => open_software(),
        }
    }
}

#[cfg(feature = "software-decode")]
fn open_software() -> Result<Box<dyn DecoderBackend>> {
    Ok(Box::new(software::OpenH264Backend::new()?))
}

#[cfg(not(feature = "software-decode"))]
fn open_software() -> Result<Box<dyn DecoderBackend>> {
    bail!("Built without the software-decode feature")
}

#[cfg(feature = "software-decode")]
mod software {
    use std::collections::VecDeque;

    use anyhow::Result;
    use h264au::process::backend::{BackendKind, DecoderBackend, DrainStatus, SendStatus};
    use h264au::structs::frame::{DecodedFrame, FrameData, PixelFormat, Plane};
    use h264au::structs::timestamp::Timestamp;
    use openh264::decoder::Decoder;
    use openh264::formats::YUVSource;

    const FORMATS: [PixelFormat; 1] = [PixelFormat::Yuv420p];

    pub struct OpenH264Backend {
        decoder: Decoder,
        ready: VecDeque<DecodedFrame>,
        ended: bool,
    }

    impl OpenH264Backend {
        pub fn new() -> Result<Self> {
            Ok(Self {
                decoder: Decoder::new()?,
                ready: VecDeque::new(),
                ended: false,
            })
        }
    }

    impl DecoderBackend for OpenH264Backend {
        fn kind(&self) -> BackendKind {
            BackendKind::Software
        }

        fn name(&self) -> &str {
            "openh264"
        }

        fn output_formats(&self) -> &[PixelFormat] {
            &FORMATS
        }

        fn send_access_unit(&mut self, data: Vec<u8>, timestamp: Option<Timestamp>) -> SendStatus {
            match self.decoder.decode(&data) {
                Ok(Some(yuv)) => {
                    self.ready.push_back(copy_picture(&yuv, timestamp));
                    SendStatus::Accepted
                }
                Ok(None) => SendStatus::Accepted,
                Err(e) => SendStatus::Rejected(e.to_string()),
            }
        }

        fn drain_frame(&mut self) -> DrainStatus {
            match self.ready.pop_front() {
                Some(frame) => DrainStatus::FrameReady(frame),
                None if self.ended => DrainStatus::EndOfStream,
                None => DrainStatus::NoFrameYet,
            }
        }

        fn flush(&mut self) {
            self.ready.clear();
            self.ended = false;
            // openh264 has no reset entry point; a fresh instance drops references
            match Decoder::new() {
                Ok(decoder) => self.decoder = decoder,
                Err(e) => log::warn!("Failed to recreate openh264 decoder: {e}"),
            }
        }

        fn end_of_stream(&mut self) {
            self.ended = true;
        }
    }

    /// Copies the borrowed decoder output into owned planes.
    fn copy_picture(yuv: &impl YUVSource, timestamp: Option<Timestamp>) -> DecodedFrame {
        let (width, height) = yuv.dimensions();
        let (y_stride, u_stride, v_stride) = yuv.strides();
        let chroma_rows = height.div_ceil(2);

        let plane = |data: &[u8], stride: usize, rows: usize| Plane {
            data: data[..(stride * rows).min(data.len())].to_vec(),
            stride,
        };

        DecodedFrame {
            width: width as u32,
            height: height as u32,
            format: PixelFormat::Yuv420p,
            data: FrameData::Planes(vec![
                plane(yuv.y(), y_stride, height),
                plane(yuv.u(), u_stride, chroma_rows),
                plane(yuv.v(), v_stride, chroma_rows),
            ]),
            timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hardware_is_unavailable() {
        let mut factory = HostBackendFactory;
        assert!(factory.open(BackendKind::Hardware).is_err());
    }
}
