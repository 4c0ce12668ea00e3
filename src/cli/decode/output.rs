use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use h264au::structs::frame::{DecodedFrame, PixelFormat};

/// Appends `expected_ext` unless the path already carries it.
pub fn create_path_with_extension(base_path: &Path, expected_ext: &str) -> PathBuf {
    match base_path.extension() {
        Some(ext) if ext == expected_ext => base_path.to_path_buf(),
        Some(_) => {
            let mut name = base_path.as_os_str().to_os_string();
            name.push(".");
            name.push(expected_ext);
            PathBuf::from(name)
        }
        None => base_path.with_extension(expected_ext),
    }
}

/// Raw planar writer. Frames are written back to back without headers.
pub struct FrameWriter {
    out: Box<dyn Write>,
    geometry: Option<(u32, u32, PixelFormat)>,
    pub frames_written: u64,
    pub bytes_written: u64,
}

impl FrameWriter {
    pub fn create(path: &Path) -> Result<Self> {
        let out: Box<dyn Write> = if path.as_os_str() == "-" {
            Box::new(BufWriter::new(io::stdout().lock()))
        } else {
            let path = create_path_with_extension(path, "yuv");
            log::info!("Writing frames to {}", path.display());
            let file = File::create(&path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            Box::new(BufWriter::new(file))
        };

        Ok(Self::from_writer(out))
    }

    pub fn from_writer(out: Box<dyn Write>) -> Self {
        Self {
            out,
            geometry: None,
            frames_written: 0,
            bytes_written: 0,
        }
    }

    pub fn write_frame(&mut self, frame: &DecodedFrame) -> Result<()> {
        let geometry = (frame.width, frame.height, frame.format);
        match self.geometry {
            None => {
                log::info!(
                    "Output geometry: {}x{} {}",
                    frame.width,
                    frame.height,
                    frame.format
                );
                self.geometry = Some(geometry);
            }
            Some(previous) if previous != geometry => {
                log::warn!(
                    "Geometry changed at frame {}: {}x{} {} -> {}x{} {}",
                    self.frames_written,
                    previous.0,
                    previous.1,
                    previous.2,
                    frame.width,
                    frame.height,
                    frame.format
                );
                self.geometry = Some(geometry);
            }
            Some(_) => {}
        }

        let mut counted = CountingWriter {
            inner: &mut self.out,
            count: 0,
        };
        frame.write_packed(&mut counted)?;
        self.bytes_written += counted.count;
        self.frames_written += 1;

        Ok(())
    }

    pub fn finalize(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}

struct CountingWriter<'a, W: Write + ?Sized> {
    inner: &'a mut W,
    count: u64,
}

impl<W: Write + ?Sized> Write for CountingWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.count += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
