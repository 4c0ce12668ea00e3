use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use h264au::process::backend::PacketSource;
use h264au::structs::packet::Packet;

/// Unified input reader that handles both file and pipe input with buffered reading
pub struct InputReader {
    reader: Box<dyn Read + Send>,
    is_pipe: bool,
}

impl InputReader {
    /// Create a new InputReader from a path
    /// Use "-" for stdin pipe input
    pub fn new<P: AsRef<Path>>(input_path: P) -> Result<Self> {
        let path_str = input_path.as_ref().to_string_lossy();
        let is_pipe = path_str == "-";

        let reader: Box<dyn Read + Send> = if is_pipe {
            Box::new(io::stdin())
        } else {
            let file = File::open(input_path)?;
            Box::new(BufReader::new(file))
        };

        Ok(Self { reader, is_pipe })
    }

    /// Read a chunk of data into the provided buffer
    /// Returns the number of bytes read, 0 indicates EOF
    pub fn read_chunk(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let bytes_read = self.reader.read(buffer)?;
        Ok(bytes_read)
    }

    /// Check if this is pipe input
    pub fn is_pipe(&self) -> bool {
        self.is_pipe
    }

    /// Process data in chunks using a callback function
    /// The callback receives each chunk and should return Ok(true) to continue or Ok(false) to stop
    pub fn process_chunks<F>(&mut self, chunk_size: usize, mut callback: F) -> Result<()>
    where
        F: FnMut(&[u8]) -> Result<bool>,
    {
        let mut buffer = vec![0u8; chunk_size];

        loop {
            let bytes_read = self.read_chunk(&mut buffer)?;
            if bytes_read == 0 {
                break; // EOF
            }

            if !callback(&buffer[..bytes_read])? {
                break; // Callback requested stop
            }
        }

        Ok(())
    }
}

/// Packet source cutting a raw Annex-B file into fixed-size chunks.
///
/// Chunks fall anywhere in the byte stream, so NAL units regularly straddle
/// packet boundaries. Rewinding reopens the file; pipes cannot be rewound.
pub struct ChunkSource {
    path: PathBuf,
    reader: InputReader,
    chunk_size: usize,
    bytes_read: u64,
}

impl ChunkSource {
    pub fn new<P: AsRef<Path>>(path: P, chunk_size: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let reader = InputReader::new(&path)?;

        Ok(Self {
            path,
            reader,
            chunk_size: chunk_size.max(1),
            bytes_read: 0,
        })
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }
}

impl PacketSource for ChunkSource {
    fn next_packet(&mut self) -> Result<Option<Packet>> {
        let mut data = vec![0u8; self.chunk_size];
        let n = self.reader.read_chunk(&mut data)?;
        if n == 0 {
            return Ok(None);
        }

        data.truncate(n);
        self.bytes_read += n as u64;
        Ok(Some(Packet::new(data)))
    }

    fn rewind(&mut self) -> Result<()> {
        if self.reader.is_pipe() {
            bail!("Cannot rewind stdin input");
        }

        log::debug!("Reopening {} from the start", self.path.display());
        self.reader = InputReader::new(&self.path)?;
        self.bytes_read = 0;

        Ok(())
    }
}
