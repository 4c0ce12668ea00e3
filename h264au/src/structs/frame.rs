//! Decoded picture types handed from a backend to the renderer.

use std::fmt::{Display, Formatter};

use crate::structs::timestamp::Timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// Luma plane followed by one interleaved CbCr plane.
    Nv12,
    /// Three planes, chroma subsampled 2x2.
    Yuv420p,
    /// Backend-specific surface the renderer imports directly.
    Opaque(u32),
}

impl PixelFormat {
    pub fn plane_count(&self) -> usize {
        match self {
            Self::Nv12 => 2,
            Self::Yuv420p => 3,
            Self::Opaque(_) => 0,
        }
    }

    /// Bytes of one tightly packed picture, `None` for opaque surfaces.
    pub fn frame_size(&self, width: u32, height: u32) -> Option<usize> {
        let luma = width as usize * height as usize;
        let chroma = width.div_ceil(2) as usize * height.div_ceil(2) as usize;
        match self {
            Self::Nv12 | Self::Yuv420p => Some(luma + 2 * chroma),
            Self::Opaque(_) => None,
        }
    }
}

impl Display for PixelFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Nv12 => write!(f, "nv12"),
            Self::Yuv420p => write!(f, "yuv420p"),
            Self::Opaque(id) => write!(f, "opaque({id:#x})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plane {
    pub data: Vec<u8>,
    pub stride: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameData {
    Planes(Vec<Plane>),
    Opaque { handle: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub data: FrameData,
    pub timestamp: Option<Timestamp>,
}

impl DecodedFrame {
    pub fn planes(&self) -> &[Plane] {
        match &self.data {
            FrameData::Planes(planes) => planes,
            FrameData::Opaque { .. } => &[],
        }
    }

    /// Writes the visible area of each plane, dropping stride padding.
    pub fn write_packed<W: std::io::Write>(&self, out: &mut W) -> std::io::Result<()> {
        let chroma_height = self.height.div_ceil(2) as usize;
        let rows = [self.height as usize, chroma_height, chroma_height];
        let widths = match self.format {
            PixelFormat::Nv12 => [self.width as usize, self.width.div_ceil(2) as usize * 2, 0],
            _ => [
                self.width as usize,
                self.width.div_ceil(2) as usize,
                self.width.div_ceil(2) as usize,
            ],
        };

        let planes = self.planes().iter().take(self.format.plane_count());
        for (i, plane) in planes.enumerate() {
            for row in plane.data.chunks(plane.stride.max(1)).take(rows[i]) {
                out.write_all(&row[..widths[i].min(row.len())])?;
            }
        }

        Ok(())
    }
}

#[test]
fn packed_output_drops_padding() {
    let frame = DecodedFrame {
        width: 2,
        height: 2,
        format: PixelFormat::Yuv420p,
        data: FrameData::Planes(vec![
            Plane { data: vec![1, 2, 0, 0, 3, 4, 0, 0], stride: 4 },
            Plane { data: vec![5, 0], stride: 2 },
            Plane { data: vec![6, 0], stride: 2 },
        ]),
        timestamp: None,
    };

    let mut out = Vec::new();
    frame.write_packed(&mut out).unwrap();
    assert_eq!(out, [1, 2, 3, 4, 5, 6]);
    assert_eq!(PixelFormat::Yuv420p.frame_size(2, 2), Some(out.len()));

    // a stray extra plane is not written
    let mut frame = frame;
    if let FrameData::Planes(planes) = &mut frame.data {
        planes.push(Plane { data: vec![7], stride: 1 });
    }
    let mut out = Vec::new();
    frame.write_packed(&mut out).unwrap();
    assert_eq!(out.len(), 6);
    assert_eq!(PixelFormat::Nv12.plane_count(), 2);
}
