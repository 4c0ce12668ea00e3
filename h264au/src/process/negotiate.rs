use log::{debug, warn};

use crate::structs::frame::PixelFormat;

/// Formats tried in order when both sides support them.
pub const FORMAT_PREFERENCE: [PixelFormat; 2] = [PixelFormat::Nv12, PixelFormat::Yuv420p];

/// Picks the output format for a decoder backend.
///
/// Preferred formats offered by the backend and accepted by the renderer win,
/// then any offered format the renderer accepts, then the backend's first
/// offer. With nothing offered at all the planar default is used.
pub fn negotiate(offered: &[PixelFormat], accepted: &[PixelFormat]) -> PixelFormat {
    if let Some(&format) = FORMAT_PREFERENCE
        .iter()
        .find(|f| offered.contains(f) && accepted.contains(f))
    {
        debug!("Negotiated output format {format}");
        return format;
    }

    if let Some(&format) = offered.iter().find(|f| accepted.contains(f)) {
        debug!("Negotiated non-preferred output format {format}");
        return format;
    }

    match offered.first() {
        Some(&format) => {
            warn!("Renderer accepts none of the offered formats, using {format}");
            format
        }
        None => {
            warn!("Backend offered no output formats, assuming yuv420p");
            PixelFormat::Yuv420p
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PixelFormat::*;

    #[test]
    fn prefers_nv12() {
        assert_eq!(negotiate(&[Yuv420p, Nv12], &[Yuv420p, Nv12]), Nv12);
        assert_eq!(negotiate(&[Yuv420p, Nv12], &[Yuv420p]), Yuv420p);
    }

    #[test]
    fn falls_back_in_order() {
        assert_eq!(negotiate(&[Opaque(7), Nv12], &[Opaque(7)]), Opaque(7));
        assert_eq!(negotiate(&[Opaque(7), Nv12], &[Yuv420p]), Opaque(7));
        assert_eq!(negotiate(&[], &[Nv12]), Yuv420p);
    }
}
