use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::structs::frame::DecodedFrame;

/// Single-slot mailbox passing the latest decoded frame from the decode
/// thread to the render thread.
///
/// Publishing replaces an unconsumed frame; the renderer always sees the
/// newest picture and never a partially written one.
#[derive(Debug, Clone, Default)]
pub struct FrameSlot {
    inner: Arc<Mutex<Option<DecodedFrame>>>,
}

impl FrameSlot {
    /// Stores `frame`, returning the frame it displaced if it was never taken.
    pub fn publish(&self, frame: DecodedFrame) -> Option<DecodedFrame> {
        self.lock().replace(frame)
    }

    pub fn take(&self) -> Option<DecodedFrame> {
        self.lock().take()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_none()
    }

    fn lock(&self) -> MutexGuard<'_, Option<DecodedFrame>> {
        // the slot holds a whole frame or nothing, so a poisoned lock is still consistent
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structs::frame::{FrameData, PixelFormat};
    use std::thread;

    fn frame(n: u32) -> DecodedFrame {
        DecodedFrame {
            width: n,
            height: 1,
            format: PixelFormat::Nv12,
            data: FrameData::Opaque { handle: n as u64 },
            timestamp: None,
        }
    }

    #[test]
    fn newest_frame_wins() {
        let slot = FrameSlot::default();
        assert!(slot.publish(frame(1)).is_none());
        assert_eq!(slot.publish(frame(2)).map(|f| f.width), Some(1));
        assert_eq!(slot.take().map(|f| f.width), Some(2));
        assert!(slot.is_empty());
    }

    #[test]
    fn across_threads() {
        let slot = FrameSlot::default();
        let producer = slot.clone();

        thread::spawn(move || {
            for n in 0..100 {
                producer.publish(frame(n));
            }
        })
        .join()
        .unwrap();

        assert_eq!(slot.take().map(|f| f.width), Some(99));
    }
}
