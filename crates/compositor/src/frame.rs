use std::sync::{Arc, Mutex, PoisonError};

use image::RgbaImage;

/// Decoded RGBA frame as delivered by the capture collaborator.
pub type VideoFrame = RgbaImage;

/// Receives "new frame available" notifications.
pub trait FrameAvailableListener: Send + Sync {
    fn on_frame_available(&self);
}

#[derive(Default)]
struct FrameSlot {
    latest: Mutex<Option<VideoFrame>>,
    listener: Mutex<Option<Arc<dyn FrameAvailableListener>>>,
}

/// Shared input slot between the capture stack and the render worker.
///
/// Capture pushes frames; only the most recent undrawn frame is kept. Every
/// push notifies the registered listener, which the render driver installs on
/// start and removes on stop.
#[derive(Clone, Default)]
pub struct FrameInput {
    slot: Arc<FrameSlot>,
}

impl FrameInput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deposits a frame and signals the listener, if any.
    pub fn push(&self, frame: VideoFrame) {
        *self
            .slot
            .latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(frame);
        self.notify();
    }

    /// Signals the listener without replacing the current frame.
    pub fn notify(&self) {
        let listener = self
            .slot
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(listener) = listener {
            listener.on_frame_available();
        }
    }

    /// Takes the newest frame not yet uploaded.
    pub(crate) fn take_latest(&self) -> Option<VideoFrame> {
        self.slot
            .latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    pub(crate) fn set_listener(&self, listener: Option<Arc<dyn FrameAvailableListener>>) {
        *self
            .slot
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = listener;
    }

    pub fn has_listener(&self) -> bool {
        self.slot
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[derive(Default)]
    struct Counter(AtomicUsize);

    impl FrameAvailableListener for Counter {
        fn on_frame_available(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn keeps_only_latest_frame() {
        let input = FrameInput::new();
        input.push(RgbaImage::new(2, 2));
        input.push(RgbaImage::new(4, 4));
        let frame = input.take_latest().expect("frame");
        assert_eq!(frame.dimensions(), (4, 4));
        assert!(input.take_latest().is_none());
    }

    #[test]
    fn notifies_registered_listener_per_push() {
        let input = FrameInput::new();
        let counter = Arc::new(Counter::default());
        input.push(RgbaImage::new(1, 1));
        input.set_listener(Some(counter.clone()));
        input.push(RgbaImage::new(1, 1));
        input.push(RgbaImage::new(1, 1));
        input.set_listener(None);
        input.push(RgbaImage::new(1, 1));
        assert_eq!(counter.0.load(Ordering::SeqCst), 2);
        assert!(!input.has_listener());
    }
}
