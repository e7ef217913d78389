use std::mem;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};

use crate::backend::GpuBackend;
use crate::compositor::{Compositor, PhotoCallback, Shared};
use crate::driver::{RenderDriver, StartFailure};
use crate::error::StreamError;
use crate::filters::{filter_queue, FilterCommand, FilterHandle, FilterSender};
use crate::frame::FrameInput;
use crate::settings::FrameSettings;
use crate::stats::RenderStats;
use crate::types::{AspectRatioMode, Destination, OrientationForced, Size};

enum Lifecycle<B: GpuBackend> {
    Idle(Box<Compositor<B>>),
    Running(RenderDriver<B>),
    /// The worker died and took the backend with it.
    Lost,
}

/// Thread-safe control surface of the compositor.
///
/// Every method may be called from any thread. Attach and detach requests are
/// marshaled onto the render worker in submission order; they are silently
/// ignored while the stream is not running. Plain setters write shared fields
/// and take effect on the next draw tick. Only [`start`](Self::start) and
/// [`stop`](Self::stop) block, waiting for worker setup and teardown.
pub struct StreamCompositor<B: GpuBackend> {
    lifecycle: Mutex<Lifecycle<B>>,
    shared: Arc<Shared>,
    filters: FilterSender,
    active_filters: Arc<AtomicUsize>,
    input: FrameInput,
}

impl<B: GpuBackend> StreamCompositor<B> {
    pub fn new(backend: B) -> Self {
        Self::with_settings(backend, FrameSettings::default())
    }

    pub fn with_settings(backend: B, settings: FrameSettings) -> Self {
        let shared = Arc::new(Shared::new(settings));
        let (filters, receiver) = filter_queue();
        let active_filters = receiver.active_count();
        let input = FrameInput::new();
        let compositor = Compositor::new(backend, receiver, input.clone(), Arc::clone(&shared));
        Self {
            lifecycle: Mutex::new(Lifecycle::Idle(Box::new(compositor))),
            shared,
            filters,
            active_filters,
            input,
        }
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle<B>> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lifecycle lock for requests that may come from the render worker.
    /// The worker never waits for it: `stop` holds it while joining the worker.
    fn try_lifecycle(&self) -> Option<MutexGuard<'_, Lifecycle<B>>> {
        if !self.shared.on_worker_thread() {
            return Some(self.lifecycle());
        }
        match self.lifecycle.try_lock() {
            Ok(guard) => Some(guard),
            Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => None,
        }
    }

    /// Spawns the render worker and builds the main, composition and photo
    /// targets. Calling it while running is a no-op. Fails with
    /// [`StreamError::OnRenderWorker`] when called from a photo callback or
    /// frame sink.
    pub fn start(&self) -> Result<(), StreamError> {
        if self.shared.on_worker_thread() {
            return Err(StreamError::OnRenderWorker);
        }
        let mut lifecycle = self.lifecycle();
        let compositor = match mem::replace(&mut *lifecycle, Lifecycle::Lost) {
            Lifecycle::Idle(compositor) => compositor,
            Lifecycle::Running(driver) if self.shared.is_running() => {
                *lifecycle = Lifecycle::Running(driver);
                return Ok(());
            }
            // Stopped from its own worker; collect it before starting over.
            Lifecycle::Running(driver) => Box::new(driver.shutdown()?),
            Lifecycle::Lost => return Err(StreamError::Unavailable),
        };

        match RenderDriver::spawn(*compositor, Arc::clone(&self.shared)) {
            Ok(driver) => {
                *lifecycle = Lifecycle::Running(driver);
                tracing::info!(size = %self.shared.settings.encoder_size(), "stream started");
                Ok(())
            }
            Err(StartFailure::Setup(compositor, error)) => {
                *lifecycle = Lifecycle::Idle(compositor);
                Err(StreamError::Backend(error))
            }
            Err(StartFailure::Lost(error)) => Err(error),
        }
    }

    /// Stops drawing and releases every render target. Safe to call at any
    /// time, any number of times.
    ///
    /// Called from a photo callback or frame sink, it only ends the stream:
    /// the worker finishes the current tick and tears down on its own, and
    /// the next `start` or `stop` from another thread collects it.
    pub fn stop(&self) {
        self.shared.set_running(false);
        if self.shared.on_worker_thread() {
            tracing::debug!("stop requested on the render worker");
            return;
        }
        let mut lifecycle = self.lifecycle();
        let driver = match mem::replace(&mut *lifecycle, Lifecycle::Lost) {
            Lifecycle::Running(driver) => driver,
            other => {
                *lifecycle = other;
                return;
            }
        };
        match driver.shutdown() {
            Ok(compositor) => {
                *lifecycle = Lifecycle::Idle(Box::new(compositor));
                tracing::info!("stream stopped");
            }
            Err(error) => tracing::warn!(%error, "render worker did not stop cleanly"),
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    /// Input slot the capture stack pushes frames into.
    pub fn frame_input(&self) -> FrameInput {
        self.input.clone()
    }

    /// Queues one draw tick without a new frame. Ignored while not running.
    pub fn request_render(&self) {
        let Some(lifecycle) = self.try_lifecycle() else {
            return;
        };
        if let Lifecycle::Running(driver) = &*lifecycle {
            if self.shared.is_running() {
                driver.request_draw();
            }
        }
    }

    fn with_driver(&self, action: &str, f: impl FnOnce(&RenderDriver<B>)) {
        let Some(lifecycle) = self.try_lifecycle() else {
            tracing::debug!(action, "ignored; stream is stopping");
            return;
        };
        match &*lifecycle {
            Lifecycle::Running(driver) => f(driver),
            _ => tracing::debug!(action, "ignored; stream is not running"),
        }
    }

    pub fn add_encoder_surface(&self, surface: B::Surface) {
        self.with_driver("add encoder surface", |driver| {
            driver.attach(Destination::Encoder, surface)
        });
    }

    pub fn remove_encoder_surface(&self) {
        self.with_driver("remove encoder surface", |driver| {
            driver.detach(Destination::Encoder)
        });
    }

    pub fn attach_preview(&self, surface: B::Surface) {
        self.with_driver("attach preview", |driver| {
            driver.attach(Destination::Preview, surface)
        });
    }

    pub fn detach_preview(&self) {
        self.with_driver("detach preview", |driver| driver.detach(Destination::Preview));
    }

    /// Captures the next composed frame at encoder size. The callback runs
    /// exactly once on the render worker; a newer request replaces a pending
    /// one. Requests made before start wait for the photo target. The
    /// callback may call [`stop`](Self::stop) but not [`start`](Self::start).
    pub fn request_photo(&self, callback: impl FnOnce(image::RgbaImage) + Send + 'static) {
        let callback: PhotoCallback = Box::new(callback);
        self.shared.request_photo(callback);
    }

    pub fn photo_pending(&self) -> bool {
        self.shared.photo_pending()
    }

    pub fn set_filter(&self, filter: FilterHandle) {
        self.filters.send(FilterCommand::Set(filter));
    }

    pub fn set_filter_at(&self, index: usize, filter: FilterHandle) {
        self.filters.send(FilterCommand::SetAt { index, filter });
    }

    pub fn add_filter(&self, filter: FilterHandle) {
        self.filters.send(FilterCommand::Add(filter));
    }

    pub fn add_filter_at(&self, index: usize, filter: FilterHandle) {
        self.filters.send(FilterCommand::AddAt { index, filter });
    }

    pub fn remove_filter(&self, filter: &FilterHandle) {
        self.filters.send(FilterCommand::Remove(filter.clone()));
    }

    pub fn remove_filter_at(&self, index: usize) {
        self.filters.send(FilterCommand::RemoveAt(index));
    }

    pub fn clear_filters(&self) {
        self.filters.send(FilterCommand::Clear);
    }

    /// Filters active after the last applied command. Queued commands are
    /// not reflected until a draw tick drains them.
    pub fn filter_count(&self) -> usize {
        self.active_filters.load(Ordering::Relaxed)
    }

    pub fn pending_filter_commands(&self) -> usize {
        self.filters.pending()
    }

    /// Takes effect for the composition and photo buffers on the next start;
    /// the encoder draw size changes immediately.
    pub fn set_encoder_size(&self, size: Size) {
        self.shared.settings.set_encoder_size(size);
    }

    pub fn encoder_size(&self) -> Size {
        self.shared.settings.encoder_size()
    }

    /// Zero disables limiting.
    pub fn set_fps(&self, fps: u32) {
        self.shared.settings.set_fps(fps);
    }

    pub fn fps(&self) -> u32 {
        self.shared.settings.fps()
    }

    pub fn mute_video(&self) {
        self.shared.settings.set_muted(true);
    }

    pub fn unmute_video(&self) {
        self.shared.settings.set_muted(false);
    }

    pub fn is_video_muted(&self) -> bool {
        self.shared.settings.muted()
    }

    pub fn force_orientation(&self, forced: OrientationForced) {
        self.shared.settings.set_forced_orientation(forced);
    }

    /// Orientation reported by the device sensor.
    pub fn set_device_portrait(&self, portrait: bool) {
        self.shared.settings.set_sensed_portrait(portrait);
    }

    pub fn set_stream_rotation(&self, degrees: i32) {
        self.shared.settings.set_stream_rotation(degrees);
    }

    pub fn set_preview_rotation(&self, degrees: i32) {
        self.shared.settings.set_preview_rotation(degrees);
    }

    /// Rotation applied to the camera frame before filtering.
    pub fn set_camera_orientation(&self, degrees: i32) {
        self.shared.settings.set_camera_rotation(degrees);
    }

    /// Zero in either dimension falls back to the encoder size.
    pub fn set_preview_resolution(&self, size: Size) {
        self.shared.settings.set_preview_size(size);
    }

    pub fn set_stream_flip_horizontal(&self, flip: bool) {
        self.shared.settings.set_stream_flip_horizontal(flip);
    }

    pub fn set_stream_flip_vertical(&self, flip: bool) {
        self.shared.settings.set_stream_flip_vertical(flip);
    }

    pub fn set_preview_flip_horizontal(&self, flip: bool) {
        self.shared.settings.set_preview_flip_horizontal(flip);
    }

    pub fn set_preview_flip_vertical(&self, flip: bool) {
        self.shared.settings.set_preview_flip_vertical(flip);
    }

    pub fn set_aspect_ratio_mode(&self, mode: AspectRatioMode) {
        self.shared.settings.set_aspect_ratio(mode);
    }

    pub fn enable_aa(&self, enabled: bool) {
        self.shared.settings.set_antialiasing(enabled);
    }

    pub fn is_aa_enabled(&self) -> bool {
        self.shared.settings.antialiasing()
    }

    /// Keeps frames flowing from a stalled source by re-drawing the last
    /// frame once per frame interval.
    pub fn set_force_render(&self, enabled: bool) {
        self.shared.settings.set_force_render(enabled);
        if enabled {
            // Wakes a worker blocked on the command queue so the timeout applies.
            self.request_render();
        }
    }

    pub fn settings(&self) -> FrameSettings {
        self.shared.settings.snapshot()
    }

    pub fn render_stats(&self) -> RenderStats {
        self.shared.stats.snapshot()
    }
}

impl<B: GpuBackend> Drop for StreamCompositor<B> {
    fn drop(&mut self) {
        self.stop();
    }
}
