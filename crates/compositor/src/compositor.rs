use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, ThreadId};
use std::time::Instant;

use image::RgbaImage;

use crate::backend::{BackendError, GpuBackend, OffscreenPass};
use crate::filters::{FilterChain, FilterReceiver};
use crate::frame::FrameInput;
use crate::limiter::FpsLimiter;
use crate::orientation::{self, ScreenDraw};
use crate::settings::{FrameSettings, SharedSettings};
use crate::stats::StatsCounters;
use crate::target::{AttachError, TargetSet};
use crate::types::{Destination, Size};

/// One-shot photo callback. Runs on the render worker with the captured pixels.
pub type PhotoCallback = Box<dyn FnOnce(RgbaImage) + Send + 'static>;

/// State shared between the facade and the render worker.
pub(crate) struct Shared {
    pub settings: SharedSettings,
    pub running: AtomicBool,
    pub stats: StatsCounters,
    photo: Mutex<Option<PhotoCallback>>,
    worker: Mutex<Option<ThreadId>>,
}

impl Shared {
    pub fn new(settings: FrameSettings) -> Self {
        Self {
            settings: SharedSettings::new(settings),
            running: AtomicBool::new(false),
            stats: StatsCounters::default(),
            photo: Mutex::new(None),
            worker: Mutex::new(None),
        }
    }

    pub fn set_worker(&self, worker: ThreadId) {
        *self.worker.lock().unwrap_or_else(PoisonError::into_inner) = Some(worker);
    }

    /// True on the render worker, where photo callbacks and frame sinks run.
    pub fn on_worker_thread(&self) -> bool {
        *self.worker.lock().unwrap_or_else(PoisonError::into_inner) == Some(thread::current().id())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }

    /// Stores a photo request, replacing any request still pending.
    pub fn request_photo(&self, callback: PhotoCallback) {
        let previous = self
            .photo
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(callback);
        if previous.is_some() {
            tracing::debug!("pending photo request replaced");
        }
    }

    pub fn photo_pending(&self) -> bool {
        self.photo
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn take_photo(&self) -> Option<PhotoCallback> {
        self.photo
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Puts a request back after a failed capture unless a newer one arrived.
    fn restore_photo(&self, callback: PhotoCallback) {
        let mut slot = self.photo.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(callback);
        }
    }
}

/// What a single draw tick did. Mostly useful for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct TickReport {
    pub composed: bool,
    pub limited: bool,
    pub encoder: bool,
    pub photo: bool,
    pub preview: bool,
}

/// Owns the backend, the render targets and the filter chain, and runs the
/// per-frame draw sequence. Lives on the render worker thread.
pub(crate) struct Compositor<B: GpuBackend> {
    backend: B,
    targets: TargetSet<B>,
    chain: FilterChain,
    filters: FilterReceiver,
    limiter: FpsLimiter,
    input: FrameInput,
    shared: Arc<Shared>,
}

impl<B: GpuBackend> Compositor<B> {
    pub fn new(backend: B, filters: FilterReceiver, input: FrameInput, shared: Arc<Shared>) -> Self {
        let fps = shared.settings.fps();
        Self {
            backend,
            targets: TargetSet::new(),
            chain: FilterChain::new(),
            filters,
            limiter: FpsLimiter::new(fps),
            input,
            shared,
        }
    }

    pub fn input(&self) -> &FrameInput {
        &self.input
    }

    /// Rebuilds the main target and composition buffer at the encoder size,
    /// then prepares the photo target. A photo target failure is logged and
    /// leaves photos deferred; a main target failure is returned.
    pub fn setup(&mut self) -> Result<(), BackendError> {
        let size = self.shared.settings.encoder_size();
        self.targets.setup_main(&mut self.backend, size)?;

        let result = self.bind_composition(size);
        if let Err(error) = result {
            self.targets.release_all(&mut self.backend);
            return Err(error);
        }
        self.limiter.set_fps(self.shared.settings.fps());

        if let Err(error) = self
            .targets
            .attach_offscreen(&mut self.backend, Destination::Photo, size)
        {
            tracing::warn!(%error, "photo render target unavailable");
        }
        tracing::debug!(%size, "compositor ready");
        Ok(())
    }

    fn bind_composition(&mut self, size: Size) -> Result<(), BackendError> {
        let main = self
            .targets
            .get_mut(Destination::Main)
            .ok_or(BackendError::Uninitialised)?;
        self.backend.make_current(main)?;
        let main = self
            .targets
            .main()
            .ok_or(BackendError::Uninitialised)?;
        self.backend.init_composition(main, size)
    }

    /// Attaches a caller-provided surface as the encoder or preview target.
    /// Failures leave the destination not ready.
    pub fn attach_surface(&mut self, destination: Destination, surface: B::Surface) {
        match self
            .targets
            .attach_surface(&mut self.backend, destination, surface)
        {
            Ok(()) => {}
            Err(AttachError::MainNotReady) => {
                tracing::debug!(%destination, "attach ignored; main target not ready");
            }
            Err(AttachError::Backend(error)) => {
                tracing::warn!(%destination, %error, "failed to attach render target");
            }
        }
    }

    pub fn detach(&mut self, destination: Destination) {
        self.targets.release(&mut self.backend, destination);
    }

    /// Releases every target, dependents before main.
    pub fn teardown(&mut self) {
        self.targets.release_all(&mut self.backend);
        tracing::debug!("compositor released");
    }

    /// Runs one draw tick in the fixed order: compose into main, apply one
    /// filter command, consult the limiter, then encoder, photo and preview.
    pub fn tick(&mut self, now: Instant) -> TickReport {
        let report = self.run_tick(now);
        self.shared.stats.record_tick();
        report
    }

    fn run_tick(&mut self, now: Instant) -> TickReport {
        let settings = self.shared.settings.snapshot();
        let mut report = TickReport::default();

        if let Err(error) = self.compose(&settings) {
            tracing::warn!(%error, "composition failed; skipping tick");
            return report;
        }
        report.composed = true;
        self.shared.stats.record_frame(Destination::Main);

        self.filters.drain_one(&mut self.chain);

        self.limiter.sync_fps(settings.fps);
        report.limited = self.limiter.limit(now);
        if report.limited {
            self.shared.stats.record_limited();
        }

        if !report.limited {
            report.encoder = self.present(Destination::Encoder, &orientation::encoder_draw(&settings));
        }
        report.photo = self.capture_photo(&settings);
        if !report.limited {
            report.preview = self.present(Destination::Preview, &orientation::preview_draw(&settings));
        }
        report
    }

    fn compose(&mut self, settings: &FrameSettings) -> Result<(), BackendError> {
        let main = self
            .targets
            .get_mut(Destination::Main)
            .ok_or(BackendError::Uninitialised)?;
        self.backend.make_current(main)?;
        self.backend.update_frame(self.input.take_latest())?;
        let pass = OffscreenPass {
            camera_rotation: settings.camera_rotation,
            antialiasing: settings.antialiasing,
        };
        self.backend.draw_offscreen(self.chain.filters(), &pass)?;
        self.backend.swap_buffers(main)
    }

    fn present(&mut self, destination: Destination, draw: &ScreenDraw) -> bool {
        let Some(target) = self.targets.get_mut(destination) else {
            return false;
        };
        let result = draw_into(&mut self.backend, target, draw)
            .and_then(|()| self.backend.swap_buffers(target));
        match result {
            Ok(()) => {
                self.shared.stats.record_frame(destination);
                true
            }
            Err(error) => {
                tracing::warn!(%destination, %error, "draw failed");
                false
            }
        }
    }

    fn capture_photo(&mut self, settings: &FrameSettings) -> bool {
        if !self.targets.is_ready(Destination::Photo) {
            return false;
        }
        let Some(callback) = self.shared.take_photo() else {
            return false;
        };
        let Some(target) = self.targets.get_mut(Destination::Photo) else {
            self.shared.restore_photo(callback);
            return false;
        };

        let draw = orientation::photo_draw(settings);
        let pixels = draw_into(&mut self.backend, target, &draw)
            .and_then(|()| self.backend.read_pixels(target, draw.size));
        let image = match pixels {
            Ok(image) => image,
            Err(error) => {
                tracing::warn!(%error, "photo capture failed; request kept");
                self.shared.restore_photo(callback);
                return false;
            }
        };

        tracing::debug!(width = image.width(), height = image.height(), "photo captured");
        callback(image);
        if let Err(error) = self.backend.swap_buffers(target) {
            tracing::warn!(%error, "photo target present failed");
        }
        self.shared.stats.record_frame(Destination::Photo);
        true
    }
}

fn draw_into<B: GpuBackend>(
    backend: &mut B,
    target: &mut B::Target,
    draw: &ScreenDraw,
) -> Result<(), BackendError> {
    backend.make_current(target)?;
    backend.draw_screen(target, draw)
}
