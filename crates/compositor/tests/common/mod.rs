#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::thread;
use std::time::{Duration, Instant};

use compositor::{
    BackendError, FilterHandle, GpuBackend, OffscreenPass, ScreenDraw, ShaderFilter, Size,
    StreamCompositor, VideoFrame,
};
use image::RgbaImage;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    CreateMain(Size),
    CreateSurface(String),
    CreateOffscreen(Size),
    Release(String),
    InitComposition(Size),
    UpdateFrame(bool),
    DrawOffscreen {
        filters: Vec<String>,
        pass: OffscreenPass,
    },
    DrawScreen {
        target: String,
        draw: ScreenDraw,
    },
    ReadPixels(String, Size),
    Swap(String),
}

/// Shared log of every backend call plus switches for injecting failures.
#[derive(Clone, Default)]
pub struct Recorder {
    calls: Arc<Mutex<Vec<Call>>>,
    fail_main: Arc<AtomicBool>,
    fail_offscreen: Arc<AtomicBool>,
    broken_surfaces: Arc<Mutex<HashSet<String>>>,
}

impl Recorder {
    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn screen_draws(&self, target: &str) -> Vec<ScreenDraw> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::DrawScreen { target: name, draw } if name == target => Some(draw),
                _ => None,
            })
            .collect()
    }

    pub fn releases(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Release(name) => Some(name),
                _ => None,
            })
            .collect()
    }

    pub fn offscreen_filters(&self) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::DrawOffscreen { filters, .. } => Some(filters),
                _ => None,
            })
            .collect()
    }

    pub fn set_fail_main(&self, fail: bool) {
        self.fail_main.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_offscreen(&self, fail: bool) {
        self.fail_offscreen.store(fail, Ordering::SeqCst);
    }

    pub fn break_surface(&self, name: &str) {
        self.broken_surfaces.lock().unwrap().insert(name.to_owned());
    }
}

pub struct StubSurface(pub String);

impl StubSurface {
    pub fn named(name: &str) -> Self {
        Self(name.to_owned())
    }
}

pub struct StubTarget {
    name: String,
    /// Held only by the main target; dependents observe it weakly.
    device: Option<Arc<()>>,
    parent: Weak<()>,
}

impl StubTarget {
    fn alive(&self) -> Result<(), BackendError> {
        if self.device.is_some() || self.parent.upgrade().is_some() {
            Ok(())
        } else {
            Err(BackendError::Released)
        }
    }
}

pub struct StubBackend {
    recorder: Recorder,
    composition: Option<Size>,
}

impl StubBackend {
    pub fn new(recorder: Recorder) -> Self {
        Self {
            recorder,
            composition: None,
        }
    }
}

fn parent_of(main: &StubTarget) -> Weak<()> {
    main.device.as_ref().map(Arc::downgrade).unwrap_or_default()
}

impl GpuBackend for StubBackend {
    type Surface = StubSurface;
    type Target = StubTarget;

    fn create_main(&mut self, size: Size) -> Result<StubTarget, BackendError> {
        if self.recorder.fail_main.load(Ordering::SeqCst) {
            return Err(BackendError::Context("no device".into()));
        }
        self.recorder.record(Call::CreateMain(size));
        Ok(StubTarget {
            name: "main".into(),
            device: Some(Arc::new(())),
            parent: Weak::new(),
        })
    }

    fn create_surface_target(
        &mut self,
        main: &StubTarget,
        surface: StubSurface,
    ) -> Result<StubTarget, BackendError> {
        main.alive()?;
        if self.recorder.broken_surfaces.lock().unwrap().contains(&surface.0) {
            return Err(BackendError::Surface(format!("{} is broken", surface.0)));
        }
        self.recorder.record(Call::CreateSurface(surface.0.clone()));
        Ok(StubTarget {
            name: surface.0,
            device: None,
            parent: parent_of(main),
        })
    }

    fn create_offscreen_target(
        &mut self,
        main: &StubTarget,
        size: Size,
    ) -> Result<StubTarget, BackendError> {
        main.alive()?;
        if self.recorder.fail_offscreen.load(Ordering::SeqCst) {
            return Err(BackendError::Surface("no offscreen buffers".into()));
        }
        self.recorder.record(Call::CreateOffscreen(size));
        Ok(StubTarget {
            name: "photo".into(),
            device: None,
            parent: parent_of(main),
        })
    }

    fn release_target(&mut self, target: StubTarget) {
        if target.device.is_some() {
            self.composition = None;
        }
        self.recorder.record(Call::Release(target.name));
    }

    fn make_current(&mut self, target: &mut StubTarget) -> Result<(), BackendError> {
        target.alive()
    }

    fn swap_buffers(&mut self, target: &mut StubTarget) -> Result<(), BackendError> {
        target.alive()?;
        self.recorder.record(Call::Swap(target.name.clone()));
        Ok(())
    }

    fn init_composition(&mut self, main: &StubTarget, size: Size) -> Result<(), BackendError> {
        main.alive()?;
        self.composition = Some(size);
        self.recorder.record(Call::InitComposition(size));
        Ok(())
    }

    fn update_frame(&mut self, frame: Option<VideoFrame>) -> Result<(), BackendError> {
        self.recorder.record(Call::UpdateFrame(frame.is_some()));
        Ok(())
    }

    fn draw_offscreen(
        &mut self,
        filters: &[FilterHandle],
        pass: &OffscreenPass,
    ) -> Result<(), BackendError> {
        if self.composition.is_none() {
            return Err(BackendError::Uninitialised);
        }
        self.recorder.record(Call::DrawOffscreen {
            filters: filters.iter().map(|f| f.label().to_owned()).collect(),
            pass: *pass,
        });
        Ok(())
    }

    fn draw_screen(&mut self, target: &mut StubTarget, draw: &ScreenDraw) -> Result<(), BackendError> {
        target.alive()?;
        self.recorder.record(Call::DrawScreen {
            target: target.name.clone(),
            draw: *draw,
        });
        Ok(())
    }

    fn read_pixels(&mut self, target: &mut StubTarget, size: Size) -> Result<RgbaImage, BackendError> {
        target.alive()?;
        self.recorder.record(Call::ReadPixels(target.name.clone(), size));
        Ok(RgbaImage::new(size.width, size.height))
    }
}

pub fn stub_stream() -> (StreamCompositor<StubBackend>, Recorder) {
    let recorder = Recorder::default();
    let stream = StreamCompositor::new(StubBackend::new(recorder.clone()));
    (stream, recorder)
}

pub fn filter(label: &str) -> FilterHandle {
    FilterHandle::new(ShaderFilter::new(
        label,
        "fn apply_filter(color: vec4<f32>, uv: vec2<f32>) -> vec4<f32> { return color; }",
    ))
}

pub fn frame() -> VideoFrame {
    RgbaImage::new(4, 4)
}

/// Polls `condition` until it holds or `timeout` elapses.
pub fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}

/// Pushes one frame and waits until the worker has run the tick for it.
pub fn push_and_wait<B: GpuBackend>(stream: &StreamCompositor<B>) {
    push_frame_and_wait(stream, frame());
}

/// Pushes `image` and waits until the worker has run the tick for it.
pub fn push_frame_and_wait<B: GpuBackend>(stream: &StreamCompositor<B>, image: VideoFrame) {
    let before = stream.render_stats().ticks;
    stream.frame_input().push(image);
    assert!(
        wait_for(Duration::from_secs(10), || stream.render_stats().ticks > before),
        "draw tick did not run"
    );
}

pub const TIMEOUT: Duration = Duration::from_secs(2);
