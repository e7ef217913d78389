use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use compositor::gpu::{GpuOptions, PowerPreference, WgpuBackend, WgpuSurface};
use compositor::{FilterHandle, RenderStats, ShaderFilter, StreamCompositor, VideoFrame};
use image::RgbaImage;
use streamconfig::{FilterSpec, SourceKind, StreamConfig};
use tracing_subscriber::EnvFilter;

use crate::cli::RunArgs;
use crate::presets;
use crate::source::FrameSource;

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Loads the configured session and applies command-line overrides.
pub fn resolve_config(args: &RunArgs) -> Result<StreamConfig> {
    let mut config = match &args.config {
        Some(path) => StreamConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => StreamConfig::default(),
    };

    if let Some(size) = args.size {
        config.encoder.size = size;
    }
    if let Some(fps) = args.fps {
        config.encoder.fps = fps;
    }
    config.encoder.muted |= args.mute;
    if let Some(size) = args.preview_size {
        config.preview.size = Some(size);
    }
    if let Some(aspect) = args.aspect {
        config.preview.aspect = Some(aspect);
    }
    if let Some(rotation) = args.preview_rotation {
        config.preview.rotation = rotation;
    }
    if let Some(forced) = args.orientation {
        config.orientation.forced = Some(forced);
    }
    if let Some(rotation) = args.camera_rotation {
        config.orientation.camera_rotation = rotation;
    }
    config.render.antialias |= args.antialias;
    config.render.force_render |= args.force_render;
    if let Some(duration) = args.duration {
        config.source.duration = duration;
    }
    if let Some(interval) = args.frame_interval {
        config.source.frame_interval = interval;
    }
    if let Some(path) = &args.image {
        config.source.kind = SourceKind::Image;
        config.source.path = Some(path.clone());
    }
    if let Some(directory) = &args.photo_dir {
        let after = config.photo.as_ref().and_then(|photo| photo.after);
        config.photo = Some(streamconfig::PhotoConfig {
            directory: directory.clone(),
            after,
        });
    }
    config.filters.extend(args.filters.iter().map(|name| FilterSpec {
        preset: Some(name.clone()),
        ..FilterSpec::default()
    }));

    config.validate().context("invalid session settings")?;
    Ok(config)
}

pub fn build_filter(spec: &FilterSpec) -> Result<FilterHandle> {
    if let Some(name) = &spec.preset {
        let preset = presets::find(name).ok_or_else(|| {
            anyhow!(
                "unknown filter preset '{name}'; available: {}",
                presets::names().join(", ")
            )
        })?;
        return Ok(preset.handle());
    }
    let label = spec.display_name().to_owned();
    if let Some(path) = &spec.shader {
        let source = fs::read_to_string(path)
            .with_context(|| format!("failed to read filter shader {}", path.display()))?;
        return Ok(FilterHandle::new(ShaderFilter::new(label, source)));
    }
    if let Some(source) = &spec.wgsl {
        return Ok(FilterHandle::new(ShaderFilter::new(label, source.clone())));
    }
    bail!("filter '{label}' has no source")
}

fn gpu_options(config: &StreamConfig, args: &RunArgs) -> Result<GpuOptions> {
    let power = match (args.gpu_power, &config.render.gpu_power) {
        (Some(power), _) => power,
        (None, Some(raw)) => raw
            .parse::<PowerPreference>()
            .map_err(|err| anyhow!(err))
            .context("invalid render.gpu_power")?,
        (None, None) => PowerPreference::default(),
    };
    Ok(GpuOptions {
        power,
        force_fallback_adapter: args.fallback_adapter,
    })
}

/// Counts presented frames and optionally keeps the latest one.
#[derive(Clone, Default)]
struct SinkProbe {
    frames: Arc<AtomicU64>,
    last: Option<Arc<Mutex<Option<RgbaImage>>>>,
}

impl SinkProbe {
    fn keeping_last() -> Self {
        Self {
            frames: Arc::default(),
            last: Some(Arc::default()),
        }
    }

    fn surface(&self) -> WgpuSurface {
        let probe = self.clone();
        WgpuSurface::sink(move |frame: RgbaImage| {
            probe.frames.fetch_add(1, Ordering::Relaxed);
            if let Some(last) = &probe.last {
                *last.lock().unwrap_or_else(PoisonError::into_inner) = Some(frame);
            }
        })
    }

    fn count(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    fn take_last(&self) -> Option<RgbaImage> {
        self.last
            .as_ref()
            .and_then(|last| last.lock().unwrap_or_else(PoisonError::into_inner).take())
    }
}

pub fn run(args: RunArgs) -> Result<()> {
    let config = resolve_config(&args)?;
    let filters = config
        .filters
        .iter()
        .map(build_filter)
        .collect::<Result<Vec<_>>>()?;
    let mut source = match config.source.kind {
        SourceKind::Synthetic => FrameSource::synthetic(config.encoder.size),
        SourceKind::Image => {
            let path = config
                .source
                .path
                .as_deref()
                .ok_or_else(|| anyhow!("image source requires a path"))?;
            FrameSource::image(path)?
        }
    };

    let settings = config.frame_settings();
    tracing::info!(
        encoder = %settings.encoder_size,
        preview = %settings.effective_preview_size(),
        fps = settings.fps,
        filters = filters.len(),
        duration = %humantime::format_duration(config.source.duration),
        "starting compositor"
    );

    let backend = WgpuBackend::new(gpu_options(&config, &args)?);
    let stream = StreamCompositor::with_settings(backend, settings);
    stream.start().context("failed to start compositor")?;

    let encoder = if args.save_last_frame.is_some() {
        SinkProbe::keeping_last()
    } else {
        SinkProbe::default()
    };
    let preview = SinkProbe::default();
    stream.add_encoder_surface(encoder.surface());
    stream.attach_preview(preview.surface());
    for filter in filters {
        stream.add_filter(filter);
    }

    let photo_slot: Arc<Mutex<Option<RgbaImage>>> = Arc::default();
    let mut photo_after = config
        .photo
        .as_ref()
        .map(|photo| photo.after.unwrap_or_default());

    let input = stream.frame_input();
    let started = Instant::now();
    let mut pushed = 0u64;
    while started.elapsed() < config.source.duration {
        input.push(source.next_frame());
        pushed += 1;
        if photo_after.is_some_and(|after| started.elapsed() >= after) {
            photo_after = None;
            let slot = Arc::clone(&photo_slot);
            stream.request_photo(move |image| {
                *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(image);
            });
            tracing::info!("photo requested");
        }
        thread::sleep(config.source.frame_interval);
    }
    // Let the worker catch up with the last frame.
    thread::sleep(config.source.frame_interval.min(Duration::from_millis(100)));
    stream.stop();

    let stats = stream.render_stats();
    print_stats(&stats, pushed, encoder.count(), preview.count(), started.elapsed());

    if let Some(photo) = &config.photo {
        match photo_slot.lock().unwrap_or_else(PoisonError::into_inner).take() {
            Some(image) => {
                let path = save_photo(&photo.directory, &image)?;
                println!("Photo saved to {}", path.display());
            }
            None => tracing::warn!("photo was requested but never captured"),
        }
    }

    if let Some(path) = &args.save_last_frame {
        let frame = encoder
            .take_last()
            .ok_or_else(|| anyhow!("the encoder received no frames"))?;
        write_png(path, &frame)?;
        println!("Last encoder frame saved to {}", path.display());
    }

    Ok(())
}

fn print_stats(stats: &RenderStats, pushed: u64, encoded: u64, previewed: u64, elapsed: Duration) {
    let seconds = elapsed.as_secs_f64().max(f64::EPSILON);
    println!("Streamed for {}", humantime::format_duration(round_millis(elapsed)));
    println!("  frames pushed:   {pushed}");
    println!("  draw ticks:      {}", stats.ticks);
    println!("  limited ticks:   {}", stats.limited_ticks);
    println!(
        "  encoder frames:  {} ({:.1} fps, {} delivered)",
        stats.encoder_frames,
        stats.encoder_frames as f64 / seconds,
        encoded
    );
    println!(
        "  preview frames:  {} ({previewed} delivered)",
        stats.preview_frames
    );
    println!("  photos:          {}", stats.photo_frames);
}

fn round_millis(duration: Duration) -> Duration {
    Duration::from_millis(duration.as_millis() as u64)
}

fn save_photo(directory: &Path, image: &RgbaImage) -> Result<PathBuf> {
    fs::create_dir_all(directory)
        .with_context(|| format!("failed to create photo directory {}", directory.display()))?;
    let name = chrono::Local::now()
        .format("photo-%Y%m%d-%H%M%S%.3f.png")
        .to_string();
    let path = directory.join(name);
    write_png(&path, image)?;
    Ok(path)
}

fn write_png(path: &Path, image: &VideoFrame) -> Result<()> {
    image
        .save_with_format(path, image::ImageFormat::Png)
        .with_context(|| format!("failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use compositor::Size;

    #[test]
    fn flags_override_config_values() {
        let args = RunArgs {
            size: Some(Size::new(320, 240)),
            fps: Some(15),
            filters: vec!["sepia".into()],
            antialias: true,
            ..RunArgs::default()
        };
        let config = resolve_config(&args).expect("resolve");
        assert_eq!(config.encoder.size, Size::new(320, 240));
        assert_eq!(config.encoder.fps, 15);
        assert!(config.render.antialias);
        assert_eq!(config.filters.len(), 1);
    }

    #[test]
    fn invalid_override_is_rejected() {
        let args = RunArgs {
            preview_rotation: Some(45),
            ..RunArgs::default()
        };
        assert!(resolve_config(&args).is_err());
    }

    #[test]
    fn builds_preset_and_inline_filters() {
        let preset = FilterSpec {
            preset: Some("invert".into()),
            ..FilterSpec::default()
        };
        assert_eq!(build_filter(&preset).unwrap().label(), "invert");

        let inline = FilterSpec {
            label: Some("passthrough".into()),
            wgsl: Some("fn apply_filter(color: vec4<f32>, uv: vec2<f32>) -> vec4<f32> { return color; }".into()),
            ..FilterSpec::default()
        };
        let handle = build_filter(&inline).unwrap();
        assert_eq!(handle.label(), "passthrough");
        assert!(handle.shader_source().contains("apply_filter"));

        let unknown = FilterSpec {
            preset: Some("bloom".into()),
            ..FilterSpec::default()
        };
        let err = build_filter(&unknown).unwrap_err();
        assert!(err.to_string().contains("grayscale"));
    }

    #[test]
    fn saves_photo_with_timestamped_name() {
        let dir = tempfile::tempdir().expect("tempdir");
        let image = RgbaImage::new(8, 4);
        let path = save_photo(&dir.path().join("shots"), &image).expect("save");
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        assert!(name.starts_with("photo-") && name.ends_with(".png"));
        let decoded = image::open(&path).expect("decode").to_rgba8();
        assert_eq!(decoded.dimensions(), (8, 4));
    }
}
