mod cli;
mod presets;
mod run;
mod source;

use std::path::Path;

use anyhow::{Context, Result};
use cli::{Command, ConfigAction};
use streamconfig::{SourceKind, StreamConfig};

fn main() -> Result<()> {
    let cli = cli::parse();
    run::initialise_tracing();

    match cli.command {
        Command::Run(args) => run::run(args),
        Command::Config(config) => match config.action {
            ConfigAction::Check { path } => run_config_check(&path),
        },
        Command::Filters => {
            run_filters_list();
            Ok(())
        }
    }
}

fn run_config_check(path: &Path) -> Result<()> {
    let config = StreamConfig::load(path)
        .with_context(|| format!("{} is not a valid configuration", path.display()))?;
    for spec in &config.filters {
        run::build_filter(spec)
            .with_context(|| format!("filter '{}' cannot be loaded", spec.display_name()))?;
    }
    let settings = config.frame_settings();

    println!("{} is valid (version {})", path.display(), config.version);
    println!(
        "  encoder:     {} fps={} muted={}",
        settings.encoder_size,
        if settings.fps == 0 {
            "unlimited".to_string()
        } else {
            settings.fps.to_string()
        },
        settings.muted
    );
    println!(
        "  preview:     {} aspect={:?} rotation={}",
        settings.effective_preview_size(),
        settings.aspect_ratio,
        settings.preview_rotation
    );
    println!(
        "  orientation: forced={:?} camera_rotation={} stream_rotation={}",
        settings.forced_orientation, settings.camera_rotation, settings.stream_rotation
    );
    println!(
        "  render:      antialias={} force_render={}",
        settings.antialiasing, settings.force_render
    );
    match config.source.kind {
        SourceKind::Synthetic => println!(
            "  source:      synthetic every {}",
            humantime::format_duration(config.source.frame_interval)
        ),
        SourceKind::Image => println!(
            "  source:      image {}",
            config
                .source
                .path
                .as_deref()
                .map(|path| path.display().to_string())
                .unwrap_or_default()
        ),
    }
    if let Some(photo) = &config.photo {
        println!("  photo:       {}", photo.directory.display());
    }
    if config.filters.is_empty() {
        println!("  filters:     (none)");
    } else {
        let names: Vec<_> = config.filters.iter().map(|spec| spec.display_name()).collect();
        println!("  filters:     {}", names.join(" -> "));
    }
    Ok(())
}

fn run_filters_list() {
    println!("Built-in filter presets:");
    for preset in presets::PRESETS {
        println!("  {:<10} {}", preset.name, preset.description);
    }
}
