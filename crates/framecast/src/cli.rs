use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use compositor::gpu::PowerPreference;
use compositor::{AspectRatioMode, OrientationForced, Size};

#[derive(Parser, Debug)]
#[command(
    name = "framecast",
    author,
    version,
    about = "Stream frames through the GPU compositor",
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the compositor, feed frames for a while, then print statistics.
    Run(RunArgs),
    /// Inspect configuration files.
    Config(ConfigCommand),
    /// List built-in filter presets.
    Filters,
}

#[derive(Parser, Debug)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Validate a configuration file and print a summary.
    Check {
        #[arg(value_name = "FILE")]
        path: PathBuf,
    },
}

#[derive(Parser, Debug, Default)]
pub struct RunArgs {
    /// Session configuration (TOML); flags below override its values.
    #[arg(long, value_name = "FILE", env = "FRAMECAST_CONFIG")]
    pub config: Option<PathBuf>,

    /// Encoder resolution (e.g. `1280x720`).
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_size)]
    pub size: Option<Size>,

    /// Preview resolution; defaults to the encoder size.
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_size)]
    pub preview_size: Option<Size>,

    /// FPS cap for the encoder and preview (0=uncapped).
    #[arg(long, value_name = "FPS")]
    pub fps: Option<u32>,

    /// How long to stream before stopping (e.g. `5s`, `1500ms`).
    #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
    pub duration: Option<Duration>,

    /// Interval between pushed frames.
    #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
    pub frame_interval: Option<Duration>,

    /// Use a still image as the camera source instead of the synthetic pattern.
    #[arg(long, value_name = "PATH")]
    pub image: Option<PathBuf>,

    /// Append a preset filter to the chain; may be repeated.
    #[arg(long = "filter", value_name = "PRESET")]
    pub filters: Vec<String>,

    /// Capture one photo into this directory.
    #[arg(long, value_name = "DIR")]
    pub photo_dir: Option<PathBuf>,

    /// Force the layout orientation (`portrait`, `landscape`, `none`).
    #[arg(long, value_name = "MODE", value_parser = parse_orientation)]
    pub orientation: Option<OrientationForced>,

    /// Preview aspect handling (`adjust`, `fill`, `none`).
    #[arg(long, value_name = "MODE", value_parser = parse_aspect)]
    pub aspect: Option<AspectRatioMode>,

    /// Extra rotation for the preview, in degrees.
    #[arg(long, value_name = "DEGREES", allow_hyphen_values = true)]
    pub preview_rotation: Option<i32>,

    /// Rotation of the camera image, in degrees.
    #[arg(long, value_name = "DEGREES", allow_hyphen_values = true)]
    pub camera_rotation: Option<i32>,

    /// Enable the edge-smoothing pass.
    #[arg(long)]
    pub antialias: bool,

    /// Keep redrawing the last frame when the source stalls.
    #[arg(long)]
    pub force_render: bool,

    /// Encode black frames.
    #[arg(long)]
    pub mute: bool,

    /// GPU power preference: `low` or `high`.
    #[arg(long, value_name = "POWER", value_parser = parse_power)]
    pub gpu_power: Option<PowerPreference>,

    /// Use the software fallback adapter.
    #[arg(long)]
    pub fallback_adapter: bool,

    /// Write the last encoded frame to this PNG path.
    #[arg(long, value_name = "PATH")]
    pub save_last_frame: Option<PathBuf>,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_size(value: &str) -> Result<Size, String> {
    let size: Size = value.parse()?;
    if size.is_empty() {
        return Err(format!("size must be non-zero, got {size}"));
    }
    Ok(size)
}

pub fn parse_duration(value: &str) -> Result<Duration, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("duration must not be empty".to_string());
    }
    if let Ok(seconds) = trimmed.parse::<f64>() {
        if seconds.is_sign_negative() || !seconds.is_finite() {
            return Err(format!("invalid duration '{trimmed}'"));
        }
        return Ok(Duration::from_secs_f64(seconds));
    }
    humantime::parse_duration(trimmed).map_err(|err| format!("invalid duration '{trimmed}': {err}"))
}

pub fn parse_orientation(value: &str) -> Result<OrientationForced, String> {
    value.parse()
}

pub fn parse_aspect(value: &str) -> Result<AspectRatioMode, String> {
    value.parse()
}

pub fn parse_power(value: &str) -> Result<PowerPreference, String> {
    value.parse()
}
