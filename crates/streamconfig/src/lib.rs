//! Versioned TOML configuration for a compositing session.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use compositor::{AspectRatioMode, Flip, FrameSettings, OrientationForced, Size};
use serde::de::{self, Deserializer};
use serde::Deserialize;

pub const CURRENT_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StreamConfig {
    pub version: u32,
    #[serde(default)]
    pub encoder: EncoderConfig,
    #[serde(default)]
    pub preview: PreviewConfig,
    #[serde(default)]
    pub orientation: OrientationConfig,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub photo: Option<PhotoConfig>,
    #[serde(default)]
    pub filters: Vec<FilterSpec>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EncoderConfig {
    #[serde(default = "default_encoder_size", deserialize_with = "deserialize_parsed")]
    pub size: Size,
    /// Zero disables the frame rate limit.
    #[serde(default)]
    pub fps: u32,
    #[serde(default)]
    pub muted: bool,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            size: default_encoder_size(),
            fps: 0,
            muted: false,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PreviewConfig {
    /// Missing or zero dimensions fall back to the encoder size.
    #[serde(default, deserialize_with = "deserialize_parsed_opt")]
    pub size: Option<Size>,
    #[serde(default, deserialize_with = "deserialize_parsed_opt")]
    pub aspect: Option<AspectRatioMode>,
    #[serde(default)]
    pub rotation: i32,
    #[serde(default)]
    pub flip_horizontal: bool,
    #[serde(default)]
    pub flip_vertical: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrientationConfig {
    #[serde(default, deserialize_with = "deserialize_parsed_opt")]
    pub forced: Option<OrientationForced>,
    #[serde(default)]
    pub device_portrait: bool,
    #[serde(default)]
    pub stream_rotation: i32,
    #[serde(default)]
    pub camera_rotation: i32,
    #[serde(default)]
    pub stream_flip_horizontal: bool,
    #[serde(default)]
    pub stream_flip_vertical: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RenderConfig {
    #[serde(default)]
    pub antialias: bool,
    #[serde(default)]
    pub force_render: bool,
    /// `low` or `high`; interpreted by the GPU backend.
    #[serde(default)]
    pub gpu_power: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    #[default]
    Synthetic,
    Image,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    #[serde(default)]
    pub kind: SourceKind,
    /// Image file for [`SourceKind::Image`].
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(
        default = "default_frame_interval",
        deserialize_with = "deserialize_duration"
    )]
    pub frame_interval: Duration,
    #[serde(
        default = "default_run_duration",
        deserialize_with = "deserialize_duration"
    )]
    pub duration: Duration,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::Synthetic,
            path: None,
            frame_interval: default_frame_interval(),
            duration: default_run_duration(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PhotoConfig {
    pub directory: PathBuf,
    /// Delay after the first frame before the photo is requested.
    #[serde(default, deserialize_with = "deserialize_duration_opt")]
    pub after: Option<Duration>,
}

/// One entry of the initial filter chain: a named preset or WGSL code.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterSpec {
    #[serde(default)]
    pub preset: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    /// Path to a WGSL file defining `apply_filter`.
    #[serde(default)]
    pub shader: Option<PathBuf>,
    /// Inline WGSL defining `apply_filter`.
    #[serde(default)]
    pub wgsl: Option<String>,
}

impl FilterSpec {
    pub fn display_name(&self) -> &str {
        self.label
            .as_deref()
            .or(self.preset.as_deref())
            .unwrap_or("custom")
    }
}

fn default_encoder_size() -> Size {
    FrameSettings::default().encoder_size
}

fn default_frame_interval() -> Duration {
    Duration::from_millis(33)
}

fn default_run_duration() -> Duration {
    Duration::from_secs(2)
}

fn deserialize_parsed<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: fmt::Display,
{
    let raw = String::deserialize(deserializer)?;
    raw.parse().map_err(de::Error::custom)
}

fn deserialize_parsed_opt<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: fmt::Display,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    raw.map(|raw| raw.parse().map_err(de::Error::custom))
        .transpose()
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    deserialize_duration_opt(deserializer)?
        .ok_or_else(|| de::Error::custom("duration may not be empty"))
}

fn deserialize_duration_opt<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Option<Duration>;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a duration as number of seconds or human-readable string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(v)
                .map(Some)
                .map_err(|err| E::custom(format!("invalid duration '{v}': {err}")))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v < 0 {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Some(Duration::from_secs(v as u64)))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(Duration::from_secs(v)))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v.is_nan() || v.is_sign_negative() {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Some(Duration::from_secs_f64(v)))
        }

        fn visit_none<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }
    }

    deserializer.deserialize_any(Visitor)
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            encoder: EncoderConfig::default(),
            preview: PreviewConfig::default(),
            orientation: OrientationConfig::default(),
            render: RenderConfig::default(),
            source: SourceConfig::default(),
            photo: None,
            filters: Vec::new(),
        }
    }
}

impl StreamConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: StreamConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Compositor settings described by this configuration.
    pub fn frame_settings(&self) -> FrameSettings {
        let defaults = FrameSettings::default();
        FrameSettings {
            encoder_size: self.encoder.size,
            preview_size: self.preview.size.unwrap_or(Size::ZERO),
            fps: self.encoder.fps,
            muted: self.encoder.muted,
            forced_orientation: self.orientation.forced.unwrap_or_default(),
            sensed_portrait: self.orientation.device_portrait,
            stream_rotation: compositor::orientation::normalize_rotation(
                self.orientation.stream_rotation,
            ),
            preview_rotation: compositor::orientation::normalize_rotation(self.preview.rotation),
            camera_rotation: compositor::orientation::normalize_rotation(
                self.orientation.camera_rotation,
            ),
            stream_flip: Flip {
                horizontal: self.orientation.stream_flip_horizontal,
                vertical: self.orientation.stream_flip_vertical,
            },
            preview_flip: Flip {
                horizontal: self.preview.flip_horizontal,
                vertical: self.preview.flip_vertical,
            },
            aspect_ratio: self.preview.aspect.unwrap_or(defaults.aspect_ratio),
            antialiasing: self.render.antialias,
            force_render: self.render.force_render,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != CURRENT_VERSION {
            return Err(ConfigError::Invalid(format!(
                "unsupported config version {}; expected {CURRENT_VERSION}",
                self.version
            )));
        }

        if self.encoder.size.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "encoder.size must be non-zero, got {}",
                self.encoder.size
            )));
        }

        for (name, degrees) in [
            ("preview.rotation", self.preview.rotation),
            ("orientation.stream_rotation", self.orientation.stream_rotation),
            ("orientation.camera_rotation", self.orientation.camera_rotation),
        ] {
            if degrees % 90 != 0 {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be a multiple of 90, got {degrees}"
                )));
            }
        }

        if let Some(power) = &self.render.gpu_power {
            if !matches!(power.trim().to_ascii_lowercase().as_str(), "low" | "high") {
                return Err(ConfigError::Invalid(format!(
                    "render.gpu_power must be 'low' or 'high', got '{power}'"
                )));
            }
        }

        if self.source.frame_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "source.frame_interval must be greater than zero".into(),
            ));
        }

        if self.source.kind == SourceKind::Image && self.source.path.is_none() {
            return Err(ConfigError::Invalid(
                "source.path is required when source.kind = \"image\"".into(),
            ));
        }

        if let Some(photo) = &self.photo {
            if photo.directory.as_os_str().is_empty() {
                return Err(ConfigError::Invalid("photo.directory may not be empty".into()));
            }
        }

        for (index, filter) in self.filters.iter().enumerate() {
            let sources = [
                filter.preset.is_some(),
                filter.shader.is_some(),
                filter.wgsl.is_some(),
            ]
            .into_iter()
            .filter(|set| *set)
            .count();
            if sources != 1 {
                return Err(ConfigError::Invalid(format!(
                    "filters[{index}] must set exactly one of preset, shader or wgsl"
                )));
            }
            if let Some(preset) = &filter.preset {
                if preset.trim().is_empty() {
                    return Err(ConfigError::Invalid(format!(
                        "filters[{index}] has an empty preset name"
                    )));
                }
            }
        }

        Ok(())
    }
}
