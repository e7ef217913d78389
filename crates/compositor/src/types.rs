use std::fmt;
use std::str::FromStr;

/// Pixel dimensions of a frame, buffer, or render target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const ZERO: Size = Size {
        width: 0,
        height: 0,
    };

    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn is_portrait(&self) -> bool {
        self.height > self.width
    }

    /// Returns the same area with width and height exchanged.
    pub fn transposed(self) -> Self {
        Self {
            width: self.height,
            height: self.width,
        }
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Size {
    type Err = String;

    /// Parses `WIDTHxHEIGHT`, e.g. `1280x720`.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let (width, height) = raw
            .trim()
            .split_once(['x', 'X'])
            .ok_or_else(|| format!("invalid size '{raw}'; expected WIDTHxHEIGHT"))?;
        let width = width
            .trim()
            .parse::<u32>()
            .map_err(|err| format!("invalid width in '{raw}': {err}"))?;
        let height = height
            .trim()
            .parse::<u32>()
            .map_err(|err| format!("invalid height in '{raw}': {err}"))?;
        Ok(Self { width, height })
    }
}

/// Override for the device-sensed portrait/landscape detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrientationForced {
    /// Use whatever the UI collaborator last reported.
    #[default]
    None,
    Portrait,
    Landscape,
}

impl OrientationForced {
    pub(crate) fn to_raw(self) -> u8 {
        match self {
            OrientationForced::None => 0,
            OrientationForced::Portrait => 1,
            OrientationForced::Landscape => 2,
        }
    }

    pub(crate) fn from_raw(raw: u8) -> Self {
        match raw {
            1 => OrientationForced::Portrait,
            2 => OrientationForced::Landscape,
            _ => OrientationForced::None,
        }
    }
}

impl FromStr for OrientationForced {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "none" | "auto" | "sensor" => Ok(Self::None),
            "portrait" => Ok(Self::Portrait),
            "landscape" => Ok(Self::Landscape),
            other => Err(format!("invalid orientation '{other}'")),
        }
    }
}

/// How the composed frame is fitted into the preview destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AspectRatioMode {
    /// Letterbox: the whole frame is visible, bars fill the remainder.
    #[default]
    Adjust,
    /// Center crop: the destination is covered, overflow is cut off.
    Fill,
    /// Stretch the frame over the whole destination.
    None,
}

impl AspectRatioMode {
    pub(crate) fn to_raw(self) -> u8 {
        match self {
            AspectRatioMode::Adjust => 0,
            AspectRatioMode::Fill => 1,
            AspectRatioMode::None => 2,
        }
    }

    pub(crate) fn from_raw(raw: u8) -> Self {
        match raw {
            1 => AspectRatioMode::Fill,
            2 => AspectRatioMode::None,
            _ => AspectRatioMode::Adjust,
        }
    }
}

impl FromStr for AspectRatioMode {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "adjust" | "fit" | "letterbox" => Ok(Self::Adjust),
            "fill" | "crop" => Ok(Self::Fill),
            "none" | "stretch" => Ok(Self::None),
            other => Err(format!("invalid aspect ratio mode '{other}'")),
        }
    }
}

/// The render destinations fed by the compositor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Destination {
    /// Internal target owning the shared GPU context.
    Main,
    Encoder,
    Photo,
    Preview,
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::Main => f.write_str("main"),
            Destination::Encoder => f.write_str("encoder"),
            Destination::Photo => f.write_str("photo"),
            Destination::Preview => f.write_str("preview"),
        }
    }
}
