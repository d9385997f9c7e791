//! Output size parsing for the scale option
//!
//! Accepts `WIDTHxHEIGHT` (e.g. `1280x720`) or one of the standard named
//! sizes understood by FFmpeg's size parser (`hd720`, `vga`, `ntsc`, ...).

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Errors from scale configuration
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScaleConfigError {
    #[error("invalid video size '{0}': expected WIDTHxHEIGHT or a size name such as hd720")]
    Unparseable(String),
    #[error("video size {width}x{height} has a zero dimension")]
    ZeroDimension { width: u32, height: u32 },
    #[error("scaler could not be configured: {0}")]
    Backend(String),
}

/// Target geometry every decoded frame is scaled to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScaleTarget {
    pub width: u32,
    pub height: u32,
}

impl ScaleTarget {
    pub fn new(width: u32, height: u32) -> Result<Self, ScaleConfigError> {
        if width == 0 || height == 0 {
            return Err(ScaleConfigError::ZeroDimension { width, height });
        }
        Ok(Self { width, height })
    }
}

impl fmt::Display for ScaleTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for ScaleTarget {
    type Err = ScaleConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_video_size(s)
    }
}

const NAMED_SIZES: &[(&str, u32, u32)] = &[
    ("ntsc", 720, 480),
    ("pal", 720, 576),
    ("qntsc", 352, 240),
    ("qpal", 352, 288),
    ("sntsc", 640, 480),
    ("spal", 768, 576),
    ("film", 352, 240),
    ("ntsc-film", 352, 240),
    ("sqcif", 128, 96),
    ("qcif", 176, 144),
    ("cif", 352, 288),
    ("4cif", 704, 576),
    ("16cif", 1408, 1152),
    ("qqvga", 160, 120),
    ("qvga", 320, 240),
    ("vga", 640, 480),
    ("svga", 800, 600),
    ("xga", 1024, 768),
    ("uxga", 1600, 1200),
    ("qxga", 2048, 1536),
    ("sxga", 1280, 1024),
    ("qsxga", 2560, 2048),
    ("hsxga", 5120, 4096),
    ("wvga", 852, 480),
    ("wxga", 1366, 768),
    ("wsxga", 1600, 1024),
    ("wuxga", 1920, 1200),
    ("woxga", 2560, 1600),
    ("wqsxga", 3200, 2048),
    ("wquxga", 3840, 2400),
    ("whsxga", 6400, 4096),
    ("whuxga", 7680, 4800),
    ("cga", 320, 200),
    ("ega", 640, 350),
    ("hd480", 852, 480),
    ("hd720", 1280, 720),
    ("hd1080", 1920, 1080),
    ("2k", 2048, 1080),
    ("2kflat", 1998, 1080),
    ("2kscope", 2048, 858),
    ("4k", 4096, 2160),
    ("4kflat", 3996, 2160),
    ("4kscope", 4096, 1716),
    ("nhd", 640, 360),
    ("hqvga", 240, 160),
    ("wqvga", 400, 240),
    ("fwqvga", 432, 240),
    ("hvga", 480, 320),
    ("qhd", 960, 540),
    ("2kdci", 2048, 1080),
    ("4kdci", 4096, 2160),
    ("uhd2160", 3840, 2160),
    ("uhd4320", 7680, 4320),
];

/// Parse a size string into a scale target
pub fn parse_video_size(s: &str) -> Result<ScaleTarget, ScaleConfigError> {
    if let Some(&(_, width, height)) = NAMED_SIZES.iter().find(|(name, _, _)| *name == s) {
        return Ok(ScaleTarget { width, height });
    }

    let unparseable = || ScaleConfigError::Unparseable(s.to_string());

    let (w, h) = s.split_once('x').ok_or_else(unparseable)?;
    let width: u32 = w.parse().map_err(|_| unparseable())?;
    let height: u32 = h.parse().map_err(|_| unparseable())?;

    ScaleTarget::new(width, height)
}
