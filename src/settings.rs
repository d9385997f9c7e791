//! Player settings
//!
//! Loaded from an XML file (`--config` or the per-user config directory) and
//! then overridden by command-line flags.

use quick_xml::de::from_str;
use quick_xml::se::to_string;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::video::{PlaybackOptions, DEFAULT_QUEUE_CAPACITY};

/// Settings stored in `settings.xml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename = "ReelPlayerSettings")]
pub struct PlayerSettings {
    /// Initial window width before the first frame arrives
    #[serde(rename = "windowWidth", default = "default_window_width")]
    pub window_width: u32,

    /// Initial window height before the first frame arrives
    #[serde(rename = "windowHeight", default = "default_window_height")]
    pub window_height: u32,

    /// Frames buffered between decoder and presenter
    #[serde(rename = "queueCapacity", default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Rewind to the start at end of stream
    #[serde(rename = "loop", default = "default_true")]
    pub looping: bool,

    /// Start playing as soon as the window opens
    #[serde(rename = "autoplay", default = "default_true")]
    pub autoplay: bool,

    /// Show the first frame when starting paused
    #[serde(rename = "initialFrame", default)]
    pub initial_frame: bool,

    /// Print container details when a file is opened
    #[serde(rename = "dumpFormat", default)]
    pub dump_format: bool,

    /// Output size such as `1280x720` or `hd720`
    #[serde(rename = "scale", default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<String>,

    /// Default log filter
    #[serde(rename = "logLevel", default = "default_log_level")]
    pub log_level: String,

    /// Seconds between heartbeat lines; 0 disables the heartbeat
    #[serde(rename = "heartbeatSeconds", default = "default_heartbeat_seconds")]
    pub heartbeat_seconds: u64,
}

fn default_window_width() -> u32 {
    800
}

fn default_window_height() -> u32 {
    600
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_heartbeat_seconds() -> u64 {
    1
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            window_width: default_window_width(),
            window_height: default_window_height(),
            queue_capacity: default_queue_capacity(),
            looping: true,
            autoplay: true,
            initial_frame: false,
            dump_format: false,
            scale: None,
            log_level: default_log_level(),
            heartbeat_seconds: default_heartbeat_seconds(),
        }
    }
}

impl PlayerSettings {
    /// Per-user settings file, if a config directory exists
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|mut p| {
            p.push("ReelPlayer");
            p.push("settings.xml");
            p
        })
    }

    /// Load from the per-user file, falling back to defaults
    pub fn load() -> Self {
        let Some(path) = Self::default_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }

        match Self::load_from_file(&path) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable settings");
                Self::default()
            }
        }
    }

    pub fn load_from_file(path: &Path) -> Result<Self, SettingsError> {
        let contents = fs::read_to_string(path).map_err(SettingsError::Io)?;
        let mut settings: Self = from_str(&contents).map_err(SettingsError::XmlParse)?;
        settings.sanitize();
        Ok(settings)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(SettingsError::Io)?;
        }

        let xml = to_string(self).map_err(SettingsError::XmlWrite)?;
        let formatted = format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{}", xml);

        fs::write(path, formatted).map_err(SettingsError::Io)?;
        Ok(())
    }

    /// Clamp values that would stall or break the pipeline
    pub fn sanitize(&mut self) {
        self.window_width = self.window_width.max(1);
        self.window_height = self.window_height.max(1);
        self.queue_capacity = self.queue_capacity.max(1);
    }

    pub fn playback_options(&self) -> PlaybackOptions {
        PlaybackOptions {
            looping: self.looping,
            autoplay: self.autoplay,
            initial: self.initial_frame,
            dump_format: self.dump_format,
        }
    }
}

/// Settings-related errors
#[derive(Debug)]
pub enum SettingsError {
    Io(std::io::Error),
    XmlParse(quick_xml::DeError),
    XmlWrite(quick_xml::SeError),
}

impl std::fmt::Display for SettingsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SettingsError::Io(e) => write!(f, "IO error: {}", e),
            SettingsError::XmlParse(e) => write!(f, "XML parse error: {}", e),
            SettingsError::XmlWrite(e) => write!(f, "XML write error: {}", e),
        }
    }
}

impl std::error::Error for SettingsError {}
