use std::path::PathBuf;

use clap::Parser;

use crate::settings::PlayerSettings;

#[derive(Debug, Parser)]
#[command(
    name = "reel-player",
    version,
    about = "Play a video file in a window",
    disable_help_subcommand = true
)]
pub struct CliArgs {
    /// Input media file
    #[arg(short = 'i', long = "input", value_name = "PATH")]
    pub input_flag: Option<PathBuf>,

    /// Input media file (positional form of --input)
    #[arg(value_name = "INPUT", conflicts_with = "input_flag")]
    pub input_positional: Option<PathBuf>,

    /// Output path (accepted for compatibility, currently unused)
    #[arg(short = 'o', long = "output", value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Read method selector: 0 normal, 1 memory mapped (currently unused)
    #[arg(short = 'm', long = "method", default_value_t = 0)]
    pub method: u8,

    /// Scale output frames, e.g. 1280x720 or hd720
    #[arg(short = 's', long = "scale", value_name = "WxH|NAME")]
    pub scale: Option<String>,

    /// Stop at end of stream instead of looping
    #[arg(long = "no-loop")]
    pub no_loop: bool,

    /// Open paused, showing the first frame
    #[arg(long = "paused")]
    pub paused: bool,

    /// Frame queue capacity before the decoder blocks
    #[arg(long = "queue-capacity", value_parser = parse_positive_usize)]
    pub queue_capacity: Option<usize>,

    /// Settings file (defaults to the per-user settings.xml)
    #[arg(long = "config", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Also write logs to this file
    #[arg(long = "log-file", value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Emit JSON logs on the console
    #[arg(long = "log-json")]
    pub log_json: bool,
}

impl CliArgs {
    /// Input path from either the flag or the positional argument
    pub fn input(&self) -> Option<&PathBuf> {
        self.input_flag.as_ref().or(self.input_positional.as_ref())
    }

    /// Override file settings with the flags that were given
    pub fn apply_to(&self, settings: &mut PlayerSettings) {
        if let Some(scale) = &self.scale {
            settings.scale = Some(scale.clone());
        }
        if self.no_loop {
            settings.looping = false;
        }
        if self.paused {
            settings.autoplay = false;
            settings.initial_frame = true;
        }
        if let Some(capacity) = self.queue_capacity {
            settings.queue_capacity = capacity;
        }
    }
}

fn parse_positive_usize(value: &str) -> Result<usize, String> {
    let parsed = value
        .parse::<usize>()
        .map_err(|_| format!("'{value}' is not a valid number"))?;
    if parsed == 0 {
        return Err("value must be at least 1".to_string());
    }
    Ok(parsed)
}
