//! Reel Player - Main Entry Point
//!
//! Opens the input, builds the frame queue and hands both to the window
//! event loop, which starts the decode and presentation threads.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use winit::event_loop::EventLoop;

use reel_player::cli::CliArgs;
use reel_player::telemetry::{init_logging, Heartbeat, LogConfig, PlaybackStats};
use reel_player::{FrameQueue, FrameSource, PlayerApp, PlayerEvent, PlayerSettings};

fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    let mut settings = match &args.config {
        Some(path) => PlayerSettings::load_from_file(path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?,
        None => PlayerSettings::load(),
    };
    args.apply_to(&mut settings);
    settings.sanitize();

    let log_config = LogConfig {
        console_enabled: true,
        file_path: args.log_file.clone(),
        json_format: args.log_json,
        default_level: settings.log_level.clone(),
    };
    // Keep the guard alive for the program duration
    let _log_guard = match init_logging(&log_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            None
        }
    };

    let input = args
        .input()
        .cloned()
        .context("no input file given; pass --input <PATH>")?;
    if let Some(output) = &args.output {
        tracing::info!(output = %output.display(), "Output path is not used by the player");
    }
    if args.method != 0 {
        tracing::info!(method = args.method, "Read method selector is not used by the player");
    }

    let stats = Arc::new(PlaybackStats::new());
    let _heartbeat = if settings.heartbeat_seconds > 0 {
        let interval = Duration::from_secs(settings.heartbeat_seconds);
        Some(Heartbeat::start(Arc::clone(&stats), interval).context("failed to start heartbeat")?)
    } else {
        None
    };

    let mut source = FrameSource::open(&input, settings.playback_options())
        .with_context(|| format!("failed to open {}", input.display()))?;
    if let Some(scale) = &settings.scale {
        source.set_scale_size(scale)?;
    }

    let (sender, receiver) = FrameQueue::bounded(settings.queue_capacity);
    tracing::debug!(capacity = sender.capacity(), "Created frame queue");
    source.set_frame_sink(sender)?;

    let info = source.info();
    tracing::info!(
        path = %input.display(),
        codec = %info.codec_name,
        width = info.width,
        height = info.height,
        fps = info.frame_rate,
        duration_ms = info.duration_us / 1000,
        "Opened media"
    );

    let event_loop = EventLoop::<PlayerEvent>::with_user_event()
        .build()
        .context("failed to create event loop")?;
    let mut app = PlayerApp::new(settings, source, receiver, stats, event_loop.create_proxy());
    event_loop.run_app(&mut app)?;

    app.into_result()
}
