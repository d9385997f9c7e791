//! Reel Player Library
//!
//! A windowed video player: a decoder thread fills a bounded frame queue,
//! a presenter thread paces frames by timestamp and draws them with wgpu.

pub mod app;
pub mod cli;
pub mod display;
pub mod event;
pub mod present;
pub mod settings;
pub mod shaders;
pub mod telemetry;
pub mod video;

#[cfg(test)]
mod test_support;

pub use app::PlayerApp;
pub use display::{DisplayError, DisplaySurface, GpuDisplay, ResizeNotifier, SurfaceManager, SurfaceSize};
pub use event::{PlayerEvent, ProxyNotifier};
pub use present::{Pacer, PresentError, PresentSummary, PresentationLoop, PresenterHandle, PresenterThread};
pub use settings::{PlayerSettings, SettingsError};
pub use video::{DecodedFrame, FrameQueue, FrameSource, MediaDecoder, PlaybackOptions, PlaybackState, QueueItem};
