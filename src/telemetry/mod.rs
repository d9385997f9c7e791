//! Telemetry and logging infrastructure
//!
//! Structured logging with tracing, playback counters and the heartbeat ticker.

pub mod heartbeat;
pub mod logging;
pub mod metrics;

pub use heartbeat::Heartbeat;
pub use logging::{init_logging, LogConfig, LogGuard, LoggingError};
pub use metrics::{FrameStats, PlaybackStats, PresentTimer, StatsSnapshot};
