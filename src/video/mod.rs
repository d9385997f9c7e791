//! Video decoding, frame transport and GPU upload
//!
//! `FrameSource` decodes on a producer thread and pushes `DecodedFrame`s into
//! a bounded `FrameQueue`. The GPU side keeps one texture per YUV plane and a
//! renderer that converts to RGB while drawing.

pub mod decoder;
#[cfg(feature = "ffmpeg")]
pub mod ffmpeg;
mod frame;
pub mod queue;
mod renderer;
pub mod size;
pub mod source;
mod texture;
pub mod timebase;

pub use decoder::{Decoded, DecoderError, MediaDecoder, OpenError, Step, StreamInfo};
#[cfg(feature = "ffmpeg")]
pub use ffmpeg::FfmpegDecoder;
pub use frame::{DecodedFrame, PLANE_U, PLANE_V, PLANE_Y};
pub use queue::{FrameQueue, FrameReceiver, FrameSender, PopError, QueueClosed, QueueItem, DEFAULT_QUEUE_CAPACITY};
pub use renderer::{VideoParams, YuvRenderer};
pub use size::{parse_video_size, ScaleConfigError, ScaleTarget};
pub use source::{
    CallbackSink, FrameSink, FrameSource, Lifecycle, PlaybackHandle, PlaybackOptions, PlaybackState, RunOutcome,
    RunSummary, SourceError, SourceThread,
};
pub use texture::YuvTexture;
pub use timebase::{rescale_q, Rational, MICROSECONDS};
