//! Decoder abstraction used by the frame source
//!
//! A `MediaDecoder` wraps a demuxer and a video decoder. The frame source
//! drives it one encoded unit at a time: read a unit, hand video units to the
//! decoder, then drain every frame the decoder has ready.

use std::path::PathBuf;

use thiserror::Error;

use super::size::{ScaleConfigError, ScaleTarget};
use super::timebase::Rational;
use super::DecodedFrame;

/// Outcome of a non-blocking read or receive
#[derive(Debug)]
pub enum Step<T> {
    /// A unit or frame is available
    Ready(T),
    /// Nothing available yet; try again
    RetryLater,
    /// The stream (or decoder) is exhausted
    EndOfStream,
}

/// A frame fresh out of the decoder
///
/// `frame.pts` is not meaningful yet; the frame source derives it from
/// `timestamp`, which is in the stream time base.
#[derive(Debug)]
pub struct Decoded {
    pub frame: DecodedFrame,
    pub timestamp: Option<i64>,
}

/// Stream properties reported at open time
#[derive(Debug, Clone, PartialEq)]
pub struct StreamInfo {
    /// Coded width in pixels
    pub width: u32,
    /// Coded height in pixels
    pub height: u32,
    /// Time base of the video stream's timestamps
    pub time_base: Rational,
    /// Average frame rate (fps), 0.0 when unknown
    pub frame_rate: f64,
    /// Duration in microseconds, 0 when unknown
    pub duration_us: i64,
    /// Codec short name
    pub codec_name: String,
}

/// Errors opening a media file
#[derive(Debug, Error)]
pub enum OpenError {
    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("unrecognized container format: {}", .0.display())]
    Unrecognized(PathBuf),
    #[error("no video stream in {}", .0.display())]
    NoVideoStream(PathBuf),
    #[error("failed to create decoder: {0}")]
    Codec(String),
}

/// Errors while reading, decoding, or seeking
#[derive(Debug, Error)]
pub enum DecoderError {
    #[error("read failed: {0}")]
    Read(String),
    #[error("decode failed: {0}")]
    Decode(String),
    #[error("seek to {target_us}us failed: {reason}")]
    Seek { target_us: i64, reason: String },
    /// A single frame could not be converted; playback can continue
    #[error("frame conversion failed: {0}")]
    Scale(String),
}

impl DecoderError {
    /// Whether the frame source should keep going after this error
    pub fn is_recoverable(&self) -> bool {
        matches!(self, DecoderError::Scale(_))
    }
}

/// Demux + decode collaborator driven by `FrameSource`
pub trait MediaDecoder: Send {
    /// Encoded unit type (a packet)
    type Unit;

    /// Properties of the selected video stream
    fn info(&self) -> &StreamInfo;

    /// Scale every subsequent frame to `target`
    fn configure_scale(&mut self, target: ScaleTarget) -> Result<(), ScaleConfigError>;

    /// Read the next encoded unit from the container
    fn read_unit(&mut self) -> Result<Step<Self::Unit>, DecoderError>;

    /// Whether `unit` belongs to the selected video stream
    fn is_video(&self, unit: &Self::Unit) -> bool;

    /// Submit a video unit to the decoder
    fn send_unit(&mut self, unit: &Self::Unit) -> Result<(), DecoderError>;

    /// Pull the next decoded frame
    fn receive_frame(&mut self) -> Result<Step<Decoded>, DecoderError>;

    /// Reposition to the keyframe at or before `target_us` and drop any
    /// frames buffered inside the decoder
    fn seek(&mut self, target_us: i64) -> Result<(), DecoderError>;
}
