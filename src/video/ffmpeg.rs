//! FFmpeg-backed `MediaDecoder`
//!
//! Demuxes with libavformat, decodes with libavcodec and converts anything
//! that is not already YUV 4:2:0 at the requested size with libswscale.

use std::path::Path;

use ffmpeg_next::format::Pixel;
use ffmpeg_next::software::scaling;

use super::decoder::{Decoded, DecoderError, MediaDecoder, OpenError, Step, StreamInfo};
use super::size::{ScaleConfigError, ScaleTarget};
use super::timebase::{rescale_q, Rational, MICROSECONDS};
use super::DecodedFrame;

/// Encoded unit handed between `read_unit` and `send_unit`
pub enum FfmpegUnit {
    Packet(ffmpeg_next::Packet),
    /// Demuxer hit end of file; the decoder still holds delayed frames
    Drain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ScalerKey {
    format: Pixel,
    width: u32,
    height: u32,
    out_width: u32,
    out_height: u32,
}

struct Scaler {
    key: ScalerKey,
    context: scaling::Context,
}

// SAFETY: an SwsContext has no thread affinity; it is only touched through
// `&mut self` on whichever thread currently owns the decoder.
unsafe impl Send for Scaler {}

/// Video decoder over an FFmpeg input context
pub struct FfmpegDecoder {
    input: ffmpeg_next::format::context::Input,
    decoder: ffmpeg_next::decoder::Video,
    video_stream_index: usize,
    info: StreamInfo,
    scale: Option<ScaleTarget>,
    scaler: Option<Scaler>,
    draining: bool,
    path: String,
}

impl FfmpegDecoder {
    /// Open a media file and select its best video stream
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, OpenError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(OpenError::NotFound(path.to_path_buf()));
        }

        // Safe to call multiple times
        ffmpeg_next::init().map_err(|e| OpenError::Codec(e.to_string()))?;

        let input = ffmpeg_next::format::input(&path)
            .map_err(|_| OpenError::Unrecognized(path.to_path_buf()))?;

        let stream = input
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or_else(|| OpenError::NoVideoStream(path.to_path_buf()))?;
        let video_stream_index = stream.index();
        let time_base = Rational::from(stream.time_base());

        let frame_rate = {
            let rate = stream.avg_frame_rate();
            if rate.denominator() > 0 {
                rate.numerator() as f64 / rate.denominator() as f64
            } else {
                0.0
            }
        };

        let duration_us = if stream.duration() > 0 {
            rescale_q(stream.duration(), time_base, MICROSECONDS)
        } else if input.duration() > 0 {
            // Container duration is already in AV_TIME_BASE (microseconds)
            input.duration()
        } else {
            0
        };

        let parameters = stream.parameters();
        let codec_name = ffmpeg_next::decoder::find(parameters.id())
            .map(|c| c.name().to_string())
            .unwrap_or_else(|| "unknown".to_string());

        let context = ffmpeg_next::codec::context::Context::from_parameters(parameters)
            .map_err(|e| OpenError::Codec(e.to_string()))?;
        let decoder = context
            .decoder()
            .video()
            .map_err(|e| OpenError::Codec(format!("{}: {}", codec_name, e)))?;

        let info = StreamInfo {
            width: decoder.width(),
            height: decoder.height(),
            time_base,
            frame_rate,
            duration_us,
            codec_name,
        };

        tracing::info!(
            path = %path.display(),
            width = info.width,
            height = info.height,
            fps = info.frame_rate,
            duration_us = info.duration_us,
            codec = %info.codec_name,
            time_base = %info.time_base,
            "Opened video"
        );

        Ok(Self {
            input,
            decoder,
            video_stream_index,
            info,
            scale: None,
            scaler: None,
            draining: false,
            path: path.to_string_lossy().to_string(),
        })
    }

    /// Print FFmpeg's description of the container to stderr
    pub fn dump_format(&self) {
        ffmpeg_next::format::context::input::dump(&self.input, 0, Some(self.path.as_str()));
    }

    /// Copy or convert a decoded frame into a `DecodedFrame`
    fn convert(&mut self, frame: &ffmpeg_next::frame::Video) -> Result<DecodedFrame, DecoderError> {
        let (out_width, out_height) = match self.scale {
            Some(target) => (target.width, target.height),
            None => (frame.width(), frame.height()),
        };

        let passthrough = frame.format() == Pixel::YUV420P
            && frame.width() == out_width
            && frame.height() == out_height;
        if passthrough {
            return Ok(copy_planes(frame));
        }

        let key = ScalerKey {
            format: frame.format(),
            width: frame.width(),
            height: frame.height(),
            out_width,
            out_height,
        };
        if self.scaler.as_ref().map(|s| s.key) != Some(key) {
            let context = scaling::Context::get(
                key.format,
                key.width,
                key.height,
                Pixel::YUV420P,
                key.out_width,
                key.out_height,
                scaling::Flags::BILINEAR,
            )
            .map_err(|e| DecoderError::Scale(e.to_string()))?;
            tracing::debug!(
                from = ?key.format,
                src = %format!("{}x{}", key.width, key.height),
                dst = %format!("{}x{}", key.out_width, key.out_height),
                "Created scaler"
            );
            self.scaler = Some(Scaler { key, context });
        }

        let scaler = match self.scaler.as_mut() {
            Some(scaler) => scaler,
            None => return Err(DecoderError::Scale("scaler unavailable".to_string())),
        };
        let mut converted = ffmpeg_next::frame::Video::empty();
        scaler
            .context
            .run(frame, &mut converted)
            .map_err(|e| DecoderError::Scale(e.to_string()))?;

        Ok(copy_planes(&converted))
    }
}

fn copy_planes(frame: &ffmpeg_next::frame::Video) -> DecodedFrame {
    let width = frame.width();
    let height = frame.height();
    let strides = [frame.stride(0), frame.stride(1), frame.stride(2)];
    let planes = [0, 1, 2].map(|i| {
        let rows = DecodedFrame::plane_rows(height, i);
        let data = frame.data(i);
        let len = (strides[i] * rows).min(data.len());
        data[..len].to_vec()
    });
    DecodedFrame::new(width, height, 0, planes, strides)
}

impl MediaDecoder for FfmpegDecoder {
    type Unit = FfmpegUnit;

    fn info(&self) -> &StreamInfo {
        &self.info
    }

    fn configure_scale(&mut self, target: ScaleTarget) -> Result<(), ScaleConfigError> {
        let target = ScaleTarget::new(target.width, target.height)?;
        tracing::info!(target_size = %target, "Scaling output");
        self.scale = Some(target);
        self.scaler = None;
        Ok(())
    }

    fn read_unit(&mut self) -> Result<Step<FfmpegUnit>, DecoderError> {
        if self.draining {
            return Ok(Step::EndOfStream);
        }

        let mut packet = ffmpeg_next::Packet::empty();
        match packet.read(&mut self.input) {
            Ok(()) => Ok(Step::Ready(FfmpegUnit::Packet(packet))),
            Err(ffmpeg_next::Error::Eof) => {
                self.draining = true;
                Ok(Step::Ready(FfmpegUnit::Drain))
            }
            Err(ffmpeg_next::Error::Other {
                errno: ffmpeg_next::error::EAGAIN,
            }) => Ok(Step::RetryLater),
            Err(e) => Err(DecoderError::Read(e.to_string())),
        }
    }

    fn is_video(&self, unit: &FfmpegUnit) -> bool {
        match unit {
            FfmpegUnit::Packet(packet) => packet.stream() == self.video_stream_index,
            FfmpegUnit::Drain => true,
        }
    }

    fn send_unit(&mut self, unit: &FfmpegUnit) -> Result<(), DecoderError> {
        let result = match unit {
            FfmpegUnit::Packet(packet) => self.decoder.send_packet(packet),
            FfmpegUnit::Drain => self.decoder.send_eof(),
        };
        match result {
            // A repeated drain after end of file
            Ok(()) | Err(ffmpeg_next::Error::Eof) => Ok(()),
            // Every send is followed by receiving until EAGAIN, so the
            // decoder always has room and EAGAIN here is a real failure
            Err(e) => Err(DecoderError::Decode(e.to_string())),
        }
    }

    fn receive_frame(&mut self) -> Result<Step<Decoded>, DecoderError> {
        let mut frame = ffmpeg_next::frame::Video::empty();
        match self.decoder.receive_frame(&mut frame) {
            Ok(()) => {
                let timestamp = frame.timestamp().or_else(|| frame.pts());
                let converted = self.convert(&frame)?;
                Ok(Step::Ready(Decoded {
                    frame: converted,
                    timestamp,
                }))
            }
            Err(ffmpeg_next::Error::Other {
                errno: ffmpeg_next::error::EAGAIN,
            }) => Ok(Step::RetryLater),
            Err(ffmpeg_next::Error::Eof) => Ok(Step::EndOfStream),
            Err(e) => Err(DecoderError::Decode(e.to_string())),
        }
    }

    fn seek(&mut self, target_us: i64) -> Result<(), DecoderError> {
        // With no stream selected FFmpeg seeks in AV_TIME_BASE units
        self.input
            .seek(target_us, ..target_us)
            .map_err(|e| DecoderError::Seek {
                target_us,
                reason: e.to_string(),
            })?;
        self.decoder.flush();
        self.draining = false;
        tracing::debug!(target_us, "Seeked");
        Ok(())
    }
}
