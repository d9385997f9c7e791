//! Test doubles: a scripted decoder and a recording display

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::display::{DisplayError, DisplaySurface, ResizeNotifier};
use crate::video::decoder::{Decoded, DecoderError, MediaDecoder, Step, StreamInfo};
use crate::video::size::{ScaleConfigError, ScaleTarget};
use crate::video::timebase::Rational;
use crate::video::DecodedFrame;

const TICKS_PER_SECOND: i64 = 90_000;

/// Description of a synthetic clip
#[derive(Debug, Clone)]
pub struct Clip {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub frames: u64,
    audio_every: u64,
    delay: usize,
    retry_every: u64,
    scale_failure_at: Option<u64>,
    decode_error_at: Option<u64>,
    size_change: Option<(u64, u32, u32)>,
    keyframe_interval: u64,
}

impl Clip {
    pub fn new(width: u32, height: u32, fps: u32, frames: u64) -> Self {
        Self {
            width,
            height,
            fps,
            frames,
            audio_every: 0,
            delay: 0,
            retry_every: 0,
            scale_failure_at: None,
            decode_error_at: None,
            size_change: None,
            keyframe_interval: 1,
        }
    }

    /// Interleave a non-video unit after every `n` video units
    pub fn with_audio_every(mut self, n: u64) -> Self {
        self.audio_every = n;
        self
    }

    /// Hold `n` frames inside the decoder until more input or a drain arrives
    pub fn with_delay(mut self, n: usize) -> Self {
        self.delay = n;
        self
    }

    /// Report "try again" on every `n`th read
    pub fn with_retry_every(mut self, n: u64) -> Self {
        self.retry_every = n;
        self
    }

    pub fn with_scale_failure_at(mut self, index: u64) -> Self {
        self.scale_failure_at = Some(index);
        self
    }

    pub fn with_decode_error_at(mut self, index: u64) -> Self {
        self.decode_error_at = Some(index);
        self
    }

    /// Frames from `index` on have the given geometry
    pub fn with_size_change_at(mut self, index: u64, width: u32, height: u32) -> Self {
        self.size_change = Some((index, width, height));
        self
    }

    /// Seeks land on the keyframe at or before the target, one every `n` frames
    pub fn with_keyframe_interval(mut self, n: u64) -> Self {
        self.keyframe_interval = n.max(1);
        self
    }

    fn ticks_per_frame(&self) -> i64 {
        TICKS_PER_SECOND / self.fps as i64
    }

    fn geometry(&self, index: u64) -> (u32, u32) {
        match self.size_change {
            Some((from, w, h)) if index >= from => (w, h),
            _ => (self.width, self.height),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntheticUnit {
    Video(u64),
    Audio,
    Drain,
}

/// Scripted `MediaDecoder` producing solid-colour frames
pub struct SyntheticDecoder {
    clip: Clip,
    info: StreamInfo,
    next_frame: u64,
    since_audio: u64,
    reads: u64,
    buffered: VecDeque<u64>,
    draining: bool,
    drained: bool,
    scale: Option<ScaleTarget>,
    scale_log: Arc<Mutex<Vec<ScaleTarget>>>,
}

impl SyntheticDecoder {
    pub fn new(clip: Clip) -> Self {
        let info = StreamInfo {
            width: clip.width,
            height: clip.height,
            time_base: Rational::new(1, TICKS_PER_SECOND as i32),
            frame_rate: clip.fps as f64,
            duration_us: clip.frames as i64 * 1_000_000 / clip.fps as i64,
            codec_name: "synthetic".to_string(),
        };
        Self {
            clip,
            info,
            next_frame: 0,
            since_audio: 0,
            reads: 0,
            buffered: VecDeque::new(),
            draining: false,
            drained: false,
            scale: None,
            scale_log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Every scale target the decoder was configured with
    pub fn scale_log(&self) -> Arc<Mutex<Vec<ScaleTarget>>> {
        Arc::clone(&self.scale_log)
    }

    fn make_frame(&self, index: u64) -> Result<Decoded, DecoderError> {
        if self.clip.scale_failure_at == Some(index) {
            return Err(DecoderError::Scale(format!("cannot convert frame {}", index)));
        }
        let (width, height) = match self.scale {
            Some(target) => (target.width, target.height),
            None => self.clip.geometry(index),
        };
        let luma = (index % 220) as u8 + 16;
        Ok(Decoded {
            frame: DecodedFrame::filled(width, height, 0, [luma, 128, 128]),
            timestamp: Some(index as i64 * self.clip.ticks_per_frame()),
        })
    }
}

impl MediaDecoder for SyntheticDecoder {
    type Unit = SyntheticUnit;

    fn info(&self) -> &StreamInfo {
        &self.info
    }

    fn configure_scale(&mut self, target: ScaleTarget) -> Result<(), ScaleConfigError> {
        self.scale_log.lock().unwrap().push(target);
        self.scale = Some(target);
        Ok(())
    }

    fn read_unit(&mut self) -> Result<Step<SyntheticUnit>, DecoderError> {
        self.reads += 1;
        if self.clip.retry_every > 0 && self.reads % self.clip.retry_every == 0 {
            return Ok(Step::RetryLater);
        }
        if self.drained {
            return Ok(Step::EndOfStream);
        }
        if self.clip.audio_every > 0 && self.since_audio == self.clip.audio_every {
            self.since_audio = 0;
            return Ok(Step::Ready(SyntheticUnit::Audio));
        }
        if self.next_frame < self.clip.frames {
            let index = self.next_frame;
            self.next_frame += 1;
            self.since_audio += 1;
            return Ok(Step::Ready(SyntheticUnit::Video(index)));
        }
        self.drained = true;
        Ok(Step::Ready(SyntheticUnit::Drain))
    }

    fn is_video(&self, unit: &SyntheticUnit) -> bool {
        !matches!(unit, SyntheticUnit::Audio)
    }

    fn send_unit(&mut self, unit: &SyntheticUnit) -> Result<(), DecoderError> {
        match *unit {
            SyntheticUnit::Video(index) => {
                if self.clip.decode_error_at == Some(index) {
                    return Err(DecoderError::Decode(format!("corrupt unit {}", index)));
                }
                self.buffered.push_back(index);
            }
            SyntheticUnit::Drain => self.draining = true,
            SyntheticUnit::Audio => {}
        }
        Ok(())
    }

    fn receive_frame(&mut self) -> Result<Step<Decoded>, DecoderError> {
        if self.buffered.len() > self.clip.delay || (self.draining && !self.buffered.is_empty()) {
            if let Some(index) = self.buffered.pop_front() {
                return self.make_frame(index).map(Step::Ready);
            }
        }
        if self.draining {
            Ok(Step::EndOfStream)
        } else {
            Ok(Step::RetryLater)
        }
    }

    fn seek(&mut self, target_us: i64) -> Result<(), DecoderError> {
        let index = (target_us.max(0) as u64 * self.clip.fps as u64) / 1_000_000;
        let keyframe = index - index % self.clip.keyframe_interval;
        self.next_frame = keyframe.min(self.clip.frames);
        self.since_audio = 0;
        self.buffered.clear();
        self.draining = false;
        self.drained = false;
        Ok(())
    }
}

/// Everything a `RecordingSurface` saw
#[derive(Debug, Default)]
pub struct SurfaceLog {
    pub reallocations: Vec<(u32, u32)>,
    pub uploads: Vec<(u32, u32, i64)>,
    pub presents: Vec<Instant>,
    pub plane_sizes: Vec<[usize; 3]>,
}

/// `DisplaySurface` double that records every call
pub struct RecordingSurface {
    size: (u32, u32),
    log: Arc<Mutex<SurfaceLog>>,
}

impl RecordingSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: (width, height),
            log: Arc::new(Mutex::new(SurfaceLog::default())),
        }
    }

    pub fn log(&self) -> Arc<Mutex<SurfaceLog>> {
        Arc::clone(&self.log)
    }
}

impl DisplaySurface for RecordingSurface {
    fn dimensions(&self) -> (u32, u32) {
        self.size
    }

    fn reallocate(&mut self, width: u32, height: u32) -> Result<(), DisplayError> {
        self.size = (width, height);
        self.log.lock().unwrap().reallocations.push((width, height));
        Ok(())
    }

    fn upload(&mut self, frame: &DecodedFrame) -> Result<(), DisplayError> {
        if frame.dimensions() != self.size {
            return Err(DisplayError::GeometryMismatch {
                frame: frame.dimensions(),
                surface: self.size,
            });
        }
        let mut log = self.log.lock().unwrap();
        log.uploads.push((frame.width, frame.height, frame.pts));
        log.plane_sizes.push([0, 1, 2].map(|i| frame.planes[i].len()));
        Ok(())
    }

    fn present(&mut self) -> Result<(), DisplayError> {
        self.log.lock().unwrap().presents.push(Instant::now());
        Ok(())
    }
}

/// `ResizeNotifier` double that records notifications
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    pub events: Arc<Mutex<Vec<(u32, u32)>>>,
}

impl ResizeNotifier for RecordingNotifier {
    fn notify_resize(&self, width: u32, height: u32) {
        self.events.lock().unwrap().push((width, height));
    }
}
