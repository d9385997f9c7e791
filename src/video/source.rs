//! Frame source: the producer side of the pipeline
//!
//! Drives a `MediaDecoder` through a small playback state machine and hands
//! every decoded frame to a `FrameSink`, normally the frame queue.
//!
//! ```text
//!   Seeking --seek done--> Playing --end of stream--> Seeking(0)   (looping)
//!                             |                  \--> Ended         (otherwise)
//!                          pause/resume
//!                             |
//!                           Paused
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use thiserror::Error;

use super::decoder::{DecoderError, MediaDecoder, OpenError, Step};
use super::queue::{FrameSender, QueueClosed, QueueItem};
use super::size::{parse_video_size, ScaleConfigError, ScaleTarget};
use super::timebase::{rescale_q, MICROSECONDS};
use crate::telemetry::PlaybackStats;

/// How long the run loop sleeps while paused or ended
pub const IDLE_POLL: Duration = Duration::from_millis(10);

/// Playback state shared between the run loop and its controllers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Playing,
    Paused,
    Seeking,
    Ended,
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlaybackState::Playing => "playing",
            PlaybackState::Paused => "paused",
            PlaybackState::Seeking => "seeking",
            PlaybackState::Ended => "ended",
        };
        f.write_str(name)
    }
}

/// Run-once gate for a frame source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    NotStarted,
    Running,
    Stopped,
}

/// Options fixed at open time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackOptions {
    /// Seek back to the start on end of stream
    pub looping: bool,
    /// Start in `Playing`; otherwise start `Paused` until `play()`
    pub autoplay: bool,
    /// When starting paused, deliver the first frame anyway so there is
    /// something on screen
    pub initial: bool,
    /// Print the container description when the file is opened
    pub dump_format: bool,
}

impl Default for PlaybackOptions {
    fn default() -> Self {
        Self {
            looping: true,
            autoplay: true,
            initial: false,
            dump_format: false,
        }
    }
}

/// Errors from the frame source
#[derive(Debug, Error)]
pub enum SourceError {
    #[error(transparent)]
    Open(#[from] OpenError),
    #[error(transparent)]
    Decode(#[from] DecoderError),
    #[error(transparent)]
    Scale(#[from] ScaleConfigError),
    #[error("frame source has already been started")]
    AlreadyStarted,
    #[error("no frame sink installed")]
    NoSink,
    #[error("failed to spawn frame source thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("frame source thread panicked")]
    Panicked,
}

/// Destination for produced frames
pub trait FrameSink: Send {
    /// Deliver one item; an error means nobody is listening any more
    fn deliver(&mut self, item: QueueItem) -> Result<(), QueueClosed>;

    /// Drop anything delivered but not yet consumed
    fn flush(&mut self) {}

    /// Items delivered but not yet consumed
    fn pending(&self) -> usize {
        0
    }
}

impl FrameSink for FrameSender {
    fn deliver(&mut self, item: QueueItem) -> Result<(), QueueClosed> {
        self.push(item)
    }

    fn flush(&mut self) {
        FrameSender::flush(self)
    }

    fn pending(&self) -> usize {
        self.len()
    }
}

/// Adapts a closure into a `FrameSink`
pub struct CallbackSink<F>(pub F);

impl<F> FrameSink for CallbackSink<F>
where
    F: FnMut(QueueItem) + Send,
{
    fn deliver(&mut self, item: QueueItem) -> Result<(), QueueClosed> {
        (self.0)(item);
        Ok(())
    }
}

#[derive(Debug)]
struct ControlState {
    state: PlaybackState,
    seek_target: Option<i64>,
    /// Seek came from a user rather than a loop rewind
    user_seek: bool,
    /// Settle in `Paused` once the pending seek is serviced
    pause_after_seek: bool,
}

/// State shared by a frame source and its handles
#[derive(Debug)]
struct PlaybackControl {
    inner: RwLock<ControlState>,
    stop: AtomicBool,
}

impl PlaybackControl {
    fn new(initial: PlaybackState) -> Self {
        Self {
            inner: RwLock::new(ControlState {
                state: initial,
                seek_target: None,
                user_seek: false,
                pause_after_seek: false,
            }),
            stop: AtomicBool::new(false),
        }
    }

    fn read<R>(&self, f: impl FnOnce(&ControlState) -> R) -> R {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    fn write<R>(&self, f: impl FnOnce(&mut ControlState) -> R) -> R {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    fn set_state(&self, state: PlaybackState) {
        self.write(|c| c.state = state);
    }

    fn request_seek(&self, target_us: i64, user_seek: bool) {
        self.write(|c| {
            // A rewind racing a pause must not resume playback
            if !user_seek && c.state == PlaybackState::Paused {
                c.pause_after_seek = true;
            }
            c.state = PlaybackState::Seeking;
            c.seek_target = Some(target_us.max(0));
            c.user_seek = user_seek;
        });
    }

    /// Consume a pending seek and move to `Playing`, or `Paused` if a pause
    /// arrived while the seek was pending
    fn begin_seek(&self) -> Option<(i64, bool)> {
        self.write(|c| {
            let target = c.seek_target.take()?;
            c.state = if std::mem::take(&mut c.pause_after_seek) {
                PlaybackState::Paused
            } else {
                PlaybackState::Playing
            };
            Some((target, std::mem::take(&mut c.user_seek)))
        })
    }
}

/// Cloneable control handle usable from any thread
#[derive(Debug, Clone)]
pub struct PlaybackHandle {
    control: Arc<PlaybackControl>,
}

impl PlaybackHandle {
    /// Start or continue playback
    ///
    /// A pending seek is kept and playback continues from its target.
    pub fn play(&self) {
        self.control.write(|c| {
            if c.state == PlaybackState::Seeking {
                c.pause_after_seek = false;
            } else {
                c.state = PlaybackState::Playing;
            }
        });
    }

    /// Pause playback; during a seek the pause applies once the seek lands
    pub fn pause(&self) {
        self.control.write(|c| match c.state {
            PlaybackState::Playing => c.state = PlaybackState::Paused,
            PlaybackState::Seeking => c.pause_after_seek = true,
            _ => {}
        });
    }

    pub fn resume(&self) {
        self.control.write(|c| match c.state {
            PlaybackState::Paused => c.state = PlaybackState::Playing,
            PlaybackState::Seeking => c.pause_after_seek = false,
            _ => {}
        });
    }

    /// Toggle between playing and paused
    ///
    /// Returns the state playback settles in, which during a seek is the
    /// state taken once the seek is serviced.
    pub fn toggle_pause(&self) -> PlaybackState {
        self.control.write(|c| match c.state {
            PlaybackState::Playing => {
                c.state = PlaybackState::Paused;
                c.state
            }
            PlaybackState::Paused => {
                c.state = PlaybackState::Playing;
                c.state
            }
            PlaybackState::Seeking => {
                c.pause_after_seek = !c.pause_after_seek;
                if c.pause_after_seek {
                    PlaybackState::Paused
                } else {
                    PlaybackState::Playing
                }
            }
            PlaybackState::Ended => c.state,
        })
    }

    /// Jump to `position_us` microseconds; queued frames are discarded
    pub fn seek(&self, position_us: i64) {
        self.control.request_seek(position_us, true);
    }

    /// Ask the run loop to finish at its next iteration
    pub fn stop(&self) {
        self.control.stop.store(true, Ordering::Release);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.control.stop.load(Ordering::Acquire)
    }

    pub fn state(&self) -> PlaybackState {
        self.control.read(|c| c.state)
    }

    /// Target of a pending seek, if one has not been serviced yet
    pub fn seek_target(&self) -> Option<i64> {
        self.control.read(|c| c.seek_target)
    }
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// End of stream without looping
    Ended,
    /// `stop()` was requested
    Stopped,
    /// The sink stopped accepting frames
    SinkClosed,
}

/// Totals reported when a run finishes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub outcome: RunOutcome,
    pub frames_delivered: u64,
    pub markers: u64,
    pub seeks: u64,
    pub loops: u64,
}

impl RunSummary {
    fn new() -> Self {
        Self {
            outcome: RunOutcome::Stopped,
            frames_delivered: 0,
            markers: 0,
            seeks: 0,
            loops: 0,
        }
    }
}

enum Flow {
    Continue,
    Finish(RunOutcome),
}

/// Producer that decodes frames and pushes them to a sink
pub struct FrameSource<D: MediaDecoder> {
    decoder: D,
    options: PlaybackOptions,
    control: Arc<PlaybackControl>,
    sink: Option<Box<dyn FrameSink>>,
    pending_scale: Option<ScaleTarget>,
    lifecycle: Lifecycle,
    stats: Arc<PlaybackStats>,
    /// Last delivered timestamp, reused for frames without one
    last_pts: i64,
    /// Next frame follows a timeline jump
    discontinuity: bool,
    /// Seek target not yet reached; earlier frames are decoded and dropped
    seek_floor: Option<i64>,
}

#[cfg(feature = "ffmpeg")]
impl FrameSource<super::ffmpeg::FfmpegDecoder> {
    /// Open a media file with the FFmpeg backend
    pub fn open<P: AsRef<std::path::Path>>(path: P, options: PlaybackOptions) -> Result<Self, OpenError> {
        let decoder = super::ffmpeg::FfmpegDecoder::open(path)?;
        if options.dump_format {
            decoder.dump_format();
        }
        Ok(Self::with_decoder(decoder, options))
    }
}

impl<D: MediaDecoder> FrameSource<D> {
    /// Wrap an already opened decoder
    pub fn with_decoder(decoder: D, options: PlaybackOptions) -> Self {
        let initial = if options.autoplay {
            PlaybackState::Playing
        } else {
            PlaybackState::Paused
        };
        Self {
            decoder,
            options,
            control: Arc::new(PlaybackControl::new(initial)),
            sink: None,
            pending_scale: None,
            lifecycle: Lifecycle::NotStarted,
            stats: Arc::new(PlaybackStats::new()),
            last_pts: 0,
            discontinuity: true,
            seek_floor: None,
        }
    }

    /// Share counters with the rest of the pipeline
    pub fn with_stats(mut self, stats: Arc<PlaybackStats>) -> Self {
        self.stats = stats;
        self
    }

    pub fn handle(&self) -> PlaybackHandle {
        PlaybackHandle {
            control: Arc::clone(&self.control),
        }
    }

    pub fn info(&self) -> &super::decoder::StreamInfo {
        self.decoder.info()
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn play(&self) {
        self.handle().play();
    }

    pub fn pause(&self) {
        self.handle().pause();
    }

    pub fn resume(&self) {
        self.handle().resume();
    }

    pub fn seek(&self, position_us: i64) {
        self.handle().seek(position_us);
    }

    pub fn stop(&self) {
        self.handle().stop();
    }

    pub fn state(&self) -> PlaybackState {
        self.handle().state()
    }

    fn ensure_not_started(&self) -> Result<(), SourceError> {
        match self.lifecycle {
            Lifecycle::NotStarted => Ok(()),
            _ => Err(SourceError::AlreadyStarted),
        }
    }

    /// Install the sink that receives every frame; must precede `run`
    pub fn set_frame_sink(&mut self, sink: impl FrameSink + 'static) -> Result<(), SourceError> {
        self.ensure_not_started()?;
        self.sink = Some(Box::new(sink));
        Ok(())
    }

    /// Scale output to `width` x `height`, applied when the run starts
    pub fn set_scale(&mut self, width: u32, height: u32) -> Result<(), SourceError> {
        self.ensure_not_started()?;
        self.pending_scale = Some(ScaleTarget::new(width, height)?);
        Ok(())
    }

    /// Like `set_scale` with a size string such as `1280x720` or `hd720`
    ///
    /// An unparseable string is rejected immediately and leaves any
    /// previously requested scale in place.
    pub fn set_scale_size(&mut self, size: &str) -> Result<(), SourceError> {
        self.ensure_not_started()?;
        let target = parse_video_size(size)?;
        self.pending_scale = Some(target);
        Ok(())
    }

    /// Scale that will be applied when the run starts
    pub fn pending_scale(&self) -> Option<ScaleTarget> {
        self.pending_scale
    }

    /// Run the playback loop on the current thread until it ends
    pub fn run(&mut self) -> Result<RunSummary, SourceError> {
        self.ensure_not_started()?;
        let mut sink = self.sink.take().ok_or(SourceError::NoSink)?;
        self.lifecycle = Lifecycle::Running;

        let result = self.run_loop(sink.as_mut());

        self.lifecycle = Lifecycle::Stopped;
        match &result {
            Ok(summary) => tracing::info!(
                outcome = ?summary.outcome,
                frames = summary.frames_delivered,
                markers = summary.markers,
                seeks = summary.seeks,
                loops = summary.loops,
                "Frame source finished"
            ),
            Err(e) => tracing::error!(error = %e, "Frame source failed"),
        }
        result
    }

    /// Run the playback loop on a dedicated `frame-source` thread
    pub fn spawn(self) -> Result<SourceThread, SourceError>
    where
        D: 'static,
    {
        let handle = self.handle();
        let mut source = self;
        let thread = thread::Builder::new()
            .name("frame-source".to_string())
            .spawn(move || source.run())?;
        Ok(SourceThread { thread, handle })
    }

    fn run_loop(&mut self, sink: &mut dyn FrameSink) -> Result<RunSummary, SourceError> {
        if let Some(target) = self.pending_scale.take() {
            self.decoder.configure_scale(target)?;
        }

        let info = self.decoder.info();
        tracing::info!(
            width = info.width,
            height = info.height,
            looping = self.options.looping,
            state = %self.state(),
            "Frame source started"
        );

        let mut summary = RunSummary::new();
        if self.options.initial && self.state() == PlaybackState::Paused {
            if let Flow::Finish(outcome) = self.preroll(sink, &mut summary)? {
                summary.outcome = outcome;
                return Ok(summary);
            }
        }

        loop {
            if self.control.stop.load(Ordering::Acquire) {
                summary.outcome = RunOutcome::Stopped;
                return Ok(summary);
            }

            let flow = match self.state() {
                PlaybackState::Seeking => {
                    self.service_seek(sink, &mut summary)?;
                    if self.state() == PlaybackState::Paused {
                        // Paused during the seek: show the frame it landed on
                        self.preroll(sink, &mut summary)?
                    } else {
                        self.play_step(sink, &mut summary)?
                    }
                }
                PlaybackState::Playing => self.play_step(sink, &mut summary)?,
                PlaybackState::Paused | PlaybackState::Ended => {
                    // Frames after a pause start a new pacing timeline
                    self.discontinuity = true;
                    thread::sleep(IDLE_POLL);
                    Flow::Continue
                }
            };

            if let Flow::Finish(outcome) = flow {
                summary.outcome = outcome;
                return Ok(summary);
            }
        }
    }

    /// Decode until one more frame is delivered, staying paused
    fn preroll(&mut self, sink: &mut dyn FrameSink, summary: &mut RunSummary) -> Result<Flow, SourceError> {
        let delivered = summary.frames_delivered;
        while summary.frames_delivered == delivered
            && self.state() == PlaybackState::Paused
            && !self.control.stop.load(Ordering::Acquire)
        {
            if let Flow::Finish(outcome) = self.play_step(sink, summary)? {
                return Ok(Flow::Finish(outcome));
            }
        }
        tracing::debug!(frames = summary.frames_delivered, "Preroll finished");
        Ok(Flow::Continue)
    }

    fn service_seek(&mut self, sink: &mut dyn FrameSink, summary: &mut RunSummary) -> Result<(), SourceError> {
        let Some((target_us, user_seek)) = self.control.begin_seek() else {
            // Seeking without a target; nothing to do but play on
            self.control.set_state(PlaybackState::Playing);
            return Ok(());
        };

        tracing::debug!(target_us, user_seek, "Seeking");
        if user_seek {
            sink.flush();
        }
        self.decoder.seek(target_us)?;
        self.discontinuity = true;
        self.last_pts = target_us;
        self.seek_floor = Some(target_us);
        summary.seeks += 1;
        self.stats.record_seek();
        Ok(())
    }

    /// Read one unit and deliver every frame it produces
    fn play_step(&mut self, sink: &mut dyn FrameSink, summary: &mut RunSummary) -> Result<Flow, SourceError> {
        let unit = match self.decoder.read_unit()? {
            Step::Ready(unit) => unit,
            Step::RetryLater => return Ok(Flow::Continue),
            Step::EndOfStream => {
                if self.options.looping {
                    tracing::debug!("End of stream, rewinding");
                    self.control.request_seek(0, false);
                    summary.loops += 1;
                    self.stats.record_loop();
                    return Ok(Flow::Continue);
                }
                tracing::info!("End of stream");
                self.control.set_state(PlaybackState::Ended);
                return Ok(Flow::Finish(RunOutcome::Ended));
            }
        };

        if !self.decoder.is_video(&unit) {
            return Ok(Flow::Continue);
        }
        self.decoder.send_unit(&unit)?;

        let time_base = self.decoder.info().time_base;
        loop {
            let item = match self.decoder.receive_frame() {
                Ok(Step::Ready(decoded)) => {
                    let pts = decoded
                        .timestamp
                        .map(|ts| rescale_q(ts, time_base, MICROSECONDS))
                        .unwrap_or(self.last_pts);
                    if let Some(floor) = self.seek_floor {
                        if pts < floor {
                            // Decoder landed on a keyframe before the target
                            continue;
                        }
                        tracing::debug!(target_us = floor, pts, "Reached seek target");
                        self.seek_floor = None;
                    }
                    self.last_pts = pts;

                    let mut frame = decoded.frame.with_discontinuity(self.discontinuity);
                    frame.pts = pts;
                    self.discontinuity = false;
                    summary.frames_delivered += 1;
                    QueueItem::Frame(frame)
                }
                Ok(Step::RetryLater) | Ok(Step::EndOfStream) => break,
                Err(e) if e.is_recoverable() => {
                    tracing::warn!(error = %e, "Skipping frame");
                    summary.markers += 1;
                    self.stats.record_marker();
                    QueueItem::Marker
                }
                Err(e) => return Err(e.into()),
            };

            let is_frame = matches!(item, QueueItem::Frame(_));
            if sink.deliver(item).is_err() {
                tracing::debug!("Frame sink closed");
                return Ok(Flow::Finish(RunOutcome::SinkClosed));
            }
            if is_frame {
                self.stats.record_decoded(sink.pending());
            }
        }

        Ok(Flow::Continue)
    }
}

/// A frame source running on its own thread
pub struct SourceThread {
    thread: JoinHandle<Result<RunSummary, SourceError>>,
    handle: PlaybackHandle,
}

impl SourceThread {
    pub fn handle(&self) -> &PlaybackHandle {
        &self.handle
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Join the thread and return how the run ended
    pub fn wait(self) -> Result<RunSummary, SourceError> {
        self.thread.join().map_err(|_| SourceError::Panicked)?
    }

    /// Request a stop and join
    pub fn stop(self) -> Result<RunSummary, SourceError> {
        self.handle.stop();
        self.wait()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Clip, SyntheticDecoder};
    use crate::video::queue::FrameQueue;
    use crate::video::DecodedFrame;
    use std::sync::Mutex;
    use std::time::Instant;

    fn no_loop() -> PlaybackOptions {
        PlaybackOptions {
            looping: false,
            ..PlaybackOptions::default()
        }
    }

    fn collecting_sink() -> (CallbackSink<impl FnMut(QueueItem) + Send>, Arc<Mutex<Vec<QueueItem>>>) {
        let items = Arc::new(Mutex::new(Vec::new()));
        let sink_items = Arc::clone(&items);
        let sink = CallbackSink(move |item| sink_items.lock().unwrap().push(item));
        (sink, items)
    }

    fn frames_of(items: &[QueueItem]) -> Vec<&DecodedFrame> {
        items
            .iter()
            .filter_map(|item| match item {
                QueueItem::Frame(f) => Some(f),
                QueueItem::Marker => None,
            })
            .collect()
    }

    #[test]
    fn test_two_second_clip_yields_every_frame() {
        let decoder = SyntheticDecoder::new(Clip::new(64, 48, 30, 60));
        let mut source = FrameSource::with_decoder(decoder, no_loop());
        let (sink, items) = collecting_sink();
        source.set_frame_sink(sink).unwrap();

        let summary = source.run().unwrap();

        assert_eq!(summary.outcome, RunOutcome::Ended);
        assert_eq!(summary.frames_delivered, 60);
        assert_eq!(source.state(), PlaybackState::Ended);
        assert_eq!(source.lifecycle(), Lifecycle::Stopped);

        let items = items.lock().unwrap();
        let frames = frames_of(&items);
        assert_eq!(frames.len(), 60);
        assert_eq!(frames[0].pts, 0);
        assert_eq!(frames[30].pts, 1_000_000);
        assert!(frames.windows(2).all(|w| w[0].pts <= w[1].pts));
        assert!(frames.iter().all(|f| f.is_valid()));
    }

    #[test]
    fn test_interleaved_non_video_units_are_skipped() {
        let clip = Clip::new(32, 32, 25, 10).with_audio_every(2);
        let mut source = FrameSource::with_decoder(SyntheticDecoder::new(clip), no_loop());
        let (sink, items) = collecting_sink();
        source.set_frame_sink(sink).unwrap();

        let summary = source.run().unwrap();
        assert_eq!(summary.frames_delivered, 10);
        assert_eq!(frames_of(&items.lock().unwrap()).len(), 10);
    }

    #[test]
    fn test_delayed_frames_are_all_delivered() {
        // Decoder holds two frames back, as with B-frame reordering
        let clip = Clip::new(32, 32, 25, 12).with_delay(2);
        let mut source = FrameSource::with_decoder(SyntheticDecoder::new(clip), no_loop());
        let (sink, items) = collecting_sink();
        source.set_frame_sink(sink).unwrap();

        source.run().unwrap();
        assert_eq!(frames_of(&items.lock().unwrap()).len(), 12);
    }

    #[test]
    fn test_retry_later_does_not_end_playback() {
        let clip = Clip::new(16, 16, 30, 8).with_retry_every(3);
        let mut source = FrameSource::with_decoder(SyntheticDecoder::new(clip), no_loop());
        let (sink, items) = collecting_sink();
        source.set_frame_sink(sink).unwrap();

        let summary = source.run().unwrap();
        assert_eq!(summary.outcome, RunOutcome::Ended);
        assert_eq!(frames_of(&items.lock().unwrap()).len(), 8);
    }

    #[test]
    fn test_loop_rewinds_timestamps() {
        let decoder = SyntheticDecoder::new(Clip::new(16, 16, 10, 5));
        let mut source = FrameSource::with_decoder(decoder, PlaybackOptions::default());
        let handle = source.handle();
        let (sink, items) = collecting_sink();
        let counter = Arc::clone(&items);
        source
            .set_frame_sink(CallbackSink({
                let mut sink = sink;
                move |item| {
                    let _ = sink.deliver(item);
                    if counter.lock().unwrap().len() >= 12 {
                        handle.stop();
                    }
                }
            }))
            .unwrap();

        let summary = source.run().unwrap();
        assert_eq!(summary.outcome, RunOutcome::Stopped);
        assert!(summary.loops >= 2);

        let items = items.lock().unwrap();
        let frames = frames_of(&items);
        let pts: Vec<i64> = frames.iter().map(|f| f.pts).collect();
        assert_eq!(&pts[..7], &[0, 100_000, 200_000, 300_000, 400_000, 0, 100_000]);
        assert!(frames[0].discontinuity);
        assert!(!frames[1].discontinuity);
        assert!(frames[5].discontinuity);
    }

    #[test]
    fn test_sink_invoked_before_end_of_stream() {
        let decoder = SyntheticDecoder::new(Clip::new(16, 16, 30, 3));
        let mut source = FrameSource::with_decoder(decoder, no_loop());
        let handle = source.handle();
        let observed = Arc::new(Mutex::new(Vec::new()));
        let record = Arc::clone(&observed);
        source
            .set_frame_sink(CallbackSink(move |_item| {
                record.lock().unwrap().push(handle.state());
            }))
            .unwrap();

        source.run().unwrap();
        let observed = observed.lock().unwrap();
        assert_eq!(observed.len(), 3);
        assert!(observed.iter().all(|s| *s == PlaybackState::Playing));
    }

    #[test]
    fn test_run_twice_fails_fast() {
        let decoder = SyntheticDecoder::new(Clip::new(16, 16, 30, 2));
        let mut source = FrameSource::with_decoder(decoder, no_loop());
        let (sink, _items) = collecting_sink();
        source.set_frame_sink(sink).unwrap();
        source.run().unwrap();

        assert!(matches!(source.run(), Err(SourceError::AlreadyStarted)));
        let (late_sink, _) = collecting_sink();
        assert!(matches!(source.set_frame_sink(late_sink), Err(SourceError::AlreadyStarted)));
    }

    #[test]
    fn test_run_without_sink() {
        let decoder = SyntheticDecoder::new(Clip::new(16, 16, 30, 2));
        let mut source = FrameSource::with_decoder(decoder, no_loop());
        assert!(matches!(source.run(), Err(SourceError::NoSink)));
        assert_eq!(source.lifecycle(), Lifecycle::NotStarted);
    }

    #[test]
    fn test_scale_is_applied_when_run_starts() {
        let decoder = SyntheticDecoder::new(Clip::new(64, 48, 30, 3));
        let scale_log = decoder.scale_log();
        let mut source = FrameSource::with_decoder(decoder, no_loop());
        source.set_scale_size("800x600").unwrap();
        assert!(scale_log.lock().unwrap().is_empty());

        let (sink, items) = collecting_sink();
        source.set_frame_sink(sink).unwrap();
        source.run().unwrap();

        assert_eq!(*scale_log.lock().unwrap(), vec![ScaleTarget { width: 800, height: 600 }]);
        let items = items.lock().unwrap();
        assert!(frames_of(&items).iter().all(|f| f.dimensions() == (800, 600)));
    }

    #[test]
    fn test_invalid_scale_keeps_previous_target() {
        let decoder = SyntheticDecoder::new(Clip::new(64, 48, 30, 1));
        let mut source = FrameSource::with_decoder(decoder, no_loop());
        source.set_scale(320, 240).unwrap();

        let err = source.set_scale_size("bogus").unwrap_err();
        assert!(matches!(err, SourceError::Scale(ScaleConfigError::Unparseable(_))));
        assert_eq!(source.pending_scale(), Some(ScaleTarget { width: 320, height: 240 }));
    }

    #[test]
    fn test_scale_failure_emits_marker() {
        let clip = Clip::new(16, 16, 30, 5).with_scale_failure_at(2);
        let mut source = FrameSource::with_decoder(SyntheticDecoder::new(clip), no_loop());
        let (sink, items) = collecting_sink();
        source.set_frame_sink(sink).unwrap();

        let summary = source.run().unwrap();
        assert_eq!(summary.markers, 1);
        assert_eq!(summary.frames_delivered, 4);
        let items = items.lock().unwrap();
        assert_eq!(items[2], QueueItem::Marker);
    }

    fn first_frame_after_seek(clip: Clip, target_us: i64) -> (DecodedFrame, Vec<DecodedFrame>) {
        let mut source = FrameSource::with_decoder(SyntheticDecoder::new(clip), no_loop());
        let handle = source.handle();
        let (sink, items) = collecting_sink();
        source.set_frame_sink(sink).unwrap();

        handle.seek(target_us);
        source.run().unwrap();
        let items = items.lock().unwrap();
        let frames: Vec<DecodedFrame> = frames_of(&items).into_iter().cloned().collect();
        (frames[0].clone(), frames)
    }

    #[test]
    fn test_seek_skips_frames_before_target() {
        // 30 s at 10 fps with a keyframe every 10 s
        let clip = Clip::new(16, 16, 10, 300).with_keyframe_interval(100);

        let (first, frames) = first_frame_after_seek(clip.clone(), 15_500_000);
        assert_eq!(first.pts, 15_500_000);
        assert!(first.discontinuity);
        assert_eq!(frames.len(), 145);
        assert!(frames.iter().skip(1).all(|f| !f.discontinuity));

        // Between two frames the next one is used
        let (first, _) = first_frame_after_seek(clip, 15_520_000);
        assert_eq!(first.pts, 15_600_000);
        assert!(first.discontinuity);
    }

    #[test]
    fn test_step_forward_moves_past_keyframe() {
        let clip = Clip::new(16, 16, 10, 300).with_keyframe_interval(100);
        let (first, _) = first_frame_after_seek(clip.clone(), 12_000_000);
        let (next, _) = first_frame_after_seek(clip, first.pts + 5_000_000);
        assert_eq!(next.pts, 17_000_000);
    }

    #[test]
    fn test_user_seek_mid_run_drops_stale_frames() {
        let decoder = SyntheticDecoder::new(Clip::new(16, 16, 10, 100));
        let mut source = FrameSource::with_decoder(decoder, no_loop());
        let handle = source.handle();
        let (tx, rx) = FrameQueue::bounded(4);
        source.set_frame_sink(tx).unwrap();
        let thread = source.spawn().unwrap();

        let next_frame = || match rx.pop() {
            Some(QueueItem::Frame(f)) => f,
            other => panic!("expected a frame, got {:?}", other),
        };
        assert_eq!(next_frame().pts, 0);
        assert_eq!(next_frame().pts, 100_000);

        // Producer refills the queue and blocks on the next push
        thread::sleep(Duration::from_millis(50));
        assert_eq!(rx.len(), 4);

        let target = 8_000_000;
        handle.seek(target);
        // Popping one item unblocks the producer, which then flushes
        let mut after = vec![next_frame()];
        thread::sleep(Duration::from_millis(100));
        after.extend(std::iter::from_fn(|| rx.pop()).filter_map(|item| match item {
            QueueItem::Frame(f) => Some(f),
            QueueItem::Marker => None,
        }));

        let summary = thread.wait().unwrap();
        assert_eq!(summary.seeks, 1);

        let stale = after.iter().take_while(|f| f.pts < target).count();
        assert!(stale <= 1, "{} stale frames survived the flush", stale);
        let jumped = &after[stale..];
        assert_eq!(jumped[0].pts, target);
        assert!(jumped[0].discontinuity);
        assert_eq!(jumped.len(), 20);
        assert!(jumped.iter().all(|f| f.pts >= target));
    }

    #[test]
    fn test_loop_rewind_keeps_queued_tail() {
        let decoder = SyntheticDecoder::new(Clip::new(16, 16, 10, 10));
        let mut source = FrameSource::with_decoder(decoder, PlaybackOptions::default());
        let (tx, rx) = FrameQueue::bounded(4);
        source.set_frame_sink(tx).unwrap();
        let thread = source.spawn().unwrap();

        // A slow consumer keeps the queue full across the rewind
        let mut frames = Vec::new();
        while frames.len() < 14 {
            thread::sleep(Duration::from_millis(5));
            if let Some(QueueItem::Frame(f)) = rx.pop() {
                frames.push(f);
            }
        }
        drop(rx);
        thread.stop().unwrap();

        let pts: Vec<i64> = frames.iter().map(|f| f.pts).collect();
        let expected: Vec<i64> = (0..10).chain(0..4).map(|i| i * 100_000).collect();
        assert_eq!(pts, expected);
        assert!(frames[10].discontinuity);
        assert!(!frames[9].discontinuity);
    }

    #[test]
    fn test_pause_during_seek_applies_after_seek() {
        let decoder = SyntheticDecoder::new(Clip::new(16, 16, 10, 50).with_keyframe_interval(25));
        let mut source = FrameSource::with_decoder(decoder, no_loop());
        let handle = source.handle();
        let (tx, rx) = FrameQueue::bounded(64);
        source.set_frame_sink(tx).unwrap();

        handle.seek(1_000_000);
        assert_eq!(handle.toggle_pause(), PlaybackState::Paused);
        assert_eq!(handle.state(), PlaybackState::Seeking);

        let thread = source.spawn().unwrap();
        thread::sleep(Duration::from_millis(50));
        assert_eq!(handle.state(), PlaybackState::Paused);
        assert_eq!(handle.seek_target(), None);
        assert_eq!(rx.len(), 1);

        handle.play();
        let summary = thread.wait().unwrap();
        assert_eq!(summary.frames_delivered, 40);

        let first = match rx.pop() {
            Some(QueueItem::Frame(f)) => f,
            other => panic!("expected a frame, got {:?}", other),
        };
        assert_eq!(first.pts, 1_000_000);
        assert!(first.discontinuity);
    }

    #[test]
    fn test_toggle_twice_during_seek_keeps_playing() {
        let handle = FrameSource::with_decoder(SyntheticDecoder::new(Clip::new(8, 8, 30, 1)), no_loop()).handle();
        handle.seek(0);
        assert_eq!(handle.toggle_pause(), PlaybackState::Paused);
        assert_eq!(handle.toggle_pause(), PlaybackState::Playing);
        handle.pause();
        handle.play();
        assert_eq!(handle.state(), PlaybackState::Seeking);
        assert_eq!(handle.seek_target(), Some(0));
    }

    #[test]
    fn test_seek_before_run_starts_at_target() {
        let decoder = SyntheticDecoder::new(Clip::new(16, 16, 10, 50));
        let mut source = FrameSource::with_decoder(decoder, no_loop());
        let handle = source.handle();
        let (tx, rx) = FrameQueue::bounded(100);
        source.set_frame_sink(tx).unwrap();

        // Seek is serviced before the first read
        handle.seek(3_000_000);
        assert_eq!(handle.state(), PlaybackState::Seeking);
        let summary = source.run().unwrap();
        assert_eq!(summary.seeks, 1);

        let first = match rx.pop() {
            Some(QueueItem::Frame(f)) => f,
            other => panic!("expected a frame, got {:?}", other),
        };
        assert_eq!(first.pts, 3_000_000);
        assert!(first.discontinuity);
        assert_eq!(handle.seek_target(), None);
    }

    #[test]
    fn test_paused_source_waits_for_play() {
        let options = PlaybackOptions {
            autoplay: false,
            ..no_loop()
        };
        let decoder = SyntheticDecoder::new(Clip::new(16, 16, 30, 4));
        let mut source = FrameSource::with_decoder(decoder, options);
        assert_eq!(source.state(), PlaybackState::Paused);
        let handle = source.handle();
        let (tx, rx) = FrameQueue::bounded(10);
        source.set_frame_sink(tx).unwrap();

        let thread = source.spawn().unwrap();
        thread::sleep(Duration::from_millis(50));
        assert!(rx.is_empty());

        handle.play();
        let summary = thread.wait().unwrap();
        assert_eq!(summary.frames_delivered, 4);
        assert_eq!(rx.len(), 4);
    }

    #[test]
    fn test_initial_frame_delivered_while_paused() {
        let options = PlaybackOptions {
            autoplay: false,
            initial: true,
            ..no_loop()
        };
        let decoder = SyntheticDecoder::new(Clip::new(16, 16, 30, 4).with_delay(1));
        let mut source = FrameSource::with_decoder(decoder, options);
        let handle = source.handle();
        let (tx, rx) = FrameQueue::bounded(10);
        source.set_frame_sink(tx).unwrap();

        let thread = source.spawn().unwrap();
        thread::sleep(Duration::from_millis(50));
        assert_eq!(rx.len(), 1);
        assert_eq!(handle.state(), PlaybackState::Paused);

        handle.play();
        let summary = thread.wait().unwrap();
        assert_eq!(summary.frames_delivered, 4);
        assert_eq!(rx.len(), 4);
    }

    #[test]
    fn test_pause_and_resume() {
        let handle = FrameSource::with_decoder(SyntheticDecoder::new(Clip::new(8, 8, 30, 1)), no_loop()).handle();
        handle.pause();
        assert_eq!(handle.state(), PlaybackState::Paused);
        handle.pause();
        assert_eq!(handle.state(), PlaybackState::Paused);
        handle.resume();
        assert_eq!(handle.state(), PlaybackState::Playing);
        assert_eq!(handle.toggle_pause(), PlaybackState::Paused);
        handle.play();
        assert_eq!(handle.state(), PlaybackState::Playing);
    }

    #[test]
    fn test_resume_marks_discontinuity() {
        let mut source = FrameSource::with_decoder(SyntheticDecoder::new(Clip::new(16, 16, 30, 4)), no_loop());
        let handle = source.handle();
        let frames = Arc::new(Mutex::new(Vec::<DecodedFrame>::new()));
        let seen = Arc::clone(&frames);
        source
            .set_frame_sink(CallbackSink(move |item| {
                if let QueueItem::Frame(frame) = item {
                    let mut seen = seen.lock().unwrap();
                    seen.push(frame);
                    if seen.len() == 2 {
                        handle.pause();
                        let resume = handle.clone();
                        thread::spawn(move || {
                            thread::sleep(Duration::from_millis(30));
                            resume.play();
                        });
                    }
                }
            }))
            .unwrap();

        source.run().unwrap();
        let frames = frames.lock().unwrap();
        let flags: Vec<bool> = frames.iter().map(|f| f.discontinuity).collect();
        assert_eq!(flags, vec![true, false, true, false]);
    }

    #[test]
    fn test_stop_ends_looping_thread() {
        let decoder = SyntheticDecoder::new(Clip::new(16, 16, 30, 10));
        let mut source = FrameSource::with_decoder(decoder, PlaybackOptions::default());
        let (tx, rx) = FrameQueue::bounded(4);
        source.set_frame_sink(tx).unwrap();

        let thread = source.spawn().unwrap();
        thread::sleep(Duration::from_millis(20));
        // Producer is blocked on the full queue; dropping the receiver wakes it
        drop(rx);
        let started = Instant::now();
        let summary = thread.stop().unwrap();
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(matches!(summary.outcome, RunOutcome::Stopped | RunOutcome::SinkClosed));
    }

    #[test]
    fn test_decode_error_stops_producer_only() {
        let clip = Clip::new(16, 16, 30, 10).with_decode_error_at(4);
        let mut source = FrameSource::with_decoder(SyntheticDecoder::new(clip), no_loop());
        let (tx, rx) = FrameQueue::bounded(16);
        source.set_frame_sink(tx).unwrap();

        let thread = source.spawn().unwrap();
        assert!(matches!(thread.wait(), Err(SourceError::Decode(_))));

        // Queue closes once the producer is gone; delivered frames remain
        let drained: Vec<QueueItem> = std::iter::from_fn(|| rx.pop()).collect();
        assert_eq!(drained.len(), 4);
    }
}
