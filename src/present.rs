//! Presentation loop: the consumer side of the pipeline
//!
//! Pops frames from the queue, waits until each frame's timestamp is due
//! relative to a monotonic origin, then uploads and presents it. Because
//! every wait is measured from the same origin, per-frame jitter does not
//! accumulate into drift.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::display::{DisplayError, DisplaySurface, ResizeNotifier, SurfaceManager};
use crate::telemetry::{PlaybackStats, PresentTimer};
use crate::video::{DecodedFrame, FrameReceiver, PopError, QueueItem};

/// How long the loop waits for a frame before re-checking the stop flag
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Longest single sleep while waiting for a frame to become due
const MAX_SLEEP_SLICE: Duration = Duration::from_millis(50);

/// What to do before presenting a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaceDecision {
    /// The frame starts a new timeline; present immediately
    ResetOrigin,
    /// Present after this long (zero when already late)
    Sleep(Duration),
}

/// Maps presentation timestamps onto the monotonic clock
#[derive(Debug, Default)]
pub struct Pacer {
    origin: Option<Instant>,
}

impl Pacer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide how long to wait before showing a frame with `pts` microseconds
    ///
    /// A non-positive timestamp, a discontinuity or a missing origin restarts
    /// the timeline so that `pts` is due right now.
    pub fn decide(&mut self, pts: i64, discontinuity: bool, now: Instant) -> PaceDecision {
        let origin = match self.origin {
            Some(origin) if pts > 0 && !discontinuity => origin,
            _ => {
                let offset = Duration::from_micros(pts.max(0) as u64);
                self.origin = Some(now.checked_sub(offset).unwrap_or(now));
                return PaceDecision::ResetOrigin;
            }
        };

        let due = origin + Duration::from_micros(pts as u64);
        PaceDecision::Sleep(due.saturating_duration_since(now))
    }

    pub fn origin(&self) -> Option<Instant> {
        self.origin
    }
}

/// Errors that end the presentation loop
#[derive(Debug, Error)]
pub enum PresentError {
    #[error(transparent)]
    Display(#[from] DisplayError),
    #[error("failed to spawn presenter thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("presenter thread panicked")]
    Panicked,
}

/// Totals reported when the loop ends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PresentSummary {
    pub frames_presented: u64,
    pub markers_skipped: u64,
    pub resizes: u64,
}

/// Cloneable stop switch for a running presentation loop
#[derive(Debug, Clone, Default)]
pub struct PresenterHandle {
    stop: Arc<AtomicBool>,
}

impl PresenterHandle {
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }
}

/// Consumer loop presenting queued frames on a surface
pub struct PresentationLoop<S, N> {
    manager: SurfaceManager<S, N>,
    receiver: FrameReceiver,
    pacer: Pacer,
    handle: PresenterHandle,
    stats: Arc<PlaybackStats>,
    timer: PresentTimer,
}

impl<S, N> PresentationLoop<S, N>
where
    S: DisplaySurface + 'static,
    N: ResizeNotifier + 'static,
{
    pub fn new(surface: S, notifier: N, receiver: FrameReceiver) -> Self {
        Self {
            manager: SurfaceManager::new(surface, notifier),
            receiver,
            pacer: Pacer::new(),
            handle: PresenterHandle::default(),
            stats: Arc::new(PlaybackStats::new()),
            timer: PresentTimer::new(),
        }
    }

    /// Share counters with the rest of the pipeline
    pub fn with_stats(mut self, stats: Arc<PlaybackStats>) -> Self {
        self.stats = stats;
        self
    }

    pub fn handle(&self) -> PresenterHandle {
        self.handle.clone()
    }

    /// Present frames until the queue closes or a stop is requested
    pub fn run(mut self) -> Result<PresentSummary, PresentError> {
        let mut summary = PresentSummary::default();

        while !self.handle.is_stop_requested() {
            let item = match self.receiver.pop_timeout(POLL_INTERVAL) {
                Ok(item) => item,
                Err(PopError::Timeout) => continue,
                Err(PopError::Closed) => {
                    tracing::debug!("Frame queue closed");
                    break;
                }
            };

            match item {
                QueueItem::Marker => summary.markers_skipped += 1,
                QueueItem::Frame(frame) => {
                    if !self.show(&frame, &mut summary)? {
                        break;
                    }
                }
            }
        }

        let timing = self.timer.stats();
        tracing::info!(
            frames = summary.frames_presented,
            markers = summary.markers_skipped,
            resizes = summary.resizes,
            avg_interval_ms = timing.avg_ms,
            p95_interval_ms = timing.p95_ms,
            "Presentation finished"
        );
        Ok(summary)
    }

    /// Pace, upload and present one frame; false if stopped while waiting
    fn show(&mut self, frame: &DecodedFrame, summary: &mut PresentSummary) -> Result<bool, PresentError> {
        if self.manager.accommodate(frame)? {
            summary.resizes += 1;
            self.stats.record_resize();
        }

        match self.pacer.decide(frame.pts, frame.discontinuity, Instant::now()) {
            PaceDecision::ResetOrigin => {
                tracing::debug!(pts = frame.pts, "Pacing origin reset");
                self.timer.restart();
            }
            PaceDecision::Sleep(wait) => {
                if !self.sleep_unless_stopped(wait) {
                    return Ok(false);
                }
            }
        }

        self.manager.upload(frame)?;
        self.manager.present()?;

        self.timer.mark(Instant::now());
        summary.frames_presented += 1;
        self.stats.record_presented(frame.pts, self.receiver.len());
        Ok(true)
    }

    fn sleep_unless_stopped(&self, wait: Duration) -> bool {
        let deadline = Instant::now() + wait;
        loop {
            if self.handle.is_stop_requested() {
                return false;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return true;
            }
            thread::sleep(remaining.min(MAX_SLEEP_SLICE));
        }
    }

    /// Run on a dedicated `presenter` thread
    pub fn spawn(self) -> Result<PresenterThread, PresentError> {
        let handle = self.handle();
        let thread = thread::Builder::new()
            .name("presenter".to_string())
            .spawn(move || self.run())?;
        Ok(PresenterThread { thread, handle })
    }
}

/// A presentation loop running on its own thread
pub struct PresenterThread {
    thread: JoinHandle<Result<PresentSummary, PresentError>>,
    handle: PresenterHandle,
}

impl PresenterThread {
    pub fn handle(&self) -> &PresenterHandle {
        &self.handle
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    pub fn wait(self) -> Result<PresentSummary, PresentError> {
        self.thread.join().map_err(|_| PresentError::Panicked)?
    }

    /// Request a stop and join
    pub fn stop(self) -> Result<PresentSummary, PresentError> {
        self.handle.stop();
        self.wait()
    }
}
