//! Playback counters and presentation timing
//!
//! `PlaybackStats` is shared between the producer, the consumer and the
//! heartbeat thread. `PresentTimer` tracks intervals between presented frames
//! on the consumer thread.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Counters updated from the pipeline threads
#[derive(Debug, Default)]
pub struct PlaybackStats {
    frames_decoded: AtomicU64,
    frames_presented: AtomicU64,
    markers: AtomicU64,
    seeks: AtomicU64,
    loops: AtomicU64,
    resizes: AtomicU64,
    queue_depth: AtomicUsize,
    last_pts_us: AtomicU64,
}

/// Point-in-time copy of `PlaybackStats`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub frames_decoded: u64,
    pub frames_presented: u64,
    pub markers: u64,
    pub seeks: u64,
    pub loops: u64,
    pub resizes: u64,
    pub queue_depth: usize,
    pub last_pts_us: u64,
}

impl PlaybackStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_decoded(&self, queue_depth: usize) {
        self.frames_decoded.fetch_add(1, Ordering::Relaxed);
        self.queue_depth.store(queue_depth, Ordering::Relaxed);
    }

    pub fn record_presented(&self, pts_us: i64, queue_depth: usize) {
        self.frames_presented.fetch_add(1, Ordering::Relaxed);
        self.last_pts_us.store(pts_us.max(0) as u64, Ordering::Relaxed);
        self.queue_depth.store(queue_depth, Ordering::Relaxed);
    }

    pub fn record_marker(&self) {
        self.markers.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_seek(&self) {
        self.seeks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_loop(&self) {
        self.loops.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_resize(&self) {
        self.resizes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_decoded: self.frames_decoded.load(Ordering::Relaxed),
            frames_presented: self.frames_presented.load(Ordering::Relaxed),
            markers: self.markers.load(Ordering::Relaxed),
            seeks: self.seeks.load(Ordering::Relaxed),
            loops: self.loops.load(Ordering::Relaxed),
            resizes: self.resizes.load(Ordering::Relaxed),
            queue_depth: self.queue_depth.load(Ordering::Relaxed),
            last_pts_us: self.last_pts_us.load(Ordering::Relaxed),
        }
    }
}

/// Frame interval statistics
#[derive(Debug, Clone, Default)]
pub struct FrameStats {
    /// Average interval in milliseconds
    pub avg_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    /// 50th percentile (median) interval
    pub p50_ms: f64,
    /// 95th percentile interval
    pub p95_ms: f64,
    /// Number of samples in the statistics
    pub sample_count: usize,
}

/// Rolling window of intervals between presented frames
pub struct PresentTimer {
    intervals: VecDeque<Duration>,
    /// Maximum samples to keep (10 seconds at 30fps)
    max_samples: usize,
    last_present: Option<Instant>,
}

impl Default for PresentTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl PresentTimer {
    pub fn new() -> Self {
        Self {
            intervals: VecDeque::with_capacity(300),
            max_samples: 300,
            last_present: None,
        }
    }

    /// Record a present at `now`
    pub fn mark(&mut self, now: Instant) {
        if let Some(last) = self.last_present {
            self.intervals.push_back(now.saturating_duration_since(last));
            if self.intervals.len() > self.max_samples {
                self.intervals.pop_front();
            }
        }
        self.last_present = Some(now);
    }

    /// Forget the previous present, e.g. after a seek
    pub fn restart(&mut self) {
        self.last_present = None;
    }

    pub fn stats(&self) -> FrameStats {
        if self.intervals.is_empty() {
            return FrameStats::default();
        }

        let mut times: Vec<f64> = self
            .intervals
            .iter()
            .map(|d| d.as_secs_f64() * 1000.0)
            .collect();
        times.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let sum: f64 = times.iter().sum();

        FrameStats {
            avg_ms: sum / times.len() as f64,
            min_ms: times.first().copied().unwrap_or(0.0),
            max_ms: times.last().copied().unwrap_or(0.0),
            p50_ms: percentile(&times, 0.50),
            p95_ms: percentile(&times, 0.95),
            sample_count: times.len(),
        }
    }
}

/// Percentile of an already sorted slice
fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((sorted.len() - 1) as f64 * p) as usize;
    sorted[idx]
}
