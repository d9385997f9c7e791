//! Once-a-second status line while media is playing

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, select, tick, Sender};

use super::metrics::{PlaybackStats, StatsSnapshot};

/// Background ticker logging playback counters
pub struct Heartbeat {
    shutdown: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Heartbeat {
    /// Start logging `stats` every `interval`
    pub fn start(stats: Arc<PlaybackStats>, interval: Duration) -> std::io::Result<Self> {
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
        let handle = thread::Builder::new()
            .name("heartbeat".to_string())
            .spawn(move || {
                let started = Instant::now();
                let ticker = tick(interval);
                let mut previous = StatsSnapshot::default();
                loop {
                    select! {
                        recv(ticker) -> _ => {
                            let snap = stats.snapshot();
                            tracing::info!(
                                target: "reel_player::heartbeat",
                                uptime_s = started.elapsed().as_secs(),
                                position_ms = snap.last_pts_us / 1000,
                                fps = snap.frames_presented.saturating_sub(previous.frames_presented),
                                decoded = snap.frames_decoded,
                                presented = snap.frames_presented,
                                queue = snap.queue_depth,
                                loops = snap.loops,
                                "tick"
                            );
                            previous = snap;
                        }
                        recv(shutdown_rx) -> _ => break,
                    }
                }
            })?;

        Ok(Self {
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    /// Stop the ticker and wait for its thread
    pub fn stop(&mut self) {
        // Dropping the sender disconnects the channel and wakes the thread
        self.shutdown.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.stop();
    }
}
