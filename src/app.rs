//! Window event loop handler
//!
//! Owns the window and the pipeline threads. The frame source and the
//! presentation loop run on their own threads; this handler forwards keyboard
//! controls to the playback handle, follows resize requests from the
//! presenter and tears everything down on quit or when playback ends.

use std::sync::Arc;
use std::time::{Duration, Instant};

use winit::application::ApplicationHandler;
use winit::dpi::{PhysicalPosition, PhysicalSize};
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoopProxy};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowAttributes, WindowId};

use crate::display::{GpuDisplay, SurfaceSize};
use crate::event::{PlayerEvent, ProxyNotifier};
use crate::present::{PresentationLoop, PresenterThread};
use crate::settings::PlayerSettings;
use crate::telemetry::PlaybackStats;
use crate::video::{FrameReceiver, FrameSource, MediaDecoder, PlaybackHandle, SourceThread};

const WINDOW_TITLE: &str = "Reel Player";

/// How often the loop checks whether playback has finished
const FINISH_POLL: Duration = Duration::from_millis(100);

/// Arrow-key seek step
const SEEK_STEP_US: i64 = 5_000_000;

/// Running pipeline bound to a window
struct Session {
    window: Arc<Window>,
    window_size: Arc<SurfaceSize>,
    playback: PlaybackHandle,
    source: Option<SourceThread>,
    presenter: Option<PresenterThread>,
}

/// winit application driving one playback
pub struct PlayerApp<D: MediaDecoder> {
    settings: PlayerSettings,
    stats: Arc<PlaybackStats>,
    proxy: EventLoopProxy<PlayerEvent>,
    /// Source and queue end waiting for the window to exist
    pending: Option<(FrameSource<D>, FrameReceiver)>,
    session: Option<Session>,
    failure: Option<anyhow::Error>,
}

impl<D: MediaDecoder + 'static> PlayerApp<D> {
    pub fn new(
        settings: PlayerSettings,
        source: FrameSource<D>,
        receiver: FrameReceiver,
        stats: Arc<PlaybackStats>,
        proxy: EventLoopProxy<PlayerEvent>,
    ) -> Self {
        Self {
            settings,
            stats,
            proxy,
            pending: Some((source, receiver)),
            session: None,
            failure: None,
        }
    }

    /// First error that ended playback, if any
    pub fn into_result(self) -> anyhow::Result<()> {
        match self.failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn start(&mut self, event_loop: &ActiveEventLoop) -> anyhow::Result<()> {
        let Some((source, receiver)) = self.pending.take() else {
            return Ok(());
        };

        let (width, height) = (self.settings.window_width, self.settings.window_height);
        let attributes = WindowAttributes::default()
            .with_title(WINDOW_TITLE)
            .with_inner_size(PhysicalSize::new(width, height));
        let window = Arc::new(event_loop.create_window(attributes)?);
        center_window(&window, window.inner_size());

        let inner = window.inner_size();
        let window_size = Arc::new(SurfaceSize::new(inner.width, inner.height));
        tracing::info!("Window created: {}x{}", inner.width, inner.height);

        // Start at window size; the first frame resizes both to its geometry
        let display = pollster::block_on(GpuDisplay::new(
            Arc::clone(&window),
            width,
            height,
            Arc::clone(&window_size),
        ))?;

        let source = source.with_stats(Arc::clone(&self.stats));
        let playback = source.handle();
        let source = source.spawn()?;

        let presenter = PresentationLoop::new(display, ProxyNotifier::new(self.proxy.clone()), receiver)
            .with_stats(Arc::clone(&self.stats))
            .spawn()?;

        tracing::info!("Space pauses, R restarts, arrows seek, Esc quits");
        self.session = Some(Session {
            window,
            window_size,
            playback,
            source: Some(source),
            presenter: Some(presenter),
        });
        Ok(())
    }

    /// Stop both threads and collect their results
    fn shutdown(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        session.playback.stop();

        // The presenter drops the queue receiver, which unblocks a full producer
        if let Some(presenter) = session.presenter.take() {
            match presenter.stop() {
                Ok(summary) => tracing::debug!(?summary, "Presenter joined"),
                Err(e) => self.fail(e.into()),
            }
        }
        if let Some(source) = session.source.take() {
            match source.wait() {
                Ok(summary) => tracing::debug!(?summary, "Frame source joined"),
                Err(e) => self.fail(e.into()),
            }
        }

        let snap = self.stats.snapshot();
        tracing::info!(
            decoded = snap.frames_decoded,
            presented = snap.frames_presented,
            skipped = snap.markers,
            loops = snap.loops,
            "Playback finished"
        );
    }

    fn fail(&mut self, error: anyhow::Error) {
        tracing::error!("{:#}", error);
        if self.failure.is_none() {
            self.failure = Some(error);
        }
    }

    fn quit(&mut self, event_loop: &ActiveEventLoop) {
        self.shutdown();
        event_loop.exit();
    }

    fn handle_key(&mut self, event_loop: &ActiveEventLoop, code: KeyCode) {
        if matches!(code, KeyCode::Escape | KeyCode::KeyQ) {
            self.quit(event_loop);
            return;
        }
        let Some(session) = &self.session else {
            return;
        };
        let playback = &session.playback;

        match code {
            KeyCode::Space => {
                let state = playback.toggle_pause();
                tracing::info!(%state, "Toggled pause");
            }
            KeyCode::KeyR | KeyCode::Home => playback.seek(0),
            KeyCode::ArrowRight | KeyCode::ArrowLeft => {
                let position = self.stats.snapshot().last_pts_us as i64;
                let step = if code == KeyCode::ArrowRight {
                    SEEK_STEP_US
                } else {
                    -SEEK_STEP_US
                };
                playback.seek((position + step).max(0));
            }
            _ => {}
        }
    }
}

impl<D: MediaDecoder + 'static> ApplicationHandler<PlayerEvent> for PlayerApp<D> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if let Err(e) = self.start(event_loop) {
            self.fail(e);
            self.quit(event_loop);
        }
    }

    fn user_event(&mut self, _event_loop: &ActiveEventLoop, event: PlayerEvent) {
        let PlayerEvent::Resize { width, height } = event;
        let Some(session) = &self.session else {
            return;
        };

        let requested = PhysicalSize::new(width, height);
        if let Some(applied) = session.window.request_inner_size(requested) {
            session.window_size.set(applied.width, applied.height);
        }
        center_window(&session.window, requested);
        tracing::debug!(width, height, "Window follows frame geometry");
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => self.quit(event_loop),
            WindowEvent::Resized(size) => {
                if let Some(session) = &self.session {
                    session.window_size.set(size.width, size.height);
                }
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(code),
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } => self.handle_key(event_loop, code),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let finished = self
            .session
            .as_ref()
            .and_then(|s| s.presenter.as_ref())
            .is_some_and(|p| p.is_finished());
        if finished {
            tracing::info!("Presentation ended");
            self.quit(event_loop);
            return;
        }
        event_loop.set_control_flow(ControlFlow::WaitUntil(Instant::now() + FINISH_POLL));
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.shutdown();
    }
}

/// Center a window of the given inner size on its current monitor
fn center_window(window: &Window, inner: PhysicalSize<u32>) {
    let Some(monitor) = window.current_monitor() else {
        return;
    };
    let screen = monitor.size();
    let origin = monitor.position();

    // Decorations keep their size across resizes
    let current_inner = window.inner_size();
    let current_outer = window.outer_size();
    let outer_width = inner.width + current_outer.width.saturating_sub(current_inner.width);
    let outer_height = inner.height + current_outer.height.saturating_sub(current_inner.height);

    let x = origin.x + (screen.width as i32 - outer_width as i32) / 2;
    let y = origin.y + (screen.height as i32 - outer_height as i32) / 2;
    window.set_outer_position(PhysicalPosition::new(x.max(origin.x), y.max(origin.y)));
}
