//! Events posted to the window event loop from pipeline threads

use winit::event_loop::EventLoopProxy;

use crate::display::ResizeNotifier;

/// User events handled by the application
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerEvent {
    /// Frame geometry changed; the window should follow
    Resize { width: u32, height: u32 },
}

/// Forwards resize notifications into the event loop
pub struct ProxyNotifier(EventLoopProxy<PlayerEvent>);

impl ProxyNotifier {
    pub fn new(proxy: EventLoopProxy<PlayerEvent>) -> Self {
        Self(proxy)
    }
}

impl ResizeNotifier for ProxyNotifier {
    fn notify_resize(&self, width: u32, height: u32) {
        if self.0.send_event(PlayerEvent::Resize { width, height }).is_err() {
            tracing::debug!("Event loop closed; dropping resize");
        }
    }
}
