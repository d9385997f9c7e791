//! Display surface management
//!
//! `SurfaceManager` keeps the display surface sized to the frames it is asked
//! to show. When a frame arrives with new geometry the surface is reallocated
//! once and the window is told to follow.

mod gpu;

use thiserror::Error;

use crate::video::DecodedFrame;

pub use gpu::{GpuDisplay, SurfaceSize};

/// Errors from the display surface
#[derive(Debug, Error)]
pub enum DisplayError {
    #[error("frame is {}x{} but the surface is {}x{}", .frame.0, .frame.1, .surface.0, .surface.1)]
    GeometryMismatch { frame: (u32, u32), surface: (u32, u32) },
    #[error("frame {width}x{height} has short or missing planes")]
    InvalidFrame { width: u32, height: u32 },
    #[error("surface lost and could not be reconfigured")]
    SurfaceLost,
    #[error("GPU out of memory")]
    OutOfMemory,
    #[error("GPU initialization failed: {0}")]
    Init(String),
}

/// Something frames can be drawn on
pub trait DisplaySurface: Send {
    /// Allocated geometry as `(width, height)`
    fn dimensions(&self) -> (u32, u32);

    /// Drop the current backing store and allocate one of the given size
    fn reallocate(&mut self, width: u32, height: u32) -> Result<(), DisplayError>;

    /// Copy a frame's planes into the surface
    fn upload(&mut self, frame: &DecodedFrame) -> Result<(), DisplayError>;

    /// Clear, draw the uploaded frame and show it
    fn present(&mut self) -> Result<(), DisplayError>;
}

/// Receives the synthetic resize notification for the window
pub trait ResizeNotifier: Send {
    fn notify_resize(&self, width: u32, height: u32);
}

/// Keeps a surface matched to frame geometry
pub struct SurfaceManager<S, N> {
    surface: S,
    notifier: N,
    reallocations: u64,
}

impl<S: DisplaySurface, N: ResizeNotifier> SurfaceManager<S, N> {
    pub fn new(surface: S, notifier: N) -> Self {
        Self {
            surface,
            notifier,
            reallocations: 0,
        }
    }

    /// Make the surface fit `frame`; returns whether it was reallocated
    pub fn accommodate(&mut self, frame: &DecodedFrame) -> Result<bool, DisplayError> {
        let (width, height) = frame.dimensions();
        if self.surface.dimensions() == (width, height) {
            return Ok(false);
        }

        let (old_width, old_height) = self.surface.dimensions();
        self.surface.reallocate(width, height)?;
        self.reallocations += 1;
        self.notifier.notify_resize(width, height);

        tracing::info!(
            from = %format!("{}x{}", old_width, old_height),
            to = %format!("{}x{}", width, height),
            "Display resized to frame geometry"
        );
        Ok(true)
    }

    pub fn upload(&mut self, frame: &DecodedFrame) -> Result<(), DisplayError> {
        self.surface.upload(frame)
    }

    pub fn present(&mut self) -> Result<(), DisplayError> {
        self.surface.present()
    }

    /// Number of reallocations so far
    pub fn reallocations(&self) -> u64 {
        self.reallocations
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }
}
