//! wgpu implementation of `DisplaySurface`
//!
//! Created on the main thread (it needs the window), then moved to the
//! presenter thread, which owns it for the rest of playback.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use winit::window::Window;

use super::{DisplayError, DisplaySurface};
use crate::video::{DecodedFrame, VideoParams, YuvRenderer, YuvTexture};

/// Latest window inner size, written by the event loop and read by the presenter
#[derive(Debug, Default)]
pub struct SurfaceSize(AtomicU64);

impl SurfaceSize {
    pub fn new(width: u32, height: u32) -> Self {
        let size = Self::default();
        size.set(width, height);
        size
    }

    pub fn set(&self, width: u32, height: u32) {
        let packed = ((width as u64) << 32) | height as u64;
        self.0.store(packed, Ordering::Release);
    }

    pub fn get(&self) -> (u32, u32) {
        let packed = self.0.load(Ordering::Acquire);
        ((packed >> 32) as u32, packed as u32)
    }
}

/// Window surface with YUV plane textures and the conversion pipeline
pub struct GpuDisplay {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    texture: YuvTexture,
    renderer: YuvRenderer,
    bind_group: wgpu::BindGroup,
    window_size: Arc<SurfaceSize>,
}

impl GpuDisplay {
    /// Create the surface for `window` with textures for `width` x `height` frames
    pub async fn new(
        window: Arc<Window>,
        width: u32,
        height: u32,
        window_size: Arc<SurfaceSize>,
    ) -> Result<Self, DisplayError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance
            .create_surface(window)
            .map_err(|e| DisplayError::Init(format!("surface: {}", e)))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| DisplayError::Init("no suitable GPU adapter".to_string()))?;

        tracing::info!("Using GPU: {}", adapter.get_info().name);
        tracing::info!("Backend: {:?}", adapter.get_info().backend);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Reel Player Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default().using_resolution(adapter.limits()),
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await
            .map_err(|e| DisplayError::Init(format!("device: {}", e)))?;

        let caps = surface.get_capabilities(&adapter);
        // The shader writes gamma-encoded values already
        let format = caps
            .formats
            .iter()
            .find(|f| !f.is_srgb())
            .or_else(|| caps.formats.first())
            .copied()
            .ok_or_else(|| DisplayError::Init("surface reports no formats".to_string()))?;
        let alpha_mode = caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let (surface_width, surface_height) = window_size.get();
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: surface_width.max(1),
            height: surface_height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);
        tracing::info!(?format, width = config.width, height = config.height, "Surface configured");

        let texture = YuvTexture::new(&device, width, height);
        let renderer = YuvRenderer::new(&device, format);
        renderer.write_params(&queue);
        let bind_group = renderer.create_bind_group(&device, &texture);

        Ok(Self {
            surface,
            device,
            queue,
            config,
            texture,
            renderer,
            bind_group,
            window_size,
        })
    }

    fn configure_surface(&mut self, width: u32, height: u32) {
        self.config.width = width.max(1);
        self.config.height = height.max(1);
        self.surface.configure(&self.device, &self.config);
        tracing::debug!(width = self.config.width, height = self.config.height, "Surface reconfigured");
    }

    fn sync_surface_size(&mut self) {
        let (width, height) = self.window_size.get();
        if width > 0 && height > 0 && (width, height) != (self.config.width, self.config.height) {
            self.configure_surface(width, height);
        }
    }

    fn acquire(&mut self) -> Result<Option<wgpu::SurfaceTexture>, DisplayError> {
        match self.surface.get_current_texture() {
            Ok(frame) => Ok(Some(frame)),
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.configure_surface(self.config.width, self.config.height);
                self.surface
                    .get_current_texture()
                    .map(Some)
                    .map_err(|_| DisplayError::SurfaceLost)
            }
            Err(wgpu::SurfaceError::OutOfMemory) => Err(DisplayError::OutOfMemory),
            Err(e) => {
                tracing::warn!(error = %e, "Skipping present");
                Ok(None)
            }
        }
    }
}

impl DisplaySurface for GpuDisplay {
    fn dimensions(&self) -> (u32, u32) {
        (self.texture.width(), self.texture.height())
    }

    fn reallocate(&mut self, width: u32, height: u32) -> Result<(), DisplayError> {
        self.texture.resize(&self.device, width, height);
        self.bind_group = self.renderer.create_bind_group(&self.device, &self.texture);
        Ok(())
    }

    fn upload(&mut self, frame: &DecodedFrame) -> Result<(), DisplayError> {
        self.texture.upload(&self.queue, frame)
    }

    fn present(&mut self) -> Result<(), DisplayError> {
        self.sync_surface_size();

        let Some(output) = self.acquire()? else {
            return Ok(());
        };
        let view = output.texture.create_view(&wgpu::TextureViewDescriptor::default());

        let params = VideoParams::fit_aspect_ratio(
            self.texture.width(),
            self.texture.height(),
            self.config.width,
            self.config.height,
        );
        self.renderer.set_params(&self.queue, params);

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Present Encoder"),
        });
        self.renderer.render(&mut encoder, &view, &self.bind_group);
        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        Ok(())
    }
}
