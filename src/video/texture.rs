//! GPU textures for planar YUV frames
//!
//! One single-channel texture per plane. The luma texture matches the frame
//! size; the chroma textures are half size, rounded up.

use super::frame::{PLANE_U, PLANE_V, PLANE_Y};
use super::DecodedFrame;
use crate::display::DisplayError;

const PLANE_LABELS: [&str; 3] = ["Y Plane Texture", "U Plane Texture", "V Plane Texture"];

struct PlaneTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    width: u32,
    height: u32,
}

/// Three R8 textures receiving the Y, U and V planes of a frame
pub struct YuvTexture {
    planes: [PlaneTexture; 3],
    width: u32,
    height: u32,
}

impl YuvTexture {
    /// Create textures for frames of `width` x `height`
    pub fn new(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let planes = [PLANE_Y, PLANE_U, PLANE_V].map(|i| {
            let (w, h) = plane_size(width, height, i);
            Self::create_plane(device, PLANE_LABELS[i], w, h)
        });

        Self { planes, width, height }
    }

    fn create_plane(device: &wgpu::Device, label: &str, width: u32, height: u32) -> PlaneTexture {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::R8Unorm,
            usage: wgpu::TextureUsages::COPY_DST | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        PlaneTexture {
            texture,
            view,
            width: width.max(1),
            height: height.max(1),
        }
    }

    /// Upload all three planes of `frame`
    ///
    /// The frame must match the texture size; call `resize()` first when the
    /// geometry changes.
    pub fn upload(&self, queue: &wgpu::Queue, frame: &DecodedFrame) -> Result<(), DisplayError> {
        if frame.dimensions() != (self.width, self.height) {
            return Err(DisplayError::GeometryMismatch {
                frame: frame.dimensions(),
                surface: (self.width, self.height),
            });
        }
        if !frame.is_valid() {
            return Err(DisplayError::InvalidFrame {
                width: frame.width,
                height: frame.height,
            });
        }

        for (i, plane) in self.planes.iter().enumerate() {
            queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: &plane.texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                &frame.planes[i],
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(frame.strides[i] as u32),
                    rows_per_image: Some(plane.height),
                },
                wgpu::Extent3d {
                    width: plane.width,
                    height: plane.height,
                    depth_or_array_layers: 1,
                },
            );
        }
        Ok(())
    }

    /// Recreate the textures for a new frame size
    ///
    /// Bind groups referencing the old textures must be recreated.
    pub fn resize(&mut self, device: &wgpu::Device, width: u32, height: u32) {
        if self.width == width && self.height == height {
            return;
        }

        *self = Self::new(device, width, height);
        log::debug!("Resized YUV textures to {}x{}", width, height);
    }

    /// Views of the Y, U and V textures, in that order
    pub fn views(&self) -> [&wgpu::TextureView; 3] {
        [&self.planes[0].view, &self.planes[1].view, &self.planes[2].view]
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

/// Size in texels of plane `index` for a `width` x `height` frame
pub fn plane_size(width: u32, height: u32, index: usize) -> (u32, u32) {
    if index == PLANE_Y {
        (width, height)
    } else {
        (DecodedFrame::chroma_width(width), DecodedFrame::chroma_height(height))
    }
}
