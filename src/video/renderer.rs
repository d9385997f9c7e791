//! Renderer for YUV video textures
//!
//! One pipeline, one sampler, one uniform buffer. The quad is scaled in the
//! vertex shader so the frame keeps its aspect ratio inside the surface.

use super::YuvTexture;
use crate::shaders::YUV_QUAD_SHADER;

/// Parameters for video display, matching the shader uniform
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct VideoParams {
    /// Scale factor for aspect ratio (1.0, 1.0 = fill surface)
    pub scale: [f32; 2],
    /// Offset for centering
    pub offset: [f32; 2],
    /// Opacity (0.0 - 1.0)
    pub opacity: f32,
    /// Padding for 16-byte alignment
    pub _padding: [f32; 3],
}

impl Default for VideoParams {
    fn default() -> Self {
        Self {
            scale: [1.0, 1.0],
            offset: [0.0, 0.0],
            opacity: 1.0,
            _padding: [0.0; 3],
        }
    }
}

impl VideoParams {
    /// Preserve the frame's aspect ratio, adding bars where needed
    pub fn fit_aspect_ratio(video_width: u32, video_height: u32, screen_width: u32, screen_height: u32) -> Self {
        if video_width == 0 || video_height == 0 || screen_width == 0 || screen_height == 0 {
            return Self::default();
        }

        let video_aspect = video_width as f32 / video_height as f32;
        let screen_aspect = screen_width as f32 / screen_height as f32;

        let (scale_x, scale_y) = if video_aspect > screen_aspect {
            // Wider than the surface: bars top and bottom
            (1.0, screen_aspect / video_aspect)
        } else {
            // Taller than the surface: bars left and right
            (video_aspect / screen_aspect, 1.0)
        };

        Self {
            scale: [scale_x, scale_y],
            ..Self::default()
        }
    }
}

/// Draws a `YuvTexture` into a render target
pub struct YuvRenderer {
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    params_buffer: wgpu::Buffer,
    current_params: VideoParams,
}

impl YuvRenderer {
    /// Create the pipeline for a render target of `output_format`
    pub fn new(device: &wgpu::Device, output_format: wgpu::TextureFormat) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("YUV Quad Shader"),
            source: wgpu::ShaderSource::Wgsl(YUV_QUAD_SHADER.into()),
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("YUV Plane Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let plane_entry = |binding: u32| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        };

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("YUV Bind Group Layout"),
            entries: &[
                plane_entry(0),
                plane_entry(1),
                plane_entry(2),
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 4,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("YUV Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("YUV Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: output_format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                unclipped_depth: false,
                polygon_mode: wgpu::PolygonMode::Fill,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let current_params = VideoParams::default();
        let params_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Video Params Buffer"),
            size: std::mem::size_of::<VideoParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Self {
            pipeline,
            bind_group_layout,
            sampler,
            params_buffer,
            current_params,
        }
    }

    /// Update display parameters; skips the upload when nothing changed
    pub fn set_params(&mut self, queue: &wgpu::Queue, params: VideoParams) {
        if params == self.current_params {
            return;
        }
        self.current_params = params;
        queue.write_buffer(&self.params_buffer, 0, bytemuck::bytes_of(&self.current_params));
    }

    /// Force the current parameters into the uniform buffer
    pub fn write_params(&self, queue: &wgpu::Queue) {
        queue.write_buffer(&self.params_buffer, 0, bytemuck::bytes_of(&self.current_params));
    }

    /// Bind group for a texture set; recreate it whenever the textures are
    pub fn create_bind_group(&self, device: &wgpu::Device, texture: &YuvTexture) -> wgpu::BindGroup {
        let [y, u, v] = texture.views();
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("YUV Bind Group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(y),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(u),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(v),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: self.params_buffer.as_entire_binding(),
                },
            ],
        })
    }

    /// Clear `output_view` to black and draw the video quad
    pub fn render(&self, encoder: &mut wgpu::CommandEncoder, output_view: &wgpu::TextureView, bind_group: &wgpu::BindGroup) {
        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Video Render Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: output_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        render_pass.set_pipeline(&self.pipeline);
        render_pass.set_bind_group(0, bind_group, &[]);
        // Two triangles covering the scaled quad
        render_pass.draw(0..6, 0..1);
    }
}
