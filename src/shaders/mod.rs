//! Embedded WGSL shaders

/// Planar YUV to RGB quad shader
pub const YUV_QUAD_SHADER: &str = include_str!("yuv_quad.wgsl");
