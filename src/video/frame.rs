//! Decoded video frame representation
//!
//! Frames are planar YUV 4:2:0: a full-resolution luma plane followed by two
//! chroma planes subsampled by two in both directions. Each plane keeps the
//! decoder's row stride so it can be uploaded without repacking.

/// Index of the luma plane
pub const PLANE_Y: usize = 0;
/// Index of the blue-difference chroma plane
pub const PLANE_U: usize = 1;
/// Index of the red-difference chroma plane
pub const PLANE_V: usize = 2;

/// A decoded YUV 4:2:0 frame with presentation timestamp
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Presentation timestamp in microseconds
    pub pts: i64,
    /// Y, U, V pixel data
    pub planes: [Vec<u8>; 3],
    /// Bytes per row of each plane
    pub strides: [usize; 3],
    /// First frame after a seek or loop rewind
    pub discontinuity: bool,
}

impl DecodedFrame {
    /// Create a frame from three planes and their strides
    pub fn new(width: u32, height: u32, pts: i64, planes: [Vec<u8>; 3], strides: [usize; 3]) -> Self {
        Self {
            width,
            height,
            pts,
            planes,
            strides,
            discontinuity: false,
        }
    }

    /// Create a frame with tightly packed planes filled with a constant colour
    pub fn filled(width: u32, height: u32, pts: i64, yuv: [u8; 3]) -> Self {
        let strides = [
            width as usize,
            Self::chroma_width(width) as usize,
            Self::chroma_width(width) as usize,
        ];
        let planes = [PLANE_Y, PLANE_U, PLANE_V]
            .map(|i| vec![yuv[i]; strides[i] * Self::plane_rows(height, i)]);
        Self::new(width, height, pts, planes, strides)
    }

    /// Width of the chroma planes (rounded up)
    pub fn chroma_width(width: u32) -> u32 {
        width.div_ceil(2)
    }

    /// Height of the chroma planes (rounded up)
    pub fn chroma_height(height: u32) -> u32 {
        height.div_ceil(2)
    }

    /// Number of rows in plane `index` for a frame of the given height
    pub fn plane_rows(height: u32, index: usize) -> usize {
        if index == PLANE_Y {
            height as usize
        } else {
            Self::chroma_height(height) as usize
        }
    }

    /// Width in pixels of plane `index`
    pub fn plane_width(&self, index: usize) -> u32 {
        if index == PLANE_Y {
            self.width
        } else {
            Self::chroma_width(self.width)
        }
    }

    /// Geometry of the frame as `(width, height)`
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Check that every plane holds at least `stride * rows` bytes and that
    /// strides cover the visible width
    pub fn is_valid(&self) -> bool {
        if self.width == 0 || self.height == 0 {
            return false;
        }
        (0..3).all(|i| {
            let rows = Self::plane_rows(self.height, i);
            self.strides[i] >= self.plane_width(i) as usize
                && self.planes[i].len() >= self.strides[i] * rows
        })
    }

    /// Mark this frame as the first after a timeline jump
    pub fn with_discontinuity(mut self, discontinuity: bool) -> Self {
        self.discontinuity = discontinuity;
        self
    }
}
