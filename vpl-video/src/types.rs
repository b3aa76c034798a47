//! Video data types and constants

use bytemuck::{Pod, Zeroable};

/// Row pitch and plane offsets are rounded up to this many bytes.
pub const FRAME_ALIGNMENT: usize = 32;

/// Channel id reserved for raw decoder output.
pub const DECODER_CHANNEL_ID: u16 = 0;

/// Video format enumeration
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VideoFormat {
    #[default]
    None = 0,
    I420 = 1, // Planar YUV 4:2:0
    NV12 = 2, // Semi-planar YUV 4:2:0 (Y plane, interleaved UV)
    I010 = 3, // Planar YUV 4:2:0 10-bit, little-endian u16 samples
    P010 = 4, // Semi-planar YUV 4:2:0 10-bit, MSB-aligned u16 samples
    BGRA = 5, // Packed BGR + alpha
}

impl VideoFormat {
    pub const ALL: [VideoFormat; 5] = [
        VideoFormat::I420,
        VideoFormat::NV12,
        VideoFormat::I010,
        VideoFormat::P010,
        VideoFormat::BGRA,
    ];

    /// Returns number of planes for this format
    pub fn plane_count(self) -> usize {
        match self {
            VideoFormat::None => 0,
            VideoFormat::I420 | VideoFormat::I010 => 3,
            VideoFormat::NV12 | VideoFormat::P010 => 2,
            VideoFormat::BGRA => 1,
        }
    }

    /// Significant bits per component
    pub fn bit_depth(self) -> u32 {
        match self {
            VideoFormat::I010 | VideoFormat::P010 => 10,
            VideoFormat::None => 0,
            _ => 8,
        }
    }

    /// Bytes used to store one component sample
    pub fn bytes_per_sample(self) -> usize {
        match self {
            VideoFormat::I010 | VideoFormat::P010 => 2,
            VideoFormat::None => 0,
            _ => 1,
        }
    }

    /// Average storage bits per pixel (4:2:0 chroma counted once)
    pub fn bits_per_pixel(self) -> u32 {
        match self {
            VideoFormat::I420 | VideoFormat::NV12 => 12,
            VideoFormat::I010 | VideoFormat::P010 => 24,
            VideoFormat::BGRA => 32,
            VideoFormat::None => 0,
        }
    }

    pub fn is_rgb(self) -> bool {
        self == VideoFormat::BGRA
    }

    pub fn is_supported(self) -> bool {
        self != VideoFormat::None
    }

    /// Calculate tightly packed frame size in bytes
    pub fn calculate_size(self, width: u32, height: u32) -> usize {
        let (w, h) = (width as usize, height as usize);
        let (cw, ch) = ((w + 1) / 2, (h + 1) / 2);
        match self {
            VideoFormat::I420 | VideoFormat::NV12 => w * h + cw * ch * 2,
            VideoFormat::I010 | VideoFormat::P010 => (w * h + cw * ch * 2) * 2,
            VideoFormat::BGRA => w * h * 4,
            VideoFormat::None => 0,
        }
    }

    /// Pitches, plane offsets and total size for an aligned buffer
    pub fn plane_layout(self, width: u32, height: u32) -> PlaneLayout {
        let (w, h) = (width as usize, height as usize);
        let (cw, ch) = ((w + 1) / 2, (h + 1) / 2);
        let bps = self.bytes_per_sample();

        let mut layout = PlaneLayout::default();
        let planes: &[(usize, usize)] = match self {
            VideoFormat::I420 | VideoFormat::I010 => {
                &[(w * bps, h), (cw * bps, ch), (cw * bps, ch)]
            }
            VideoFormat::NV12 | VideoFormat::P010 => &[(w * bps, h), (cw * 2 * bps, ch)],
            VideoFormat::BGRA => &[(w * 4, h)],
            VideoFormat::None => &[],
        };

        let mut offset = 0;
        for (i, &(row_bytes, rows)) in planes.iter().enumerate() {
            let pitch = align_up(row_bytes, FRAME_ALIGNMENT);
            layout.offsets[i] = offset;
            layout.pitches[i] = pitch;
            layout.rows[i] = rows;
            offset += pitch * rows;
        }
        layout.plane_count = planes.len();
        layout.total_size = offset;
        layout
    }
}

impl TryFrom<u32> for VideoFormat {
    type Error = u32;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(VideoFormat::None),
            1 => Ok(VideoFormat::I420),
            2 => Ok(VideoFormat::NV12),
            3 => Ok(VideoFormat::I010),
            4 => Ok(VideoFormat::P010),
            5 => Ok(VideoFormat::BGRA),
            other => Err(other),
        }
    }
}

pub(crate) fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) / align * align
}

/// Memory layout of one frame buffer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaneLayout {
    pub offsets: [usize; 4],
    pub pitches: [usize; 4],
    pub rows: [usize; 4],
    pub plane_count: usize,
    pub total_size: usize,
}

impl PlaneLayout {
    /// Byte range of plane `index` within the buffer
    pub fn plane_range(&self, index: usize) -> std::ops::Range<usize> {
        let start = self.offsets[index];
        start..start + self.pitches[index] * self.rows[index]
    }
}

/// Frame rate as a rational number
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct FrameRate {
    pub num: u32,
    pub den: u32,
}

impl FrameRate {
    pub const fn new(num: u32, den: u32) -> Self {
        Self { num, den }
    }

    /// Zero numerator or denominator means the rate is unspecified
    pub fn is_set(&self) -> bool {
        self.num != 0 && self.den != 0
    }

    /// Same rate, compared as a ratio (30/1 == 60/2)
    pub fn same_rate(&self, other: &FrameRate) -> bool {
        self.num as u64 * other.den as u64 == other.num as u64 * self.den as u64
    }

    pub fn as_f64(&self) -> f64 {
        if self.den == 0 {
            0.0
        } else {
            self.num as f64 / self.den as f64
        }
    }
}

impl Default for FrameRate {
    fn default() -> Self {
        Self { num: 30, den: 1 }
    }
}

/// Rectangle in pixel coordinates
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Pod, Zeroable)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl Rect {
    pub const fn new(x: u32, y: u32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }

    /// Rectangle covering a whole `width` x `height` frame
    pub const fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    pub fn is_empty(&self) -> bool {
        self.w == 0 || self.h == 0
    }

    /// Check the rectangle lies inside a `width` x `height` frame
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        let right = self.x as u64 + self.w as u64;
        let bottom = self.y as u64 + self.h as u64;
        right <= width as u64 && bottom <= height as u64
    }

    pub fn is_full_frame(&self, width: u32, height: u32) -> bool {
        *self == Self::full(width, height)
    }
}

/// Memory locality constraint for pipeline input/output (bitfield)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IoPattern(pub u16);

impl IoPattern {
    pub const IN_VIDEO_MEMORY: u16 = 0x01;
    pub const IN_SYSTEM_MEMORY: u16 = 0x02;
    pub const IN_OPAQUE_MEMORY: u16 = 0x04;
    pub const OUT_VIDEO_MEMORY: u16 = 0x10;
    pub const OUT_SYSTEM_MEMORY: u16 = 0x20;
    pub const OUT_OPAQUE_MEMORY: u16 = 0x40;

    pub fn new(flags: u16) -> Self {
        Self(flags)
    }

    /// System memory on both sides, the only pattern the pipeline supports
    pub fn system_memory() -> Self {
        Self(Self::IN_SYSTEM_MEMORY | Self::OUT_SYSTEM_MEMORY)
    }

    pub fn has_opaque(&self) -> bool {
        self.0 & (Self::IN_OPAQUE_MEMORY | Self::OUT_OPAQUE_MEMORY) != 0
    }

    pub fn has_video_memory(&self) -> bool {
        self.0 & (Self::IN_VIDEO_MEMORY | Self::OUT_VIDEO_MEMORY) != 0
    }

    pub fn bits(&self) -> u16 {
        self.0
    }
}

impl Default for IoPattern {
    fn default() -> Self {
        Self::system_memory()
    }
}

/// Frame description carried by every surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameInfo {
    pub format: VideoFormat,
    pub width: u32,
    pub height: u32,
    pub frame_rate: FrameRate,
    /// Logical output the frame belongs to (0 = decoder output)
    pub channel_id: u16,
}

impl FrameInfo {
    pub fn new(format: VideoFormat, width: u32, height: u32) -> Self {
        Self {
            format,
            width,
            height,
            frame_rate: FrameRate::default(),
            channel_id: DECODER_CHANNEL_ID,
        }
    }

    pub fn with_frame_rate(mut self, frame_rate: FrameRate) -> Self {
        self.frame_rate = frame_rate;
        self
    }

    pub fn with_channel_id(mut self, channel_id: u16) -> Self {
        self.channel_id = channel_id;
        self
    }

    /// Same buffer geometry: format and dimensions match
    pub fn same_geometry(&self, other: &FrameInfo) -> bool {
        self.format == other.format && self.width == other.width && self.height == other.height
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
