//! Scalar pixel-format conversion through a 4:4:4 working image
//!
//! Every supported surface format unpacks into [`WorkingImage`]: three
//! full-resolution planes (Y, Cb, Cr) of 10-bit samples. Filters operate on
//! the working image and the result is packed into the destination format.
//! RGB uses BT.601 limited-range coefficients.

use crate::error::{Result, VplError};
use crate::types::{PlaneLayout, VideoFormat};

/// 10-bit limited-range black
pub const BLACK_LUMA: u16 = 16 << 2;
pub const NEUTRAL_CHROMA: u16 = 128 << 2;
pub const MAX_SAMPLE: u16 = 1023;

/// Full-resolution YCbCr image with 10-bit samples
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkingImage {
    pub width: u32,
    pub height: u32,
    pub planes: [Vec<u16>; 3],
}

impl WorkingImage {
    /// Image filled with a constant (Y, Cb, Cr) value
    pub fn filled(width: u32, height: u32, value: [u16; 3]) -> Self {
        let len = width as usize * height as usize;
        Self {
            width,
            height,
            planes: [
                vec![value[0]; len],
                vec![value[1]; len],
                vec![value[2]; len],
            ],
        }
    }

    /// Black limited-range canvas
    pub fn black(width: u32, height: u32) -> Self {
        Self::filled(width, height, [BLACK_LUMA, NEUTRAL_CHROMA, NEUTRAL_CHROMA])
    }

    #[inline]
    pub fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    pub fn sample(&self, plane: usize, x: u32, y: u32) -> u16 {
        self.planes[plane][self.index(x, y)]
    }
}

#[inline]
fn read_u16(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([data[offset], data[offset + 1]])
}

#[inline]
fn write_u16(data: &mut [u8], offset: usize, value: u16) {
    data[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

#[inline]
fn clip8(value: i32) -> u8 {
    value.clamp(0, 255) as u8
}

/// BT.601 limited range, 8-bit in / 8-bit out
#[inline]
pub fn rgb_to_yuv(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let (r, g, b) = (r as i32, g as i32, b as i32);
    let y = ((66 * r + 129 * g + 25 * b + 128) >> 8) + 16;
    let u = ((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128;
    let v = ((112 * r - 94 * g - 18 * b + 128) >> 8) + 128;
    (clip8(y), clip8(u), clip8(v))
}

/// Inverse of [`rgb_to_yuv`]
#[inline]
pub fn yuv_to_rgb(y: u8, u: u8, v: u8) -> (u8, u8, u8) {
    let c = y as i32 - 16;
    let d = u as i32 - 128;
    let e = v as i32 - 128;
    let r = (298 * c + 409 * e + 128) >> 8;
    let g = (298 * c - 100 * d - 208 * e + 128) >> 8;
    let b = (298 * c + 516 * d + 128) >> 8;
    (clip8(r), clip8(g), clip8(b))
}

fn check_buffer(format: VideoFormat, layout: &PlaneLayout, len: usize) -> Result<()> {
    if !format.is_supported() {
        return Err(VplError::invalid(format!("cannot convert {format:?}")));
    }
    if layout.plane_count != format.plane_count() || len < layout.total_size {
        return Err(VplError::invalid(format!(
            "{format:?} buffer of {len} bytes does not match layout ({} bytes, {} planes)",
            layout.total_size, layout.plane_count
        )));
    }
    Ok(())
}

/// Unpack a surface buffer into a 4:4:4 working image
pub fn unpack_to_working(
    format: VideoFormat,
    width: u32,
    height: u32,
    data: &[u8],
    layout: &PlaneLayout,
) -> Result<WorkingImage> {
    check_buffer(format, layout, data.len())?;

    let mut image = WorkingImage::black(width, height);
    let (w, h) = (width as usize, height as usize);
    let pitch = layout.pitches;
    let off = layout.offsets;

    for y in 0..h {
        for x in 0..w {
            let i = y * w + x;
            let (cx, cy) = (x / 2, y / 2);
            let (luma, cb, cr) = match format {
                VideoFormat::I420 => (
                    (data[off[0] + y * pitch[0] + x] as u16) << 2,
                    (data[off[1] + cy * pitch[1] + cx] as u16) << 2,
                    (data[off[2] + cy * pitch[2] + cx] as u16) << 2,
                ),
                VideoFormat::NV12 => {
                    let uv = off[1] + cy * pitch[1] + cx * 2;
                    (
                        (data[off[0] + y * pitch[0] + x] as u16) << 2,
                        (data[uv] as u16) << 2,
                        (data[uv + 1] as u16) << 2,
                    )
                }
                VideoFormat::I010 => (
                    read_u16(data, off[0] + y * pitch[0] + x * 2) & MAX_SAMPLE,
                    read_u16(data, off[1] + cy * pitch[1] + cx * 2) & MAX_SAMPLE,
                    read_u16(data, off[2] + cy * pitch[2] + cx * 2) & MAX_SAMPLE,
                ),
                VideoFormat::P010 => {
                    let uv = off[1] + cy * pitch[1] + cx * 4;
                    (
                        read_u16(data, off[0] + y * pitch[0] + x * 2) >> 6,
                        read_u16(data, uv) >> 6,
                        read_u16(data, uv + 2) >> 6,
                    )
                }
                VideoFormat::BGRA => {
                    let px = off[0] + y * pitch[0] + x * 4;
                    let (yy, u, v) = rgb_to_yuv(data[px + 2], data[px + 1], data[px]);
                    ((yy as u16) << 2, (u as u16) << 2, (v as u16) << 2)
                }
                VideoFormat::None => unreachable!("rejected by check_buffer"),
            };
            image.planes[0][i] = luma;
            image.planes[1][i] = cb;
            image.planes[2][i] = cr;
        }
    }

    Ok(image)
}

/// Average one 2x2 chroma block of the working image
fn chroma_average(image: &WorkingImage, plane: usize, cx: usize, cy: usize) -> u16 {
    let (w, h) = (image.width as usize, image.height as usize);
    let x0 = (cx * 2).min(w - 1);
    let x1 = (cx * 2 + 1).min(w - 1);
    let y0 = (cy * 2).min(h - 1);
    let y1 = (cy * 2 + 1).min(h - 1);
    let p = &image.planes[plane];
    let sum = p[y0 * w + x0] as u32 + p[y0 * w + x1] as u32 + p[y1 * w + x0] as u32 + p[y1 * w + x1] as u32;
    ((sum + 2) / 4) as u16
}

/// Pack a working image into a surface buffer of `format`
pub fn pack_from_working(
    image: &WorkingImage,
    format: VideoFormat,
    data: &mut [u8],
    layout: &PlaneLayout,
) -> Result<()> {
    check_buffer(format, layout, data.len())?;

    let (w, h) = (image.width as usize, image.height as usize);
    let pitch = layout.pitches;
    let off = layout.offsets;
    let to8 = |v: u16| (v.min(MAX_SAMPLE) >> 2) as u8;

    if format == VideoFormat::BGRA {
        for y in 0..h {
            for x in 0..w {
                let i = y * w + x;
                let (r, g, b) = yuv_to_rgb(
                    to8(image.planes[0][i]),
                    to8(image.planes[1][i]),
                    to8(image.planes[2][i]),
                );
                let px = off[0] + y * pitch[0] + x * 4;
                data[px..px + 4].copy_from_slice(&[b, g, r, 0xFF]);
            }
        }
        return Ok(());
    }

    for y in 0..h {
        for x in 0..w {
            let luma = image.planes[0][y * w + x].min(MAX_SAMPLE);
            match format {
                VideoFormat::I420 | VideoFormat::NV12 => data[off[0] + y * pitch[0] + x] = to8(luma),
                VideoFormat::I010 => write_u16(data, off[0] + y * pitch[0] + x * 2, luma),
                VideoFormat::P010 => write_u16(data, off[0] + y * pitch[0] + x * 2, luma << 6),
                _ => {}
            }
        }
    }

    for cy in 0..(h + 1) / 2 {
        for cx in 0..(w + 1) / 2 {
            let cb = chroma_average(image, 1, cx, cy).min(MAX_SAMPLE);
            let cr = chroma_average(image, 2, cx, cy).min(MAX_SAMPLE);
            match format {
                VideoFormat::I420 => {
                    data[off[1] + cy * pitch[1] + cx] = to8(cb);
                    data[off[2] + cy * pitch[2] + cx] = to8(cr);
                }
                VideoFormat::NV12 => {
                    let uv = off[1] + cy * pitch[1] + cx * 2;
                    data[uv] = to8(cb);
                    data[uv + 1] = to8(cr);
                }
                VideoFormat::I010 => {
                    write_u16(data, off[1] + cy * pitch[1] + cx * 2, cb);
                    write_u16(data, off[2] + cy * pitch[2] + cx * 2, cr);
                }
                VideoFormat::P010 => {
                    let uv = off[1] + cy * pitch[1] + cx * 4;
                    write_u16(data, uv, cb << 6);
                    write_u16(data, uv + 2, cr << 6);
                }
                _ => {}
            }
        }
    }

    Ok(())
}
