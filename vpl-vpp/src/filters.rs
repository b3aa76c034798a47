//! Software filter kernels on the 4:4:4 working image
//!
//! Row loops run in parallel with rayon; scale factors use glam vectors.
//! The kernels are simple (nearest-neighbour, box, unsharp mask) and are not
//! meant to be bit-exact with any hardware implementation.

use glam::Vec2;
use rayon::prelude::*;
use vpl_video::{Rect, WorkingImage, MAX_SAMPLE};

/// Copy `rect` out of `src`
pub fn crop(src: &WorkingImage, rect: Rect) -> WorkingImage {
    let mut out = WorkingImage::black(rect.w, rect.h);
    let (sw, ow) = (src.width as usize, rect.w as usize);

    for plane in 0..3 {
        out.planes[plane]
            .par_chunks_mut(ow)
            .enumerate()
            .for_each(|(row, line)| {
                let start = (rect.y as usize + row) * sw + rect.x as usize;
                line.copy_from_slice(&src.planes[plane][start..start + ow]);
            });
    }
    out
}

/// Nearest-neighbour resize to `width` x `height`
pub fn scale(src: &WorkingImage, width: u32, height: u32) -> WorkingImage {
    if (src.width, src.height) == (width, height) {
        return src.clone();
    }

    let mut out = WorkingImage::black(width, height);
    let ratio = Vec2::new(
        src.width as f32 / width as f32,
        src.height as f32 / height as f32,
    );
    let max = Vec2::new((src.width - 1) as f32, (src.height - 1) as f32);
    let sw = src.width as usize;

    for plane in 0..3 {
        out.planes[plane]
            .par_chunks_mut(width as usize)
            .enumerate()
            .for_each(|(row, line)| {
                for (col, sample) in line.iter_mut().enumerate() {
                    let pos = ((Vec2::new(col as f32, row as f32) + 0.5) * ratio)
                        .floor()
                        .min(max);
                    *sample = src.planes[plane][pos.y as usize * sw + pos.x as usize];
                }
            });
    }
    out
}

/// Scale `src` into `dst` on a black `width` x `height` canvas
pub fn composite(src: &WorkingImage, dst: Rect, width: u32, height: u32) -> WorkingImage {
    let placed = scale(src, dst.w, dst.h);
    let mut canvas = WorkingImage::black(width, height);
    let (cw, pw) = (width as usize, dst.w as usize);

    for plane in 0..3 {
        for row in 0..dst.h as usize {
            let to = (dst.y as usize + row) * cw + dst.x as usize;
            canvas.planes[plane][to..to + pw]
                .copy_from_slice(&placed.planes[plane][row * pw..(row + 1) * pw]);
        }
    }
    canvas
}

/// Mean over a (2r+1)^2 window with clamped edges
fn box_filter(plane: &[u16], width: usize, height: usize, radius: usize) -> Vec<u16> {
    let mut out = vec![0u16; plane.len()];
    out.par_chunks_mut(width)
        .enumerate()
        .for_each(|(y, line)| {
            let y0 = y.saturating_sub(radius);
            let y1 = (y + radius).min(height - 1);
            for (x, sample) in line.iter_mut().enumerate() {
                let x0 = x.saturating_sub(radius);
                let x1 = (x + radius).min(width - 1);
                let mut sum = 0u32;
                for yy in y0..=y1 {
                    for xx in x0..=x1 {
                        sum += plane[yy * width + xx] as u32;
                    }
                }
                let count = ((y1 - y0 + 1) * (x1 - x0 + 1)) as u32;
                *sample = ((sum + count / 2) / count) as u16;
            }
        });
    out
}

/// Box blur on all planes; strength 0-100 maps to radius 1-3
pub fn blur(image: &mut WorkingImage, strength: f64) {
    let radius = 1 + (strength / 34.0) as usize;
    let (w, h) = (image.width as usize, image.height as usize);
    for plane in image.planes.iter_mut() {
        *plane = box_filter(plane, w, h, radius);
    }
}

/// Unsharp mask on luma; strength 0-100 maps to gain 0-2
pub fn sharpen(image: &mut WorkingImage, strength: f64) {
    let gain = (strength / 50.0) as f32;
    let (w, h) = (image.width as usize, image.height as usize);
    let blurred = box_filter(&image.planes[0], w, h, 1);

    image.planes[0]
        .par_iter_mut()
        .zip(blurred.par_iter())
        .for_each(|(sample, &soft)| {
            let detail = *sample as f32 - soft as f32;
            *sample = (*sample as f32 + gain * detail)
                .round()
                .clamp(0.0, MAX_SAMPLE as f32) as u16;
        });
}
