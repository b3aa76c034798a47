//! In-process decoder producing deterministic test frames
//!
//! Every accepted bitstream chunk becomes one frame. The first `latency`
//! chunks only fill the pipeline, so the decoder answers `MoreData` until
//! then, and a drain flushes whatever is still buffered.

use crate::decoder::{DecodeStatus, Decoder};
use crate::params::{Bitstream, DecodeParams};
use std::collections::VecDeque;
use vpl_video::{pack_from_working, Result, Surface, VplError, WorkingImage, NEUTRAL_CHROMA};

/// Luma gradient range, in 10-bit working samples
const LUMA_MIN: u32 = 64;
const LUMA_SPAN: u32 = 876;

/// Decoder that synthesises gradient frames instead of parsing a bitstream
#[derive(Debug, Default)]
pub struct SyntheticDecoder {
    latency: usize,
    params: Option<DecodeParams>,
    pending: VecDeque<u64>,
    frames_emitted: u64,
    fail_at_frame: Option<u64>,
    init_count: u32,
    reset_count: u32,
    close_count: u32,
}

impl SyntheticDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold back `latency` frames before the first output
    pub fn with_latency(mut self, latency: usize) -> Self {
        self.latency = latency;
        self
    }

    /// Fail the decode call that would emit frame `index` (0-based)
    pub fn fail_at_frame(&mut self, index: Option<u64>) {
        self.fail_at_frame = index;
    }

    pub fn params(&self) -> Option<&DecodeParams> {
        self.params.as_ref()
    }

    pub fn frames_emitted(&self) -> u64 {
        self.frames_emitted
    }

    pub fn buffered(&self) -> usize {
        self.pending.len()
    }

    pub fn init_count(&self) -> u32 {
        self.init_count
    }

    pub fn reset_count(&self) -> u32 {
        self.reset_count
    }

    pub fn close_count(&self) -> u32 {
        self.close_count
    }

    /// Expected luma of frame `index` at (x, y), as a 10-bit sample
    pub fn luma_at(index: u64, x: u32, y: u32) -> u16 {
        let step = (x as u64 + y as u64 + index * 8) % LUMA_SPAN as u64;
        (LUMA_MIN + step as u32) as u16
    }

    fn emit(&mut self, timestamp: u64, output: &Surface) -> Result<DecodeStatus> {
        let params = self
            .params
            .as_ref()
            .ok_or(VplError::NotInitialized("synthetic decoder"))?;

        let index = self.frames_emitted;
        if self.fail_at_frame == Some(index) {
            return Err(VplError::DeviceFailed(format!(
                "injected decode failure at frame {index}"
            )));
        }

        let info = output.info();
        if !info.same_geometry(&params.frame_info) {
            return Err(VplError::invalid(format!(
                "decode surface is {:?} {}x{}, stream is {:?} {}x{}",
                info.format,
                info.width,
                info.height,
                params.frame_info.format,
                params.frame_info.width,
                params.frame_info.height
            )));
        }

        let mut image = WorkingImage::filled(info.width, info.height, [0, NEUTRAL_CHROMA, NEUTRAL_CHROMA]);
        for y in 0..info.height {
            for x in 0..info.width {
                let i = image.index(x, y);
                image.planes[0][i] = Self::luma_at(index, x, y);
            }
        }

        {
            let layout = output.plane_layout();
            let mut data = output.data();
            pack_from_working(&image, info.format, &mut data, &layout)?;
        }
        output.set_timestamp(timestamp);

        self.frames_emitted += 1;
        log::trace!("synthetic decoder emitted frame {} (ts {})", index, timestamp);
        Ok(DecodeStatus::FrameReady)
    }
}

impl Decoder for SyntheticDecoder {
    fn init(&mut self, params: &DecodeParams) -> Result<()> {
        if self.params.is_some() {
            return Err(VplError::AlreadyInitialized("synthetic decoder"));
        }
        self.params = Some(params.clone());
        self.pending.clear();
        self.init_count += 1;
        Ok(())
    }

    fn reset(&mut self, params: &DecodeParams) -> Result<()> {
        if self.params.is_none() {
            return Err(VplError::NotInitialized("synthetic decoder"));
        }
        self.params = Some(params.clone());
        self.pending.clear();
        self.reset_count += 1;
        Ok(())
    }

    fn close(&mut self) {
        self.params = None;
        self.pending.clear();
        self.close_count += 1;
    }

    fn decode_frame(&mut self, bitstream: Option<&Bitstream>, output: &Surface) -> Result<DecodeStatus> {
        if self.params.is_none() {
            return Err(VplError::NotInitialized("synthetic decoder"));
        }

        match bitstream.filter(|bs| !bs.is_empty()) {
            Some(bs) => {
                self.pending.push_back(bs.timestamp);
                if self.pending.len() <= self.latency {
                    return Ok(DecodeStatus::MoreData);
                }
            }
            None if self.pending.is_empty() => return Ok(DecodeStatus::EndOfStream),
            None => {}
        }

        // A failed emit keeps the frame queued for the next call
        let Some(&timestamp) = self.pending.front() else {
            return Ok(DecodeStatus::MoreData);
        };
        let status = self.emit(timestamp, output)?;
        self.pending.pop_front();
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::Codec;
    use vpl_video::{unpack_to_working, FrameInfo, SurfacePool, VideoFormat};

    fn params() -> DecodeParams {
        DecodeParams::new(Codec::Avc, FrameInfo::new(VideoFormat::I420, 64, 48))
    }

    fn chunk(ts: u64) -> Bitstream {
        Bitstream::new(vec![0, 0, 0, 1]).with_timestamp(ts)
    }

    #[test]
    fn test_decode_before_init_fails() {
        let pool = SurfacePool::new(params().frame_info, 1).unwrap();
        let surface = pool.acquire().unwrap();
        let mut decoder = SyntheticDecoder::new();
        assert!(matches!(
            decoder.decode_frame(Some(&chunk(0)), &surface),
            Err(VplError::NotInitialized(_))
        ));
    }

    #[test]
    fn test_zero_latency_emits_each_chunk() {
        let pool = SurfacePool::new(params().frame_info, 1).unwrap();
        let surface = pool.acquire().unwrap();
        let mut decoder = SyntheticDecoder::new();
        decoder.init(&params()).unwrap();

        assert_eq!(decoder.decode_frame(Some(&chunk(40)), &surface).unwrap(), DecodeStatus::FrameReady);
        assert_eq!(surface.timestamp(), 40);
        assert_eq!(decoder.decode_frame(None, &surface).unwrap(), DecodeStatus::EndOfStream);
    }

    #[test]
    fn test_latency_and_drain() {
        let pool = SurfacePool::new(params().frame_info, 1).unwrap();
        let surface = pool.acquire().unwrap();
        let mut decoder = SyntheticDecoder::new().with_latency(2);
        decoder.init(&params()).unwrap();

        assert_eq!(decoder.decode_frame(Some(&chunk(1)), &surface).unwrap(), DecodeStatus::MoreData);
        assert_eq!(decoder.decode_frame(Some(&chunk(2)), &surface).unwrap(), DecodeStatus::MoreData);
        assert_eq!(decoder.decode_frame(Some(&chunk(3)), &surface).unwrap(), DecodeStatus::FrameReady);
        assert_eq!(surface.timestamp(), 1);
        assert_eq!(decoder.buffered(), 2);

        // Empty chunk drains like None
        assert_eq!(decoder.decode_frame(Some(&Bitstream::default()), &surface).unwrap(), DecodeStatus::FrameReady);
        assert_eq!(surface.timestamp(), 2);
        assert_eq!(decoder.decode_frame(None, &surface).unwrap(), DecodeStatus::FrameReady);
        assert_eq!(surface.timestamp(), 3);
        assert_eq!(decoder.decode_frame(None, &surface).unwrap(), DecodeStatus::EndOfStream);
        assert_eq!(decoder.frames_emitted(), 3);
    }

    #[test]
    fn test_frame_content_is_gradient() {
        let info = params().frame_info;
        let pool = SurfacePool::new(info, 1).unwrap();
        let surface = pool.acquire().unwrap();
        let mut decoder = SyntheticDecoder::new();
        decoder.init(&params()).unwrap();
        decoder.decode_frame(Some(&chunk(0)), &surface).unwrap();
        decoder.decode_frame(Some(&chunk(1)), &surface).unwrap();

        let layout = surface.plane_layout();
        let image = unpack_to_working(info.format, info.width, info.height, &surface.data(), &layout).unwrap();
        // I420 keeps the upper 8 bits of each sample
        for (x, y) in [(0, 0), (10, 3), (63, 47)] {
            let expected = SyntheticDecoder::luma_at(1, x, y) & !0x3;
            assert_eq!(image.sample(0, x, y), expected);
        }
        assert_eq!(image.sample(1, 5, 5), NEUTRAL_CHROMA);
    }

    #[test]
    fn test_injected_failure() {
        let pool = SurfacePool::new(params().frame_info, 1).unwrap();
        let surface = pool.acquire().unwrap();
        let mut decoder = SyntheticDecoder::new();
        decoder.init(&params()).unwrap();
        decoder.fail_at_frame(Some(0));
        assert!(matches!(
            decoder.decode_frame(Some(&chunk(0)), &surface),
            Err(VplError::DeviceFailed(_))
        ));
        assert_eq!(decoder.buffered(), 1);

        // Draining after the failure delivers the same frame
        decoder.fail_at_frame(None);
        assert_eq!(decoder.decode_frame(None, &surface).unwrap(), DecodeStatus::FrameReady);
        assert_eq!(surface.timestamp(), 0);
        assert_eq!(decoder.frames_emitted(), 1);
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_lifecycle_counters() {
        let mut decoder = SyntheticDecoder::new();
        assert!(matches!(decoder.reset(&params()), Err(VplError::NotInitialized(_))));
        decoder.init(&params()).unwrap();
        assert!(matches!(decoder.init(&params()), Err(VplError::AlreadyInitialized(_))));
        decoder.reset(&params()).unwrap();
        decoder.close();
        assert_eq!(
            (decoder.init_count(), decoder.reset_count(), decoder.close_count()),
            (1, 1, 1)
        );
        assert!(decoder.params().is_none());
    }
}
