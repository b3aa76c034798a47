//! Decode+VPP coordinator
//!
//! Drives one decoder and N VPP channels in lockstep: every decode call that
//! yields a frame fans it out to the channels and returns the decoded surface
//! (channel 0) plus each channel's processed surface as one ordered batch.

use crate::decoder::{DecodeStatus, Decoder};
use crate::params::{Bitstream, DecodeParams};
use crate::validate::{check_video_channel_param_decode_vpp, check_video_param_decode_vpp};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use vpl_video::{PoolStats, Result, Surface, SurfacePool, VplError, DECODER_CHANNEL_ID};
use vpl_vpp::{ChannelParam, FilterEngine, PipelineOptions, SoftwareEngine, VppChannel, VppConfig};

/// Lifecycle of a [`DecodeVpp`] instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Uninitialized,
    /// Configured, no frame produced yet (also right after a reset)
    Initialized,
    /// At least one frame decoded since the last (re)initialization
    Running,
    Closed,
}

impl PipelineState {
    fn is_live(self) -> bool {
        matches!(self, PipelineState::Initialized | PipelineState::Running)
    }
}

/// Surfaces produced by one decode+VPP cycle
///
/// Entries are in fan-out order: the decoder output first (unless skipped),
/// then each channel in configuration order. Every surface carries one
/// reference owned by the batch; dropping the batch releases them all.
#[derive(Debug, Default)]
pub struct OutputBatch {
    entries: Vec<(u16, Surface)>,
}

impl OutputBatch {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    fn push(&mut self, channel_id: u16, surface: Surface) {
        self.entries.push((channel_id, surface));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn channel_ids(&self) -> Vec<u16> {
        self.entries.iter().map(|(id, _)| *id).collect()
    }

    /// Surface of `channel_id`, if it is part of this batch
    pub fn get(&self, channel_id: u16) -> Option<&Surface> {
        self.entries
            .iter()
            .find(|(id, _)| *id == channel_id)
            .map(|(_, surface)| surface)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u16, &Surface)> {
        self.entries.iter().map(|(id, surface)| (*id, surface))
    }

    pub fn into_surfaces(self) -> Vec<Surface> {
        self.entries.into_iter().map(|(_, surface)| surface).collect()
    }
}

impl IntoIterator for OutputBatch {
    type Item = (u16, Surface);
    type IntoIter = std::vec::IntoIter<(u16, Surface)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Result of one `decode_vpp_frame` call
#[derive(Debug)]
pub enum DecodeVppOutput {
    Batch(OutputBatch),
    /// A frame was decoded but every output was on the skip list
    NoOutput,
    /// The decoder needs more bitstream
    MoreData,
    /// Drain complete
    EndOfStream,
}

impl DecodeVppOutput {
    pub fn into_batch(self) -> Option<OutputBatch> {
        match self {
            DecodeVppOutput::Batch(batch) => Some(batch),
            _ => None,
        }
    }

    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, DecodeVppOutput::EndOfStream)
    }
}

/// Combined decoder and multi-channel VPP
///
/// Not thread-safe by construction: every mutating call takes `&mut self`.
pub struct DecodeVpp<D: Decoder> {
    decoder: D,
    decoder_open: bool,
    engine: Arc<dyn FilterEngine>,
    options: PipelineOptions,
    state: PipelineState,

    // Owned copies of the active configuration
    decode_params: Option<DecodeParams>,
    channel_params: Vec<ChannelParam>,

    channels: Vec<VppChannel>,
    decode_pool: Option<SurfacePool>,

    // Statistics
    frames_decoded: u64,
    outputs_skipped: u64,
}

impl<D: Decoder> DecodeVpp<D> {
    pub fn new(decoder: D, engine: Arc<dyn FilterEngine>, options: PipelineOptions) -> Self {
        Self {
            decoder,
            decoder_open: false,
            engine,
            options,
            state: PipelineState::Uninitialized,
            decode_params: None,
            channel_params: Vec::new(),
            channels: Vec::new(),
            decode_pool: None,
            frames_decoded: 0,
            outputs_skipped: 0,
        }
    }

    /// Coordinator backed by the software filter engine and default options
    pub fn with_software_engine(decoder: D) -> Self {
        Self::new(decoder, Arc::new(SoftwareEngine::new()), PipelineOptions::default())
    }

    /// Validate, then initialize the decoder and every VPP channel
    pub fn init_decode_vpp(&mut self, params: &DecodeParams, channels: &[ChannelParam]) -> Result<()> {
        if self.state.is_live() {
            return Err(VplError::AlreadyInitialized("decode+vpp pipeline"));
        }

        check_video_param_decode_vpp(params)?;
        check_video_channel_param_decode_vpp(channels)?;

        // A previous reset may have failed half way and left the decoder open
        self.close_decoder();

        self.decoder.init(params)?;
        self.decoder_open = true;

        if let Err(e) = self.build_vpp(params, channels) {
            log::warn!("decode+vpp init failed: {}", e);
            self.close_decoder();
            self.state = PipelineState::Uninitialized;
            return Err(e);
        }

        self.frames_decoded = 0;
        self.outputs_skipped = 0;
        self.state = PipelineState::Initialized;
        log::info!(
            "decode+vpp initialized: {:?} {:?} {}x{} with {} channel(s)",
            params.codec,
            params.frame_info.format,
            params.frame_info.width,
            params.frame_info.height,
            channels.len()
        );
        Ok(())
    }

    /// Rebuild the VPP side on top of an open decoder
    ///
    /// Previous channels and pools are dropped first; a failure leaves the
    /// VPP side empty. On success the pipeline is ready to decode, which also
    /// recovers from a reset that failed after the decoder was reset.
    pub fn init_vpp(&mut self, params: &DecodeParams, channels: &[ChannelParam]) -> Result<()> {
        if !self.decoder_open {
            return Err(VplError::NotInitialized("decoder"));
        }

        check_video_param_decode_vpp(params)?;
        check_video_channel_param_decode_vpp(channels)?;

        if let Err(e) = self.build_vpp(params, channels) {
            log::warn!("vpp init failed: {}", e);
            self.state = PipelineState::Uninitialized;
            return Err(e);
        }

        self.state = PipelineState::Initialized;
        log::info!("vpp initialized with {} channel(s)", channels.len());
        Ok(())
    }

    fn build_vpp(&mut self, params: &DecodeParams, channels: &[ChannelParam]) -> Result<()> {
        self.discard_vpp();

        let decode_info = params.frame_info.with_channel_id(DECODER_CHANNEL_ID);
        let decode_pool = SurfacePool::new(decode_info, self.options.surface_pool_depth)?;

        let mut built = Vec::with_capacity(channels.len());
        for channel in channels {
            let config = VppConfig::new(params.frame_info, channel.clone());
            built.push(VppChannel::init(config, self.engine.as_ref(), &self.options)?);
        }

        self.decode_pool = Some(decode_pool);
        self.channels = built;
        self.decode_params = Some(params.clone());
        self.channel_params = channels.to_vec();
        Ok(())
    }

    /// Decode one frame and fan it out to every channel not in `skip_channels`
    ///
    /// `None` or an empty bitstream drains the decoder. On error every
    /// reference taken during the cycle has been released.
    pub fn decode_vpp_frame(
        &mut self,
        bitstream: Option<&Bitstream>,
        skip_channels: &[u16],
    ) -> Result<DecodeVppOutput> {
        if !self.state.is_live() {
            return Err(VplError::NotInitialized("decode+vpp pipeline"));
        }
        let decode_pool = self
            .decode_pool
            .as_ref()
            .ok_or(VplError::NotInitialized("decode surface pool"))?;

        let skip: HashSet<u16> = skip_channels.iter().copied().collect();

        let reserved = self
            .channels
            .iter()
            .map(VppChannel::get_output_surface)
            .collect::<Result<Vec<_>>>()?;
        let decoded = decode_pool.acquire()?;

        let bitstream = bitstream.filter(|bs| !bs.is_empty());
        match self.decoder.decode_frame(bitstream, &decoded) {
            Ok(DecodeStatus::FrameReady) => {}
            Ok(DecodeStatus::MoreData) => return Ok(DecodeVppOutput::MoreData),
            Ok(DecodeStatus::EndOfStream) => {
                log::debug!("decode+vpp drained after {} frames", self.frames_decoded);
                return Ok(DecodeVppOutput::EndOfStream);
            }
            Err(e) => {
                log::warn!("decode failed: {}", e);
                return Err(e);
            }
        }

        self.frames_decoded += 1;
        self.state = PipelineState::Running;

        let mut batch = OutputBatch::with_capacity(self.channels.len() + 1);

        decoded.set_channel_id(DECODER_CHANNEL_ID);
        if skip.contains(&DECODER_CHANNEL_ID) {
            self.outputs_skipped += 1;
        } else {
            batch.push(DECODER_CHANNEL_ID, decoded.add_ref());
        }

        for (channel, output) in self.channels.iter_mut().zip(&reserved) {
            let channel_id = channel.channel_id();
            if skip.contains(&channel_id) {
                self.outputs_skipped += 1;
                continue;
            }

            if let Err(e) = channel.process_frame(Some(&decoded), Some(output)) {
                log::warn!(
                    "vpp channel {} failed on frame {}, dropping {} output(s): {}",
                    channel_id,
                    self.frames_decoded,
                    batch.len(),
                    e
                );
                return Err(e);
            }
            output.set_channel_id(channel_id);
            batch.push(channel_id, output.add_ref());
        }

        log::trace!(
            "decode+vpp frame {} -> channels {:?}",
            self.frames_decoded,
            batch.channel_ids()
        );

        if batch.is_empty() {
            Ok(DecodeVppOutput::NoOutput)
        } else {
            Ok(DecodeVppOutput::Batch(batch))
        }
    }

    /// Configuration of the channel with `channel_id`
    pub fn get_channel_param(&self, channel_id: u16) -> Result<ChannelParam> {
        if !self.state.is_live() {
            return Err(VplError::NotInitialized("decode+vpp pipeline"));
        }
        self.channel_params
            .iter()
            .find(|param| param.channel_id == channel_id)
            .cloned()
            .ok_or_else(|| VplError::NotFound(format!("vpp channel {channel_id}")))
    }

    /// Number of VPP channels, excluding the decoder output
    pub fn get_vpp_channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Reinitialize with new parameters, keeping the decoder instance
    ///
    /// The VPP side is rebuilt completely, so the channel topology may change.
    pub fn reset(&mut self, params: &DecodeParams, channels: &[ChannelParam]) -> Result<()> {
        if !self.state.is_live() {
            return Err(VplError::NotInitialized("decode+vpp pipeline"));
        }

        check_video_param_decode_vpp(params)?;
        check_video_channel_param_decode_vpp(channels)?;

        self.decoder.reset(params)?;

        if let Err(e) = self.build_vpp(params, channels) {
            log::warn!("decode+vpp reset failed: {}", e);
            self.state = PipelineState::Uninitialized;
            return Err(e);
        }

        self.state = PipelineState::Initialized;
        log::info!("decode+vpp reset with {} channel(s)", channels.len());
        Ok(())
    }

    /// Release everything; safe to call repeatedly
    pub fn close(&mut self) {
        let was_live = self.state.is_live();
        self.close_decoder();
        self.discard_vpp();
        self.state = PipelineState::Closed;

        if was_live {
            log::info!(
                "decode+vpp closed after {} frames ({} outputs skipped)",
                self.frames_decoded,
                self.outputs_skipped
            );
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn decoder(&self) -> &D {
        &self.decoder
    }

    pub fn decoder_mut(&mut self) -> &mut D {
        &mut self.decoder
    }

    pub fn decode_params(&self) -> Option<&DecodeParams> {
        self.decode_params.as_ref()
    }

    pub fn channels(&self) -> &[VppChannel] {
        &self.channels
    }

    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded
    }

    pub fn outputs_skipped(&self) -> u64 {
        self.outputs_skipped
    }

    pub fn decode_pool_stats(&self) -> Option<PoolStats> {
        self.decode_pool.as_ref().map(SurfacePool::stats)
    }

    fn close_decoder(&mut self) {
        if self.decoder_open {
            self.decoder.close();
            self.decoder_open = false;
        }
    }

    fn discard_vpp(&mut self) {
        for channel in self.channels.drain(..) {
            channel.close();
        }
        self.decode_pool = None;
        self.decode_params = None;
        self.channel_params.clear();
    }
}

impl<D: Decoder> Drop for DecodeVpp<D> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<D: Decoder + fmt::Debug> fmt::Debug for DecodeVpp<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodeVpp")
            .field("decoder", &self.decoder)
            .field("state", &self.state)
            .field("channels", &self.channels)
            .field("frames_decoded", &self.frames_decoded)
            .finish()
    }
}
