//! Bitstream decoder boundary

use crate::params::{Bitstream, DecodeParams};
use vpl_video::{Result, Surface};

/// Outcome of one decode call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStatus {
    /// A frame was written into the output surface
    FrameReady,
    /// More bitstream is needed before the next frame
    MoreData,
    /// Drain finished; no buffered frames remain
    EndOfStream,
}

/// Decoder collaborator driven by the decode+VPP coordinator
///
/// `decode_frame` with `None` is a drain request: flush pipelined frames
/// without consuming new input.
pub trait Decoder: Send {
    fn init(&mut self, params: &DecodeParams) -> Result<()>;

    /// Reinitialize in place; the decoder instance is kept
    fn reset(&mut self, params: &DecodeParams) -> Result<()>;

    fn close(&mut self);

    fn decode_frame(&mut self, bitstream: Option<&Bitstream>, output: &Surface)
        -> Result<DecodeStatus>;
}
