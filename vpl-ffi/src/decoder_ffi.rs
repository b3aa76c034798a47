//! Decoder supplied by the C caller as a callback table

use crate::status::{callback_error, VPL_STATUS_MORE_DATA, VPL_STATUS_OK};
use crate::{VplBitstream, VplDecodeParams, VplExtBuffer, VplFrameInfo};
use libc::{c_int, c_void};
use std::ptr;
use vpl_decodevpp::{Bitstream, DecodeParams, DecodeStatus, Decoder};
use vpl_video::{Result, Surface, VplError};

pub type VplDecoderInitFn =
    unsafe extern "C" fn(user_data: *mut c_void, params: *const VplDecodeParams) -> c_int;
pub type VplDecoderCloseFn = unsafe extern "C" fn(user_data: *mut c_void);
/// `bitstream` is null for a drain. Return 0 when `target` was filled,
/// `VPL_STATUS_MORE_DATA` when no frame is available.
pub type VplDecoderDecodeFn = unsafe extern "C" fn(
    user_data: *mut c_void,
    bitstream: *const VplBitstream,
    target: *mut VplDecodeTarget,
) -> c_int;

/// Decoder vtable
#[repr(C)]
#[derive(Clone, Copy)]
pub struct VplDecoderCallbacks {
    pub user_data: *mut c_void,
    pub init: Option<VplDecoderInitFn>,
    pub reset: Option<VplDecoderInitFn>,
    pub close: Option<VplDecoderCloseFn>,
    pub decode: Option<VplDecoderDecodeFn>,
}

/// Surface memory handed to the decode callback
#[repr(C)]
pub struct VplDecodeTarget {
    pub data: *mut u8,
    pub size: usize,
    pub info: VplFrameInfo,
    pub offsets: [usize; 4],
    pub pitches: [usize; 4],
    pub plane_count: u32,
    /// Written by the callback
    pub timestamp: u64,
}

/// `Decoder` backed by a [`VplDecoderCallbacks`] table
pub(crate) struct CallbackDecoder {
    callbacks: VplDecoderCallbacks,
    init: VplDecoderInitFn,
    reset: VplDecoderInitFn,
    close: VplDecoderCloseFn,
    decode: VplDecoderDecodeFn,
}

// The caller guarantees `user_data` may be used from the thread that drives
// the pipeline; calls are never concurrent.
unsafe impl Send for CallbackDecoder {}

impl CallbackDecoder {
    /// None if any callback is missing
    pub(crate) fn new(callbacks: VplDecoderCallbacks) -> Option<Self> {
        Some(Self {
            init: callbacks.init?,
            reset: callbacks.reset?,
            close: callbacks.close?,
            decode: callbacks.decode?,
            callbacks,
        })
    }

    fn call_init(&self, f: VplDecoderInitFn, params: &DecodeParams, name: &'static str) -> Result<()> {
        let ext: Vec<VplExtBuffer> = params
            .ext_params
            .iter()
            .map(|buffer| VplExtBuffer {
                id: buffer.id,
                data: buffer.payload.as_ptr(),
                size: buffer.payload.len(),
            })
            .collect();
        let c_params = VplDecodeParams::from_params(params, &ext);

        let code = unsafe { f(self.callbacks.user_data, &c_params) };
        if code == VPL_STATUS_OK {
            Ok(())
        } else {
            log::warn!("decoder {} callback returned {}", name, code);
            Err(callback_error(code, name))
        }
    }
}

impl Decoder for CallbackDecoder {
    fn init(&mut self, params: &DecodeParams) -> Result<()> {
        self.call_init(self.init, params, "init")
    }

    fn reset(&mut self, params: &DecodeParams) -> Result<()> {
        self.call_init(self.reset, params, "reset")
    }

    fn close(&mut self) {
        unsafe { (self.close)(self.callbacks.user_data) }
    }

    fn decode_frame(&mut self, bitstream: Option<&Bitstream>, output: &Surface) -> Result<DecodeStatus> {
        let c_bitstream = bitstream.map(|bs| VplBitstream {
            data: bs.data.as_ptr(),
            size: bs.data.len(),
            timestamp: bs.timestamp,
        });
        let bitstream_ptr = c_bitstream
            .as_ref()
            .map_or(ptr::null(), |bs| bs as *const VplBitstream);

        let layout = output.plane_layout();
        let code = {
            let mut data = output.data();
            let mut target = VplDecodeTarget {
                data: data.as_mut_ptr(),
                size: data.len(),
                info: VplFrameInfo::from_info(&output.info()),
                offsets: layout.offsets,
                pitches: layout.pitches,
                plane_count: layout.plane_count as u32,
                timestamp: 0,
            };
            let code = unsafe { (self.decode)(self.callbacks.user_data, bitstream_ptr, &mut target) };
            if code == VPL_STATUS_OK {
                output.set_timestamp(target.timestamp);
            }
            code
        };

        match code {
            VPL_STATUS_OK => Ok(DecodeStatus::FrameReady),
            VPL_STATUS_MORE_DATA if bitstream.is_none() => Ok(DecodeStatus::EndOfStream),
            VPL_STATUS_MORE_DATA => Ok(DecodeStatus::MoreData),
            other => {
                log::warn!("decoder decode callback returned {}", other);
                Err(callback_error(other, "decode"))
            }
        }
    }
}

/// Reject a callback table with missing entries
pub(crate) fn decoder_from_callbacks(callbacks: &VplDecoderCallbacks) -> Result<CallbackDecoder> {
    CallbackDecoder::new(*callbacks).ok_or(VplError::NullInput("decoder callback"))
}
