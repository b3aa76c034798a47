//! VPL FFI - C Foreign Function Interface
//!
//! C-compatible API over the decode+VPP coordinator. The decoder itself is
//! provided by the caller through a callback table.

use libc::{c_char, c_int};
use std::collections::BTreeSet;
use std::ptr;
use std::slice;

use vpl_decodevpp::{
    check_video_channel_param_decode_vpp, check_video_param_decode_vpp, Codec, DecodeParams,
    DecodeVpp, DecodeVppOutput, OutputBatch,
};
use vpl_video::{FrameInfo, FrameRate, IoPattern, Rect, Result, VideoFormat, VplError};
use vpl_vpp::{
    ChannelParam, FilterKind, PipelineOptions, SoftwareEngine, TargetUsage, VppHints,
    VppOperation,
};

mod decoder_ffi;
mod status;

pub use decoder_ffi::*;
pub use status::*;

use decoder_ffi::{decoder_from_callbacks, CallbackDecoder};

/// Opaque handle to a decode+VPP pipeline (C-compatible)
pub struct VplDecodeVpp {
    _private: [u8; 0],
}

/// Opaque handle to one output batch (C-compatible)
pub struct VplSurfaceArray {
    _private: [u8; 0],
}

type Pipeline = DecodeVpp<CallbackDecoder>;

/// C-compatible frame description
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct VplFrameInfo {
    pub format: u32,
    pub width: u32,
    pub height: u32,
    pub fps_num: u32,
    pub fps_den: u32,
    pub channel_id: u16,
}

/// C-compatible rectangle
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct VplRect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

/// Opaque extended parameter block
#[repr(C)]
pub struct VplExtBuffer {
    pub id: u32,
    pub data: *const u8,
    pub size: usize,
}

/// C-compatible decode parameters
#[repr(C)]
pub struct VplDecodeParams {
    pub codec: u32,
    pub frame_info: VplFrameInfo,
    pub io_pattern: u16,
    pub decoded_order: u8,
    pub ext_params: *const VplExtBuffer,
    pub num_ext_params: usize,
}

/// One requested operation; `kind` is a `FilterKind` bit
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct VplOperation {
    pub kind: u32,
    /// Crop source or composite destination
    pub rect: VplRect,
    /// Scale target
    pub width: u32,
    pub height: u32,
    /// Sharpen / blur strength, 0-100
    pub strength: f64,
}

/// C-compatible channel parameters
#[repr(C)]
pub struct VplChannelParam {
    pub channel_id: u16,
    pub io_pattern: u16,
    pub output: VplFrameInfo,
    pub operations: *const VplOperation,
    pub num_operations: usize,
    /// 1 (best quality) to 7 (best speed), 0 for the default
    pub target_usage: u16,
    /// Bitmask of forbidden `FilterKind`s
    pub do_not_use: u32,
    /// Bitmask of `FilterKind`s that run even as identity stages
    pub do_use: u32,
}

/// Channel configuration as reported back to C
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct VplChannelInfo {
    pub channel_id: u16,
    pub io_pattern: u16,
    pub output: VplFrameInfo,
    pub num_operations: u32,
    pub target_usage: u16,
    pub do_not_use: u32,
    pub do_use: u32,
}

/// One chunk of compressed input
#[repr(C)]
pub struct VplBitstream {
    pub data: *const u8,
    pub size: usize,
    pub timestamp: u64,
}

/// Description of one surface in a [`VplSurfaceArray`]
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct VplSurfaceInfo {
    pub channel_id: u16,
    pub info: VplFrameInfo,
    pub timestamp: u64,
    pub size: usize,
    pub offsets: [usize; 4],
    pub pitches: [usize; 4],
    pub plane_count: u32,
}

// ============================================================================
// CONVERSIONS
// ============================================================================

impl VplFrameInfo {
    pub(crate) fn from_info(info: &FrameInfo) -> Self {
        Self {
            format: info.format as u32,
            width: info.width,
            height: info.height,
            fps_num: info.frame_rate.num,
            fps_den: info.frame_rate.den,
            channel_id: info.channel_id,
        }
    }

    fn to_info(self) -> Result<FrameInfo> {
        let format = VideoFormat::try_from(self.format)
            .map_err(|raw| VplError::invalid(format!("unknown video format {raw}")))?;
        Ok(FrameInfo::new(format, self.width, self.height)
            .with_frame_rate(FrameRate::new(self.fps_num, self.fps_den))
            .with_channel_id(self.channel_id))
    }
}

impl From<VplRect> for Rect {
    fn from(r: VplRect) -> Self {
        Rect::new(r.x, r.y, r.w, r.h)
    }
}

/// Borrow a C array, treating a zero count as empty regardless of the pointer
unsafe fn c_slice<'a, T>(data: *const T, len: usize, what: &'static str) -> Result<&'a [T]> {
    if len == 0 {
        return Ok(&[]);
    }
    if data.is_null() {
        return Err(VplError::NullInput(what));
    }
    Ok(slice::from_raw_parts(data, len))
}

impl VplDecodeParams {
    pub(crate) fn from_params(params: &DecodeParams, ext: &[VplExtBuffer]) -> Self {
        Self {
            codec: params.codec as u32,
            frame_info: VplFrameInfo::from_info(&params.frame_info),
            io_pattern: params.io_pattern.bits(),
            decoded_order: params.decoded_order as u8,
            ext_params: if ext.is_empty() { ptr::null() } else { ext.as_ptr() },
            num_ext_params: ext.len(),
        }
    }

    unsafe fn to_params(&self) -> Result<DecodeParams> {
        let codec = Codec::try_from(self.codec)
            .map_err(|raw| VplError::invalid(format!("unknown codec {raw}")))?;

        // Extended blocks are never accepted, so the array is not read
        if self.num_ext_params != 0 {
            return Err(VplError::invalid(format!(
                "{} extended parameter block(s) not supported",
                self.num_ext_params
            )));
        }

        let mut params = DecodeParams::new(codec, self.frame_info.to_info()?);
        params.io_pattern = IoPattern::new(self.io_pattern);
        params.decoded_order = self.decoded_order != 0;
        Ok(params)
    }
}

impl VplOperation {
    fn to_operation(self) -> Result<VppOperation> {
        let op = match self.kind {
            k if k == FilterKind::Crop as u32 => VppOperation::Crop {
                rect: self.rect.into(),
            },
            k if k == FilterKind::Scale as u32 => VppOperation::Scale {
                width: self.width,
                height: self.height,
            },
            k if k == FilterKind::ColorConvert as u32 => VppOperation::ColorConvert,
            k if k == FilterKind::Composite as u32 => VppOperation::Composite {
                dst: self.rect.into(),
            },
            k if k == FilterKind::Sharpen as u32 => VppOperation::Sharpen {
                strength: self.strength,
            },
            k if k == FilterKind::Blur as u32 => VppOperation::Blur {
                strength: self.strength,
            },
            other => return Err(VplError::invalid(format!("unknown operation kind {other}"))),
        };
        Ok(op)
    }
}

impl VplChannelParam {
    unsafe fn to_param(&self) -> Result<ChannelParam> {
        let operations = c_slice(self.operations, self.num_operations, "channel operations")?
            .iter()
            .map(|op| op.to_operation())
            .collect::<Result<Vec<_>>>()?;
        let target_usage = TargetUsage::from_level(self.target_usage)
            .ok_or_else(|| VplError::invalid(format!("target usage {}", self.target_usage)))?;

        let mut param = ChannelParam::new(self.channel_id, self.output.to_info()?)
            .with_io_pattern(IoPattern::new(self.io_pattern))
            .with_hints(VppHints {
                target_usage,
                do_use: FilterKind::from_mask(self.do_use).collect(),
                do_not_use: FilterKind::from_mask(self.do_not_use).collect(),
            });
        param.operations = operations;
        Ok(param)
    }
}

fn filter_mask(kinds: &BTreeSet<FilterKind>) -> u32 {
    kinds.iter().fold(0, |mask, kind| mask | *kind as u32)
}

impl VplChannelInfo {
    fn from_param(param: &ChannelParam) -> Self {
        Self {
            channel_id: param.channel_id,
            io_pattern: param.io_pattern.bits(),
            output: VplFrameInfo::from_info(&param.output),
            num_operations: param.operations.len() as u32,
            target_usage: param.hints.target_usage as u16,
            do_not_use: filter_mask(&param.hints.do_not_use),
            do_use: filter_mask(&param.hints.do_use),
        }
    }
}

unsafe fn channel_params(params: *const VplChannelParam, count: usize) -> Result<Vec<ChannelParam>> {
    c_slice(params, count, "channel params")?
        .iter()
        .map(|param| param.to_param())
        .collect()
}

unsafe fn pipeline_mut<'a>(ptr: *mut VplDecodeVpp) -> &'a mut Pipeline {
    &mut *(ptr as *mut Pipeline)
}

// ============================================================================
// DECODE+VPP PIPELINE API
// ============================================================================

/// Create a pipeline around a caller-provided decoder
///
/// Returns null if `callbacks` is null or any callback is missing.
/// `surface_pool_depth` of 0 selects the default depth.
///
/// # Safety
/// `callbacks` must be null or point to a valid callback table.
#[no_mangle]
pub unsafe extern "C" fn vpl_decodevpp_create(
    callbacks: *const VplDecoderCallbacks,
    surface_pool_depth: u32,
) -> *mut VplDecodeVpp {
    if callbacks.is_null() {
        return ptr::null_mut();
    }

    let decoder = match decoder_from_callbacks(&*callbacks) {
        Ok(decoder) => decoder,
        Err(e) => {
            log::warn!("vpl_decodevpp_create: {}", e);
            return ptr::null_mut();
        }
    };

    let mut options = PipelineOptions::default();
    if surface_pool_depth > 0 {
        options.surface_pool_depth = surface_pool_depth as usize;
    }

    let pipeline: Box<Pipeline> =
        Box::new(DecodeVpp::new(decoder, std::sync::Arc::new(SoftwareEngine::new()), options));
    Box::into_raw(pipeline) as *mut VplDecodeVpp
}

/// Destroy a pipeline, closing it first
///
/// # Safety
/// Caller must ensure ptr is valid and not already freed.
#[no_mangle]
pub unsafe extern "C" fn vpl_decodevpp_destroy(ptr: *mut VplDecodeVpp) {
    if !ptr.is_null() {
        let _ = Box::from_raw(ptr as *mut Pipeline);
    }
}

/// Initialize the decoder and `num_channels` VPP channels
///
/// # Safety
/// Caller must ensure all pointers are valid; `channels` must hold
/// `num_channels` entries.
#[no_mangle]
pub unsafe extern "C" fn vpl_decodevpp_init(
    ptr: *mut VplDecodeVpp,
    params: *const VplDecodeParams,
    channels: *const VplChannelParam,
    num_channels: usize,
) -> c_int {
    if ptr.is_null() || params.is_null() {
        return VPL_STATUS_NULL_PTR;
    }

    let pipeline = pipeline_mut(ptr);
    let result = (*params).to_params().and_then(|params| {
        let channels = channel_params(channels, num_channels)?;
        pipeline.init_decode_vpp(&params, &channels)
    });
    status_of(result, "vpl_decodevpp_init")
}

/// Reset with new parameters; the channel topology may change
///
/// # Safety
/// Same contract as [`vpl_decodevpp_init`].
#[no_mangle]
pub unsafe extern "C" fn vpl_decodevpp_reset(
    ptr: *mut VplDecodeVpp,
    params: *const VplDecodeParams,
    channels: *const VplChannelParam,
    num_channels: usize,
) -> c_int {
    if ptr.is_null() || params.is_null() {
        return VPL_STATUS_NULL_PTR;
    }

    let pipeline = pipeline_mut(ptr);
    let result = (*params).to_params().and_then(|params| {
        let channels = channel_params(channels, num_channels)?;
        pipeline.reset(&params, &channels)
    });
    status_of(result, "vpl_decodevpp_reset")
}

/// Close the pipeline; safe to call more than once
///
/// # Safety
/// Caller must ensure ptr is valid.
#[no_mangle]
pub unsafe extern "C" fn vpl_decodevpp_close(ptr: *mut VplDecodeVpp) -> c_int {
    if ptr.is_null() {
        return VPL_STATUS_NULL_PTR;
    }
    pipeline_mut(ptr).close();
    VPL_STATUS_OK
}

/// Decode one frame and run it through every channel not in `skip`
///
/// A null `bitstream` (or one with size 0) drains the decoder. On success
/// `*out` receives a surface array, or null when every output was skipped.
/// `VPL_STATUS_MORE_DATA` means no frame was produced; during a drain it
/// marks the end of the stream.
///
/// # Safety
/// Caller must ensure all pointers are valid; `skip` must hold `num_skip`
/// entries. A returned array must be released with
/// [`vpl_surface_array_release`].
#[no_mangle]
pub unsafe extern "C" fn vpl_decodevpp_decode_frame(
    ptr: *mut VplDecodeVpp,
    bitstream: *const VplBitstream,
    skip: *const u16,
    num_skip: usize,
    out: *mut *mut VplSurfaceArray,
) -> c_int {
    if ptr.is_null() || out.is_null() {
        return VPL_STATUS_NULL_PTR;
    }
    *out = ptr::null_mut();

    let skip = match c_slice(skip, num_skip, "skip list") {
        Ok(skip) => skip,
        Err(e) => return error_code(&e),
    };
    let bitstream = if bitstream.is_null() {
        None
    } else {
        match c_slice((*bitstream).data, (*bitstream).size, "bitstream data") {
            Ok(data) => Some(vpl_decodevpp::Bitstream::new(data).with_timestamp((*bitstream).timestamp)),
            Err(e) => return error_code(&e),
        }
    };

    match pipeline_mut(ptr).decode_vpp_frame(bitstream.as_ref(), skip) {
        Ok(DecodeVppOutput::Batch(batch)) => {
            *out = Box::into_raw(Box::new(batch)) as *mut VplSurfaceArray;
            VPL_STATUS_OK
        }
        Ok(DecodeVppOutput::NoOutput) => VPL_STATUS_OK,
        Ok(DecodeVppOutput::MoreData) | Ok(DecodeVppOutput::EndOfStream) => VPL_STATUS_MORE_DATA,
        Err(e) => {
            log::debug!("vpl_decodevpp_decode_frame failed: {}", e);
            error_code(&e)
        }
    }
}

/// Look up the configuration of one channel
///
/// # Safety
/// Caller must ensure ptr and out are valid.
#[no_mangle]
pub unsafe extern "C" fn vpl_decodevpp_get_channel_param(
    ptr: *const VplDecodeVpp,
    channel_id: u16,
    out: *mut VplChannelInfo,
) -> c_int {
    if ptr.is_null() || out.is_null() {
        return VPL_STATUS_NULL_PTR;
    }

    let pipeline = &*(ptr as *const Pipeline);
    match pipeline.get_channel_param(channel_id) {
        Ok(param) => {
            *out = VplChannelInfo::from_param(&param);
            VPL_STATUS_OK
        }
        Err(e) => error_code(&e),
    }
}

/// Number of VPP channels, excluding the decoder output
///
/// # Safety
/// Caller must ensure ptr is valid.
#[no_mangle]
pub unsafe extern "C" fn vpl_decodevpp_get_channel_count(ptr: *const VplDecodeVpp) -> u32 {
    if ptr.is_null() {
        return 0;
    }
    let pipeline = &*(ptr as *const Pipeline);
    pipeline.get_vpp_channel_count() as u32
}

// ============================================================================
// SURFACE ARRAY API
// ============================================================================

unsafe fn batch_ref<'a>(ptr: *const VplSurfaceArray) -> &'a OutputBatch {
    &*(ptr as *const OutputBatch)
}

/// Number of surfaces in the array
///
/// # Safety
/// Caller must ensure ptr is valid.
#[no_mangle]
pub unsafe extern "C" fn vpl_surface_array_len(ptr: *const VplSurfaceArray) -> u32 {
    if ptr.is_null() {
        return 0;
    }
    batch_ref(ptr).len() as u32
}

/// Describe surface `index`
///
/// # Safety
/// Caller must ensure ptr and out are valid.
#[no_mangle]
pub unsafe extern "C" fn vpl_surface_array_get_info(
    ptr: *const VplSurfaceArray,
    index: u32,
    out: *mut VplSurfaceInfo,
) -> c_int {
    if ptr.is_null() || out.is_null() {
        return VPL_STATUS_NULL_PTR;
    }

    let Some((channel_id, surface)) = batch_ref(ptr).iter().nth(index as usize) else {
        return VPL_STATUS_NOT_FOUND;
    };
    let layout = surface.plane_layout();
    *out = VplSurfaceInfo {
        channel_id,
        info: VplFrameInfo::from_info(&surface.info()),
        timestamp: surface.timestamp(),
        size: layout.total_size,
        offsets: layout.offsets,
        pitches: layout.pitches,
        plane_count: layout.plane_count as u32,
    };
    VPL_STATUS_OK
}

/// Copy the pixel data of surface `index` into `dst`
///
/// # Safety
/// Caller must ensure ptr is valid and `dst` holds `dst_len` bytes.
#[no_mangle]
pub unsafe extern "C" fn vpl_surface_array_copy_data(
    ptr: *const VplSurfaceArray,
    index: u32,
    dst: *mut u8,
    dst_len: usize,
) -> c_int {
    if ptr.is_null() || dst.is_null() {
        return VPL_STATUS_NULL_PTR;
    }

    let Some((_, surface)) = batch_ref(ptr).iter().nth(index as usize) else {
        return VPL_STATUS_NOT_FOUND;
    };
    let size = surface.plane_layout().total_size;
    if dst_len < size {
        return VPL_STATUS_NOT_ENOUGH_BUFFER;
    }

    let data = surface.data();
    ptr::copy_nonoverlapping(data.as_ptr(), dst, size);
    VPL_STATUS_OK
}

/// Release every surface reference held by the array
///
/// # Safety
/// Caller must ensure ptr is valid and not already released.
#[no_mangle]
pub unsafe extern "C" fn vpl_surface_array_release(ptr: *mut VplSurfaceArray) {
    if !ptr.is_null() {
        let _ = Box::from_raw(ptr as *mut OutputBatch);
    }
}

// ============================================================================
// PARAMETER CHECKS
// ============================================================================

/// Validate decode parameters without creating a pipeline
///
/// # Safety
/// Caller must ensure params is valid.
#[no_mangle]
pub unsafe extern "C" fn vpl_check_video_param_decode_vpp(params: *const VplDecodeParams) -> c_int {
    if params.is_null() {
        return VPL_STATUS_NULL_PTR;
    }
    let result = (*params)
        .to_params()
        .and_then(|params| check_video_param_decode_vpp(&params));
    status_of(result, "vpl_check_video_param_decode_vpp")
}

/// Validate a channel parameter array without creating a pipeline
///
/// # Safety
/// Caller must ensure `channels` holds `num_channels` entries.
#[no_mangle]
pub unsafe extern "C" fn vpl_check_video_channel_param_decode_vpp(
    channels: *const VplChannelParam,
    num_channels: usize,
) -> c_int {
    let result = channel_params(channels, num_channels)
        .and_then(|channels| check_video_channel_param_decode_vpp(&channels));
    status_of(result, "vpl_check_video_channel_param_decode_vpp")
}

// ============================================================================
// UTILITY FUNCTIONS
// ============================================================================

/// Get library version string
///
/// # Safety
/// Returns a static string, safe to call.
#[no_mangle]
pub extern "C" fn vpl_version() -> *const c_char {
    "0.1.0\0".as_ptr() as *const c_char
}
