//! Numeric status codes of the C API

use libc::c_int;
use vpl_video::VplError;

pub const VPL_STATUS_OK: c_int = 0;
pub const VPL_STATUS_NULL_PTR: c_int = -2;
pub const VPL_STATUS_UNSUPPORTED: c_int = -3;
pub const VPL_STATUS_NOT_ENOUGH_BUFFER: c_int = -5;
pub const VPL_STATUS_NOT_INITIALIZED: c_int = -8;
pub const VPL_STATUS_NOT_FOUND: c_int = -9;
/// Decoder needs more input; during a drain it means the decoder is empty
pub const VPL_STATUS_MORE_DATA: c_int = -10;
pub const VPL_STATUS_INCOMPATIBLE_VIDEO_PARAM: c_int = -14;
pub const VPL_STATUS_INVALID_VIDEO_PARAM: c_int = -15;
pub const VPL_STATUS_UNDEFINED_BEHAVIOR: c_int = -16;
pub const VPL_STATUS_DEVICE_FAILED: c_int = -17;

pub fn error_code(error: &VplError) -> c_int {
    match error {
        VplError::InvalidParameter(_) => VPL_STATUS_INVALID_VIDEO_PARAM,
        VplError::IncompatibleParameter(_) => VPL_STATUS_INCOMPATIBLE_VIDEO_PARAM,
        VplError::NullInput(_) => VPL_STATUS_NULL_PTR,
        VplError::NotInitialized(_) => VPL_STATUS_NOT_INITIALIZED,
        VplError::NotFound(_) => VPL_STATUS_NOT_FOUND,
        VplError::Unsupported(_) => VPL_STATUS_UNSUPPORTED,
        VplError::AlreadyInitialized(_) => VPL_STATUS_UNDEFINED_BEHAVIOR,
        VplError::NotEnoughBuffer { .. } => VPL_STATUS_NOT_ENOUGH_BUFFER,
        VplError::DeviceFailed(_) => VPL_STATUS_DEVICE_FAILED,
    }
}

/// Collapse a result into a status code, logging failures
pub fn status_of(result: Result<(), VplError>, call: &str) -> c_int {
    match result {
        Ok(()) => VPL_STATUS_OK,
        Err(e) => {
            log::debug!("{} failed: {}", call, e);
            error_code(&e)
        }
    }
}

/// Error for a failure code returned by a caller-supplied callback
pub fn callback_error(code: c_int, callback: &'static str) -> VplError {
    match code {
        VPL_STATUS_NULL_PTR => VplError::NullInput(callback),
        VPL_STATUS_UNSUPPORTED => VplError::Unsupported(format!("{callback} callback")),
        VPL_STATUS_NOT_ENOUGH_BUFFER => VplError::NotEnoughBuffer { capacity: 0 },
        VPL_STATUS_NOT_INITIALIZED => VplError::NotInitialized(callback),
        VPL_STATUS_NOT_FOUND => VplError::NotFound(format!("{callback} callback")),
        VPL_STATUS_INCOMPATIBLE_VIDEO_PARAM => {
            VplError::incompatible(format!("rejected by {callback} callback"))
        }
        VPL_STATUS_INVALID_VIDEO_PARAM => VplError::invalid(format!("rejected by {callback} callback")),
        VPL_STATUS_UNDEFINED_BEHAVIOR => VplError::AlreadyInitialized(callback),
        other => VplError::DeviceFailed(format!("{callback} callback returned {other}")),
    }
}
