//! Parameter validation for the combined decode+VPP pipeline
//!
//! Value errors are `InvalidParameter`; structurally valid requests this
//! pipeline cannot serve (opaque memory) are `IncompatibleParameter`.

use crate::params::DecodeParams;
use std::collections::HashSet;
use vpl_video::{FrameInfo, IoPattern, Result, VplError, DECODER_CHANNEL_ID};
use vpl_vpp::{check_io_pattern, ChannelParam};

/// Largest accepted frame edge
pub const MAX_FRAME_DIMENSION: u32 = 16384;

/// Checks shared by decode and channel frame descriptions
pub fn check_frame_info(info: &FrameInfo) -> Result<()> {
    if !info.format.is_supported() {
        return Err(VplError::invalid(format!("unsupported format {:?}", info.format)));
    }
    if info.width == 0 || info.height == 0 {
        return Err(VplError::invalid(format!(
            "frame size {}x{} has a zero dimension",
            info.width, info.height
        )));
    }
    if info.width > MAX_FRAME_DIMENSION || info.height > MAX_FRAME_DIMENSION {
        return Err(VplError::invalid(format!(
            "frame size {}x{} exceeds {}",
            info.width, info.height, MAX_FRAME_DIMENSION
        )));
    }
    if !info.format.is_rgb() && (info.width % 2 != 0 || info.height % 2 != 0) {
        return Err(VplError::invalid(format!(
            "{:?} needs even dimensions, got {}x{}",
            info.format, info.width, info.height
        )));
    }
    let rate = info.frame_rate;
    if rate.den == 0 && rate.num != 0 {
        return Err(VplError::invalid(format!(
            "frame rate {}/0 has a zero denominator",
            rate.num
        )));
    }
    Ok(())
}

/// Validate decode parameters for use with decode+VPP
pub fn check_video_param_decode_vpp(params: &DecodeParams) -> Result<()> {
    check_frame_info(&params.frame_info)?;

    let io = params.io_pattern;
    if io.bits() != IoPattern::OUT_SYSTEM_MEMORY {
        if io.has_opaque() {
            return Err(VplError::incompatible(format!(
                "decode io pattern {:#x} uses opaque memory",
                io.bits()
            )));
        }
        return Err(VplError::invalid(format!(
            "decode io pattern {:#x}, expected system memory output",
            io.bits()
        )));
    }

    if params.decoded_order {
        return Err(VplError::Unsupported("decoded-order output".to_string()));
    }

    if let Some(ext) = params.ext_params.first() {
        return Err(VplError::invalid(format!(
            "{} extended parameter block(s) attached, first id {:#x}",
            params.ext_params.len(),
            ext.id
        )));
    }

    Ok(())
}

/// Validate the channel list of a decode+VPP configuration
pub fn check_video_channel_param_decode_vpp(channels: &[ChannelParam]) -> Result<()> {
    if channels.is_empty() {
        return Err(VplError::invalid("no vpp channels given"));
    }

    let mut seen = HashSet::with_capacity(channels.len());
    for channel in channels {
        let id = channel.channel_id;
        if id == DECODER_CHANNEL_ID {
            return Err(VplError::invalid(format!(
                "channel id {DECODER_CHANNEL_ID} is reserved for decoder output"
            )));
        }
        if !seen.insert(id) {
            return Err(VplError::invalid(format!("duplicate channel id {id}")));
        }
        check_io_pattern(channel.io_pattern)?;
        check_frame_info(&channel.output)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{Codec, ExtBuffer};
    use vpl_video::{FrameRate, VideoFormat};

    fn decode_params() -> DecodeParams {
        DecodeParams::new(Codec::Hevc, FrameInfo::new(VideoFormat::I420, 128, 96))
    }

    fn channel(id: u16) -> ChannelParam {
        ChannelParam::new(id, FrameInfo::new(VideoFormat::I420, 320, 240))
    }

    #[test]
    fn test_valid_decode_params() {
        assert!(check_video_param_decode_vpp(&decode_params()).is_ok());
    }

    #[test]
    fn test_frame_info_checks() {
        let mut params = decode_params();
        params.frame_info.format = VideoFormat::None;
        assert!(matches!(check_video_param_decode_vpp(&params), Err(VplError::InvalidParameter(_))));

        let mut params = decode_params();
        params.frame_info.width = 0;
        assert!(matches!(check_video_param_decode_vpp(&params), Err(VplError::InvalidParameter(_))));

        let mut params = decode_params();
        params.frame_info.height = 95;
        assert!(matches!(check_video_param_decode_vpp(&params), Err(VplError::InvalidParameter(_))));

        let mut params = decode_params();
        params.frame_info.frame_rate = FrameRate { num: 30, den: 0 };
        assert!(matches!(check_video_param_decode_vpp(&params), Err(VplError::InvalidParameter(_))));

        // Unspecified rate is fine
        let mut params = decode_params();
        params.frame_info.frame_rate = FrameRate { num: 0, den: 0 };
        assert!(check_video_param_decode_vpp(&params).is_ok());
    }

    #[test]
    fn test_odd_size_allowed_for_rgb() {
        let info = FrameInfo::new(VideoFormat::BGRA, 101, 33);
        assert!(check_frame_info(&info).is_ok());
    }

    #[test]
    fn test_decode_io_pattern() {
        let mut params = decode_params();
        params.io_pattern = IoPattern::new(IoPattern::OUT_OPAQUE_MEMORY);
        assert!(matches!(
            check_video_param_decode_vpp(&params),
            Err(VplError::IncompatibleParameter(_))
        ));

        params.io_pattern = IoPattern::new(IoPattern::OUT_VIDEO_MEMORY);
        assert!(matches!(check_video_param_decode_vpp(&params), Err(VplError::InvalidParameter(_))));
    }

    #[test]
    fn test_decoded_order_unsupported() {
        let mut params = decode_params();
        params.decoded_order = true;
        assert!(matches!(check_video_param_decode_vpp(&params), Err(VplError::Unsupported(_))));
    }

    #[test]
    fn test_ext_params_rejected() {
        let mut params = decode_params();
        params.ext_params.push(ExtBuffer {
            id: 0x4f43_5053,
            payload: vec![1, 2, 3],
        });
        assert!(matches!(check_video_param_decode_vpp(&params), Err(VplError::InvalidParameter(_))));
    }

    #[test]
    fn test_channel_list_checks() {
        assert!(check_video_channel_param_decode_vpp(&[channel(1), channel(2)]).is_ok());
        assert!(matches!(check_video_channel_param_decode_vpp(&[]), Err(VplError::InvalidParameter(_))));
        assert!(matches!(
            check_video_channel_param_decode_vpp(&[channel(0)]),
            Err(VplError::InvalidParameter(_))
        ));
        assert!(matches!(
            check_video_channel_param_decode_vpp(&[channel(3), channel(3)]),
            Err(VplError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_channel_io_and_output() {
        let opaque = channel(1).with_io_pattern(IoPattern::new(
            IoPattern::IN_OPAQUE_MEMORY | IoPattern::OUT_SYSTEM_MEMORY,
        ));
        assert!(matches!(
            check_video_channel_param_decode_vpp(&[opaque]),
            Err(VplError::IncompatibleParameter(_))
        ));

        let video = channel(1).with_io_pattern(IoPattern::new(IoPattern::OUT_VIDEO_MEMORY));
        assert!(matches!(
            check_video_channel_param_decode_vpp(&[video]),
            Err(VplError::InvalidParameter(_))
        ));

        let odd = ChannelParam::new(2, FrameInfo::new(VideoFormat::NV12, 321, 240));
        assert!(matches!(
            check_video_channel_param_decode_vpp(&[channel(1), odd]),
            Err(VplError::InvalidParameter(_))
        ));
    }
}
