//! Decode-side parameters and bitstream chunks

use vpl_video::{FrameInfo, IoPattern};

/// Compressed stream type
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Codec {
    Avc = 1,
    Hevc = 2,
    Av1 = 3,
    Vp9 = 4,
    Mpeg2 = 5,
    Jpeg = 6,
}

impl TryFrom<u32> for Codec {
    type Error = u32;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Codec::Avc),
            2 => Ok(Codec::Hevc),
            3 => Ok(Codec::Av1),
            4 => Ok(Codec::Vp9),
            5 => Ok(Codec::Mpeg2),
            6 => Ok(Codec::Jpeg),
            other => Err(other),
        }
    }
}

/// Opaque extended parameter block attached to decode parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtBuffer {
    pub id: u32,
    pub payload: Vec<u8>,
}

/// Decoder configuration
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeParams {
    pub codec: Codec,
    /// Decoded frame description; also the input of every VPP channel
    pub frame_info: FrameInfo,
    pub io_pattern: IoPattern,
    /// Output in decode order instead of display order
    pub decoded_order: bool,
    pub ext_params: Vec<ExtBuffer>,
}

impl DecodeParams {
    pub fn new(codec: Codec, frame_info: FrameInfo) -> Self {
        Self {
            codec,
            frame_info,
            io_pattern: IoPattern::new(IoPattern::OUT_SYSTEM_MEMORY),
            decoded_order: false,
            ext_params: Vec::new(),
        }
    }
}

/// One chunk of compressed input
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Bitstream {
    pub data: Vec<u8>,
    pub timestamp: u64,
}

impl Bitstream {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            timestamp: 0,
        }
    }

    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// An empty chunk is treated as a drain request
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vpl_video::VideoFormat;

    #[test]
    fn test_decode_params_defaults() {
        let params = DecodeParams::new(Codec::Hevc, FrameInfo::new(VideoFormat::I420, 128, 96));
        assert_eq!(params.io_pattern.bits(), IoPattern::OUT_SYSTEM_MEMORY);
        assert!(!params.decoded_order);
        assert!(params.ext_params.is_empty());
    }

    #[test]
    fn test_codec_from_u32() {
        assert_eq!(Codec::try_from(2), Ok(Codec::Hevc));
        assert_eq!(Codec::try_from(0), Err(0));
    }

    #[test]
    fn test_empty_bitstream_is_drain() {
        assert!(Bitstream::default().is_empty());
        let bs = Bitstream::new(vec![0, 0, 1]).with_timestamp(33);
        assert!(!bs.is_empty());
        assert_eq!(bs.timestamp, 33);
    }
}
