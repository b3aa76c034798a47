//! End-to-end decode+VPP behaviour with the synthetic decoder

use std::sync::Arc;
use vpl_decodevpp::{
    check_video_param_decode_vpp, Bitstream, Codec, DecodeParams, DecodeVpp, DecodeVppOutput,
    PipelineState, SyntheticDecoder,
};
use vpl_video::{
    unpack_to_working, FrameInfo, FrameRate, IoPattern, Surface, VideoFormat, VplError,
};
use vpl_vpp::{
    ChannelParam, FilterEngine, FilterGraph, PipelineOptions, PipelinePlan, PullStatus,
    SoftwareEngine, VppOperation,
};

fn hevc_128x96() -> DecodeParams {
    DecodeParams::new(Codec::Hevc, FrameInfo::new(VideoFormat::I420, 128, 96))
}

fn channel_320x240(id: u16) -> ChannelParam {
    ChannelParam::new(id, FrameInfo::new(VideoFormat::I420, 320, 240))
}

fn chunk(ts: u64) -> Bitstream {
    Bitstream::new(vec![0, 0, 1, 0x40]).with_timestamp(ts)
}

fn pipeline(channels: &[ChannelParam]) -> DecodeVpp<SyntheticDecoder> {
    let mut pipeline = DecodeVpp::with_software_engine(SyntheticDecoder::new());
    pipeline.init_decode_vpp(&hevc_128x96(), channels).unwrap();
    pipeline
}

fn size_of(surface: &Surface) -> (u32, u32) {
    surface.info().size()
}

#[test]
fn test_single_channel_batch() {
    let mut pipeline = pipeline(&[channel_320x240(1)]);

    let batch = pipeline
        .decode_vpp_frame(Some(&chunk(0)), &[])
        .unwrap()
        .into_batch()
        .unwrap();

    let entries: Vec<_> = batch.iter().map(|(id, s)| (id, size_of(s))).collect();
    assert_eq!(entries, vec![(0, (128, 96)), (1, (320, 240))]);
    assert_eq!(batch.get(0).unwrap().channel_id(), 0);
    assert_eq!(batch.get(1).unwrap().channel_id(), 1);
}

#[test]
fn test_skip_decoder_output() {
    let mut pipeline = pipeline(&[channel_320x240(1)]);

    let batch = pipeline
        .decode_vpp_frame(Some(&chunk(0)), &[0])
        .unwrap()
        .into_batch()
        .unwrap();

    assert_eq!(batch.len(), 1);
    let surface = batch.get(1).unwrap();
    assert_eq!(size_of(surface), (320, 240));

    // The decoded frame went back to its pool instead of into the batch
    let stats = pipeline.decode_pool_stats().unwrap();
    assert_eq!(stats.in_use, 0);
    assert_eq!(stats.available, stats.capacity);
}

#[test]
fn test_batch_order_follows_configuration() {
    let channels = [
        ChannelParam::new(7, FrameInfo::new(VideoFormat::NV12, 64, 48)),
        channel_320x240(3),
        ChannelParam::new(5, FrameInfo::new(VideoFormat::BGRA, 128, 96)),
    ];
    let mut pipeline = pipeline(&channels);

    let skip_lists: [&[u16]; 6] = [&[], &[0], &[3], &[7, 5], &[0, 3, 42], &[5, 5]];
    for (i, skip) in skip_lists.iter().enumerate() {
        let out = pipeline.decode_vpp_frame(Some(&chunk(i as u64)), skip).unwrap();
        let ids = out.into_batch().map(|b| b.channel_ids()).unwrap_or_default();

        let expected: Vec<u16> = [0u16, 7, 3, 5]
            .into_iter()
            .filter(|id| !skip.contains(id))
            .collect();
        assert_eq!(ids, expected, "skip list {skip:?}");
    }
}

#[test]
fn test_all_outputs_skipped() {
    let mut pipeline = pipeline(&[channel_320x240(1), channel_320x240(2)]);
    let out = pipeline.decode_vpp_frame(Some(&chunk(0)), &[0, 1, 2]).unwrap();
    assert!(matches!(out, DecodeVppOutput::NoOutput));
    assert_eq!(pipeline.frames_decoded(), 1);
}

#[test]
fn test_channel_count_after_init_and_reset() {
    for n in 1..=4u16 {
        let channels: Vec<_> = (1..=n).map(channel_320x240).collect();
        let mut pipeline = pipeline(&channels);
        assert_eq!(pipeline.get_vpp_channel_count(), n as usize);

        let fewer: Vec<_> = (1..=n.div_ceil(2)).map(channel_320x240).collect();
        pipeline.reset(&hevc_128x96(), &fewer).unwrap();
        assert_eq!(pipeline.get_vpp_channel_count(), fewer.len());
    }
}

#[test]
fn test_reset_replaces_topology() {
    let mut pipeline = pipeline(&[channel_320x240(1), channel_320x240(2)]);
    pipeline.decode_vpp_frame(Some(&chunk(0)), &[]).unwrap();

    let new_channels = [
        ChannelParam::new(9, FrameInfo::new(VideoFormat::NV12, 64, 48)),
        channel_320x240(2),
        ChannelParam::new(4, FrameInfo::new(VideoFormat::BGRA, 256, 192)),
    ];
    pipeline.reset(&hevc_128x96(), &new_channels).unwrap();

    assert_eq!(pipeline.get_vpp_channel_count(), 3);
    assert!(matches!(pipeline.get_channel_param(1), Err(VplError::NotFound(_))));
    assert_eq!(pipeline.get_channel_param(9).unwrap(), new_channels[0]);
    assert_eq!(pipeline.get_channel_param(2).unwrap(), new_channels[1]);

    // Same decoder instance, reset in place
    assert_eq!(pipeline.decoder().init_count(), 1);
    assert_eq!(pipeline.decoder().reset_count(), 1);
    assert_eq!(pipeline.decoder().close_count(), 0);

    let batch = pipeline
        .decode_vpp_frame(Some(&chunk(1)), &[])
        .unwrap()
        .into_batch()
        .unwrap();
    assert_eq!(batch.channel_ids(), vec![0, 9, 2, 4]);
}

#[test]
fn test_reset_with_new_resolution() {
    let mut pipeline = pipeline(&[channel_320x240(1)]);
    let params = DecodeParams::new(Codec::Hevc, FrameInfo::new(VideoFormat::NV12, 64, 32));
    pipeline.reset(&params, &[channel_320x240(1)]).unwrap();

    let batch = pipeline
        .decode_vpp_frame(Some(&chunk(0)), &[])
        .unwrap()
        .into_batch()
        .unwrap();
    let decoded = batch.get(0).unwrap();
    assert_eq!(decoded.info().format, VideoFormat::NV12);
    assert_eq!(size_of(decoded), (64, 32));
}

#[test]
fn test_reset_before_init() {
    let mut pipeline = DecodeVpp::with_software_engine(SyntheticDecoder::new());
    assert!(matches!(
        pipeline.reset(&hevc_128x96(), &[channel_320x240(1)]),
        Err(VplError::NotInitialized(_))
    ));
}

#[test]
fn test_double_close() {
    let mut pipeline = pipeline(&[channel_320x240(1)]);
    pipeline.close();
    pipeline.close();

    assert_eq!(pipeline.state(), PipelineState::Closed);
    assert_eq!(pipeline.get_vpp_channel_count(), 0);
    assert!(matches!(
        pipeline.decode_vpp_frame(Some(&chunk(0)), &[]),
        Err(VplError::NotInitialized(_))
    ));
    assert_eq!(pipeline.decoder().close_count(), 1);
}

#[test]
fn test_decode_before_init() {
    let mut pipeline = DecodeVpp::with_software_engine(SyntheticDecoder::new());
    assert!(matches!(
        pipeline.decode_vpp_frame(None, &[]),
        Err(VplError::NotInitialized(_))
    ));
}

#[test]
fn test_drain_returns_batches_then_end_of_stream() {
    let mut pipeline = DecodeVpp::with_software_engine(SyntheticDecoder::new().with_latency(2));
    pipeline
        .init_decode_vpp(&hevc_128x96(), &[channel_320x240(1)])
        .unwrap();

    let mut timestamps = Vec::new();
    for ts in [100, 200, 300] {
        if let Some(batch) = pipeline.decode_vpp_frame(Some(&chunk(ts)), &[]).unwrap().into_batch() {
            timestamps.push(batch.get(1).unwrap().timestamp());
        }
    }
    assert_eq!(timestamps, vec![100]);

    // Drain with both forms of the signal; none may be a parameter error
    let empty = Bitstream::default();
    let drains = [Some(&empty), None, None, None];
    let mut ended = false;
    for bitstream in drains {
        match pipeline.decode_vpp_frame(bitstream, &[]) {
            Ok(DecodeVppOutput::Batch(batch)) => {
                assert!(!ended);
                timestamps.push(batch.get(1).unwrap().timestamp());
            }
            Ok(DecodeVppOutput::EndOfStream) => ended = true,
            Ok(other) => panic!("unexpected drain outcome {other:?}"),
            Err(e) => panic!("drain raised {e}"),
        }
    }
    assert!(ended);
    assert_eq!(timestamps, vec![100, 200, 300]);
}

#[test]
fn test_drain_on_empty_decoder() {
    let mut pipeline = pipeline(&[channel_320x240(1)]);
    let out = pipeline.decode_vpp_frame(None, &[]).unwrap();
    assert!(out.is_end_of_stream());
}

#[test]
fn test_channel_frame_rate_must_match_stream() {
    let mut params = hevc_128x96();
    params.frame_info.frame_rate = FrameRate::new(24000, 1001);

    let doubled = ChannelParam::new(
        1,
        FrameInfo::new(VideoFormat::I420, 320, 240).with_frame_rate(FrameRate::new(48000, 1001)),
    );
    let mut pipeline = DecodeVpp::with_software_engine(SyntheticDecoder::new());
    assert!(matches!(
        pipeline.init_decode_vpp(&params, &[doubled]),
        Err(VplError::IncompatibleParameter(_))
    ));
    assert_eq!(pipeline.state(), PipelineState::Uninitialized);

    let unset = ChannelParam::new(
        1,
        FrameInfo::new(VideoFormat::I420, 320, 240).with_frame_rate(FrameRate::new(0, 0)),
    );
    pipeline.init_decode_vpp(&params, &[unset]).unwrap();
    let batch = pipeline
        .decode_vpp_frame(Some(&chunk(0)), &[])
        .unwrap()
        .into_batch()
        .unwrap();
    for (_, surface) in batch.iter() {
        assert_eq!(surface.info().frame_rate, FrameRate::new(24000, 1001));
    }
}

#[test]
fn test_opaque_io_is_incompatible() {
    let mut params = hevc_128x96();
    params.io_pattern = IoPattern::new(IoPattern::OUT_OPAQUE_MEMORY);
    assert!(matches!(
        check_video_param_decode_vpp(&params),
        Err(VplError::IncompatibleParameter(_))
    ));

    let mut pipeline = DecodeVpp::with_software_engine(SyntheticDecoder::new());
    assert!(matches!(
        pipeline.init_decode_vpp(&params, &[channel_320x240(1)]),
        Err(VplError::IncompatibleParameter(_))
    ));
}

#[test]
fn test_unknown_channel_is_not_found() {
    let pipeline = pipeline(&[channel_320x240(1)]);
    assert!(matches!(pipeline.get_channel_param(2), Err(VplError::NotFound(_))));
    assert!(matches!(pipeline.get_channel_param(0), Err(VplError::NotFound(_))));
}

#[test]
fn test_channel_params_are_copied() {
    let mut channels = vec![channel_320x240(1)];
    let pipeline = pipeline(&channels);
    channels[0].output.width = 640;
    channels.clear();
    assert_eq!(pipeline.get_channel_param(1).unwrap().output.width, 320);
}

#[test]
fn test_decoded_frame_content() {
    let mut pipeline = pipeline(&[channel_320x240(1)]);
    pipeline.decode_vpp_frame(Some(&chunk(0)), &[]).unwrap();
    let batch = pipeline
        .decode_vpp_frame(Some(&chunk(1)), &[])
        .unwrap()
        .into_batch()
        .unwrap();

    let decoded = batch.get(0).unwrap();
    let info = decoded.info();
    let layout = decoded.plane_layout();
    let image = unpack_to_working(info.format, info.width, info.height, &decoded.data(), &layout).unwrap();
    for (x, y) in [(0, 0), (17, 9), (127, 95)] {
        assert_eq!(image.sample(0, x, y), SyntheticDecoder::luma_at(1, x, y) & !0x3);
    }
}

#[test]
fn test_processing_options_reach_channels() {
    let channel = channel_320x240(1).with_operation(VppOperation::Sharpen { strength: 30.0 });
    let mut pipeline = pipeline(&[channel]);
    let plan = pipeline.channels()[0].plan().to_string();
    assert!(plan.contains("sharpen"), "{plan}");

    pipeline.decode_vpp_frame(Some(&chunk(0)), &[]).unwrap();
    assert_eq!(pipeline.channels()[0].frames_processed(), 1);
}

#[test]
fn test_decode_failure_aborts_before_channels() {
    let mut pipeline = pipeline(&[channel_320x240(1)]);
    pipeline.decoder_mut().fail_at_frame(Some(0));

    assert!(matches!(
        pipeline.decode_vpp_frame(Some(&chunk(0)), &[]),
        Err(VplError::DeviceFailed(_))
    ));
    assert_eq!(pipeline.channels()[0].frames_processed(), 0);
    assert_eq!(pipeline.channels()[0].output_pool_stats().in_use, 0);
    assert_eq!(pipeline.decode_pool_stats().unwrap().in_use, 0);
}

/// Engine whose graphs fail for one output width
struct FailingEngine {
    inner: SoftwareEngine,
    fail_width: u32,
}

struct FailingGraph;

impl FilterGraph for FailingGraph {
    fn push_frame(&mut self, _input: &Surface) -> vpl_video::Result<()> {
        Ok(())
    }

    fn pull_frame(&mut self, _output: &Surface) -> vpl_video::Result<PullStatus> {
        Err(VplError::DeviceFailed("filter graph lost".to_string()))
    }
}

impl FilterEngine for FailingEngine {
    fn build_graph(&self, plan: &PipelinePlan) -> vpl_video::Result<Box<dyn FilterGraph>> {
        if plan.output().width == self.fail_width {
            Ok(Box::new(FailingGraph))
        } else {
            self.inner.build_graph(plan)
        }
    }
}

#[test]
fn test_channel_failure_unwinds_batch() {
    let engine = Arc::new(FailingEngine {
        inner: SoftwareEngine::new(),
        fail_width: 64,
    });
    let mut pipeline = DecodeVpp::new(SyntheticDecoder::new(), engine, PipelineOptions::default());
    let channels = [
        channel_320x240(1),
        ChannelParam::new(2, FrameInfo::new(VideoFormat::I420, 64, 48)),
        channel_320x240(3),
    ];
    pipeline.init_decode_vpp(&hevc_128x96(), &channels).unwrap();

    assert!(matches!(
        pipeline.decode_vpp_frame(Some(&chunk(0)), &[]),
        Err(VplError::DeviceFailed(_))
    ));

    // Nothing from the failed cycle is still referenced
    assert_eq!(pipeline.decode_pool_stats().unwrap().in_use, 0);
    for channel in pipeline.channels() {
        assert_eq!(channel.output_pool_stats().in_use, 0);
    }
    assert_eq!(pipeline.channels()[0].frames_processed(), 1);
    assert_eq!(pipeline.channels()[2].frames_processed(), 0);

    // Skipping the broken channel keeps the pipeline usable
    let batch = pipeline
        .decode_vpp_frame(Some(&chunk(1)), &[2])
        .unwrap()
        .into_batch()
        .unwrap();
    assert_eq!(batch.channel_ids(), vec![0, 1, 3]);
}

#[test]
fn test_pool_exhaustion_when_caller_holds_batches() {
    let options = PipelineOptions { surface_pool_depth: 2 };
    let mut pipeline = DecodeVpp::new(
        SyntheticDecoder::new(),
        Arc::new(SoftwareEngine::new()),
        options,
    );
    pipeline
        .init_decode_vpp(&hevc_128x96(), &[channel_320x240(1)])
        .unwrap();

    let first = pipeline.decode_vpp_frame(Some(&chunk(0)), &[]).unwrap();
    let second = pipeline.decode_vpp_frame(Some(&chunk(1)), &[]).unwrap();
    assert!(matches!(
        pipeline.decode_vpp_frame(Some(&chunk(2)), &[]),
        Err(VplError::NotEnoughBuffer { capacity: 2 })
    ));

    drop(first);
    assert!(pipeline.decode_vpp_frame(Some(&chunk(2)), &[]).is_ok());
    drop(second);
}
