//! One VPP output channel: a planned filter graph bound to an input spec,
//! an output spec and the surface pools that back them.

use crate::engine::{FilterEngine, FilterGraph, PullStatus};
use crate::planner::compute_stages;
use crate::types::{PipelineOptions, PipelinePlan, VppConfig};
use std::fmt;
use vpl_video::{FrameInfo, IoPattern, PoolStats, Result, Surface, SurfacePool, VplError};

/// Surface counts a channel needs from its caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceRequest {
    pub min: usize,
    pub suggested: usize,
}

/// Reject memory patterns other than system memory in and out
pub fn check_io_pattern(io: IoPattern) -> Result<()> {
    if io.has_opaque() {
        return Err(VplError::incompatible(format!(
            "opaque memory io pattern {:#x}",
            io.bits()
        )));
    }
    if io != IoPattern::system_memory() {
        return Err(VplError::invalid(format!(
            "io pattern {:#x}, only system memory in/out is supported",
            io.bits()
        )));
    }
    Ok(())
}

/// A filter pipeline instance with its own input and output surfaces
///
/// There is no incremental reconfiguration: a reset is `close` followed by a
/// fresh `init`, which discards the previous graph and pools.
pub struct VppChannel {
    config: VppConfig,
    plan: PipelinePlan,
    graph: Box<dyn FilterGraph>,
    input_pool: SurfacePool,
    output_pool: SurfacePool,
    frames_processed: u64,
    last_timestamp: Option<u64>,
}

impl VppChannel {
    /// Plan the stages, build the graph and allocate the surface pools
    pub fn init(
        config: VppConfig,
        engine: &dyn FilterEngine,
        options: &PipelineOptions,
    ) -> Result<Self> {
        check_io_pattern(config.channel.io_pattern)?;

        let channel_id = config.channel.channel_id;
        let plan = compute_stages(
            &config.input,
            &config.channel.output,
            &config.channel.operations,
            &config.channel.hints,
        )?;
        let graph = engine.build_graph(&plan)?;

        let input_pool = SurfacePool::new(config.input, options.surface_pool_depth)?;
        let mut output_info: FrameInfo = config.channel.output.with_channel_id(channel_id);
        if !output_info.frame_rate.is_set() {
            output_info.frame_rate = config.input.frame_rate;
        }
        let output_pool = SurfacePool::new(output_info, options.surface_pool_depth)?;

        log::info!("vpp channel {} initialized: {}", channel_id, plan);

        Ok(VppChannel {
            config,
            plan,
            graph,
            input_pool,
            output_pool,
            frames_processed: 0,
            last_timestamp: None,
        })
    }

    /// Validate a configuration and report how many surfaces it needs
    pub fn query_io_surf(config: &VppConfig, options: &PipelineOptions) -> Result<SurfaceRequest> {
        check_io_pattern(config.channel.io_pattern)?;
        compute_stages(
            &config.input,
            &config.channel.output,
            &config.channel.operations,
            &config.channel.hints,
        )?;
        Ok(SurfaceRequest {
            min: 1,
            suggested: options.surface_pool_depth.max(1),
        })
    }

    /// Filter one frame from `input` into `output`
    ///
    /// The output's reference count is left unchanged; a caller forwarding
    /// it elsewhere adds its own reference.
    pub fn process_frame(&mut self, input: Option<&Surface>, output: Option<&Surface>) -> Result<()> {
        let input = input.ok_or(VplError::NullInput("vpp input surface"))?;
        let output = output.ok_or(VplError::NullInput("vpp output surface"))?;

        let in_info = input.info();
        if !in_info.same_geometry(&self.config.input) {
            return Err(VplError::invalid(format!(
                "channel {} input is {:?} {}x{}, expected {:?} {}x{}",
                self.channel_id(),
                in_info.format,
                in_info.width,
                in_info.height,
                self.config.input.format,
                self.config.input.width,
                self.config.input.height
            )));
        }
        let out_info = output.info();
        if !out_info.same_geometry(&self.output_pool.info()) {
            return Err(VplError::invalid(format!(
                "channel {} output surface is {:?} {}x{}",
                self.channel_id(),
                out_info.format,
                out_info.width,
                out_info.height
            )));
        }

        self.graph.push_frame(input)?;
        match self.graph.pull_frame(output)? {
            PullStatus::Frame => {}
            PullStatus::WouldBlock => {
                return Err(VplError::DeviceFailed(format!(
                    "channel {} graph produced no frame",
                    self.channel_id()
                )))
            }
        }

        let timestamp = input.timestamp();
        output.set_timestamp(timestamp);
        self.frames_processed += 1;
        self.last_timestamp = Some(timestamp);
        Ok(())
    }

    /// Reserve an output surface without processing
    pub fn get_output_surface(&self) -> Result<Surface> {
        self.output_pool.acquire()
    }

    /// Reserve an input surface for standalone use
    pub fn get_input_surface(&self) -> Result<Surface> {
        self.input_pool.acquire()
    }

    pub fn channel_id(&self) -> u16 {
        self.config.channel.channel_id
    }

    pub fn video_param(&self) -> &VppConfig {
        &self.config
    }

    pub fn plan(&self) -> &PipelinePlan {
        &self.plan
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    /// Timestamp of the last frame written to an output surface
    pub fn last_timestamp(&self) -> Option<u64> {
        self.last_timestamp
    }

    pub fn output_pool_stats(&self) -> PoolStats {
        self.output_pool.stats()
    }

    pub fn close(self) {
        log::debug!(
            "vpp channel {} closed after {} frames",
            self.channel_id(),
            self.frames_processed
        );
    }
}

impl fmt::Debug for VppChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VppChannel")
            .field("channel_id", &self.channel_id())
            .field("plan", &self.plan)
            .field("frames_processed", &self.frames_processed)
            .finish()
    }
}
