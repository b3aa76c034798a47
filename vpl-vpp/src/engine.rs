//! Filter execution boundary
//!
//! A [`FilterEngine`] builds a [`FilterGraph`] from a planned stage list. A
//! graph accepts one frame with `push_frame` and yields it with `pull_frame`.
//! [`SoftwareEngine`] is the CPU reference implementation.

use crate::filters;
use crate::types::{PipelinePlan, StageOp, StageSpec};
use std::sync::atomic::{AtomicU64, Ordering};
use vpl_video::{pack_from_working, unpack_to_working, Result, Surface, VplError, WorkingImage};

/// Result of pulling from a graph
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullStatus {
    /// A frame was written into the output surface
    Frame,
    /// Nothing available yet
    WouldBlock,
}

/// Builds executable graphs from planned stages
pub trait FilterEngine: Send + Sync {
    fn build_graph(&self, plan: &PipelinePlan) -> Result<Box<dyn FilterGraph>>;
}

/// One built filter graph bound to a plan's input and output spec
pub trait FilterGraph: Send {
    fn push_frame(&mut self, input: &Surface) -> Result<()>;
    fn pull_frame(&mut self, output: &Surface) -> Result<PullStatus>;
}

fn check_spec(surface: &Surface, spec: StageSpec, side: &str) -> Result<()> {
    let info = surface.info();
    if StageSpec::of(&info) != spec {
        return Err(VplError::invalid(format!(
            "graph {side} expects {spec}, surface is {}",
            StageSpec::of(&info)
        )));
    }
    Ok(())
}

/// CPU filter engine running the kernels in [`crate::filters`]
#[derive(Debug, Default)]
pub struct SoftwareEngine {
    graphs_built: AtomicU64,
}

impl SoftwareEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn graphs_built(&self) -> u64 {
        self.graphs_built.load(Ordering::Relaxed)
    }
}

impl FilterEngine for SoftwareEngine {
    fn build_graph(&self, plan: &PipelinePlan) -> Result<Box<dyn FilterGraph>> {
        self.graphs_built.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(SoftwareGraph {
            plan: plan.clone(),
            pending: None,
        }))
    }
}

/// Single-frame graph: no buffering beyond one pushed frame
struct SoftwareGraph {
    plan: PipelinePlan,
    pending: Option<WorkingImage>,
}

impl SoftwareGraph {
    fn run(&self, mut image: WorkingImage) -> WorkingImage {
        for stage in self.plan.stages() {
            image = match stage.op {
                StageOp::Crop(rect) => filters::crop(&image, rect),
                StageOp::Scale => filters::scale(&image, stage.output.width, stage.output.height),
                StageOp::Composite { dst } => {
                    filters::composite(&image, dst, stage.output.width, stage.output.height)
                }
                // Format changes happen when packing into the output surface.
                StageOp::ColorConvert => image,
                StageOp::Sharpen { strength } => {
                    filters::sharpen(&mut image, strength);
                    image
                }
                StageOp::Blur { strength } => {
                    filters::blur(&mut image, strength);
                    image
                }
            };
        }
        image
    }
}

impl FilterGraph for SoftwareGraph {
    fn push_frame(&mut self, input: &Surface) -> Result<()> {
        if self.pending.is_some() {
            return Err(VplError::DeviceFailed(
                "filter graph already holds an unpulled frame".into(),
            ));
        }
        let spec = self.plan.input();
        check_spec(input, spec, "input")?;

        let image = unpack_to_working(
            spec.format,
            spec.width,
            spec.height,
            &input.data(),
            &input.plane_layout(),
        )?;
        self.pending = Some(image);
        Ok(())
    }

    fn pull_frame(&mut self, output: &Surface) -> Result<PullStatus> {
        let spec = self.plan.output();
        check_spec(output, spec, "output")?;

        let Some(image) = self.pending.take() else {
            return Ok(PullStatus::WouldBlock);
        };
        let image = self.run(image);
        pack_from_working(&image, spec.format, &mut output.data(), &output.plane_layout())?;
        Ok(PullStatus::Frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::compute_stages;
    use crate::types::VppHints;
    use vpl_video::{FrameInfo, SurfacePool, VideoFormat};

    fn graph_for(input: FrameInfo, output: FrameInfo) -> Box<dyn FilterGraph> {
        let plan = compute_stages(&input, &output, &[], &VppHints::default()).unwrap();
        SoftwareEngine::new().build_graph(&plan).unwrap()
    }

    #[test]
    fn test_pull_without_push_would_block() {
        let info = FrameInfo::new(VideoFormat::I420, 16, 16);
        let pool = SurfacePool::new(info, 1).unwrap();
        let mut graph = graph_for(info, info);

        let out = pool.acquire().unwrap();
        assert_eq!(graph.pull_frame(&out).unwrap(), PullStatus::WouldBlock);
    }

    #[test]
    fn test_scale_and_convert_through_graph() {
        let input = FrameInfo::new(VideoFormat::I420, 16, 16);
        let output = FrameInfo::new(VideoFormat::NV12, 32, 32);
        let in_pool = SurfacePool::new(input, 1).unwrap();
        let out_pool = SurfacePool::new(output, 1).unwrap();
        let mut graph = graph_for(input, output);

        let src = in_pool.acquire().unwrap();
        src.data().fill(100);
        let dst = out_pool.acquire().unwrap();

        graph.push_frame(&src).unwrap();
        assert_eq!(graph.pull_frame(&dst).unwrap(), PullStatus::Frame);

        let data = dst.data();
        let layout = dst.plane_layout();
        assert_eq!(data[0], 100);
        assert_eq!(data[layout.offsets[1]], 100);
        assert_eq!(data[layout.offsets[1] + 1], 100);
    }

    #[test]
    fn test_mismatched_surface_rejected() {
        let info = FrameInfo::new(VideoFormat::I420, 16, 16);
        let other = SurfacePool::new(FrameInfo::new(VideoFormat::NV12, 16, 16), 1).unwrap();
        let mut graph = graph_for(info, info);

        let wrong = other.acquire().unwrap();
        let err = graph.push_frame(&wrong).unwrap_err();
        assert!(matches!(err, VplError::InvalidParameter(_)));
    }

    #[test]
    fn test_double_push_rejected() {
        let info = FrameInfo::new(VideoFormat::NV12, 16, 16);
        let pool = SurfacePool::new(info, 1).unwrap();
        let mut graph = graph_for(info, info);
        let src = pool.acquire().unwrap();

        graph.push_frame(&src).unwrap();
        assert!(matches!(
            graph.push_frame(&src),
            Err(VplError::DeviceFailed(_))
        ));
    }

    #[test]
    fn test_engine_counts_graphs() {
        let info = FrameInfo::new(VideoFormat::NV12, 16, 16);
        let plan = compute_stages(&info, &info, &[], &VppHints::default()).unwrap();
        let engine = SoftwareEngine::new();
        engine.build_graph(&plan).unwrap();
        engine.build_graph(&plan).unwrap();
        assert_eq!(engine.graphs_built(), 2);
    }
}
