//! Core type definitions for VPP channels
//!
//! Requested operations, per-channel parameters and the immutable pipeline
//! description produced by the planner.

use std::collections::BTreeSet;
use std::fmt;
use vpl_video::{FrameInfo, IoPattern, Rect, VideoFormat};

/// Strength values for sharpen and blur are percentages.
pub const MAX_FILTER_STRENGTH: f64 = 100.0;

/// Strength of an enhance filter forced through `do_use` without an operation
pub const DEFAULT_FILTER_STRENGTH: f64 = 50.0;

/// Default number of surfaces owned by each pool
pub const DEFAULT_SURFACE_POOL_DEPTH: usize = 4;

/// Filter identifier, used for do-not-use lists and stage reporting
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FilterKind {
    ColorConvert = 1,
    Scale = 2,
    Crop = 4,
    Composite = 8,
    Sharpen = 16,
    Blur = 32,
}

impl FilterKind {
    pub const ALL: [FilterKind; 6] = [
        FilterKind::ColorConvert,
        FilterKind::Scale,
        FilterKind::Crop,
        FilterKind::Composite,
        FilterKind::Sharpen,
        FilterKind::Blur,
    ];

    /// Kinds whose bit is set in `mask`
    pub fn from_mask(mask: u32) -> impl Iterator<Item = FilterKind> {
        Self::ALL.into_iter().filter(move |kind| mask & *kind as u32 != 0)
    }

    pub fn name(self) -> &'static str {
        match self {
            FilterKind::ColorConvert => "csc",
            FilterKind::Scale => "scale",
            FilterKind::Crop => "crop",
            FilterKind::Composite => "composite",
            FilterKind::Sharpen => "sharpen",
            FilterKind::Blur => "blur",
        }
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One requested video operation with its parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VppOperation {
    /// Keep only `rect` of the input frame
    Crop { rect: Rect },
    /// Explicit per-channel target size
    Scale { width: u32, height: u32 },
    /// Convert to the channel's output format
    ColorConvert,
    /// Place the (cropped) frame into `dst` on a black output canvas
    Composite { dst: Rect },
    /// Luma sharpening, 0-100
    Sharpen { strength: f64 },
    /// Box blur, 0-100
    Blur { strength: f64 },
}

impl VppOperation {
    pub fn kind(&self) -> FilterKind {
        match self {
            VppOperation::Crop { .. } => FilterKind::Crop,
            VppOperation::Scale { .. } => FilterKind::Scale,
            VppOperation::ColorConvert => FilterKind::ColorConvert,
            VppOperation::Composite { .. } => FilterKind::Composite,
            VppOperation::Sharpen { .. } => FilterKind::Sharpen,
            VppOperation::Blur { .. } => FilterKind::Blur,
        }
    }
}

/// Quality / speed trade-off hint (1 = best quality, 7 = best speed)
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TargetUsage {
    BestQuality = 1,
    #[default]
    Balanced = 4,
    BestSpeed = 7,
}

impl TargetUsage {
    /// Nearest preset for a 1-7 usage level; 0 means unset
    pub fn from_level(level: u16) -> Option<Self> {
        match level {
            0 | 3..=5 => Some(TargetUsage::Balanced),
            1 | 2 => Some(TargetUsage::BestQuality),
            6 | 7 => Some(TargetUsage::BestSpeed),
            _ => None,
        }
    }

    pub fn ordering(self) -> OrderingPolicy {
        match self {
            TargetUsage::BestSpeed => OrderingPolicy::Speed,
            TargetUsage::BestQuality | TargetUsage::Balanced => OrderingPolicy::Quality,
        }
    }
}

/// Stage ordering selected from [`TargetUsage`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderingPolicy {
    /// crop -> scale -> color-convert -> enhance
    Quality,
    /// shrink early, grow late
    Speed,
}

/// Extended per-channel filter configuration
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VppHints {
    pub target_usage: TargetUsage,
    /// Filters that run even where they would be an identity stage
    pub do_use: BTreeSet<FilterKind>,
    /// Filters the caller forbids, whether requested or implied
    pub do_not_use: BTreeSet<FilterKind>,
}

/// Parameters of one VPP output channel
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelParam {
    /// Unique among active channels; 0 is reserved for decoder output
    pub channel_id: u16,
    pub output: FrameInfo,
    pub operations: Vec<VppOperation>,
    pub io_pattern: IoPattern,
    pub hints: VppHints,
}

impl ChannelParam {
    pub fn new(channel_id: u16, output: FrameInfo) -> Self {
        Self {
            channel_id,
            output: output.with_channel_id(channel_id),
            operations: Vec::new(),
            io_pattern: IoPattern::default(),
            hints: VppHints::default(),
        }
    }

    pub fn with_operation(mut self, operation: VppOperation) -> Self {
        self.operations.push(operation);
        self
    }

    pub fn with_hints(mut self, hints: VppHints) -> Self {
        self.hints = hints;
        self
    }

    pub fn with_io_pattern(mut self, io_pattern: IoPattern) -> Self {
        self.io_pattern = io_pattern;
        self
    }
}

/// Everything a channel needs to initialize: its input and its parameters
#[derive(Debug, Clone, PartialEq)]
pub struct VppConfig {
    pub input: FrameInfo,
    pub channel: ChannelParam,
}

impl VppConfig {
    pub fn new(input: FrameInfo, channel: ChannelParam) -> Self {
        Self { input, channel }
    }
}

/// Pool sizing shared by the coordinator and its channels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Surfaces per pool; bounds how many frames a caller may hold at once
    pub surface_pool_depth: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            surface_pool_depth: DEFAULT_SURFACE_POOL_DEPTH,
        }
    }
}

/// Format and size at one point of the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageSpec {
    pub format: VideoFormat,
    pub width: u32,
    pub height: u32,
}

impl StageSpec {
    pub fn of(info: &FrameInfo) -> Self {
        Self {
            format: info.format,
            width: info.width,
            height: info.height,
        }
    }

    pub fn pixel_count(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

impl fmt::Display for StageSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} {}x{}", self.format, self.width, self.height)
    }
}

/// Concrete filter operation of a planned stage
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StageOp {
    Crop(Rect),
    Scale,
    ColorConvert,
    Composite { dst: Rect },
    Sharpen { strength: f64 },
    Blur { strength: f64 },
}

impl StageOp {
    pub fn kind(&self) -> FilterKind {
        match self {
            StageOp::Crop(_) => FilterKind::Crop,
            StageOp::Scale => FilterKind::Scale,
            StageOp::ColorConvert => FilterKind::ColorConvert,
            StageOp::Composite { .. } => FilterKind::Composite,
            StageOp::Sharpen { .. } => FilterKind::Sharpen,
            StageOp::Blur { .. } => FilterKind::Blur,
        }
    }
}

/// One filter with its input and output spec
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stage {
    pub op: StageOp,
    pub input: StageSpec,
    pub output: StageSpec,
}

impl Stage {
    pub fn kind(&self) -> FilterKind {
        self.op.kind()
    }
}

/// Immutable, validated stage sequence of one channel
#[derive(Debug, Clone, PartialEq)]
pub struct PipelinePlan {
    pub(crate) input: StageSpec,
    pub(crate) output: StageSpec,
    pub(crate) policy: OrderingPolicy,
    pub(crate) stages: Vec<Stage>,
}

impl PipelinePlan {
    pub fn input(&self) -> StageSpec {
        self.input
    }

    pub fn output(&self) -> StageSpec {
        self.output
    }

    pub fn policy(&self) -> OrderingPolicy {
        self.policy
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn kinds(&self) -> Vec<FilterKind> {
        self.stages.iter().map(Stage::kind).collect()
    }

    /// No stage survived elision; the graph copies input to output
    pub fn is_passthrough(&self) -> bool {
        self.stages.is_empty()
    }
}

impl fmt::Display for PipelinePlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.input)?;
        for stage in &self.stages {
            write!(f, " -> {} -> [{}]", stage.kind(), stage.output)?;
        }
        Ok(())
    }
}
