//! VPL VPP - filter pipeline planning and per-channel processing
//!
//! Key pieces:
//! - Planner that orders, merges, elides or rejects requested operations
//! - Quality and speed stage orderings selected by a target-usage hint
//! - Filter-engine traits (build graph, push frame, pull frame)
//! - Software reference engine with rayon-parallel kernels
//! - `VppChannel` binding one graph to its input/output surface pools

pub mod channel;
pub mod engine;
pub mod filters;
pub mod planner;
pub mod types;

pub use channel::*;
pub use engine::*;
pub use planner::*;
pub use types::*;

pub fn version() -> &'static str {
    "0.1.0"
}
