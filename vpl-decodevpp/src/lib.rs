//! VPL DecodeVPP - combined decoder and multi-channel video post-processing
//!
//! Key pieces:
//! - `DecodeVpp` coordinator: one decode call fans a frame out to N channels
//! - Per-call skip list suppressing individual outputs
//! - Ordered, reference-counted output batches with full unwind on failure
//! - Parameter validation shared with the C ABI
//! - `Decoder` boundary with a deterministic synthetic implementation

pub mod coordinator;
pub mod decoder;
pub mod params;
pub mod synthetic;
pub mod validate;

pub use coordinator::*;
pub use decoder::*;
pub use params::*;
pub use synthetic::*;
pub use validate::*;

pub fn version() -> &'static str {
    "0.1.0"
}
