//! VPL Video - frame data model and surface pooling
//!
//! Shared foundation for the decode + VPP pipeline crates.
//!
//! Key pieces:
//! - Closed error taxonomy used by every pipeline stage
//! - Aligned, pre-allocated surface pools with atomic reference counts
//! - Lock-free idle list so released surfaces are reclaimed exactly once
//! - Scalar format conversion through a 4:4:4 working image

pub mod error;
pub mod format_conversion;
pub mod surface_pool;
pub mod types;

pub use error::*;
pub use format_conversion::*;
pub use surface_pool::*;
pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_surfaces_match_declared_format() {
        let info = FrameInfo::new(VideoFormat::I420, 128, 96);
        let pool = SurfacePool::new(info, 2).unwrap();
        let surface = pool.acquire().unwrap();

        assert_eq!(surface.info(), info);
        assert_eq!(surface.plane_layout().plane_count, 3);
        assert!(surface.data().len() >= VideoFormat::I420.calculate_size(128, 96));
    }
}
