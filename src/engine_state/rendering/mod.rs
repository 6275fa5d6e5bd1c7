//! # Rendering Module
//!
//! The render-thread side of terrain editing. Shader re-baking itself lives
//! outside this crate; what lives here is the handle tasks address their
//! notifications to and the per-frame sink those notifications are batched in.

use std::fmt;

pub mod dirty_regions;

pub use dirty_regions::{DirtyBatch, DirtyRegion, DirtyRegionSink, FrameDirtyRegions, SinkError};

/// Opaque handle to the shader that paints a terrain layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShaderTarget(pub u32);

impl fmt::Display for ShaderTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "shader#{}", self.0)
    }
}
