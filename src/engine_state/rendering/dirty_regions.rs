//! # Dirty Region Batching
//!
//! Terrain tasks do not re-bake shaders themselves. On the main thread they
//! submit the regions they changed to a `DirtyRegionSink`, and once per frame the
//! sink is drained into a `DirtyBatch` that the shader rebuild pass consumes.
//!
//! ## Frame Lifecycle
//! 1. `begin_frame()` clears the sink and opens it for submissions
//! 2. Main-thread task phases `submit()` regions against shader targets
//! 3. `drain()` hands back the deduplicated batch and closes the sink
//!
//! Submitting to a closed sink fails with `SinkError::Unavailable`; the task
//! reports itself incomplete and the scheduler retries it next frame.
//!
//! ## Deduplication
//! Identical `(region, target)` pairs submitted any number of times in one frame
//! appear once in the batch. The batch also maps every region onto the terrain
//! pages it overlaps, per target, so a page is rebuilt at most once per frame no
//! matter how many edits touched it. Regions covering more than
//! `max_pages_per_region` pages, or lying beyond the page grid, are kept in the
//! batch but not mapped onto pages.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use log::{trace, warn};
use thiserror::Error;

use super::ShaderTarget;
use crate::{
    config::TerrainConfig,
    engine_state::terrain::{BoundingBox, PageCoord},
};

/// Errors raised when submitting to a sink.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SinkError {
    /// The sink is between frames and not accepting submissions.
    #[error("dirty-region sink is closed (last frame {frame})")]
    Unavailable {
        /// Last frame the sink was opened for.
        frame: u64,
    },
}

/// Receives dirty-region notifications from main-thread task phases.
pub trait DirtyRegionSink {
    /// Marks `region` dirty for `target`.
    fn submit(&mut self, region: BoundingBox, target: ShaderTarget) -> Result<(), SinkError>;
}

/// One dirty region addressed to a shader.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirtyRegion {
    /// Shader the region must be re-baked for.
    pub target: ShaderTarget,
    /// Area of terrain that changed.
    pub region: BoundingBox,
}

/// Everything one frame marked dirty, deduplicated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DirtyBatch {
    /// Frame the batch was collected in.
    pub frame: u64,
    /// Unique regions in first-submission order.
    pub regions: Vec<DirtyRegion>,
    /// Pages each target must rebuild.
    pub pages: BTreeMap<ShaderTarget, BTreeSet<PageCoord>>,
    /// Submissions received, duplicates included.
    pub submissions: usize,
}

impl DirtyBatch {
    /// Returns `true` if nothing was marked dirty.
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Regions marked dirty for one target.
    pub fn regions_for(&self, target: ShaderTarget) -> Vec<BoundingBox> {
        self.regions
            .iter()
            .filter(|dirty| dirty.target == target)
            .map(|dirty| dirty.region)
            .collect()
    }
}

/// The frame-scoped sink owned by the main thread.
///
/// Never shared with worker threads, so it needs no locking.
#[derive(Debug)]
pub struct FrameDirtyRegions {
    page_size: f32,
    max_pages_per_region: u64,
    frame: u64,
    open: bool,
    regions: Vec<DirtyRegion>,
    seen: HashSet<(ShaderTarget, [u32; 4])>,
    submissions: usize,
}

impl FrameDirtyRegions {
    /// Creates a closed sink that maps regions onto pages of `page_size`.
    pub fn new(page_size: f32) -> Self {
        Self {
            page_size,
            max_pages_per_region: TerrainConfig::default().max_pages_per_area,
            frame: 0,
            open: false,
            regions: Vec::new(),
            seen: HashSet::new(),
            submissions: 0,
        }
    }

    /// Sets the most pages a single region is mapped onto.
    pub fn with_max_pages_per_region(mut self, limit: u64) -> Self {
        self.max_pages_per_region = limit;
        self
    }

    /// Clears any leftovers and opens the sink for a new frame.
    ///
    /// Returns the new frame number.
    pub fn begin_frame(&mut self) -> u64 {
        self.frame += 1;
        self.open = true;
        self.regions.clear();
        self.seen.clear();
        self.submissions = 0;
        self.frame
    }

    /// Current frame number; 0 before the first `begin_frame`.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Returns `true` between `begin_frame` and `drain`.
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Unique regions collected so far this frame.
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// Returns `true` if no region was collected this frame.
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Closes the sink and returns the frame's deduplicated batch.
    pub fn drain(&mut self) -> DirtyBatch {
        self.open = false;
        self.seen.clear();

        let regions = std::mem::take(&mut self.regions);
        let mut pages: BTreeMap<ShaderTarget, BTreeSet<PageCoord>> = BTreeMap::new();
        for dirty in &regions {
            let target_pages = pages.entry(dirty.target).or_default();
            match dirty.region.page_span(self.page_size) {
                Some(span) if span.count() <= self.max_pages_per_region => {
                    target_pages.extend(span.pages());
                }
                _ => warn!(
                    "Dirty region {} for {:?} not mapped onto pages",
                    dirty.region, dirty.target
                ),
            }
        }

        let submissions = std::mem::take(&mut self.submissions);
        trace!(
            "Frame {}: {} submissions, {} unique regions",
            self.frame,
            submissions,
            regions.len()
        );

        DirtyBatch {
            frame: self.frame,
            regions,
            pages,
            submissions,
        }
    }
}

impl DirtyRegionSink for FrameDirtyRegions {
    fn submit(&mut self, region: BoundingBox, target: ShaderTarget) -> Result<(), SinkError> {
        if !self.open {
            return Err(SinkError::Unavailable { frame: self.frame });
        }
        self.submissions += 1;
        if self.seen.insert((target, region.key())) {
            self.regions.push(DirtyRegion { target, region });
        }
        Ok(())
    }
}
