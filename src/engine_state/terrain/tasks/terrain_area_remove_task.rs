//! # Terrain Area Remove Task
//!
//! Removes an area from the terrain and marks the footprint it vacated dirty.

use super::submit_dirty_regions;
use crate::{
    core::MtResource,
    engine_state::{
        rendering::{DirtyRegionSink, ShaderTarget},
        task_management::{execution_context::TaskExecutionContext, task::TaskError},
        terrain::{AreaId, BoundingBox, TerrainStore},
    },
};

/// A task that removes one area from the terrain.
pub struct TerrainAreaRemoveTask<S: TerrainStore> {
    terrain: MtResource<S>,
    area: AreaId,
    shader: Option<ShaderTarget>,
    /// Last bounding box of the removed area, recorded by the background phase
    old_shape: Option<BoundingBox>,
}

impl<S: TerrainStore> TerrainAreaRemoveTask<S> {
    /// Creates a task removing `area`, notifying `shader` once it is gone.
    pub fn new(terrain: MtResource<S>, area: AreaId, shader: Option<ShaderTarget>) -> Self {
        TerrainAreaRemoveTask {
            terrain,
            area,
            shader,
            old_shape: None,
        }
    }

    /// The area being removed.
    pub fn area(&self) -> AreaId {
        self.area
    }

    /// Footprint the area covered; `None` until the background phase succeeds.
    pub fn old_shape(&self) -> Option<BoundingBox> {
        self.old_shape
    }

    /// Removes the area from the store.
    pub fn execute_in_background(
        &mut self,
        context: &mut TaskExecutionContext,
    ) -> Result<(), TaskError> {
        context.check_cancelled()?;

        let removed = self.terrain.get_mut().remove_area(self.area)?;
        self.old_shape = Some(removed.bbox());

        context.report_progress(1.0);
        Ok(())
    }

    /// Marks the vacated footprint dirty.
    pub fn execute_in_main_thread(&mut self, sink: &mut dyn DirtyRegionSink) -> bool {
        match (self.shader, self.old_shape) {
            (Some(shader), Some(old_shape)) => {
                submit_dirty_regions(sink, shader, &[old_shape], self.area)
            }
            _ => true,
        }
    }
}
