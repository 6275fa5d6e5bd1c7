//! # Terrain Area Add Task
//!
//! Inserts a new area into the terrain and marks its footprint dirty.

use super::submit_dirty_regions;
use crate::{
    core::MtResource,
    engine_state::{
        rendering::{DirtyRegionSink, ShaderTarget},
        task_management::{execution_context::TaskExecutionContext, task::TaskError},
        terrain::{Area, BoundingBox, TerrainStore},
    },
};

/// A task that adds one area to the terrain.
pub struct TerrainAreaAddTask<S: TerrainStore> {
    terrain: MtResource<S>,
    area: Area,
    shader: Option<ShaderTarget>,
    /// Bounding box of the inserted area, recorded by the background phase
    shape: Option<BoundingBox>,
}

impl<S: TerrainStore> TerrainAreaAddTask<S> {
    /// Creates a task inserting `area`, notifying `shader` once it is in place.
    pub fn new(terrain: MtResource<S>, area: Area, shader: Option<ShaderTarget>) -> Self {
        TerrainAreaAddTask {
            terrain,
            area,
            shader,
            shape: None,
        }
    }

    /// The area being added.
    pub fn area(&self) -> &Area {
        &self.area
    }

    /// Footprint of the inserted area; `None` until the background phase succeeds.
    pub fn shape(&self) -> Option<BoundingBox> {
        self.shape
    }

    /// Inserts a copy of the area; the store validates and indexes it.
    pub fn execute_in_background(
        &mut self,
        context: &mut TaskExecutionContext,
    ) -> Result<(), TaskError> {
        context.check_cancelled()?;

        let mut terrain = self.terrain.get_mut();
        terrain.insert_area(self.area.clone())?;
        self.shape = Some(terrain.area_bbox(self.area.id())?);
        drop(terrain);

        context.report_progress(1.0);
        Ok(())
    }

    /// Marks the new footprint dirty.
    pub fn execute_in_main_thread(&mut self, sink: &mut dyn DirtyRegionSink) -> bool {
        match (self.shader, self.shape) {
            (Some(shader), Some(shape)) => {
                submit_dirty_regions(sink, shader, &[shape], self.area.id())
            }
            _ => true,
        }
    }
}
