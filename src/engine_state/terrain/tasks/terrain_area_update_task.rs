//! # Terrain Area Update Task
//!
//! Replaces the shape of an existing area and marks both the footprint it left
//! and the footprint it now covers dirty for the area's shader.

use std::panic::{self, AssertUnwindSafe};

use log::{error, trace};

use super::submit_dirty_regions;
use crate::{
    core::MtResource,
    engine_state::{
        rendering::{DirtyRegionSink, ShaderTarget},
        task_management::{execution_context::TaskExecutionContext, task::TaskError},
        terrain::{AreaId, BoundingBox, Shape, TerrainError, TerrainStore},
    },
};

/// A task that reshapes one area of the terrain.
///
/// The background phase swaps the shape inside the store under its write lock;
/// the main-thread phase submits the new and old bounding boxes to the sink. Both
/// are needed: an area can shrink, grow or move, and every page it left must be
/// re-baked as well as every page it now covers.
pub struct TerrainAreaUpdateTask<S: TerrainStore> {
    /// Thread-safe handle to the store holding the area
    terrain: MtResource<S>,
    /// The area being reshaped
    area: AreaId,
    /// The shape the area will have afterwards
    new_area_shape: Shape,
    /// Shader to notify, if the area is painted at all
    shader: Option<ShaderTarget>,
    /// Bounding box before the edit, recorded by the background phase
    old_shape: Option<BoundingBox>,
    /// Bounding box after the edit, recorded by the background phase
    new_shape: Option<BoundingBox>,
}

impl<S: TerrainStore> TerrainAreaUpdateTask<S> {
    /// Creates a new area update task.
    ///
    /// # Arguments
    /// * `terrain` - The store holding the area
    /// * `area` - The area to reshape
    /// * `new_area_shape` - The replacement shape; the task keeps its own copy
    /// * `shader` - Shader to mark dirty, or `None` for an area nothing paints
    pub fn new(
        terrain: MtResource<S>,
        area: AreaId,
        new_area_shape: Shape,
        shader: Option<ShaderTarget>,
    ) -> Self {
        TerrainAreaUpdateTask {
            terrain,
            area,
            new_area_shape,
            shader,
            old_shape: None,
            new_shape: None,
        }
    }

    /// The area being reshaped.
    pub fn area(&self) -> AreaId {
        self.area
    }

    /// The shader this task notifies.
    pub fn shader(&self) -> Option<ShaderTarget> {
        self.shader
    }

    /// Bounding box before the edit; `None` until the background phase succeeds.
    pub fn old_shape(&self) -> Option<BoundingBox> {
        self.old_shape
    }

    /// Bounding box after the edit; `None` until the background phase succeeds.
    pub fn new_shape(&self) -> Option<BoundingBox> {
        self.new_shape
    }

    /// Swaps the area's shape inside the store.
    ///
    /// The old bounding box is read before the shape is replaced, since it cannot
    /// be recovered afterwards. Once the shape is swapped, any failure puts the
    /// previous shape back before the write guard is released, so no half-applied
    /// edit is visible. A panic in the store is rolled back the same way and then
    /// resumed, so the unit still reports it.
    pub fn execute_in_background(
        &mut self,
        context: &mut TaskExecutionContext,
    ) -> Result<(), TaskError> {
        context.check_cancelled()?;

        let area = self.area;
        let mut terrain = self.terrain.get_mut();
        let old_shape = terrain.area_bbox(area)?;
        let previous_shape = terrain.set_area_shape(area, self.new_area_shape.clone())?;

        let refreshed = panic::catch_unwind(AssertUnwindSafe(
            || -> Result<BoundingBox, TerrainError> {
                let new_shape = terrain.area_bbox(area)?;
                terrain.update_area(area)?;
                Ok(new_shape)
            },
        ));
        let new_shape = match refreshed {
            Ok(Ok(new_shape)) => new_shape,
            Ok(Err(error)) => {
                restore_shape(&mut *terrain, area, previous_shape, false);
                return Err(error.into());
            }
            Err(payload) => {
                // The index may be half rewritten, so rebuild it too.
                restore_shape(&mut *terrain, area, previous_shape, true);
                drop(terrain);
                panic::resume_unwind(payload);
            }
        };
        drop(terrain);

        trace!("{} reshaped from {} to {}", area, old_shape, new_shape);
        self.old_shape = Some(old_shape);
        self.new_shape = Some(new_shape);
        context.report_progress(1.0);
        Ok(())
    }

    /// Submits the new and then the old bounding box to the sink.
    ///
    /// Without a shader there is nothing to notify and the task completes at once.
    /// Returns `false` only if the sink refused a submission.
    pub fn execute_in_main_thread(&mut self, sink: &mut dyn DirtyRegionSink) -> bool {
        let Some(shader) = self.shader else {
            return true;
        };
        let regions: Vec<BoundingBox> = self.new_shape.into_iter().chain(self.old_shape).collect();
        submit_dirty_regions(sink, shader, &regions, self.area)
    }
}

fn restore_shape<S: TerrainStore>(terrain: &mut S, area: AreaId, previous: Shape, reindex: bool) {
    if let Err(error) = terrain.set_area_shape(area, previous) {
        error!("Could not restore {} after failed update: {}", area, error);
        return;
    }
    if reindex {
        if let Err(error) = terrain.update_area(area) {
            error!("Could not reindex {} after failed update: {}", area, error);
        }
    }
}
