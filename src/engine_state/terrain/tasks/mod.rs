//! # Terrain Task System
//!
//! Tasks that edit terrain areas. Every edit is a `TerrainAreaTask`: a closed set
//! of variants, each carrying its own data, that the task pool sees only through
//! the two operations of the `Task` trait.
//!
//! | Variant  | Background phase            | Main-thread phase             |
//! |----------|-----------------------------|-------------------------------|
//! | `Update` | replace an area's shape     | mark new and old bounds dirty |
//! | `Add`    | insert a new area           | mark its bounds dirty         |
//! | `Remove` | remove an area              | mark its last bounds dirty    |
//!
//! The caller must not have two tasks for the same area in flight at once; the
//! tasks themselves do no area-level locking beyond the store's write lock.

pub mod terrain_area_add_task;
pub mod terrain_area_remove_task;
pub mod terrain_area_update_task;

use log::warn;

pub use terrain_area_add_task::TerrainAreaAddTask;
pub use terrain_area_remove_task::TerrainAreaRemoveTask;
pub use terrain_area_update_task::TerrainAreaUpdateTask;

use crate::engine_state::{
    rendering::{DirtyRegionSink, ShaderTarget},
    task_management::{
        execution_context::TaskExecutionContext,
        task::{Task, TaskError},
    },
    terrain::{AreaId, BoundingBox, TerrainStore},
};

/// An edit to one terrain area.
pub enum TerrainAreaTask<S: TerrainStore> {
    /// Reshape an existing area.
    Update(TerrainAreaUpdateTask<S>),
    /// Insert a new area.
    Add(TerrainAreaAddTask<S>),
    /// Remove an area.
    Remove(TerrainAreaRemoveTask<S>),
}

impl<S: TerrainStore> TerrainAreaTask<S> {
    /// The area the task edits.
    pub fn area(&self) -> AreaId {
        match self {
            TerrainAreaTask::Update(task) => task.area(),
            TerrainAreaTask::Add(task) => task.area().id(),
            TerrainAreaTask::Remove(task) => task.area(),
        }
    }
}

impl<S: TerrainStore> Task for TerrainAreaTask<S> {
    fn name(&self) -> &'static str {
        match self {
            TerrainAreaTask::Update(_) => "terrain area update",
            TerrainAreaTask::Add(_) => "terrain area add",
            TerrainAreaTask::Remove(_) => "terrain area remove",
        }
    }

    fn execute_in_background(
        &mut self,
        context: &mut TaskExecutionContext,
    ) -> Result<(), TaskError> {
        match self {
            TerrainAreaTask::Update(task) => task.execute_in_background(context),
            TerrainAreaTask::Add(task) => task.execute_in_background(context),
            TerrainAreaTask::Remove(task) => task.execute_in_background(context),
        }
    }

    fn execute_in_main_thread(&mut self, sink: &mut dyn DirtyRegionSink) -> bool {
        match self {
            TerrainAreaTask::Update(task) => task.execute_in_main_thread(sink),
            TerrainAreaTask::Add(task) => task.execute_in_main_thread(sink),
            TerrainAreaTask::Remove(task) => task.execute_in_main_thread(sink),
        }
    }
}

impl<S: TerrainStore> From<TerrainAreaUpdateTask<S>> for TerrainAreaTask<S> {
    fn from(task: TerrainAreaUpdateTask<S>) -> Self {
        TerrainAreaTask::Update(task)
    }
}

impl<S: TerrainStore> From<TerrainAreaAddTask<S>> for TerrainAreaTask<S> {
    fn from(task: TerrainAreaAddTask<S>) -> Self {
        TerrainAreaTask::Add(task)
    }
}

impl<S: TerrainStore> From<TerrainAreaRemoveTask<S>> for TerrainAreaTask<S> {
    fn from(task: TerrainAreaRemoveTask<S>) -> Self {
        TerrainAreaTask::Remove(task)
    }
}

/// Submits `regions` in order, stopping at the first refusal.
///
/// Returns `false` if the sink refused, so the task is retried next frame.
/// Resubmitting regions that were already accepted is harmless, the sink
/// deduplicates them.
fn submit_dirty_regions(
    sink: &mut dyn DirtyRegionSink,
    shader: ShaderTarget,
    regions: &[BoundingBox],
    area: AreaId,
) -> bool {
    for region in regions {
        if let Err(error) = sink.submit(*region, shader) {
            warn!("Deferring dirty regions of {} for {}: {}", area, shader, error);
            return false;
        }
    }
    true
}
