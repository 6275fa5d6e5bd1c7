//! # Engine State Module
//!
//! Wires the terrain store, the task pool and the frame sink together.
//!
//! ## Key Components
//!
//! * `TerrainEditor` - Publishes area edits and pumps them once per frame
//! * `rendering` - Shader targets and the per-frame dirty-region sink
//! * `task_management` - The two-phase task contract and the worker pool
//! * `terrain` - Areas, shapes, the terrain store and the area tasks
//!
//! ## Frame Flow
//!
//! Each call to `TerrainEditor::process_frame()`:
//! 1. Opens the sink for the frame
//! 2. Runs main-thread phases of tasks the workers finished
//! 3. Hands queued tasks to free workers
//! 4. Drains the sink into the batch the shader rebuild pass consumes
//! 5. Collects the store's invalidated pages, unless a worker holds the store,
//!    in which case they are reported by a later frame
//!
//! The caller must keep at most one edit per area in flight; use the ids in
//! `FrameSummary::report` to learn when an edit has finished.

use std::collections::HashMap;
use std::io;

use log::{debug, trace};

use crate::{config::EditorConfig, core::MtResource};
use rendering::{DirtyBatch, FrameDirtyRegions, ShaderTarget};
use task_management::{task::TaskId, TaskManager, TaskReport};
use terrain::{
    tasks::{TerrainAreaAddTask, TerrainAreaRemoveTask, TerrainAreaTask, TerrainAreaUpdateTask},
    Area, AreaId, PageCoord, Shape, Terrain,
};

pub mod rendering;
pub mod task_management;
pub mod terrain;

/// Everything one frame produced.
#[derive(Debug, Default)]
pub struct FrameSummary {
    /// Tasks that finished, failed or were deferred this frame.
    pub report: TaskReport,
    /// Deduplicated dirty regions for the shader rebuild pass.
    pub batch: DirtyBatch,
    /// Terrain pages whose cached shader data went stale since the last frame.
    pub invalidated_pages: Vec<PageCoord>,
}

/// Main-thread entry point for editing terrain areas.
///
/// # Examples
///
/// ```no_run
/// use cgmath::Point2;
/// use terrain_area_tasks::config::EditorConfig;
/// use terrain_area_tasks::engine_state::{
///     rendering::ShaderTarget,
///     terrain::{Area, AreaId, Shape},
///     TerrainEditor,
/// };
///
/// let mut editor = TerrainEditor::new(&EditorConfig::default()).unwrap();
/// editor.register_layer_shader(0, ShaderTarget(1));
///
/// let square = Shape::rectangle(Point2::new(0.0, 0.0), Point2::new(10.0, 10.0));
/// editor.add_area(Area::new(AreaId(1), 0, square));
///
/// // Main loop
/// loop {
///     let frame = editor.process_frame();
///     for region in &frame.batch.regions {
///         // re-bake region.region for region.target
///     }
/// }
/// ```
pub struct TerrainEditor {
    /// The terrain store shared with the workers
    terrain: MtResource<Terrain>,
    /// Worker pool running the area tasks
    task_manager: TaskManager,
    /// Frame sink, never shared with the workers
    dirty_regions: FrameDirtyRegions,
    /// Shader painting each terrain layer
    layer_shaders: HashMap<u32, ShaderTarget>,
}

impl TerrainEditor {
    /// Creates an editor with an empty terrain and a running worker pool.
    ///
    /// # Errors
    /// Returns the OS error if a worker thread cannot be spawned.
    pub fn new(config: &EditorConfig) -> io::Result<Self> {
        let terrain = MtResource::new(Terrain::from_config(&config.terrain));
        let task_manager = TaskManager::new(&config.task_manager)?;

        Ok(Self {
            terrain,
            task_manager,
            dirty_regions: FrameDirtyRegions::new(config.terrain.page_size)
                .with_max_pages_per_region(config.terrain.max_pages_per_area),
            layer_shaders: HashMap::new(),
        })
    }

    /// Handle to the terrain store.
    pub fn terrain(&self) -> MtResource<Terrain> {
        self.terrain.clone()
    }

    /// Routes dirty regions of areas on `layer` to `shader`.
    ///
    /// Areas on layers without a shader are edited without any notification.
    pub fn register_layer_shader(&mut self, layer: u32, shader: ShaderTarget) {
        self.layer_shaders.insert(layer, shader);
    }

    fn shader_for_layer(&self, layer: u32) -> Option<ShaderTarget> {
        self.layer_shaders.get(&layer).copied()
    }

    fn shader_for_area(&self, area: AreaId) -> Option<ShaderTarget> {
        let layer = self.terrain.get().area(area).map(Area::layer)?;
        self.shader_for_layer(layer)
    }

    fn publish(&mut self, task: TerrainAreaTask<Terrain>) -> TaskId {
        let area = task.area();
        let id = self.task_manager.publish_task(Box::new(task));
        debug!("{} published for {}", id, area);
        id
    }

    /// Publishes a task adding `area` to the terrain.
    pub fn add_area(&mut self, area: Area) -> TaskId {
        let shader = self.shader_for_layer(area.layer());
        let task = TerrainAreaAddTask::new(self.terrain.clone(), area, shader);
        self.publish(task.into())
    }

    /// Publishes a task replacing the shape of `area`.
    ///
    /// The area's shader is looked up now. If the area is already gone, the task
    /// still runs and fails with `InvalidArea`.
    pub fn update_area_shape(&mut self, area: AreaId, shape: Shape) -> TaskId {
        let shader = self.shader_for_area(area);
        let task = TerrainAreaUpdateTask::new(self.terrain.clone(), area, shape, shader);
        self.publish(task.into())
    }

    /// Publishes a task removing `area` from the terrain.
    pub fn remove_area(&mut self, area: AreaId) -> TaskId {
        let shader = self.shader_for_area(area);
        let task = TerrainAreaRemoveTask::new(self.terrain.clone(), area, shader);
        self.publish(task.into())
    }

    /// Runs one frame's worth of task processing.
    ///
    /// Must be called from the main thread, before the shader rebuild pass.
    /// Never waits on the terrain lock.
    pub fn process_frame(&mut self) -> FrameSummary {
        self.dirty_regions.begin_frame();
        let report = self
            .task_manager
            .process_completed_tasks(&mut self.dirty_regions);
        self.task_manager.process_queued_tasks();
        let batch = self.dirty_regions.drain();
        let invalidated_pages = match self.terrain.try_get_mut() {
            Some(mut terrain) => terrain.take_invalidated_pages(),
            None => {
                trace!("Terrain busy, invalidated pages carried to the next frame");
                Vec::new()
            }
        };

        FrameSummary {
            report,
            batch,
            invalidated_pages,
        }
    }

    /// Returns `true` once every published edit has finished.
    pub fn is_idle(&self) -> bool {
        self.task_manager.is_idle()
    }

    /// The worker pool, for cancellation and queue inspection.
    pub fn task_manager(&self) -> &TaskManager {
        &self.task_manager
    }
}
