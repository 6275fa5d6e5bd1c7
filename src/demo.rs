//! # Headless Editing Demo
//!
//! Drives a `TerrainEditor` through a fixed number of frames, moving, adding
//! and removing random areas, and logs what each frame marked dirty.
//!
//! The demo honours the editor's one rule for callers: an area never has two
//! edits in flight at once.

use std::collections::{HashMap, HashSet};
use std::io;
use std::thread;

use cgmath::Point2;
use log::{debug, info};
use web_time::{Duration, Instant};

use crate::{
    config::EditorConfig,
    engine_state::{
        rendering::ShaderTarget,
        task_management::task::TaskId,
        terrain::{Area, AreaId, BoundingBox, Shape},
        TerrainEditor,
    },
};

/// Frames to keep pumping after the last scripted frame before giving up.
const MAX_SETTLE_FRAMES: u32 = 10_000;

/// Totals collected over a demo run.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DemoStats {
    /// Frames processed, settle frames included.
    pub frames: u32,
    /// Edits published.
    pub edits: u32,
    /// Edits that completed.
    pub completed: usize,
    /// Edits that failed.
    pub failed: usize,
    /// Edits whose visual update was dropped.
    pub dropped: usize,
    /// Dirty-region submissions received by the sink.
    pub submissions: usize,
    /// Unique dirty regions handed to the rebuild pass.
    pub dirty_regions: usize,
    /// Areas left in the terrain at the end.
    pub areas: usize,
}

enum Edit {
    Add(AreaId),
    Update(AreaId),
    Remove(AreaId),
}

impl Edit {
    fn area(&self) -> AreaId {
        match self {
            Edit::Add(area) | Edit::Update(area) | Edit::Remove(area) => *area,
        }
    }
}

struct EditScript {
    rng: fastrand::Rng,
    extent: BoundingBox,
    page_size: f32,
    layers: u32,
    next_area: u32,
    /// Areas present in the terrain and not being removed
    live: Vec<AreaId>,
    /// Areas with an edit in flight
    busy: HashSet<AreaId>,
    in_flight: HashMap<TaskId, Edit>,
}

impl EditScript {
    fn random_square(&mut self) -> Shape {
        let max_side = (self.extent.width().min(self.extent.height()) * 0.5).max(1.0);
        let side = (self.page_size * (0.25 + self.rng.f32() * 1.25)).min(max_side);
        let x = self.extent.min.x + self.rng.f32() * (self.extent.width() - side).max(0.0);
        let y = self.extent.min.y + self.rng.f32() * (self.extent.height() - side).max(0.0);
        Shape::rectangle(Point2::new(x, y), Point2::new(x + side, y + side))
    }

    fn add(&mut self, editor: &mut TerrainEditor) {
        let id = AreaId(self.next_area);
        self.next_area += 1;
        let layer = id.0 % self.layers;
        let shape = self.random_square();

        let task = editor.add_area(Area::new(id, layer, shape));
        self.busy.insert(id);
        self.in_flight.insert(task, Edit::Add(id));
    }

    fn pick_idle(&mut self) -> Option<AreaId> {
        let idle: Vec<AreaId> = self
            .live
            .iter()
            .copied()
            .filter(|area| !self.busy.contains(area))
            .collect();
        if idle.is_empty() {
            None
        } else {
            Some(idle[self.rng.usize(..idle.len())])
        }
    }

    fn edit(&mut self, editor: &mut TerrainEditor) {
        let roll = self.rng.u32(0..10);
        if roll == 0 || self.live.is_empty() {
            self.add(editor);
            return;
        }
        let Some(area) = self.pick_idle() else {
            return;
        };

        if roll == 1 {
            let task = editor.remove_area(area);
            self.live.retain(|live| *live != area);
            self.busy.insert(area);
            self.in_flight.insert(task, Edit::Remove(area));
            return;
        }

        let current = editor
            .terrain()
            .get()
            .area(area)
            .map(|area| area.shape().clone());
        let Some(current) = current else {
            return;
        };
        let step = self.page_size * 0.5;
        let dx = (self.rng.f32() * 2.0 - 1.0) * step;
        let dy = (self.rng.f32() * 2.0 - 1.0) * step;
        let mut shape = current.translated(dx, dy);
        if !self.extent.contains(&shape.bbox()) {
            shape = self.random_square();
        }

        let task = editor.update_area_shape(area, shape);
        self.busy.insert(area);
        self.in_flight.insert(task, Edit::Update(area));
    }

    fn finish(&mut self, task: TaskId, succeeded: bool) {
        let Some(edit) = self.in_flight.remove(&task) else {
            return;
        };
        self.busy.remove(&edit.area());
        if let (Edit::Add(area), true) = (&edit, succeeded) {
            self.live.push(*area);
        }
    }
}

/// Runs the demo described by `config.demo`.
///
/// # Errors
/// Returns the OS error if the worker pool cannot be started.
pub fn run_demo(config: &EditorConfig) -> io::Result<DemoStats> {
    let demo = &config.demo;
    let page_size = config.terrain.page_size;
    let extent = config
        .terrain
        .extent_bbox()
        .unwrap_or_else(|| BoundingBox::from_coords(0.0, 0.0, page_size * 8.0, page_size * 8.0));

    let mut editor = TerrainEditor::new(config)?;
    for layer in 0..demo.layers {
        editor.register_layer_shader(layer, ShaderTarget(layer + 1));
    }

    let mut script = EditScript {
        rng: demo.seed.map_or_else(fastrand::Rng::new, fastrand::Rng::with_seed),
        extent,
        page_size,
        layers: demo.layers.max(1),
        next_area: 0,
        live: Vec::new(),
        busy: HashSet::new(),
        in_flight: HashMap::new(),
    };
    let mut stats = DemoStats::default();

    for _ in 0..demo.areas {
        script.add(&mut editor);
        stats.edits += 1;
    }

    let frame_time = Duration::from_millis(demo.frame_millis);
    let mut frame = 0;
    let last_frame = demo.frames.saturating_add(MAX_SETTLE_FRAMES);
    while frame < demo.frames || (!editor.is_idle() && frame < last_frame) {
        let started = Instant::now();

        if frame < demo.frames {
            for _ in 0..demo.edits_per_frame {
                let before = script.in_flight.len();
                script.edit(&mut editor);
                stats.edits += (script.in_flight.len() - before) as u32;
            }
        }

        let summary = editor.process_frame();
        for task in &summary.report.completed {
            script.finish(*task, true);
        }
        for failure in &summary.report.failed {
            script.finish(failure.id, false);
        }
        for task in &summary.report.dropped {
            script.finish(*task, true);
        }

        stats.completed += summary.report.completed.len();
        stats.failed += summary.report.failed.len();
        stats.dropped += summary.report.dropped.len();
        stats.submissions += summary.batch.submissions;
        stats.dirty_regions += summary.batch.regions.len();

        if !summary.batch.is_empty() {
            let pages: usize = summary.batch.pages.values().map(|pages| pages.len()).sum();
            debug!(
                "Frame {}: {} submissions -> {} dirty regions over {} shader pages, {} store pages invalidated",
                summary.batch.frame,
                summary.batch.submissions,
                summary.batch.regions.len(),
                pages,
                summary.invalidated_pages.len()
            );
        }

        frame += 1;
        if frame <= demo.frames {
            if let Some(remaining) = frame_time.checked_sub(started.elapsed()) {
                thread::sleep(remaining);
            }
        } else {
            thread::sleep(Duration::from_millis(1));
        }
    }

    stats.frames = frame;
    stats.areas = editor.terrain().get().area_count();
    info!(
        "Demo finished after {} frames: {} edits, {} completed, {} failed, {} dropped, {} submissions batched into {} dirty regions, {} areas remain",
        stats.frames,
        stats.edits,
        stats.completed,
        stats.failed,
        stats.dropped,
        stats.submissions,
        stats.dirty_regions,
        stats.areas
    );
    Ok(stats)
}
