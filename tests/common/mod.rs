#![allow(dead_code)]

use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use cgmath::Point2;
use terrain_area_tasks::engine_state::{
    rendering::{DirtyBatch, DirtyRegionSink, FrameDirtyRegions, ShaderTarget, SinkError},
    task_management::{TaskManager, TaskReport},
    terrain::{Area, AreaId, BoundingBox, Shape, Terrain, TerrainError, TerrainStore},
};

pub const PAGE_SIZE: f32 = 10.0;

pub fn rect(min_x: f32, min_y: f32, max_x: f32, max_y: f32) -> Shape {
    Shape::rectangle(Point2::new(min_x, min_y), Point2::new(max_x, max_y))
}

pub fn bbox(min_x: f32, min_y: f32, max_x: f32, max_y: f32) -> BoundingBox {
    BoundingBox::from_coords(min_x, min_y, max_x, max_y)
}

/// A store call, in the order it reached the store.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    ReadBbox(AreaId, BoundingBox),
    SetShape(AreaId),
    UpdateArea(AreaId),
    Insert(AreaId),
    Remove(AreaId),
}

/// Wraps a `Terrain` and records every call made to it.
pub struct RecordingStore {
    pub terrain: Terrain,
    pub events: Mutex<Vec<StoreEvent>>,
    /// Makes `update_area` fail after the shape was replaced.
    pub fail_update: bool,
    /// Makes the next `update_area` reindex the area and then panic.
    pub panic_on_update: bool,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self {
            terrain: Terrain::new(PAGE_SIZE, None),
            events: Mutex::new(Vec::new()),
            fail_update: false,
            panic_on_update: false,
        }
    }

    pub fn with_area(id: u32, shape: Shape) -> Self {
        let mut store = Self::new();
        store.terrain.insert_area(Area::new(AreaId(id), 0, shape)).unwrap();
        store
    }

    pub fn events(&self) -> Vec<StoreEvent> {
        self.events.lock().unwrap().clone()
    }

    fn record(&self, event: StoreEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl TerrainStore for RecordingStore {
    fn area_bbox(&self, area: AreaId) -> Result<BoundingBox, TerrainError> {
        let bbox = self.terrain.area_bbox(area)?;
        self.record(StoreEvent::ReadBbox(area, bbox));
        Ok(bbox)
    }

    fn set_area_shape(&mut self, area: AreaId, shape: Shape) -> Result<Shape, TerrainError> {
        let previous = self.terrain.set_area_shape(area, shape)?;
        self.record(StoreEvent::SetShape(area));
        Ok(previous)
    }

    fn update_area(&mut self, area: AreaId) -> Result<(), TerrainError> {
        self.record(StoreEvent::UpdateArea(area));
        if self.fail_update {
            return Err(TerrainError::InvalidArea(area));
        }
        if self.panic_on_update {
            self.panic_on_update = false;
            self.terrain.update_area(area)?;
            panic!("store crashed while refreshing {area}");
        }
        self.terrain.update_area(area)
    }

    fn insert_area(&mut self, area: Area) -> Result<(), TerrainError> {
        let id = area.id();
        self.terrain.insert_area(area)?;
        self.record(StoreEvent::Insert(id));
        Ok(())
    }

    fn remove_area(&mut self, area: AreaId) -> Result<Area, TerrainError> {
        let removed = self.terrain.remove_area(area)?;
        self.record(StoreEvent::Remove(area));
        Ok(removed)
    }
}

/// Sink that keeps every submission, duplicates included.
#[derive(Default)]
pub struct RecordingSink {
    pub submissions: Vec<(BoundingBox, ShaderTarget)>,
    /// Refuse this many submissions before accepting any.
    pub refusals: u32,
}

impl DirtyRegionSink for RecordingSink {
    fn submit(&mut self, region: BoundingBox, target: ShaderTarget) -> Result<(), SinkError> {
        if self.refusals > 0 {
            self.refusals -= 1;
            return Err(SinkError::Unavailable { frame: 0 });
        }
        self.submissions.push((region, target));
        Ok(())
    }
}

/// One frame of the main loop: open the sink, commit, dispatch, drain.
pub fn frame(manager: &mut TaskManager, sink: &mut FrameDirtyRegions) -> (TaskReport, DirtyBatch) {
    sink.begin_frame();
    let report = manager.process_completed_tasks(sink);
    manager.process_queued_tasks();
    (report, sink.drain())
}

/// Runs frames until the manager is idle, merging every report and batch.
pub fn pump_until_idle(
    manager: &mut TaskManager,
    sink: &mut FrameDirtyRegions,
) -> (TaskReport, Vec<DirtyBatch>) {
    let deadline = Instant::now() + Duration::from_secs(10);
    let mut merged = TaskReport::default();
    let mut batches = Vec::new();

    loop {
        let (report, batch) = frame(manager, sink);
        merged.completed.extend(report.completed);
        merged.deferred.extend(report.deferred);
        merged.failed.extend(report.failed);
        merged.dropped.extend(report.dropped);
        if !batch.is_empty() {
            batches.push(batch);
        }
        if manager.is_idle() {
            return (merged, batches);
        }
        assert!(Instant::now() < deadline, "task manager never became idle");
        thread::sleep(Duration::from_millis(1));
    }
}
