mod common;

use cgmath::Point2;
use common::{bbox, rect, RecordingSink, RecordingStore, StoreEvent};
use terrain_area_tasks::core::MtResource;
use terrain_area_tasks::engine_state::{
    rendering::ShaderTarget,
    task_management::{
        execution_context::{CancellationToken, TaskExecutionContext},
        task::{TaskError, TaskId, TaskState, TaskUnit},
    },
    terrain::{
        tasks::{TerrainAreaTask, TerrainAreaUpdateTask},
        Area, AreaId, PageCoord, Shape, ShapeError, TerrainError, TerrainStore,
    },
};

const AREA: AreaId = AreaId(1);
const SHADER: ShaderTarget = ShaderTarget(7);

fn context() -> TaskExecutionContext {
    TaskExecutionContext::new(0, CancellationToken::new())
}

fn store_with_unit_square() -> MtResource<RecordingStore> {
    MtResource::new(RecordingStore::with_area(AREA.0, rect(0.0, 0.0, 10.0, 10.0)))
}

fn unit_for(task: TerrainAreaUpdateTask<RecordingStore>) -> TaskUnit {
    TaskUnit::new(TaskId(1), Box::new(TerrainAreaTask::from(task)))
}

#[test]
fn test_moved_area_marks_old_and_new_bounds_dirty() {
    let store = store_with_unit_square();
    let mut task =
        TerrainAreaUpdateTask::new(store.clone(), AREA, rect(5.0, 5.0, 15.0, 15.0), Some(SHADER));
    let mut sink = RecordingSink::default();

    task.execute_in_background(&mut context()).unwrap();
    assert!(task.execute_in_main_thread(&mut sink));

    assert_eq!(
        store.get().area_bbox(AREA).unwrap(),
        bbox(5.0, 5.0, 15.0, 15.0)
    );
    assert_eq!(
        sink.submissions,
        vec![
            (bbox(5.0, 5.0, 15.0, 15.0), SHADER),
            (bbox(0.0, 0.0, 10.0, 10.0), SHADER),
        ]
    );
    assert_eq!(task.old_shape(), Some(bbox(0.0, 0.0, 10.0, 10.0)));
    assert_eq!(task.new_shape(), Some(bbox(5.0, 5.0, 15.0, 15.0)));
}

#[test]
fn test_area_takes_new_shape_exactly() {
    let store = store_with_unit_square();
    let shape = rect(-3.5, 2.0, 4.25, 8.0);
    let mut task = TerrainAreaUpdateTask::new(store.clone(), AREA, shape.clone(), Some(SHADER));

    task.execute_in_background(&mut context()).unwrap();
    assert!(task.execute_in_main_thread(&mut RecordingSink::default()));

    let guard = store.get();
    let area = guard.terrain.area(AREA).unwrap();
    assert_eq!(area.shape(), &shape);
    assert_eq!(area.bbox(), shape.bbox());
}

#[test]
fn test_old_bounds_read_before_mutation() {
    let store = store_with_unit_square();
    let mut task =
        TerrainAreaUpdateTask::new(store.clone(), AREA, rect(20.0, 20.0, 30.0, 30.0), None);

    task.execute_in_background(&mut context()).unwrap();

    assert_eq!(
        store.get().events(),
        vec![
            StoreEvent::ReadBbox(AREA, bbox(0.0, 0.0, 10.0, 10.0)),
            StoreEvent::SetShape(AREA),
            StoreEvent::ReadBbox(AREA, bbox(20.0, 20.0, 30.0, 30.0)),
            StoreEvent::UpdateArea(AREA),
        ]
    );
    assert_eq!(task.old_shape(), Some(bbox(0.0, 0.0, 10.0, 10.0)));
}

#[test]
fn test_no_shader_updates_silently() {
    let store = store_with_unit_square();
    let mut unit = unit_for(TerrainAreaUpdateTask::new(
        store.clone(),
        AREA,
        rect(5.0, 5.0, 15.0, 15.0),
        None,
    ));
    let mut sink = RecordingSink::default();

    unit.run_background(&mut context()).unwrap();
    assert!(unit.run_main_thread(&mut sink).unwrap());

    assert_eq!(unit.state(), TaskState::Complete);
    assert_eq!(
        store.get().area_bbox(AREA).unwrap(),
        bbox(5.0, 5.0, 15.0, 15.0)
    );
    assert!(sink.submissions.is_empty());
}

#[test]
fn test_removed_area_fails_without_commit() {
    let store = store_with_unit_square();
    store
        .get_mut()
        .terrain
        .insert_area(Area::new(AreaId(2), 0, rect(40.0, 40.0, 50.0, 50.0)))
        .unwrap();
    let mut unit = unit_for(TerrainAreaUpdateTask::new(
        store.clone(),
        AREA,
        rect(5.0, 5.0, 15.0, 15.0),
        Some(SHADER),
    ));
    let mut sink = RecordingSink::default();

    store.get_mut().remove_area(AREA).unwrap();
    let result = unit.run_background(&mut context());

    assert!(matches!(
        result,
        Err(TaskError::Terrain(TerrainError::InvalidArea(AreaId(1))))
    ));
    assert_eq!(unit.state(), TaskState::Failed);
    assert!(unit.run_main_thread(&mut sink).is_err());
    assert!(sink.submissions.is_empty());
    assert_eq!(
        store.get().area_bbox(AreaId(2)).unwrap(),
        bbox(40.0, 40.0, 50.0, 50.0)
    );
}

#[test]
fn test_rejected_shape_leaves_area_unchanged() {
    let store = store_with_unit_square();
    let degenerate = rect(3.0, 3.0, 3.0, 9.0);
    let mut task = TerrainAreaUpdateTask::new(store.clone(), AREA, degenerate, Some(SHADER));

    let result = task.execute_in_background(&mut context());

    assert!(matches!(
        result,
        Err(TaskError::Terrain(TerrainError::ShapeRejected {
            area: AreaId(1),
            source: ShapeError::Degenerate,
        }))
    ));
    assert_eq!(
        store.get().area_bbox(AREA).unwrap(),
        bbox(0.0, 0.0, 10.0, 10.0)
    );
    assert_eq!(task.old_shape(), None);
    assert_eq!(task.new_shape(), None);
}

#[test]
fn test_failed_refresh_restores_previous_shape() {
    let store = store_with_unit_square();
    store.get_mut().fail_update = true;
    let mut task =
        TerrainAreaUpdateTask::new(store.clone(), AREA, rect(5.0, 5.0, 15.0, 15.0), Some(SHADER));

    assert!(task.execute_in_background(&mut context()).is_err());

    let guard = store.get();
    assert_eq!(
        guard.terrain.area_bbox(AREA).unwrap(),
        bbox(0.0, 0.0, 10.0, 10.0)
    );
    assert_eq!(
        guard.events().last(),
        Some(&StoreEvent::SetShape(AREA)),
        "rollback must put the previous shape back"
    );
}

#[test]
fn test_panic_in_refresh_restores_shape_and_pages() {
    let store = store_with_unit_square();
    store.get_mut().panic_on_update = true;
    let mut unit = unit_for(TerrainAreaUpdateTask::new(
        store.clone(),
        AREA,
        rect(5.0, 5.0, 15.0, 15.0),
        Some(SHADER),
    ));
    let mut sink = RecordingSink::default();

    let result = unit.run_background(&mut context());

    match result {
        Err(TaskError::Panicked(message)) => assert!(message.contains("store crashed")),
        other => panic!("expected a panic failure, got {other:?}"),
    }
    assert_eq!(unit.state(), TaskState::Failed);
    assert!(unit.run_main_thread(&mut sink).is_err());
    assert!(sink.submissions.is_empty());

    let guard = store.get();
    assert_eq!(guard.area_bbox(AREA).unwrap(), bbox(0.0, 0.0, 10.0, 10.0));
    assert_eq!(guard.terrain.pages_for_area(AREA), vec![PageCoord::new(0, 0)]);
    assert!(guard.terrain.areas_on_page(PageCoord::new(1, 1)).is_empty());
}

#[test]
fn test_unaddressable_shape_rejected_before_write() {
    let store = store_with_unit_square();
    let far = Shape::polygon(vec![
        Point2::new(-3e10, 0.0),
        Point2::new(-2.9e10, 0.0),
        Point2::new(-3e10, 1.0),
    ]);
    let mut unit = unit_for(TerrainAreaUpdateTask::new(
        store.clone(),
        AREA,
        far,
        Some(SHADER),
    ));

    let result = unit.run_background(&mut context());

    assert!(matches!(
        result,
        Err(TaskError::Terrain(TerrainError::ShapeRejected {
            area: AreaId(1),
            source: ShapeError::OutOfPageRange(_),
        }))
    ));
    assert_eq!(unit.state(), TaskState::Failed);
    let guard = store.get();
    assert_eq!(guard.area_bbox(AREA).unwrap(), bbox(0.0, 0.0, 10.0, 10.0));
    assert_eq!(guard.terrain.pages_for_area(AREA), vec![PageCoord::new(0, 0)]);
    assert!(!guard.events().contains(&StoreEvent::SetShape(AREA)));
}

#[test]
fn test_identical_shape_still_marks_region_dirty() {
    let store = store_with_unit_square();
    let mut task =
        TerrainAreaUpdateTask::new(store.clone(), AREA, rect(0.0, 0.0, 10.0, 10.0), Some(SHADER));
    let mut sink = RecordingSink::default();

    task.execute_in_background(&mut context()).unwrap();
    assert!(task.execute_in_main_thread(&mut sink));

    assert_eq!(sink.submissions.len(), 2);
    assert!(sink
        .submissions
        .iter()
        .all(|(region, target)| *region == bbox(0.0, 0.0, 10.0, 10.0) && *target == SHADER));
}

#[test]
fn test_refused_submission_retries() {
    let store = store_with_unit_square();
    let mut unit = unit_for(TerrainAreaUpdateTask::new(
        store,
        AREA,
        rect(5.0, 5.0, 15.0, 15.0),
        Some(SHADER),
    ));
    let mut sink = RecordingSink {
        refusals: 1,
        ..RecordingSink::default()
    };

    unit.run_background(&mut context()).unwrap();
    assert!(!unit.run_main_thread(&mut sink).unwrap());
    assert_eq!(unit.state(), TaskState::MainThreadRunning);
    assert!(unit.run_main_thread(&mut sink).unwrap());

    assert_eq!(unit.commit_attempts(), 2);
    assert_eq!(sink.submissions.len(), 2);
}

#[test]
fn test_cancelled_before_start_changes_nothing() {
    let store = store_with_unit_square();
    let cancellation = CancellationToken::new();
    cancellation.cancel();
    let mut task =
        TerrainAreaUpdateTask::new(store.clone(), AREA, rect(5.0, 5.0, 15.0, 15.0), Some(SHADER));

    let result = task.execute_in_background(&mut TaskExecutionContext::new(0, cancellation));

    assert!(matches!(result, Err(TaskError::Cancelled)));
    assert!(store.get().events().is_empty());
}
