//! # Terrain Module
//!
//! Terrain areas, their shapes, the store that holds them and the tasks that
//! edit them.
//!
//! ## Architecture
//!
//! * **Shape**: Polygon footprints and their bounding boxes
//! * **Area**: A named region of the terrain with a shader layer and a shape
//! * **Store**: The `TerrainStore` contract tasks edit through
//! * **World**: `Terrain`, the paged in-memory store
//! * **Tasks**: Add, reshape and remove areas off the main thread
//!
//! ## Data Flow
//!
//! 1. A task is published with a handle to the store and the area it edits
//! 2. On a worker, the task locks the store and applies its edit
//! 3. The store re-indexes the area and invalidates the pages it touched
//! 4. On the main thread, the task marks the changed bounds dirty for its shader

pub mod area;
pub mod shape;
pub mod store;
pub mod tasks;
pub mod world;

pub use area::{Area, AreaId};
pub use shape::{BoundingBox, PageCoord, PageSpan, Shape, ShapeError};
pub use store::{TerrainError, TerrainStore};
pub use world::Terrain;
