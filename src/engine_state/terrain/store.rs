//! # Terrain Store Contract
//!
//! The operations terrain tasks need from whatever holds the terrain's areas.
//! `Terrain` is the in-memory implementation; tests plug in instrumented stores.

use thiserror::Error;

use super::{
    area::{Area, AreaId},
    shape::{BoundingBox, Shape, ShapeError},
};

/// Errors raised by a terrain store.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TerrainError {
    /// The area is not (or no longer) in the store.
    #[error("{0} does not exist in the terrain")]
    InvalidArea(AreaId),
    /// The store refused the new footprint; nothing was changed.
    #[error("shape rejected for {area}: {source}")]
    ShapeRejected {
        /// Area the shape was meant for.
        area: AreaId,
        /// Why it was refused.
        source: ShapeError,
    },
    /// An area with this id is already present.
    #[error("{0} already exists in the terrain")]
    DuplicateArea(AreaId),
}

/// A mutable store of terrain areas keyed by id.
///
/// Background tasks call these methods while holding the store's write lock, so
/// a sequence of calls made under one guard is atomic to every other reader.
pub trait TerrainStore: Send + Sync {
    /// Bounding box of the area's current shape.
    fn area_bbox(&self, area: AreaId) -> Result<BoundingBox, TerrainError>;

    /// Validates `shape` and, only if it is accepted, replaces the area's shape.
    ///
    /// Returns the shape that was replaced.
    fn set_area_shape(&mut self, area: AreaId, shape: Shape) -> Result<Shape, TerrainError>;

    /// Refreshes whatever the store derives from the area's shape.
    ///
    /// Called once after every shape replacement.
    fn update_area(&mut self, area: AreaId) -> Result<(), TerrainError>;

    /// Adds a new area and indexes it.
    fn insert_area(&mut self, area: Area) -> Result<(), TerrainError>;

    /// Removes an area, returning it.
    fn remove_area(&mut self, area: AreaId) -> Result<Area, TerrainError>;
}
