use std::fmt;

use super::shape::{BoundingBox, Shape};

/// Identifies an area inside a terrain store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AreaId(pub u32);

impl fmt::Display for AreaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "area#{}", self.0)
    }
}

/// A named, independently editable region of the terrain.
///
/// The `layer` selects which shader paints the area; the `shape` is its
/// footprint. Areas are owned by the terrain store and referred to by id
/// everywhere else.
#[derive(Debug, Clone, PartialEq)]
pub struct Area {
    id: AreaId,
    layer: u32,
    shape: Shape,
}

impl Area {
    /// Creates an area on `layer` covering `shape`.
    pub fn new(id: AreaId, layer: u32, shape: Shape) -> Self {
        Self { id, layer, shape }
    }

    /// The area's id.
    pub fn id(&self) -> AreaId {
        self.id
    }

    /// Shader layer painted inside the area.
    pub fn layer(&self) -> u32 {
        self.layer
    }

    /// Current footprint.
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Bounding box of the current footprint.
    pub fn bbox(&self) -> BoundingBox {
        self.shape.bbox()
    }

    /// Replaces the footprint, returning the previous one.
    pub fn set_shape(&mut self, shape: Shape) -> Shape {
        std::mem::replace(&mut self.shape, shape)
    }
}
