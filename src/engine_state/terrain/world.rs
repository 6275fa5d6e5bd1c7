//! # Terrain World
//!
//! This module provides `Terrain`, the in-memory terrain store that area tasks
//! edit.
//!
//! ## Architecture
//!
//! The terrain is tiled into square pages. Each area is indexed on every page its
//! bounding box overlaps, so the renderer can ask which areas paint a page. When an
//! area is added, reshaped or removed, every page it touched before or after the
//! change is marked *invalidated*: its cached shader weights no longer match the
//! area data and must be rebuilt.
//!
//! Pages are stored sparsely, only pages that some area overlaps are kept. A
//! shape is only accepted if its pages are addressable and number at most
//! `max_pages_per_area`, so indexing an accepted shape cannot fail.

use std::collections::{BTreeSet, HashMap};

use log::trace;

use super::{
    area::{Area, AreaId},
    shape::{BoundingBox, PageCoord, Shape, ShapeError},
    store::{TerrainError, TerrainStore},
};
use crate::config::TerrainConfig;

/// In-memory, paged terrain store.
///
/// # Examples
///
/// ```
/// use cgmath::Point2;
/// use terrain_area_tasks::engine_state::terrain::{
///     Area, AreaId, PageCoord, Shape, Terrain, TerrainStore,
/// };
///
/// let mut terrain = Terrain::new(10.0, None);
/// let shape = Shape::rectangle(Point2::new(0.0, 0.0), Point2::new(10.0, 10.0));
/// terrain.insert_area(Area::new(AreaId(1), 0, shape)).unwrap();
///
/// assert_eq!(terrain.pages_for_area(AreaId(1)), vec![PageCoord::new(0, 0)]);
/// assert_eq!(terrain.take_invalidated_pages(), vec![PageCoord::new(0, 0)]);
/// ```
pub struct Terrain {
    areas: HashMap<AreaId, Area>,
    page_size: f32,
    extent: Option<BoundingBox>,
    max_pages_per_area: u64,
    /// Pages each area is currently indexed on.
    area_pages: HashMap<AreaId, BTreeSet<PageCoord>>,
    /// Areas indexed on each page.
    page_areas: HashMap<PageCoord, BTreeSet<AreaId>>,
    invalidated_pages: BTreeSet<PageCoord>,
}

impl Terrain {
    /// Creates an empty terrain.
    ///
    /// # Arguments
    /// * `page_size` - Edge length of one page in world units
    /// * `extent` - If set, shapes must lie inside this box to be accepted
    pub fn new(page_size: f32, extent: Option<BoundingBox>) -> Self {
        Self {
            areas: HashMap::new(),
            page_size,
            extent,
            max_pages_per_area: TerrainConfig::default().max_pages_per_area,
            area_pages: HashMap::new(),
            page_areas: HashMap::new(),
            invalidated_pages: BTreeSet::new(),
        }
    }

    /// Creates an empty terrain from its configuration section.
    pub fn from_config(config: &TerrainConfig) -> Self {
        Self::new(config.page_size, config.extent_bbox())
            .with_max_pages_per_area(config.max_pages_per_area)
    }

    /// Sets the most pages a single area may be indexed on.
    pub fn with_max_pages_per_area(mut self, limit: u64) -> Self {
        self.max_pages_per_area = limit;
        self
    }

    /// Edge length of one page.
    pub fn page_size(&self) -> f32 {
        self.page_size
    }

    /// Looks up an area.
    pub fn area(&self, id: AreaId) -> Option<&Area> {
        self.areas.get(&id)
    }

    /// Number of areas in the store.
    pub fn area_count(&self) -> usize {
        self.areas.len()
    }

    /// Ids of every area, sorted.
    pub fn area_ids(&self) -> Vec<AreaId> {
        let mut ids: Vec<AreaId> = self.areas.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Pages the area is indexed on, sorted. Empty for unknown areas.
    pub fn pages_for_area(&self, id: AreaId) -> Vec<PageCoord> {
        self.area_pages
            .get(&id)
            .map(|pages| pages.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Areas indexed on the page, sorted.
    pub fn areas_on_page(&self, page: PageCoord) -> Vec<AreaId> {
        self.page_areas
            .get(&page)
            .map(|areas| areas.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Returns and clears the set of pages whose shader data went stale.
    pub fn take_invalidated_pages(&mut self) -> Vec<PageCoord> {
        std::mem::take(&mut self.invalidated_pages)
            .into_iter()
            .collect()
    }

    /// Checks `shape` may be stored and returns the pages it would be indexed on.
    fn validate_shape(&self, shape: &Shape) -> Result<BTreeSet<PageCoord>, ShapeError> {
        shape.validate()?;
        let bbox = shape.bbox();
        if let Some(extent) = self.extent {
            if !extent.contains(&bbox) {
                return Err(ShapeError::OutOfBounds { bbox, extent });
            }
        }
        self.pages_for_bbox(bbox)
    }

    fn pages_for_bbox(&self, bbox: BoundingBox) -> Result<BTreeSet<PageCoord>, ShapeError> {
        let span = bbox
            .page_span(self.page_size)
            .ok_or(ShapeError::OutOfPageRange(bbox))?;
        let pages = span.count();
        if pages > self.max_pages_per_area {
            return Err(ShapeError::TooManyPages {
                pages,
                limit: self.max_pages_per_area,
            });
        }
        Ok(span.pages().collect())
    }

    /// Moves `id` from the pages it was indexed on to `pages`, invalidating both sets.
    fn reindex(&mut self, id: AreaId, pages: BTreeSet<PageCoord>) {
        let old_pages = self.area_pages.remove(&id).unwrap_or_default();

        for page in old_pages.difference(&pages) {
            if let Some(areas) = self.page_areas.get_mut(page) {
                areas.remove(&id);
                if areas.is_empty() {
                    self.page_areas.remove(page);
                }
            }
        }
        for page in &pages {
            self.page_areas.entry(*page).or_default().insert(id);
        }

        self.invalidated_pages.extend(old_pages.iter().copied());
        self.invalidated_pages.extend(pages.iter().copied());

        trace!(
            "Reindexed {} from {} to {} pages",
            id,
            old_pages.len(),
            pages.len()
        );

        if !pages.is_empty() {
            self.area_pages.insert(id, pages);
        }
    }
}

impl TerrainStore for Terrain {
    fn area_bbox(&self, area: AreaId) -> Result<BoundingBox, TerrainError> {
        self.areas
            .get(&area)
            .map(Area::bbox)
            .ok_or(TerrainError::InvalidArea(area))
    }

    fn set_area_shape(&mut self, area: AreaId, shape: Shape) -> Result<Shape, TerrainError> {
        if !self.areas.contains_key(&area) {
            return Err(TerrainError::InvalidArea(area));
        }
        self.validate_shape(&shape)
            .map_err(|source| TerrainError::ShapeRejected { area, source })?;

        let entry = self
            .areas
            .get_mut(&area)
            .ok_or(TerrainError::InvalidArea(area))?;
        Ok(entry.set_shape(shape))
    }

    fn update_area(&mut self, area: AreaId) -> Result<(), TerrainError> {
        let bbox = self.area_bbox(area)?;
        let pages = self
            .pages_for_bbox(bbox)
            .map_err(|source| TerrainError::ShapeRejected { area, source })?;
        self.reindex(area, pages);
        Ok(())
    }

    fn insert_area(&mut self, area: Area) -> Result<(), TerrainError> {
        let id = area.id();
        if self.areas.contains_key(&id) {
            return Err(TerrainError::DuplicateArea(id));
        }
        let pages = self
            .validate_shape(area.shape())
            .map_err(|source| TerrainError::ShapeRejected { area: id, source })?;
        self.areas.insert(id, area);
        self.reindex(id, pages);
        Ok(())
    }

    fn remove_area(&mut self, area: AreaId) -> Result<Area, TerrainError> {
        let removed = self
            .areas
            .remove(&area)
            .ok_or(TerrainError::InvalidArea(area))?;
        self.reindex(area, BTreeSet::new());
        Ok(removed)
    }
}
