//! # Shape Module
//!
//! Geometric footprints for terrain areas.
//!
//! A `Shape` is an immutable polygon in terrain space (x/y, world units) with a
//! bounding box derived once at construction. A `BoundingBox` is what tasks record
//! before and after an edit and what the dirty-region sink receives. A `PageCoord`
//! addresses one square page of the tiled terrain.

use std::{cmp::Ordering, fmt};

use cgmath::Point2;
use thiserror::Error;

/// Reasons a polygon is rejected as an area footprint.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ShapeError {
    /// Fewer than three vertices.
    #[error("polygon has {0} points, at least 3 are required")]
    TooFewPoints(usize),
    /// A vertex has a NaN or infinite coordinate.
    #[error("polygon contains a non-finite coordinate")]
    NonFinite,
    /// All vertices are collinear or coincident.
    #[error("polygon encloses no area")]
    Degenerate,
    /// The footprint leaves the terrain's extent.
    #[error("shape bounds {bbox} fall outside the terrain extent {extent}")]
    OutOfBounds {
        /// Bounds of the rejected shape.
        bbox: BoundingBox,
        /// Extent of the terrain.
        extent: BoundingBox,
    },
    /// The footprint lies beyond the addressable page grid.
    #[error("shape bounds {0} have no addressable pages")]
    OutOfPageRange(BoundingBox),
    /// The footprint overlaps more pages than one area may be indexed on.
    #[error("shape covers {pages} pages, at most {limit} are allowed")]
    TooManyPages {
        /// Pages the shape would cover.
        pages: u64,
        /// Configured limit.
        limit: u64,
    },
}

/// An axis-aligned rectangle in terrain space.
///
/// `min` is always component-wise less than or equal to `max`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    /// Lower corner.
    pub min: Point2<f32>,
    /// Upper corner.
    pub max: Point2<f32>,
}

impl BoundingBox {
    /// Creates a box spanning the two corners, in any order.
    pub fn new(a: Point2<f32>, b: Point2<f32>) -> Self {
        Self {
            min: Point2::new(a.x.min(b.x), a.y.min(b.y)),
            max: Point2::new(a.x.max(b.x), a.y.max(b.y)),
        }
    }

    /// Shorthand for `BoundingBox::new` from raw coordinates.
    pub fn from_coords(min_x: f32, min_y: f32, max_x: f32, max_y: f32) -> Self {
        Self::new(Point2::new(min_x, min_y), Point2::new(max_x, max_y))
    }

    /// Smallest box containing every point, or `None` for an empty slice.
    pub fn from_points(points: &[Point2<f32>]) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        let mut bbox = Self {
            min: *first,
            max: *first,
        };
        for point in rest {
            bbox.min.x = bbox.min.x.min(point.x);
            bbox.min.y = bbox.min.y.min(point.y);
            bbox.max.x = bbox.max.x.max(point.x);
            bbox.max.y = bbox.max.y.max(point.y);
        }
        Some(bbox)
    }

    /// Extent along x.
    pub fn width(&self) -> f32 {
        self.max.x - self.min.x
    }

    /// Extent along y.
    pub fn height(&self) -> f32 {
        self.max.y - self.min.y
    }

    /// Returns `true` if the boxes share any point, edges included.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min.x <= other.max.x
            && other.min.x <= self.max.x
            && self.min.y <= other.max.y
            && other.min.y <= self.max.y
    }

    /// Returns `true` if `other` lies entirely inside this box.
    pub fn contains(&self, other: &BoundingBox) -> bool {
        self.min.x <= other.min.x
            && self.min.y <= other.min.y
            && other.max.x <= self.max.x
            && other.max.y <= self.max.y
    }

    /// Smallest box containing both boxes.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            min: Point2::new(self.min.x.min(other.min.x), self.min.y.min(other.min.y)),
            max: Point2::new(self.max.x.max(other.max.x), self.max.y.max(other.max.y)),
        }
    }

    /// The block of pages of edge `page_size` this box overlaps.
    ///
    /// A box whose upper edge lies exactly on a page boundary does not reach into
    /// the next page. A zero-sized box still maps to the page containing it.
    /// Returns `None` if any page coordinate would not fit in an `i32`.
    pub fn page_span(&self, page_size: f32) -> Option<PageSpan> {
        let (first_x, last_x) = axis_span(self.min.x, self.max.x, page_size)?;
        let (first_y, last_y) = axis_span(self.min.y, self.max.y, page_size)?;
        Some(PageSpan {
            first: PageCoord::new(first_x, first_y),
            last: PageCoord::new(last_x, last_y),
        })
    }

    /// Bit pattern identifying this box exactly, used as a hash key.
    pub(crate) fn key(&self) -> [u32; 4] {
        // + 0.0 folds -0.0 into 0.0 so both spellings hash alike
        [
            (self.min.x + 0.0).to_bits(),
            (self.min.y + 0.0).to_bits(),
            (self.max.x + 0.0).to_bits(),
            (self.max.y + 0.0).to_bits(),
        ]
    }
}

fn axis_span(min: f32, max: f32, page_size: f32) -> Option<(i32, i32)> {
    let page_size = f64::from(page_size);
    let first = (f64::from(min) / page_size).floor();
    let last = ((f64::from(max) / page_size).ceil() - 1.0).max(first);
    let addressable = f64::from(i32::MIN)..=f64::from(i32::MAX);
    if !addressable.contains(&first) || !addressable.contains(&last) {
        return None;
    }
    Some((first as i32, last as i32))
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[({}, {})-({}, {})]",
            self.min.x, self.min.y, self.max.x, self.max.y
        )
    }
}

/// Integer coordinates of a terrain page.
///
/// Ordered row-major, the same order `PageSpan::pages` yields them in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageCoord {
    /// Column.
    pub x: i32,
    /// Row.
    pub y: i32,
}

impl PageCoord {
    /// Creates a page coordinate.
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl Ord for PageCoord {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.y, self.x).cmp(&(other.y, other.x))
    }
}

impl PartialOrd for PageCoord {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for PageCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "page({}, {})", self.x, self.y)
    }
}

/// An inclusive, row-major block of pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSpan {
    /// Lowest column and row.
    pub first: PageCoord,
    /// Highest column and row.
    pub last: PageCoord,
}

impl PageSpan {
    /// Number of pages in the block, saturating at `u64::MAX`.
    pub fn count(&self) -> u64 {
        let columns = (i64::from(self.last.x) - i64::from(self.first.x) + 1) as u64;
        let rows = (i64::from(self.last.y) - i64::from(self.first.y) + 1) as u64;
        columns.saturating_mul(rows)
    }

    /// Every page of the block, row by row.
    pub fn pages(&self) -> impl Iterator<Item = PageCoord> {
        let (first, last) = (self.first, self.last);
        (first.y..=last.y).flat_map(move |y| (first.x..=last.x).map(move |x| PageCoord { x, y }))
    }
}

/// A polygonal footprint with its derived bounding box.
///
/// Shapes are immutable; editing an area means replacing its shape with a new one.
/// Construction never fails, validation is a separate step so the terrain store
/// can reject a shape at the moment it is applied.
#[derive(Debug, Clone, PartialEq)]
pub struct Shape {
    points: Vec<Point2<f32>>,
    bbox: BoundingBox,
}

impl Shape {
    /// Creates a polygon from its vertices, in either winding order.
    pub fn polygon(points: Vec<Point2<f32>>) -> Self {
        let bbox = BoundingBox::from_points(&points)
            .unwrap_or_else(|| BoundingBox::from_coords(0.0, 0.0, 0.0, 0.0));
        Self { points, bbox }
    }

    /// Creates an axis-aligned rectangle.
    pub fn rectangle(min: Point2<f32>, max: Point2<f32>) -> Self {
        let bbox = BoundingBox::new(min, max);
        Self::polygon(vec![
            bbox.min,
            Point2::new(bbox.max.x, bbox.min.y),
            bbox.max,
            Point2::new(bbox.min.x, bbox.max.y),
        ])
    }

    /// The polygon's vertices.
    pub fn points(&self) -> &[Point2<f32>] {
        &self.points
    }

    /// The bounding box computed at construction.
    pub fn bbox(&self) -> BoundingBox {
        self.bbox
    }

    /// Shoelace area; positive for counter-clockwise winding.
    pub fn signed_area(&self) -> f32 {
        let n = self.points.len();
        let twice: f32 = (0..n)
            .map(|i| {
                let a = self.points[i];
                let b = self.points[(i + 1) % n];
                a.x * b.y - b.x * a.y
            })
            .sum();
        twice * 0.5
    }

    /// A copy of this shape moved by `(dx, dy)`.
    pub fn translated(&self, dx: f32, dy: f32) -> Shape {
        Shape::polygon(
            self.points
                .iter()
                .map(|p| Point2::new(p.x + dx, p.y + dy))
                .collect(),
        )
    }

    /// Checks the shape is a usable footprint, independent of any terrain.
    pub fn validate(&self) -> Result<(), ShapeError> {
        if self.points.len() < 3 {
            return Err(ShapeError::TooFewPoints(self.points.len()));
        }
        if self
            .points
            .iter()
            .any(|p| !p.x.is_finite() || !p.y.is_finite())
        {
            return Err(ShapeError::NonFinite);
        }
        if self.signed_area() == 0.0 {
            return Err(ShapeError::Degenerate);
        }
        Ok(())
    }
}
