//! Hit testing and selection handles.

use crate::shapes::{Shape, ShapeId};
use kurbo::{Point, Rect};
use serde::{Deserialize, Serialize};

/// Corner positions of a selection box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Corner {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl Corner {
    pub const ALL: [Corner; 4] = [
        Corner::TopLeft,
        Corner::TopRight,
        Corner::BottomLeft,
        Corner::BottomRight,
    ];

    /// Position of this corner on `rect`.
    pub fn of(self, rect: Rect) -> Point {
        match self {
            Corner::TopLeft => Point::new(rect.x0, rect.y0),
            Corner::TopRight => Point::new(rect.x1, rect.y0),
            Corner::BottomLeft => Point::new(rect.x0, rect.y1),
            Corner::BottomRight => Point::new(rect.x1, rect.y1),
        }
    }

    /// The diagonally opposite corner, which stays fixed while scaling.
    pub fn opposite(self) -> Corner {
        match self {
            Corner::TopLeft => Corner::BottomRight,
            Corner::TopRight => Corner::BottomLeft,
            Corner::BottomLeft => Corner::TopRight,
            Corner::BottomRight => Corner::TopLeft,
        }
    }
}

/// Find the scale handle of `bounds` under `point`, if any.
pub fn hit_corner(bounds: Rect, point: Point, tolerance: f64) -> Option<Corner> {
    Corner::ALL
        .into_iter()
        .find(|corner| corner.of(bounds).distance(point) <= tolerance)
}

/// Resolves which shapes lie under the pointer or inside a band.
///
/// Exact geometry belongs to the renderer; the default implementation works
/// on shape bounds.
pub trait HitTester {
    /// Topmost shape under `point`.
    fn shape_at(&self, shapes: &[Shape], point: Point, tolerance: f64) -> Option<ShapeId>;

    /// Shapes whose bounds lie entirely inside `band`.
    fn shapes_in(&self, shapes: &[Shape], band: Rect) -> Vec<ShapeId> {
        let band = band.abs();
        shapes
            .iter()
            .filter(|shape| {
                let b = shape.bounds();
                band.contains(Point::new(b.x0, b.y0)) && b.x1 <= band.x1 && b.y1 <= band.y1
            })
            .map(Shape::id)
            .collect()
    }
}

/// Hit testing against each shape's own `hit_test`. Later shapes are on top.
#[derive(Debug, Clone, Copy, Default)]
pub struct BoundsHitTester;

impl HitTester for BoundsHitTester {
    fn shape_at(&self, shapes: &[Shape], point: Point, tolerance: f64) -> Option<ShapeId> {
        shapes
            .iter()
            .rev()
            .find(|shape| shape.hit_test(point, tolerance))
            .map(Shape::id)
    }
}
