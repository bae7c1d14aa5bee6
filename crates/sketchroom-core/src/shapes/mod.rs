//! Shape definitions for the canvas.
//!
//! A [`Shape`] is a flat, self-contained record: identity, a kind tag with the
//! kind-specific fields, placement, and style. It serializes to a single JSON
//! object keyed by `objectId`, which is the unit the shape store replicates.

mod attributes;
mod geometry;
mod style;

pub use attributes::{AttributeEdit, ElementAttributes};
pub use geometry::Geometry;
pub use style::{ColorParseError, SerializableColor, ShapeStyle};

use kurbo::{Line, ParamCurveNearest, Point, Rect, Vec2};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for shapes.
pub type ShapeId = Uuid;

/// Placeholder content for freshly placed text.
pub const DEFAULT_TEXT: &str = "Tap to Type";
/// Font size for freshly placed text.
pub const DEFAULT_FONT_SIZE: f64 = 36.0;
/// Font family for freshly placed text.
pub const DEFAULT_FONT_FAMILY: &str = "Helvetica";
/// Font weight for freshly placed text.
pub const DEFAULT_FONT_WEIGHT: u16 = 400;

/// Average glyph advance relative to the font size.
const CHAR_WIDTH_FACTOR: f64 = 0.55;
/// Line height relative to the font size.
const LINE_HEIGHT_FACTOR: f64 = 1.2;

/// Kind tag plus kind-specific fields.
///
/// Point data (line endpoints, freehand path) is relative to the shape origin
/// and unscaled, so moving a shape only touches its [`Geometry`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ShapeKind {
    Rectangle,
    Circle {
        radius: f64,
    },
    Line {
        x1: f64,
        y1: f64,
        x2: f64,
        y2: f64,
    },
    Freehand {
        path: Vec<Point>,
    },
    #[serde(rename_all = "camelCase")]
    Text {
        text: String,
        font_size: f64,
        font_family: String,
        font_weight: u16,
    },
    Image {
        src: String,
    },
}

impl ShapeKind {
    /// Wire name of the kind.
    pub fn name(&self) -> &'static str {
        match self {
            ShapeKind::Rectangle => "rectangle",
            ShapeKind::Circle { .. } => "circle",
            ShapeKind::Line { .. } => "line",
            ShapeKind::Freehand { .. } => "freehand",
            ShapeKind::Text { .. } => "text",
            ShapeKind::Image { .. } => "image",
        }
    }
}

/// A shape on the shared canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shape {
    /// Identity, assigned once at creation and equal to the store key.
    pub object_id: ShapeId,
    #[serde(flatten)]
    pub kind: ShapeKind,
    #[serde(flatten)]
    pub geometry: Geometry,
    #[serde(flatten)]
    pub style: ShapeStyle,
}

impl Shape {
    /// Create a shape with a fresh identity.
    pub fn new(kind: ShapeKind, geometry: Geometry, style: ShapeStyle) -> Self {
        Self {
            object_id: Uuid::new_v4(),
            kind,
            geometry,
            style,
        }
    }

    /// Rectangle covering `rect` (corners in any order).
    pub fn rectangle(rect: Rect) -> Self {
        Self::new(ShapeKind::Rectangle, Geometry::from_rect(rect), ShapeStyle::default())
    }

    /// Circle whose bounding square starts at the top-left of `rect` and has
    /// the larger of its two sides.
    pub fn circle(rect: Rect) -> Self {
        let rect = rect.abs();
        let side = rect.width().max(rect.height());
        Self::new(
            ShapeKind::Circle { radius: side / 2.0 },
            Geometry::from_rect(Rect::from_origin_size(rect.origin(), (side, side))),
            ShapeStyle::default(),
        )
    }

    /// Straight line between two canvas points.
    pub fn line(start: Point, end: Point) -> Self {
        let geometry = Geometry::from_rect(Rect::from_points(start, end));
        let origin = geometry.origin();
        Self::new(
            ShapeKind::Line {
                x1: start.x - origin.x,
                y1: start.y - origin.y,
                x2: end.x - origin.x,
                y2: end.y - origin.y,
            },
            geometry,
            ShapeStyle::stroke_only(SerializableColor::light_gray(), 5.0),
        )
    }

    /// Freehand path through canvas points. Returns `None` for an empty path.
    pub fn freehand(points: &[Point]) -> Option<Self> {
        let first = *points.first()?;
        let bounds = points
            .iter()
            .fold(Rect::from_points(first, first), |acc, p| acc.union_pt(*p));
        let origin = bounds.origin();
        let path = points.iter().map(|p| Point::new(p.x - origin.x, p.y - origin.y)).collect();
        Some(Self::new(
            ShapeKind::Freehand { path },
            Geometry::from_rect(bounds),
            ShapeStyle::stroke_only(SerializableColor::black(), 5.0),
        ))
    }

    /// Text with the default font at `origin`.
    pub fn text(origin: Point, content: &str) -> Self {
        let (width, height) = approximate_text_size(content, DEFAULT_FONT_SIZE);
        Self::new(
            ShapeKind::Text {
                text: content.to_string(),
                font_size: DEFAULT_FONT_SIZE,
                font_family: DEFAULT_FONT_FAMILY.to_string(),
                font_weight: DEFAULT_FONT_WEIGHT,
            },
            Geometry::from_rect(Rect::from_origin_size(origin, (width, height))),
            ShapeStyle {
                fill: Some(SerializableColor::light_gray()),
                stroke: None,
                stroke_width: 1.0,
            },
        )
    }

    /// Image shape referencing an uploaded asset.
    pub fn image(origin: Point, src: impl Into<String>, width: f64, height: f64) -> Self {
        Self::new(
            ShapeKind::Image { src: src.into() },
            Geometry::from_rect(Rect::from_origin_size(origin, (width, height))),
            ShapeStyle {
                fill: None,
                stroke: None,
                stroke_width: 0.0,
            },
        )
    }

    pub fn id(&self) -> ShapeId {
        self.object_id
    }

    pub fn kind_name(&self) -> &'static str {
        self.kind.name()
    }

    /// Axis-aligned bounds in canvas coordinates.
    pub fn bounds(&self) -> Rect {
        self.geometry.bounds()
    }

    /// Move the shape by `delta`.
    pub fn translate(&mut self, delta: Vec2) {
        self.geometry.translate(delta);
    }

    /// Copy with a fresh identity, offset by `delta`.
    pub fn duplicate(&self, delta: Vec2) -> Self {
        let mut copy = self.clone();
        copy.object_id = Uuid::new_v4();
        copy.translate(delta);
        copy
    }

    /// Check whether `point` (canvas coordinates) lies on the shape.
    pub fn hit_test(&self, point: Point, tolerance: f64) -> bool {
        match &self.kind {
            ShapeKind::Line { x1, y1, x2, y2 } => {
                let g = &self.geometry;
                let to_canvas = |x: f64, y: f64| Point::new(g.x + x * g.scale_x, g.y + y * g.scale_y);
                let segment = Line::new(to_canvas(*x1, *y1), to_canvas(*x2, *y2));
                let reach = tolerance + self.style.stroke_width / 2.0;
                segment.nearest(point, 1e-6).distance_sq <= reach * reach
            }
            _ => self.bounds().inflate(tolerance, tolerance).contains(point),
        }
    }

    /// Replace the shape's extent with `rect`, rescaling kind-specific point
    /// data and resetting scale to 1. Circles stay square: the side of
    /// `rect` that differs most from the current bounds sets the diameter.
    pub fn set_bounds(&mut self, rect: Rect) {
        let mut rect = rect.abs();
        if let ShapeKind::Circle { .. } = self.kind {
            let current = self.bounds();
            let side = if (rect.width() - current.width()).abs() >= (rect.height() - current.height()).abs() {
                rect.width()
            } else {
                rect.height()
            };
            rect = Rect::from_origin_size(rect.origin(), (side, side));
        }
        // Intrinsic point data is unscaled, so the factor is relative to the
        // intrinsic extent rather than the rendered one.
        let sx = if self.geometry.width > 0.0 { rect.width() / self.geometry.width } else { 1.0 };
        let sy = if self.geometry.height > 0.0 { rect.height() / self.geometry.height } else { 1.0 };

        match &mut self.kind {
            ShapeKind::Circle { radius } => {
                *radius = rect.width() / 2.0;
            }
            ShapeKind::Line { x1, y1, x2, y2 } => {
                *x1 *= sx;
                *y1 *= sy;
                *x2 *= sx;
                *y2 *= sy;
            }
            ShapeKind::Freehand { path } => {
                for p in path.iter_mut() {
                    p.x *= sx;
                    p.y *= sy;
                }
            }
            ShapeKind::Rectangle | ShapeKind::Text { .. } | ShapeKind::Image { .. } => {}
        }

        let angle = self.geometry.angle;
        self.geometry = Geometry::from_rect(rect);
        self.geometry.angle = angle;
    }

    /// Text content, if this is a text shape.
    pub fn text_content(&self) -> Option<&str> {
        match &self.kind {
            ShapeKind::Text { text, .. } => Some(text),
            _ => None,
        }
    }

    /// Replace the text content and refit the intrinsic extent.
    /// No-op for non-text shapes.
    pub fn set_text(&mut self, content: &str) {
        if let ShapeKind::Text { text, font_size, .. } = &mut self.kind {
            *text = content.to_string();
            let (width, height) = approximate_text_size(content, *font_size);
            self.geometry.width = width;
            self.geometry.height = height;
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self.kind, ShapeKind::Text { .. })
    }
}

/// Rough text extent; the renderer owns exact layout.
pub fn approximate_text_size(content: &str, font_size: f64) -> (f64, f64) {
    let max_line_len = content.lines().map(|line| line.chars().count()).max().unwrap_or(0);
    let line_count = content.lines().count().max(1);
    let line_count = if content.ends_with('\n') { line_count + 1 } else { line_count };
    (
        (max_line_len as f64 * font_size * CHAR_WIDTH_FACTOR).max(font_size),
        line_count as f64 * font_size * LINE_HEIGHT_FACTOR,
    )
}
