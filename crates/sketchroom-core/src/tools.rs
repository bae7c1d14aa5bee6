//! Tool system for the canvas.

use crate::shapes::{Shape, ShapeId};
use kurbo::{Point, Rect, Vec2};
use serde::{Deserialize, Serialize};

/// Available tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    /// Neutral selection tool.
    #[default]
    Select,
    Rectangle,
    Circle,
    Line,
    Freehand,
    /// Places a text shape with a single click.
    Text,
}

impl ToolKind {
    /// Tools that create a shape by dragging.
    pub fn draws_by_drag(self) -> bool {
        matches!(
            self,
            ToolKind::Rectangle | ToolKind::Circle | ToolKind::Line | ToolKind::Freehand
        )
    }

    /// Sticky tools stay armed after a completed gesture; all other shape
    /// tools revert to [`ToolKind::Select`].
    pub fn is_sticky(self) -> bool {
        matches!(self, ToolKind::Select | ToolKind::Freehand)
    }
}

/// State of a drag-to-draw interaction.
#[derive(Debug, Clone, Default)]
pub enum ToolState {
    #[default]
    Idle,
    Active {
        /// Pointer-down position.
        start: Point,
        /// Latest pointer position.
        current: Point,
        /// Identity of the shape being drawn, stable for the whole gesture.
        id: ShapeId,
    },
}

/// Turns a drag gesture into a shape.
#[derive(Debug, Clone, Default)]
pub struct ToolManager {
    pub current_tool: ToolKind,
    pub state: ToolState,
    /// Accumulated points for freehand drawing.
    freehand_points: Vec<Point>,
}

impl ToolManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the current tool, dropping any gesture in progress.
    pub fn set_tool(&mut self, tool: ToolKind) {
        self.current_tool = tool;
        self.state = ToolState::Idle;
        self.freehand_points.clear();
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, ToolState::Active { .. })
    }

    /// Begin a gesture at `point`, reserving the identity of the new shape.
    pub fn begin(&mut self, point: Point, id: ShapeId) {
        self.freehand_points.clear();
        if self.current_tool == ToolKind::Freehand {
            self.freehand_points.push(point);
        }
        self.state = ToolState::Active {
            start: point,
            current: point,
            id,
        };
    }

    /// Extend the gesture to `point`.
    pub fn update(&mut self, point: Point) {
        if let ToolState::Active { current, .. } = &mut self.state {
            *current = point;
            if self.current_tool == ToolKind::Freehand {
                self.freehand_points.push(point);
            }
        }
    }

    /// Shape for the gesture so far, with degenerate extents snapped to
    /// `min_extent`.
    pub fn preview(&self, min_extent: f64) -> Option<Shape> {
        let ToolState::Active { start, current, id } = self.state else {
            return None;
        };
        let mut shape = match self.current_tool {
            ToolKind::Freehand => freehand_shape(&self.freehand_points)?,
            tool => shape_for_drag(tool, start, current, min_extent)?,
        };
        shape.object_id = id;
        Some(shape)
    }

    /// Finish the gesture at `point`, returning the final shape.
    pub fn end(&mut self, point: Point, min_extent: f64) -> Option<Shape> {
        self.update(point);
        let shape = self.preview(min_extent);
        self.state = ToolState::Idle;
        self.freehand_points.clear();
        shape
    }

    /// Number of accumulated freehand points.
    pub fn freehand_len(&self) -> usize {
        self.freehand_points.len()
    }
}

/// Shape produced by dragging `tool` from `start` to `end`.
///
/// Negative extents are normalized. A drag shorter than `min_extent` along an
/// axis is given `min_extent` along that axis (lines get `min_extent` length
/// to the right of `start`). Returns `None` for tools that do not draw by drag.
pub fn shape_for_drag(tool: ToolKind, start: Point, end: Point, min_extent: f64) -> Option<Shape> {
    match tool {
        ToolKind::Rectangle => Some(Shape::rectangle(clamped_rect(start, end, min_extent))),
        ToolKind::Circle => {
            let rect = clamped_rect(start, end, min_extent);
            Some(Shape::circle(rect))
        }
        ToolKind::Line => {
            let end = if start.distance(end) < min_extent {
                start + Vec2::new(min_extent, 0.0)
            } else {
                end
            };
            Some(Shape::line(start, end))
        }
        ToolKind::Freehand => freehand_shape(&[start, end]),
        ToolKind::Select | ToolKind::Text => None,
    }
}

/// Freehand shape from raw points. A single point is duplicated so the path
/// always has a segment.
fn freehand_shape(points: &[Point]) -> Option<Shape> {
    match points {
        [] => None,
        [only] => Shape::freehand(&[*only, *only]),
        many => Shape::freehand(many),
    }
}

fn clamped_rect(start: Point, end: Point, min_extent: f64) -> Rect {
    let rect = Rect::from_points(start, end);
    Rect::from_origin_size(
        rect.origin(),
        (rect.width().max(min_extent), rect.height().max(min_extent)),
    )
}
