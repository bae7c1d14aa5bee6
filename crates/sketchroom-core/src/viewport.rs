//! Canvas container placement and client-to-canvas conversion.

use kurbo::{Affine, Point, Rect, Size, Vec2};
use serde::{Deserialize, Serialize};

/// Bounding box of the canvas container in client coordinates.
///
/// Cursor positions, comment anchors and shape geometry are all relative to
/// the container's top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CanvasFrame {
    /// Top-left corner of the container in client coordinates.
    pub origin: Point,
    pub size: Size,
}

impl Default for CanvasFrame {
    fn default() -> Self {
        Self {
            origin: Point::ZERO,
            size: Size::new(1280.0, 720.0),
        }
    }
}

impl CanvasFrame {
    pub fn new(origin: Point, size: Size) -> Self {
        Self { origin, size }
    }

    /// Transform from canvas to client coordinates.
    pub fn transform(&self) -> Affine {
        Affine::translate(self.origin.to_vec2())
    }

    /// Convert a client point to canvas coordinates.
    pub fn client_to_canvas(&self, client: Point) -> Point {
        self.transform().inverse() * client
    }

    /// Convert a canvas point to client coordinates.
    pub fn canvas_to_client(&self, canvas: Point) -> Point {
        self.transform() * canvas
    }

    /// The container's rectangle in client coordinates.
    pub fn client_rect(&self) -> Rect {
        Rect::from_origin_size(self.origin, self.size)
    }

    /// Whether a client point lies inside the container.
    pub fn contains_client(&self, client: Point) -> bool {
        self.client_rect().contains(client)
    }

    /// Center of the container in canvas coordinates.
    pub fn center(&self) -> Point {
        Point::ZERO + Vec2::new(self.size.width / 2.0, self.size.height / 2.0)
    }

    /// Update the container placement after a layout change.
    pub fn resize(&mut self, origin: Point, size: Size) {
        self.origin = origin;
        self.size = size;
    }
}
