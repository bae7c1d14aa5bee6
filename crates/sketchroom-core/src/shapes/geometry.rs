//! Placement and extent shared by every shape kind.

use kurbo::{Point, Rect, Vec2};
use serde::{Deserialize, Serialize};

/// Position, intrinsic size, rotation and scale of a shape.
///
/// `width`/`height` are the intrinsic (unscaled) extent. The rendered extent
/// is `width * scale_x` by `height * scale_y`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Geometry {
    /// Left edge in canvas coordinates.
    pub x: f64,
    /// Top edge in canvas coordinates.
    pub y: f64,
    pub width: f64,
    pub height: f64,
    /// Rotation in degrees around the top-left corner.
    #[serde(default)]
    pub angle: f64,
    #[serde(default = "unit_scale")]
    pub scale_x: f64,
    #[serde(default = "unit_scale")]
    pub scale_y: f64,
}

fn unit_scale() -> f64 {
    1.0
}

impl Default for Geometry {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: 0.0,
            height: 0.0,
            angle: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
        }
    }
}

impl Geometry {
    /// Geometry covering `rect` at unit scale.
    pub fn from_rect(rect: Rect) -> Self {
        let rect = rect.abs();
        Self {
            x: rect.x0,
            y: rect.y0,
            width: rect.width(),
            height: rect.height(),
            ..Self::default()
        }
    }

    pub fn origin(&self) -> Point {
        Point::new(self.x, self.y)
    }

    /// Rendered width (intrinsic width times horizontal scale).
    pub fn scaled_width(&self) -> f64 {
        self.width * self.scale_x
    }

    /// Rendered height (intrinsic height times vertical scale).
    pub fn scaled_height(&self) -> f64 {
        self.height * self.scale_y
    }

    /// Axis-aligned bounds, ignoring rotation.
    pub fn bounds(&self) -> Rect {
        Rect::new(
            self.x,
            self.y,
            self.x + self.scaled_width(),
            self.y + self.scaled_height(),
        )
    }

    pub fn translate(&mut self, delta: Vec2) {
        self.x += delta.x;
        self.y += delta.y;
    }
}
