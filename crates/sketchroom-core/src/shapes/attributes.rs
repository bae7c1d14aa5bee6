//! Editable attributes of the selected element.

use super::{approximate_text_size, SerializableColor, Shape, ShapeKind};
use kurbo::Rect;
use serde::{Deserialize, Serialize};

/// Attribute values shown for the selected element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementAttributes {
    /// Rendered width (scale applied).
    pub width: f64,
    /// Rendered height (scale applied).
    pub height: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_size: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_family: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_weight: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fill: Option<SerializableColor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stroke: Option<SerializableColor>,
}

impl ElementAttributes {
    pub fn of(shape: &Shape) -> Self {
        let (font_size, font_family, font_weight) = match &shape.kind {
            ShapeKind::Text {
                font_size,
                font_family,
                font_weight,
                ..
            } => (Some(*font_size), Some(font_family.clone()), Some(*font_weight)),
            _ => (None, None, None),
        };
        Self {
            width: shape.geometry.scaled_width(),
            height: shape.geometry.scaled_height(),
            font_size,
            font_family,
            font_weight,
            fill: shape.style.fill,
            stroke: shape.style.stroke,
        }
    }
}

/// A single attribute change requested from the attribute panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "attribute", content = "value", rename_all = "camelCase")]
pub enum AttributeEdit {
    Width(f64),
    Height(f64),
    FontSize(f64),
    FontFamily(String),
    FontWeight(u16),
    Fill(SerializableColor),
    Stroke(SerializableColor),
}

impl Shape {
    /// Apply an attribute edit. Returns `false` when the attribute does not
    /// apply to this kind or the value is not usable; the shape is unchanged.
    pub fn apply_attribute(&mut self, edit: &AttributeEdit) -> bool {
        match edit {
            AttributeEdit::Width(width) => {
                if !width.is_finite() || *width <= 0.0 {
                    return false;
                }
                let b = self.bounds();
                self.set_bounds(Rect::from_origin_size(b.origin(), (*width, b.height())));
            }
            AttributeEdit::Height(height) => {
                if !height.is_finite() || *height <= 0.0 {
                    return false;
                }
                let b = self.bounds();
                self.set_bounds(Rect::from_origin_size(b.origin(), (b.width(), *height)));
            }
            AttributeEdit::FontSize(size) => {
                if !size.is_finite() || *size <= 0.0 {
                    return false;
                }
                let ShapeKind::Text { text, font_size, .. } = &mut self.kind else {
                    return false;
                };
                *font_size = *size;
                let (width, height) = approximate_text_size(text, *size);
                self.geometry.width = width;
                self.geometry.height = height;
            }
            AttributeEdit::FontFamily(family) => {
                let ShapeKind::Text { font_family, .. } = &mut self.kind else {
                    return false;
                };
                *font_family = family.clone();
            }
            AttributeEdit::FontWeight(weight) => {
                let ShapeKind::Text { font_weight, .. } = &mut self.kind else {
                    return false;
                };
                *font_weight = *weight;
            }
            AttributeEdit::Fill(color) => self.style.fill = Some(*color),
            AttributeEdit::Stroke(color) => self.style.stroke = Some(*color),
        }
        true
    }
}
