//! Bridge from store snapshots to a retained render surface.

use crate::shapes::{Shape, ShapeId};
use std::collections::BTreeMap;

/// A retained-mode surface that draws shapes by identity.
pub trait RenderSurface {
    /// Add a shape, or replace the one with the same id.
    fn upsert(&mut self, shape: &Shape);

    fn remove(&mut self, id: ShapeId);

    /// Drop everything.
    fn clear(&mut self);

    /// Called once after a batch of changes.
    fn request_redraw(&mut self) {}
}

/// What a reconcile did to the surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneChange {
    Added(ShapeId),
    Updated(ShapeId),
    Removed(ShapeId),
    Cleared,
}

/// Last state pushed to the surface.
#[derive(Debug, Clone, Default)]
pub struct SceneMirror {
    shown: BTreeMap<ShapeId, Shape>,
}

impl SceneMirror {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.shown.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shown.is_empty()
    }

    pub fn get(&self, id: &ShapeId) -> Option<&Shape> {
        self.shown.get(id)
    }

    /// Bring the surface in line with `snapshot`, touching only shapes that
    /// were added, changed or removed.
    pub fn reconcile(&mut self, snapshot: &[Shape], surface: &mut dyn RenderSurface) -> Vec<SceneChange> {
        let mut changes = Vec::new();
        let mut next = BTreeMap::new();

        for shape in snapshot {
            let id = shape.id();
            match self.shown.remove(&id) {
                Some(old) if old == *shape => {}
                Some(_) => {
                    surface.upsert(shape);
                    changes.push(SceneChange::Updated(id));
                }
                None => {
                    surface.upsert(shape);
                    changes.push(SceneChange::Added(id));
                }
            }
            next.insert(id, shape.clone());
        }
        for id in std::mem::take(&mut self.shown).into_keys() {
            surface.remove(id);
            changes.push(SceneChange::Removed(id));
        }
        self.shown = next;

        if !changes.is_empty() {
            surface.request_redraw();
        }
        changes
    }

    /// Drop everything from the surface.
    pub fn clear(&mut self, surface: &mut dyn RenderSurface) -> SceneChange {
        self.shown.clear();
        surface.clear();
        surface.request_redraw();
        SceneChange::Cleared
    }
}
