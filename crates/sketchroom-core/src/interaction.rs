//! Pointer and keyboard interaction state machine.
//!
//! The machine itself holds only configuration. All transient UI state lives
//! in [`CanvasState`], which the session passes in through an [`EditContext`]
//! together with the shape store and the local history.

use crate::config::InteractionConfig;
use crate::history::History;
use crate::input::{Modifiers, MouseButton};
use crate::selection::{hit_corner, BoundsHitTester, HitTester};
use crate::shapes::{AttributeEdit, ElementAttributes, Shape, ShapeId, DEFAULT_TEXT};
use crate::store::ShapeStore;
use crate::tools::{ToolKind, ToolManager};
use kurbo::{Point, Rect, Size, Vec2};
use uuid::Uuid;

/// Interaction mode.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Mode {
    #[default]
    Idle,
    /// A drag-to-draw gesture is in progress.
    Drawing { tool: ToolKind },
    /// One or more shapes are selected, possibly being dragged.
    Selecting { drag: Option<Drag> },
    /// A text shape has keyboard focus. Keystrokes edit `draft`, which is
    /// written to the store on commit.
    EditingText { id: ShapeId, draft: String },
}

/// Drag in progress while selecting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Drag {
    /// Moving the selection; `last` is the previous pointer position.
    Move { last: Point },
    /// Scaling one shape from a corner; `anchor` is the fixed opposite corner.
    Scale { id: ShapeId, anchor: Point },
    /// Rubber-band selection.
    Band { start: Point, current: Point },
}

/// Local, non-replicated UI state of one participant.
#[derive(Debug, Clone, Default)]
pub struct CanvasState {
    pub mode: Mode,
    pub tools: ToolManager,
    /// Selected shapes, in selection order.
    pub selection: Vec<ShapeId>,
    /// Shapes captured by the last copy.
    pub clipboard: Vec<Shape>,
}

impl CanvasState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_tool(&self) -> ToolKind {
        self.tools.current_tool
    }

    pub fn is_drawing(&self) -> bool {
        matches!(self.mode, Mode::Drawing { .. })
    }

    /// Whether a pointer gesture (draw, move, scale or band) is open.
    pub fn has_gesture(&self) -> bool {
        matches!(self.mode, Mode::Drawing { .. } | Mode::Selecting { drag: Some(_) })
    }

    pub fn is_editing_text(&self) -> bool {
        matches!(self.mode, Mode::EditingText { .. })
    }

    /// Text being typed, if a text shape has focus.
    pub fn text_draft(&self) -> Option<&str> {
        match &self.mode {
            Mode::EditingText { draft, .. } => Some(draft),
            _ => None,
        }
    }
}

/// Everything an interaction may read or mutate.
pub struct EditContext<'a> {
    pub store: &'a mut dyn ShapeStore,
    pub history: &'a mut History,
    pub canvas: &'a mut CanvasState,
}

/// Observable outcome of an interaction step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// The shape store was written; re-render from a snapshot.
    StoreChanged,
    /// The active tool changed.
    ToolChanged(ToolKind),
    /// The selection or the selected shape's attributes changed.
    SelectionChanged,
    /// The local text draft changed.
    TextDraftChanged,
    /// The render surface must drop everything it shows.
    ClearSurface,
}

/// Turns input into shape mutations.
pub struct InteractionMachine {
    config: InteractionConfig,
    hit_tester: Box<dyn HitTester>,
}

impl InteractionMachine {
    pub fn new(config: InteractionConfig) -> Self {
        Self::with_hit_tester(config, Box::new(BoundsHitTester))
    }

    pub fn with_hit_tester(config: InteractionConfig, hit_tester: Box<dyn HitTester>) -> Self {
        Self { config, hit_tester }
    }

    pub fn config(&self) -> &InteractionConfig {
        &self.config
    }

    // --- Pointer ---

    /// Handle a pointer press at `point` (canvas coordinates).
    pub fn pointer_down(
        &self,
        ctx: &mut EditContext<'_>,
        point: Point,
        button: MouseButton,
        modifiers: Modifiers,
        double_click: bool,
    ) -> Vec<Effect> {
        if button != MouseButton::Left {
            return Vec::new();
        }

        let mut effects = Vec::new();
        if let Mode::EditingText { id, .. } = &ctx.canvas.mode {
            let id = *id;
            let on_text = ctx
                .store
                .get(&id)
                .is_some_and(|shape| shape.hit_test(point, self.config.hit_tolerance));
            if on_text {
                return effects;
            }
            effects.extend(self.commit_text(ctx));
        }
        if ctx.canvas.is_drawing() {
            return effects;
        }

        match ctx.canvas.active_tool() {
            tool if tool.draws_by_drag() => self.begin_drawing(ctx, tool, point, &mut effects),
            ToolKind::Text => self.place_text(ctx, point, &mut effects),
            _ => self.select_at(ctx, point, modifiers.shift, double_click, &mut effects),
        }
        effects
    }

    /// Handle pointer movement to `point` (canvas coordinates).
    pub fn pointer_move(&self, ctx: &mut EditContext<'_>, point: Point) -> Vec<Effect> {
        let mut effects = Vec::new();
        match ctx.canvas.mode.clone() {
            Mode::Drawing { tool } => {
                ctx.canvas.tools.update(point);
                // Freehand paths are written once, on release.
                if tool != ToolKind::Freehand {
                    if let Some(shape) = ctx.canvas.tools.preview(self.config.min_shape_extent) {
                        if write(ctx, &shape) {
                            effects.push(Effect::StoreChanged);
                        }
                    }
                }
            }
            Mode::Selecting {
                drag: Some(Drag::Move { last }),
            } => {
                ctx.canvas.mode = Mode::Selecting {
                    drag: Some(Drag::Move { last: point }),
                };
                let delta = point - last;
                if delta == Vec2::ZERO {
                    return effects;
                }
                let mut changed = false;
                for id in ctx.canvas.selection.clone() {
                    if let Some(mut shape) = ctx.store.get(&id) {
                        shape.translate(delta);
                        changed |= write(ctx, &shape);
                    }
                }
                if changed {
                    effects.push(Effect::StoreChanged);
                }
            }
            Mode::Selecting {
                drag: Some(Drag::Scale { id, anchor }),
            } => {
                if let Some(mut shape) = ctx.store.get(&id) {
                    scale_into(&mut shape, Rect::from_points(anchor, point), self.config.min_shape_extent);
                    if write(ctx, &shape) {
                        effects.push(Effect::StoreChanged);
                        effects.push(Effect::SelectionChanged);
                    }
                }
            }
            Mode::Selecting {
                drag: Some(Drag::Band { start, .. }),
            } => {
                ctx.canvas.mode = Mode::Selecting {
                    drag: Some(Drag::Band { start, current: point }),
                };
            }
            Mode::Idle | Mode::Selecting { drag: None } | Mode::EditingText { .. } => {}
        }
        effects
    }

    /// Handle a pointer release at `point` (canvas coordinates).
    pub fn pointer_up(&self, ctx: &mut EditContext<'_>, point: Point, button: MouseButton) -> Vec<Effect> {
        if button != MouseButton::Left {
            return Vec::new();
        }

        let mut effects = Vec::new();
        match ctx.canvas.mode.clone() {
            Mode::Drawing { tool } => {
                if let Some(shape) = ctx.canvas.tools.end(point, self.config.min_shape_extent) {
                    if write(ctx, &shape) {
                        effects.push(Effect::StoreChanged);
                    }
                }
                ctx.history.end_group();
                ctx.canvas.mode = Mode::Idle;
                if !tool.is_sticky() {
                    ctx.canvas.tools.set_tool(ToolKind::Select);
                    effects.push(Effect::ToolChanged(ToolKind::Select));
                }
            }
            Mode::Selecting {
                drag: Some(Drag::Move { .. }),
            } => {
                ctx.history.end_group();
                ctx.canvas.mode = Mode::Selecting { drag: None };
            }
            Mode::Selecting {
                drag: Some(Drag::Scale { .. }),
            } => {
                ctx.history.end_group();
                ctx.canvas.mode = Mode::Selecting { drag: None };
                effects.push(Effect::SelectionChanged);
            }
            Mode::Selecting {
                drag: Some(Drag::Band { start, .. }),
            } => {
                let shapes = ctx.store.entries();
                let selected = self.hit_tester.shapes_in(&shapes, Rect::from_points(start, point));
                ctx.canvas.mode = if selected.is_empty() {
                    Mode::Idle
                } else {
                    Mode::Selecting { drag: None }
                };
                ctx.canvas.selection = selected;
                effects.push(Effect::SelectionChanged);
            }
            Mode::Idle | Mode::Selecting { drag: None } | Mode::EditingText { .. } => {}
        }
        effects
    }

    /// Complete any open gesture at `point`, as if the primary button had
    /// been released there.
    pub fn finish_gesture(&self, ctx: &mut EditContext<'_>, point: Point) -> Vec<Effect> {
        if !ctx.canvas.has_gesture() {
            return Vec::new();
        }
        self.pointer_up(ctx, point, MouseButton::Left)
    }

    fn begin_drawing(&self, ctx: &mut EditContext<'_>, tool: ToolKind, point: Point, effects: &mut Vec<Effect>) {
        if !ctx.canvas.selection.is_empty() {
            ctx.canvas.selection.clear();
            effects.push(Effect::SelectionChanged);
        }

        ctx.history.begin_group();
        ctx.canvas.tools.begin(point, Uuid::new_v4());
        ctx.canvas.mode = Mode::Drawing { tool };
        if tool != ToolKind::Freehand {
            if let Some(shape) = ctx.canvas.tools.preview(self.config.min_shape_extent) {
                if write(ctx, &shape) {
                    effects.push(Effect::StoreChanged);
                }
            }
        }
    }

    fn place_text(&self, ctx: &mut EditContext<'_>, point: Point, effects: &mut Vec<Effect>) {
        let shape = Shape::text(point, DEFAULT_TEXT);
        if write(ctx, &shape) {
            effects.push(Effect::StoreChanged);
        }
        ctx.canvas.selection = vec![shape.id()];
        ctx.canvas.mode = Mode::Selecting { drag: None };
        ctx.canvas.tools.set_tool(ToolKind::Select);
        effects.push(Effect::SelectionChanged);
        effects.push(Effect::ToolChanged(ToolKind::Select));
    }

    fn select_at(
        &self,
        ctx: &mut EditContext<'_>,
        point: Point,
        extend: bool,
        double_click: bool,
        effects: &mut Vec<Effect>,
    ) {
        let tolerance = self.config.hit_tolerance;
        let shapes = ctx.store.entries();

        if let [id] = ctx.canvas.selection.as_slice() {
            let id = *id;
            if let Some(shape) = shapes.iter().find(|shape| shape.id() == id) {
                let bounds = shape.bounds();
                if let Some(corner) = hit_corner(bounds, point, tolerance) {
                    ctx.history.begin_group();
                    ctx.canvas.mode = Mode::Selecting {
                        drag: Some(Drag::Scale {
                            id,
                            anchor: corner.opposite().of(bounds),
                        }),
                    };
                    return;
                }
            }
        }

        let Some(hit) = self.hit_tester.shape_at(&shapes, point, tolerance) else {
            if !extend && !ctx.canvas.selection.is_empty() {
                ctx.canvas.selection.clear();
                effects.push(Effect::SelectionChanged);
            }
            ctx.canvas.mode = Mode::Selecting {
                drag: Some(Drag::Band { start: point, current: point }),
            };
            return;
        };

        if double_click {
            if let Some(text) = shapes
                .iter()
                .find(|shape| shape.id() == hit)
                .and_then(Shape::text_content)
            {
                ctx.canvas.selection = vec![hit];
                ctx.canvas.mode = Mode::EditingText {
                    id: hit,
                    draft: text.to_string(),
                };
                effects.push(Effect::SelectionChanged);
                effects.push(Effect::TextDraftChanged);
                return;
            }
        }

        let selection = &mut ctx.canvas.selection;
        if extend {
            if let Some(pos) = selection.iter().position(|id| *id == hit) {
                selection.remove(pos);
            } else {
                selection.push(hit);
            }
        } else if !selection.contains(&hit) {
            *selection = vec![hit];
        }
        effects.push(Effect::SelectionChanged);

        if ctx.canvas.selection.is_empty() {
            ctx.canvas.mode = Mode::Idle;
            return;
        }
        ctx.history.begin_group();
        ctx.canvas.mode = Mode::Selecting {
            drag: Some(Drag::Move { last: point }),
        };
    }

    // --- Keyboard ---

    /// Handle a key press. While a text shape has focus every key goes to
    /// the text draft and global shortcuts do not fire.
    pub fn key_pressed(&self, ctx: &mut EditContext<'_>, key: &str, modifiers: Modifiers) -> Vec<Effect> {
        if ctx.canvas.is_editing_text() {
            return self.edit_text(ctx, key, modifiers);
        }
        if ctx.canvas.is_drawing() {
            return Vec::new();
        }

        if modifiers.command() {
            match key.to_ascii_lowercase().as_str() {
                "z" if modifiers.shift => self.redo(ctx),
                "z" => self.undo(ctx),
                "y" => self.redo(ctx),
                "c" => self.copy(ctx),
                "v" => self.paste(ctx),
                _ => Vec::new(),
            }
        } else {
            match key {
                "Delete" | "Backspace" => self.delete_selection(ctx),
                _ => Vec::new(),
            }
        }
    }

    fn edit_text(&self, ctx: &mut EditContext<'_>, key: &str, modifiers: Modifiers) -> Vec<Effect> {
        if key == "Escape" {
            return self.commit_text(ctx);
        }
        let Mode::EditingText { draft, .. } = &mut ctx.canvas.mode else {
            return Vec::new();
        };
        match key {
            "Backspace" => {
                draft.pop();
            }
            "Enter" => draft.push('\n'),
            _ if key.chars().count() == 1 && !modifiers.command() => draft.push_str(key),
            _ => return Vec::new(),
        }
        vec![Effect::TextDraftChanged]
    }

    /// Write the text draft to the store and leave text editing.
    pub fn commit_text(&self, ctx: &mut EditContext<'_>) -> Vec<Effect> {
        if !ctx.canvas.is_editing_text() {
            return Vec::new();
        }
        let Mode::EditingText { id, draft } = std::mem::take(&mut ctx.canvas.mode) else {
            return Vec::new();
        };

        let mut effects = Vec::new();
        match ctx.store.get(&id) {
            Some(mut shape) => {
                if shape.text_content() != Some(draft.as_str()) {
                    shape.set_text(&draft);
                    if write(ctx, &shape) {
                        effects.push(Effect::StoreChanged);
                    }
                }
                ctx.canvas.selection = vec![id];
                ctx.canvas.mode = Mode::Selecting { drag: None };
            }
            None => {
                log::debug!("Text shape {} vanished while editing", id);
                ctx.canvas.selection.clear();
            }
        }
        effects.push(Effect::SelectionChanged);
        effects
    }

    // --- Commands ---

    /// Switch tools. Ignored while a drawing gesture is in progress.
    pub fn select_tool(&self, ctx: &mut EditContext<'_>, tool: ToolKind) -> Vec<Effect> {
        if ctx.canvas.is_drawing() {
            return Vec::new();
        }
        let mut effects = self.commit_text(ctx);
        if tool != ToolKind::Select && !ctx.canvas.selection.is_empty() {
            ctx.canvas.selection.clear();
            ctx.canvas.mode = Mode::Idle;
            effects.push(Effect::SelectionChanged);
        }
        ctx.canvas.tools.set_tool(tool);
        effects.push(Effect::ToolChanged(tool));
        effects
    }

    /// Remove every selected shape as one undo step. No-op without a
    /// selection.
    pub fn delete_selection(&self, ctx: &mut EditContext<'_>) -> Vec<Effect> {
        if ctx.canvas.selection.is_empty() || ctx.canvas.is_drawing() {
            return Vec::new();
        }

        let mut changed = false;
        ctx.history.begin_group();
        for id in std::mem::take(&mut ctx.canvas.selection) {
            match ctx.store.delete(&id) {
                Ok(removed) => changed |= removed,
                Err(e) => log::warn!("Failed to delete shape {}: {}", id, e),
            }
        }
        ctx.history.end_group();
        ctx.canvas.mode = Mode::Idle;

        let mut effects = vec![Effect::SelectionChanged];
        if changed {
            effects.push(Effect::StoreChanged);
        }
        effects
    }

    /// Remove every shape and ask the render surface to clear.
    pub fn reset(&self, ctx: &mut EditContext<'_>) -> Vec<Effect> {
        ctx.history.end_group();
        if let Err(e) = ctx.store.clear() {
            log::warn!("Failed to clear shapes: {}", e);
        }
        ctx.canvas.selection.clear();
        ctx.canvas.mode = Mode::Idle;
        ctx.canvas.tools.set_tool(ToolKind::Select);
        vec![
            Effect::StoreChanged,
            Effect::ClearSurface,
            Effect::SelectionChanged,
            Effect::ToolChanged(ToolKind::Select),
        ]
    }

    pub fn undo(&self, ctx: &mut EditContext<'_>) -> Vec<Effect> {
        if ctx.canvas.is_drawing() {
            return Vec::new();
        }
        let mut effects = self.commit_text(ctx);
        if ctx.history.undo() {
            effects.extend(self.after_external_change(ctx));
            effects.push(Effect::StoreChanged);
        }
        effects
    }

    pub fn redo(&self, ctx: &mut EditContext<'_>) -> Vec<Effect> {
        if ctx.canvas.is_drawing() {
            return Vec::new();
        }
        let mut effects = self.commit_text(ctx);
        if ctx.history.redo() {
            effects.extend(self.after_external_change(ctx));
            effects.push(Effect::StoreChanged);
        }
        effects
    }

    /// Copy the selected shapes to the clipboard.
    pub fn copy(&self, ctx: &mut EditContext<'_>) -> Vec<Effect> {
        let copied: Vec<Shape> = ctx
            .canvas
            .selection
            .iter()
            .filter_map(|id| ctx.store.get(id))
            .collect();
        if !copied.is_empty() {
            ctx.canvas.clipboard = copied;
        }
        Vec::new()
    }

    /// Paste clipboard copies with fresh identities, offset from the
    /// originals. Repeated pastes cascade.
    pub fn paste(&self, ctx: &mut EditContext<'_>) -> Vec<Effect> {
        if ctx.canvas.clipboard.is_empty() {
            return Vec::new();
        }
        let offset = Vec2::new(self.config.paste_offset, self.config.paste_offset);
        let copies: Vec<Shape> = ctx
            .canvas
            .clipboard
            .iter()
            .map(|shape| shape.duplicate(offset))
            .collect();

        ctx.history.begin_group();
        for shape in &copies {
            write(ctx, shape);
        }
        ctx.history.end_group();

        ctx.canvas.selection = copies.iter().map(Shape::id).collect();
        ctx.canvas.clipboard = copies;
        ctx.canvas.mode = Mode::Selecting { drag: None };
        vec![Effect::StoreChanged, Effect::SelectionChanged]
    }

    /// Insert an uploaded image centred on `center`, scaled so its longer
    /// side is the configured maximum.
    pub fn insert_image(
        &self,
        ctx: &mut EditContext<'_>,
        src: &str,
        natural: Size,
        center: Point,
    ) -> Vec<Effect> {
        let longest = natural.width.max(natural.height);
        if !longest.is_finite() || natural.width <= 0.0 || natural.height <= 0.0 {
            log::warn!("Ignoring image with unusable size {:?}", natural);
            return Vec::new();
        }
        let mut effects = self.commit_text(ctx);

        let scale = self.config.image_max_side / longest;
        let (width, height) = (natural.width * scale, natural.height * scale);
        let origin = center - Vec2::new(width / 2.0, height / 2.0);
        let shape = Shape::image(origin, src, width, height);
        if write(ctx, &shape) {
            effects.push(Effect::StoreChanged);
        }
        ctx.canvas.selection = vec![shape.id()];
        ctx.canvas.mode = Mode::Selecting { drag: None };
        effects.push(Effect::SelectionChanged);
        effects
    }

    /// Apply an attribute edit to the single selected shape.
    pub fn edit_attribute(&self, ctx: &mut EditContext<'_>, edit: &AttributeEdit) -> Vec<Effect> {
        let [id] = ctx.canvas.selection.as_slice() else {
            return Vec::new();
        };
        let Some(mut shape) = ctx.store.get(id) else {
            return Vec::new();
        };
        if !shape.apply_attribute(edit) || !write(ctx, &shape) {
            return Vec::new();
        }
        vec![Effect::StoreChanged, Effect::SelectionChanged]
    }

    /// Attributes of the single selected shape.
    pub fn attributes(&self, store: &dyn ShapeStore, canvas: &CanvasState) -> Option<ElementAttributes> {
        let [id] = canvas.selection.as_slice() else {
            return None;
        };
        store.get(id).map(|shape| ElementAttributes::of(&shape))
    }

    /// Drop local references to shapes that no longer exist after an undo,
    /// redo or remote update.
    pub fn after_external_change(&self, ctx: &mut EditContext<'_>) -> Vec<Effect> {
        let before = ctx.canvas.selection.len();
        let store = &*ctx.store;
        ctx.canvas.selection.retain(|id| store.contains(id));

        if let Mode::EditingText { id, .. } = &ctx.canvas.mode {
            if !store.contains(id) {
                ctx.canvas.mode = Mode::Idle;
                return vec![Effect::SelectionChanged, Effect::TextDraftChanged];
            }
        }
        if ctx.canvas.selection.len() == before {
            return Vec::new();
        }
        if ctx.canvas.selection.is_empty() && matches!(ctx.canvas.mode, Mode::Selecting { .. }) {
            ctx.canvas.mode = Mode::Idle;
        }
        vec![Effect::SelectionChanged]
    }
}

/// Write a shape, logging failures. Returns true if the store changed.
fn write(ctx: &mut EditContext<'_>, shape: &Shape) -> bool {
    match ctx.store.put(shape.id(), shape) {
        Ok(changed) => changed,
        Err(e) => {
            log::warn!("Failed to write shape {}: {}", shape.id(), e);
            false
        }
    }
}

/// Fit a shape into `target` by adjusting scale, keeping intrinsic extent.
fn scale_into(shape: &mut Shape, target: Rect, min_extent: f64) {
    let target = target.abs();
    let geometry = &mut shape.geometry;
    if geometry.width > 0.0 {
        geometry.scale_x = target.width().max(min_extent) / geometry.width;
    }
    if geometry.height > 0.0 {
        geometry.scale_y = target.height().max(min_extent) / geometry.height;
    }
    geometry.x = target.x0;
    geometry.y = target.y0;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HistoryConfig;
    use crate::shapes::{SerializableColor, ShapeKind};
    use crate::store::ReplicatedStore;

    struct Harness {
        store: ReplicatedStore,
        history: History,
        canvas: CanvasState,
        machine: InteractionMachine,
    }

    impl Harness {
        fn new() -> Self {
            let store = ReplicatedStore::new();
            let history = History::new(&store, &HistoryConfig::default());
            Self {
                store,
                history,
                canvas: CanvasState::new(),
                machine: InteractionMachine::new(InteractionConfig::default()),
            }
        }

        fn run<R>(&mut self, f: impl FnOnce(&InteractionMachine, &mut EditContext<'_>) -> R) -> R {
            let mut ctx = EditContext {
                store: &mut self.store,
                history: &mut self.history,
                canvas: &mut self.canvas,
            };
            f(&self.machine, &mut ctx)
        }

        fn down(&mut self, x: f64, y: f64) -> Vec<Effect> {
            self.run(|m, ctx| {
                m.pointer_down(ctx, Point::new(x, y), MouseButton::Left, Modifiers::default(), false)
            })
        }

        fn double_down(&mut self, x: f64, y: f64) -> Vec<Effect> {
            self.run(|m, ctx| {
                m.pointer_down(ctx, Point::new(x, y), MouseButton::Left, Modifiers::default(), true)
            })
        }

        fn moved(&mut self, x: f64, y: f64) -> Vec<Effect> {
            self.run(|m, ctx| m.pointer_move(ctx, Point::new(x, y)))
        }

        fn up(&mut self, x: f64, y: f64) -> Vec<Effect> {
            self.run(|m, ctx| m.pointer_up(ctx, Point::new(x, y), MouseButton::Left))
        }

        fn drag(&mut self, from: (f64, f64), to: (f64, f64)) {
            self.down(from.0, from.1);
            self.moved((from.0 + to.0) / 2.0, (from.1 + to.1) / 2.0);
            self.moved(to.0, to.1);
            self.up(to.0, to.1);
        }

        fn key(&mut self, key: &str, modifiers: Modifiers) -> Vec<Effect> {
            self.run(|m, ctx| m.key_pressed(ctx, key, modifiers))
        }

        fn tool(&mut self, tool: ToolKind) {
            self.run(|m, ctx| m.select_tool(ctx, tool));
        }

        fn only_shape(&self) -> Shape {
            let entries = self.store.entries();
            assert_eq!(entries.len(), 1, "expected exactly one shape");
            entries[0].clone()
        }
    }

    #[test]
    fn test_rectangle_gesture() {
        let mut h = Harness::new();
        h.tool(ToolKind::Rectangle);
        h.down(50.0, 50.0);
        assert!(h.canvas.is_drawing());
        h.moved(100.0, 90.0);
        h.moved(150.0, 120.0);
        let effects = h.up(150.0, 120.0);

        let shape = h.only_shape();
        assert_eq!(shape.kind, ShapeKind::Rectangle);
        assert!((shape.geometry.x - 50.0).abs() < 1e-9);
        assert!((shape.geometry.y - 50.0).abs() < 1e-9);
        assert!((shape.geometry.width - 100.0).abs() < 1e-9);
        assert!((shape.geometry.height - 70.0).abs() < 1e-9);

        assert_eq!(h.canvas.mode, Mode::Idle);
        assert_eq!(h.canvas.active_tool(), ToolKind::Select);
        assert!(effects.contains(&Effect::ToolChanged(ToolKind::Select)));
    }

    #[test]
    fn test_shape_is_visible_while_drawing() {
        let mut h = Harness::new();
        h.tool(ToolKind::Circle);
        h.down(0.0, 0.0);
        assert_eq!(h.store.entries().len(), 1);
        let effects = h.moved(80.0, 40.0);
        assert!(effects.contains(&Effect::StoreChanged));
        assert_eq!(h.only_shape().kind, ShapeKind::Circle { radius: 40.0 });
    }

    #[test]
    fn test_drawing_is_one_undo_step() {
        let mut h = Harness::new();
        h.tool(ToolKind::Rectangle);
        h.drag((50.0, 50.0), (150.0, 120.0));
        let created = h.only_shape();
        assert_eq!(h.history.undo_count(), 1);

        h.key("z", Modifiers::ctrl());
        assert!(h.store.is_empty());

        h.key("z", Modifiers::ctrl_shift());
        assert_eq!(h.only_shape(), created);
    }

    #[test]
    fn test_zero_drag_uses_min_extent() {
        let mut h = Harness::new();
        h.tool(ToolKind::Rectangle);
        h.down(20.0, 20.0);
        h.up(20.0, 20.0);
        assert_eq!(h.only_shape().bounds(), Rect::new(20.0, 20.0, 30.0, 30.0));
    }

    #[test]
    fn test_freehand_is_sticky_and_written_on_release() {
        let mut h = Harness::new();
        h.tool(ToolKind::Freehand);
        h.down(0.0, 0.0);
        h.moved(5.0, 5.0);
        assert!(h.store.is_empty());
        h.up(10.0, 0.0);

        assert!(matches!(h.only_shape().kind, ShapeKind::Freehand { .. }));
        assert_eq!(h.canvas.active_tool(), ToolKind::Freehand);
    }

    #[test]
    fn test_delete_without_selection_is_noop() {
        let mut h = Harness::new();
        h.tool(ToolKind::Rectangle);
        h.drag((0.0, 0.0), (50.0, 50.0));
        let before = h.store.entries();

        let effects = h.key("Delete", Modifiers::default());
        assert!(effects.is_empty());
        assert_eq!(h.store.entries(), before);
    }

    #[test]
    fn test_click_select_then_delete() {
        let mut h = Harness::new();
        h.tool(ToolKind::Rectangle);
        h.drag((0.0, 0.0), (50.0, 50.0));
        let id = h.only_shape().id();

        h.down(25.0, 25.0);
        h.up(25.0, 25.0);
        assert_eq!(h.canvas.selection, vec![id]);

        let effects = h.key("Backspace", Modifiers::default());
        assert!(effects.contains(&Effect::StoreChanged));
        assert!(h.store.is_empty());
        assert!(h.canvas.selection.is_empty());
        assert_eq!(h.canvas.mode, Mode::Idle);
    }

    #[test]
    fn test_move_drag_and_undo() {
        let mut h = Harness::new();
        h.tool(ToolKind::Rectangle);
        h.drag((0.0, 0.0), (50.0, 50.0));
        let original = h.only_shape();

        h.drag((25.0, 25.0), (125.0, 65.0));
        let moved = h.only_shape();
        assert_eq!(moved.bounds(), Rect::new(100.0, 40.0, 150.0, 90.0));
        assert_eq!(h.history.undo_count(), 2);

        h.key("z", Modifiers::ctrl());
        assert_eq!(h.only_shape(), original);
    }

    #[test]
    fn test_scale_from_corner() {
        let mut h = Harness::new();
        h.tool(ToolKind::Rectangle);
        h.drag((0.0, 0.0), (50.0, 50.0));
        h.down(25.0, 25.0);
        h.up(25.0, 25.0);

        h.drag((50.0, 50.0), (100.0, 150.0));
        let shape = h.only_shape();
        assert_eq!(shape.bounds(), Rect::new(0.0, 0.0, 100.0, 150.0));
        assert!((shape.geometry.scale_x - 2.0).abs() < 1e-9);
        assert!((shape.geometry.width - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_band_selection() {
        let mut h = Harness::new();
        h.tool(ToolKind::Rectangle);
        h.drag((10.0, 10.0), (20.0, 20.0));
        h.tool(ToolKind::Rectangle);
        h.drag((200.0, 200.0), (260.0, 260.0));

        h.drag((0.0, 0.0), (100.0, 100.0));
        assert_eq!(h.canvas.selection.len(), 1);

        h.drag((0.0, 0.0), (300.0, 300.0));
        assert_eq!(h.canvas.selection.len(), 2);

        h.drag((500.0, 500.0), (600.0, 600.0));
        assert!(h.canvas.selection.is_empty());
        assert_eq!(h.canvas.mode, Mode::Idle);
    }

    #[test]
    fn test_text_editing_suppresses_shortcuts() {
        let mut h = Harness::new();
        h.tool(ToolKind::Text);
        h.down(10.0, 10.0);
        h.up(10.0, 10.0);
        let text = h.only_shape();
        assert_eq!(text.text_content(), Some(DEFAULT_TEXT));
        assert_eq!(h.canvas.active_tool(), ToolKind::Select);

        h.double_down(15.0, 15.0);
        assert!(h.canvas.is_editing_text());
        for _ in 0..DEFAULT_TEXT.len() {
            h.key("Backspace", Modifiers::default());
        }
        h.key("H", Modifiers::default());
        h.key("i", Modifiers::default());
        assert_eq!(h.canvas.text_draft(), Some("Hi"));

        // Neither delete nor undo fire while editing.
        assert!(h.key("Delete", Modifiers::default()).is_empty());
        h.key("z", Modifiers::ctrl());
        assert_eq!(h.only_shape().text_content(), Some(DEFAULT_TEXT));

        let effects = h.run(|m, ctx| m.commit_text(ctx));
        assert!(effects.contains(&Effect::StoreChanged));
        assert_eq!(h.only_shape().text_content(), Some("Hi"));
        assert_eq!(h.canvas.selection, vec![text.id()]);
    }

    #[test]
    fn test_copy_paste_offsets_copies() {
        let mut h = Harness::new();
        h.tool(ToolKind::Rectangle);
        h.drag((0.0, 0.0), (50.0, 50.0));
        let original = h.only_shape();
        h.down(25.0, 25.0);
        h.up(25.0, 25.0);

        h.key("c", Modifiers::ctrl());
        h.key("v", Modifiers::ctrl());
        h.key("v", Modifiers::ctrl());

        let entries = h.store.entries();
        assert_eq!(entries.len(), 3);
        let mut origins: Vec<f64> = entries.iter().map(|s| s.geometry.x).collect();
        origins.sort_by(f64::total_cmp);
        assert_eq!(origins, vec![0.0, 20.0, 40.0]);
        assert!(!h.canvas.selection.contains(&original.id()));
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut h = Harness::new();
        h.tool(ToolKind::Rectangle);
        h.drag((0.0, 0.0), (50.0, 50.0));
        h.tool(ToolKind::Line);

        let effects = h.run(|m, ctx| m.reset(ctx));
        assert!(h.store.is_empty());
        assert!(effects.contains(&Effect::ClearSurface));
        assert_eq!(h.canvas.active_tool(), ToolKind::Select);
    }

    #[test]
    fn test_insert_image_scales_longest_side() {
        let mut h = Harness::new();
        h.run(|m, ctx| m.insert_image(ctx, "blob:1", Size::new(800.0, 400.0), Point::new(300.0, 300.0)));
        let image = h.only_shape();
        assert_eq!(image.kind, ShapeKind::Image { src: "blob:1".to_string() });
        assert_eq!(image.bounds(), Rect::new(200.0, 250.0, 400.0, 350.0));
        assert_eq!(h.canvas.selection, vec![image.id()]);
    }

    #[test]
    fn test_edit_attribute_on_selection() {
        let mut h = Harness::new();
        h.tool(ToolKind::Rectangle);
        h.drag((0.0, 0.0), (50.0, 50.0));
        let none = h.run(|m, ctx| m.edit_attribute(ctx, &AttributeEdit::Width(10.0)));
        assert!(none.is_empty());

        h.down(25.0, 25.0);
        h.up(25.0, 25.0);
        let red = SerializableColor::rgb(255, 0, 0);
        h.run(|m, ctx| m.edit_attribute(ctx, &AttributeEdit::Fill(red)));
        assert_eq!(h.only_shape().style.fill, Some(red));

        let attrs = h.machine.attributes(&h.store, &h.canvas).expect("selected");
        assert_eq!(attrs.fill, Some(red));
    }

    #[test]
    fn test_tool_change_ignored_while_drawing() {
        let mut h = Harness::new();
        h.tool(ToolKind::Rectangle);
        h.down(0.0, 0.0);
        h.tool(ToolKind::Line);
        assert_eq!(h.canvas.active_tool(), ToolKind::Rectangle);
        h.up(40.0, 40.0);
        assert_eq!(h.canvas.active_tool(), ToolKind::Select);
    }

    #[test]
    fn test_remote_delete_prunes_selection() {
        let mut h = Harness::new();
        h.tool(ToolKind::Rectangle);
        h.drag((0.0, 0.0), (50.0, 50.0));
        let id = h.only_shape().id();
        h.down(25.0, 25.0);
        h.up(25.0, 25.0);

        h.store.delete(&id).expect("delete");
        let effects = h.run(|m, ctx| m.after_external_change(ctx));
        assert_eq!(effects, vec![Effect::SelectionChanged]);
        assert_eq!(h.canvas.mode, Mode::Idle);
    }
}
