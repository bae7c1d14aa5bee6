//! One participant's session.
//!
//! The session owns the local replica, undo history and UI state, routes
//! input to the interaction machine and cursor, and exchanges JSON frames
//! with the relay. It never talks to a socket itself: the host feeds in
//! server frames with [`Session::handle_message`] and sends whatever
//! [`Session::take_outgoing`] returns.

use crate::comments::{
    self, CommentError, CommentPlacement, MemoryThreadStore, MetadataPatch, Thread, ThreadId,
    ThreadMetadata, ThreadStore,
};
use crate::config::SessionConfig;
use crate::cursor::{ContextMenuItem, CursorEffect, CursorMode, CursorState};
use crate::history::History;
use crate::input::{InputEvent, InputState, KeyEvent, Modifiers, MouseButton, PointerEvent};
use crate::interaction::{CanvasState, EditContext, Effect, InteractionMachine};
use crate::presence::{ConnectionId, Presence, PresenceChannel, RemoteCursor};
use crate::reactions::{Reaction, ReactionBuffer, ReactionEvent};
use crate::render::{RenderSurface, SceneChange, SceneMirror};
use crate::shapes::{AttributeEdit, ElementAttributes};
use crate::store::{ReplicatedStore, ShapeStore};
use crate::sync::{decode_bytes, ClientMessage, ServerMessage, SyncEvent};
use crate::timer::{IntervalTimer, Scheduler, Task};
use crate::tools::ToolKind;
use crate::viewport::CanvasFrame;
use kurbo::{Point, Size};
use loro::VersionVector;
use std::ops::{Deref, DerefMut};
use std::time::Instant;

/// Toolbar actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavAction {
    Tool(ToolKind),
    /// Stop drawing and wait for an uploaded image.
    Image,
    /// Start or cancel placing a comment thread.
    Comments,
    Reset,
    Delete,
}

/// Thread store that keeps a local copy and forwards writes to the relay.
#[derive(Debug, Default)]
struct RelayThreads {
    cache: MemoryThreadStore,
    outbox: Vec<ClientMessage>,
}

impl ThreadStore for RelayThreads {
    fn create(&mut self, body: &str, metadata: ThreadMetadata) -> Result<ThreadId, CommentError> {
        let thread = Thread::new(body, metadata)?;
        let id = thread.id;
        self.cache.insert(thread.clone());
        self.outbox.push(ClientMessage::CreateThread { thread });
        Ok(id)
    }

    fn edit_metadata(&mut self, id: ThreadId, patch: &MetadataPatch) -> Result<(), CommentError> {
        self.cache.edit_metadata(id, patch)?;
        self.outbox.push(ClientMessage::EditThread {
            thread_id: id,
            metadata: patch.clone(),
        });
        Ok(())
    }

    fn list(&self) -> Vec<Thread> {
        self.cache.list()
    }
}

/// A participant's view of one shared canvas.
pub struct Session {
    config: SessionConfig,
    store: ReplicatedStore,
    history: History,
    canvas: CanvasState,
    machine: InteractionMachine,
    input: InputState,
    frame: CanvasFrame,
    presence: PresenceChannel,
    cursor: CursorState,
    reactions: ReactionBuffer,
    threads: RelayThreads,
    placement: CommentPlacement,
    scheduler: Scheduler,
    mirror: SceneMirror,

    connection_id: Option<ConnectionId>,
    current_room: Option<String>,
    /// Store version last sent to the relay
    last_synced: VersionVector,
    /// Pending outgoing JSON frames
    outgoing: Vec<String>,

    input_bound: bool,
    awaiting_image: bool,
    needs_render: bool,
    clear_pending: bool,
}

impl Session {
    /// Create a session with an empty store. `now` starts the periodic tasks.
    pub fn new(config: SessionConfig, now: Instant) -> Self {
        Self::with_store(ReplicatedStore::new(), config, now)
    }

    pub fn with_store(store: ReplicatedStore, config: SessionConfig, now: Instant) -> Self {
        let history = History::new(&store, &config.history);
        let machine = InteractionMachine::new(config.interaction.clone());
        let reactions = ReactionBuffer::new(config.reactions.lifetime());
        let mut scheduler = Scheduler::new();
        scheduler.schedule(
            Task::PruneReactions,
            IntervalTimer::new(config.reactions.prune_interval(), now),
        );

        Self {
            config,
            store,
            history,
            canvas: CanvasState::new(),
            machine,
            input: InputState::new(),
            frame: CanvasFrame::default(),
            presence: PresenceChannel::new(),
            cursor: CursorState::new(),
            reactions,
            threads: RelayThreads::default(),
            placement: CommentPlacement::new(),
            scheduler,
            mirror: SceneMirror::new(),
            connection_id: None,
            current_room: None,
            last_synced: VersionVector::default(),
            outgoing: Vec::new(),
            input_bound: false,
            awaiting_image: false,
            needs_render: true,
            clear_pending: false,
        }
    }

    // --- Accessors ---

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn store(&self) -> &ReplicatedStore {
        &self.store
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn canvas(&self) -> &CanvasState {
        &self.canvas
    }

    pub fn frame(&self) -> &CanvasFrame {
        &self.frame
    }

    /// Update the canvas container placement after a layout change.
    pub fn set_frame(&mut self, origin: Point, size: Size) {
        self.frame.resize(origin, size);
    }

    pub fn own_presence(&self) -> &Presence {
        self.presence.own()
    }

    pub fn remote_cursors(&self) -> Vec<RemoteCursor> {
        self.presence.remote_cursors()
    }

    pub fn cursor_mode(&self) -> &CursorMode {
        self.cursor.mode()
    }

    pub fn reactions(&self) -> &[Reaction] {
        self.reactions.reactions()
    }

    /// Whether a held reaction is being emitted.
    pub fn is_emitting(&self) -> bool {
        self.scheduler.is_scheduled(Task::EmitReaction)
    }

    pub fn threads(&self) -> &[Thread] {
        self.threads.cache.threads()
    }

    /// Unresolved threads in draw order.
    pub fn visible_threads(&self) -> Vec<&Thread> {
        comments::draw_order(self.threads())
    }

    pub fn comment_placement(&self) -> &CommentPlacement {
        &self.placement
    }

    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.connection_id
    }

    pub fn current_room(&self) -> Option<&str> {
        self.current_room.as_deref()
    }

    pub fn is_in_room(&self) -> bool {
        self.current_room.is_some()
    }

    pub fn is_input_bound(&self) -> bool {
        self.input_bound
    }

    pub fn is_awaiting_image(&self) -> bool {
        self.awaiting_image
    }

    /// Whether something visible changed since the last [`render`](Self::render).
    pub fn needs_render(&self) -> bool {
        self.needs_render
    }

    // --- Input ---

    /// Start routing input to this session. Input is released when the
    /// returned binding is dropped.
    pub fn bind_input(&mut self) -> InputBinding<'_> {
        self.input_bound = true;
        InputBinding { session: self }
    }

    fn release_input(&mut self) {
        // A gesture cut short by losing input is completed, never abandoned.
        let effects = self.finish_gesture();
        self.note(&effects);
        self.cursor.pointer_up();
        self.scheduler.cancel(Task::EmitReaction);
        self.input = InputState::new();
        self.input_bound = false;
        log::debug!("Input released");
    }

    fn handle_input(&mut self, event: &InputEvent, now: Instant) -> Vec<Effect> {
        let effects = match event {
            InputEvent::Pointer(pointer) => {
                self.input.handle_pointer_event(pointer, now);
                self.handle_pointer(pointer, now)
            }
            InputEvent::Key { event, modifiers } => {
                self.input.handle_key_event(*modifiers);
                match event {
                    KeyEvent::Pressed(key) => self.handle_key(key, *modifiers, now),
                    KeyEvent::Released(_) => Vec::new(),
                }
            }
            InputEvent::Blur => {
                let cursor = self.cursor.pointer_up();
                self.apply_cursor(cursor, now);
                Vec::new()
            }
        };
        self.note(&effects);
        effects
    }

    fn handle_pointer(&mut self, event: &PointerEvent, now: Instant) -> Vec<Effect> {
        match *event {
            PointerEvent::Down { position, button } => {
                if button == MouseButton::Right {
                    self.placement.context_menu();
                    return Vec::new();
                }
                if self.placement.is_active() {
                    self.placement.pointer_down();
                    return Vec::new();
                }
                let point = self.frame.client_to_canvas(position);
                let cursor = self.cursor.pointer_down(point);
                self.apply_cursor(cursor, now);
                if self.is_reacting() {
                    return Vec::new();
                }
                let modifiers = self.input.modifiers;
                let double_click = self.input.is_double_click();
                self.edit(|machine, ctx| machine.pointer_down(ctx, point, button, modifiers, double_click))
            }
            PointerEvent::Move { position } => {
                let point = self.frame.client_to_canvas(position);
                let cursor = self.cursor.pointer_move(point);
                self.apply_cursor(cursor, now);
                self.edit(|machine, ctx| machine.pointer_move(ctx, point))
            }
            PointerEvent::Up { position, button } => {
                if self.placement.is_active() {
                    if button == MouseButton::Left {
                        self.placement.click(position, false);
                    }
                    return Vec::new();
                }
                let point = self.frame.client_to_canvas(position);
                let cursor = self.cursor.pointer_up();
                self.apply_cursor(cursor, now);
                self.edit(|machine, ctx| machine.pointer_up(ctx, point, button))
            }
            PointerEvent::Leave => {
                let cursor = self.cursor.pointer_leave();
                self.apply_cursor(cursor, now);
                self.finish_gesture()
            }
        }
    }

    /// Complete an open gesture at the last pointer position.
    fn finish_gesture(&mut self) -> Vec<Effect> {
        let point = self.frame.client_to_canvas(self.input.pointer_position);
        self.edit(|machine, ctx| machine.finish_gesture(ctx, point))
    }

    fn handle_key(&mut self, key: &str, modifiers: Modifiers, now: Instant) -> Vec<Effect> {
        // Text editing takes every key; otherwise cursor keys come first.
        if !self.canvas.is_editing_text() && !modifiers.command() {
            if let Some(cursor) = self.cursor.key_pressed(key) {
                self.apply_cursor(cursor, now);
                return Vec::new();
            }
        }
        self.edit(|machine, ctx| machine.key_pressed(ctx, key, modifiers))
    }

    fn is_reacting(&self) -> bool {
        matches!(
            self.cursor.mode(),
            CursorMode::ReactionSelector | CursorMode::Reaction { .. }
        )
    }

    fn apply_cursor(&mut self, effects: Vec<CursorEffect>, now: Instant) {
        for effect in effects {
            match effect {
                CursorEffect::Presence(update) => {
                    self.presence.update(update);
                }
                CursorEffect::StartEmitting => self.scheduler.schedule(
                    Task::EmitReaction,
                    IntervalTimer::immediate(self.config.reactions.emit_interval(), now),
                ),
                CursorEffect::StopEmitting => {
                    self.scheduler.cancel(Task::EmitReaction);
                }
            }
        }
    }

    fn edit<R>(&mut self, f: impl FnOnce(&InteractionMachine, &mut EditContext<'_>) -> R) -> R {
        let mut ctx = EditContext {
            store: &mut self.store,
            history: &mut self.history,
            canvas: &mut self.canvas,
        };
        f(&self.machine, &mut ctx)
    }

    fn note(&mut self, effects: &[Effect]) {
        if effects.is_empty() {
            return;
        }
        self.needs_render = true;
        if effects.contains(&Effect::ClearSurface) {
            self.clear_pending = true;
        }
    }

    // --- Commands ---

    pub fn nav(&mut self, action: NavAction) -> Vec<Effect> {
        let effects = match action {
            NavAction::Tool(tool) => {
                self.awaiting_image = false;
                self.edit(|machine, ctx| machine.select_tool(ctx, tool))
            }
            NavAction::Image => {
                self.awaiting_image = true;
                self.edit(|machine, ctx| machine.select_tool(ctx, ToolKind::Select))
            }
            NavAction::Comments => {
                self.placement.toggle();
                self.edit(|machine, ctx| machine.commit_text(ctx))
            }
            NavAction::Reset => self.edit(|machine, ctx| machine.reset(ctx)),
            NavAction::Delete => {
                let mut effects = self.edit(|machine, ctx| machine.delete_selection(ctx));
                if self.canvas.active_tool() != ToolKind::Select {
                    effects.extend(self.edit(|machine, ctx| machine.select_tool(ctx, ToolKind::Select)));
                }
                effects
            }
        };
        self.note(&effects);
        effects
    }

    /// Insert an uploaded image at the middle of the canvas.
    pub fn insert_image(&mut self, src: &str, natural: Size) -> Vec<Effect> {
        self.awaiting_image = false;
        let center = self.frame.center();
        let effects = self.edit(|machine, ctx| machine.insert_image(ctx, src, natural, center));
        self.note(&effects);
        effects
    }

    pub fn cancel_image(&mut self) {
        self.awaiting_image = false;
    }

    pub fn context_menu(&mut self, item: ContextMenuItem, now: Instant) -> Vec<Effect> {
        let effects = match item {
            ContextMenuItem::Undo => self.edit(|machine, ctx| machine.undo(ctx)),
            ContextMenuItem::Redo => self.edit(|machine, ctx| machine.redo(ctx)),
            ContextMenuItem::Chat | ContextMenuItem::Reactions => {
                let cursor = self.cursor.context_menu(item);
                self.apply_cursor(cursor, now);
                Vec::new()
            }
        };
        self.note(&effects);
        effects
    }

    /// Pick a reaction in the selector.
    pub fn select_reaction(&mut self, reaction: &str, now: Instant) {
        let cursor = self.cursor.select_reaction(reaction);
        self.apply_cursor(cursor, now);
    }

    pub fn attributes(&self) -> Option<ElementAttributes> {
        self.machine.attributes(&self.store, &self.canvas)
    }

    pub fn edit_attribute(&mut self, edit: &AttributeEdit) -> Vec<Effect> {
        let effects = self.edit(|machine, ctx| machine.edit_attribute(ctx, edit));
        self.note(&effects);
        effects
    }

    // --- Comments ---

    /// A click outside the canvas while placing a thread.
    pub fn comment_click(&mut self, client: Point, on_composer: bool) -> bool {
        self.placement.click(client, on_composer)
    }

    /// Submit the open composer.
    pub fn submit_comment(&mut self, body: &str) -> Result<Option<ThreadId>, CommentError> {
        let frame = self.frame;
        let created = self.placement.submit(&mut self.threads, &frame, body)?;
        if created.is_some() {
            self.needs_render = true;
        }
        Ok(created)
    }

    /// Bring a thread to the front.
    pub fn focus_thread(&mut self, id: ThreadId) -> Result<Option<i64>, CommentError> {
        let raised = comments::focus_thread(&mut self.threads, id)?;
        if raised.is_some() {
            self.needs_render = true;
        }
        Ok(raised)
    }

    pub fn resolve_thread(&mut self, id: ThreadId, resolved: bool) -> Result<(), CommentError> {
        self.threads.edit_metadata(id, &MetadataPatch::resolved(resolved))?;
        self.needs_render = true;
        Ok(())
    }

    // --- Periodic work ---

    /// Run whatever periodic work is due.
    pub fn tick(&mut self, now: Instant) {
        for task in self.scheduler.due(now) {
            match task {
                Task::PruneReactions => {
                    if self.reactions.prune(now) > 0 {
                        self.needs_render = true;
                    }
                }
                Task::EmitReaction => self.emit_reaction(now),
            }
        }
    }

    fn emit_reaction(&mut self, now: Instant) {
        let (Some(value), Some(point)) = (self.cursor.held_reaction(), self.presence.own().cursor) else {
            return;
        };
        let value = value.to_string();
        self.reactions.record(point, &value, now);
        self.needs_render = true;
        if self.is_in_room() {
            self.queue(&ClientMessage::Reaction {
                event: ReactionEvent::new(point, value),
            });
        }
    }

    // --- Rendering ---

    /// Push the current store snapshot to `surface`.
    pub fn render(&mut self, surface: &mut dyn RenderSurface) -> Vec<SceneChange> {
        let mut changes = Vec::new();
        if std::mem::take(&mut self.clear_pending) {
            changes.push(self.mirror.clear(surface));
        }
        changes.extend(self.mirror.reconcile(&self.store.entries(), surface));
        self.needs_render = false;
        changes
    }

    // --- Room/Connection Management ---

    /// Request to join a room. Queues the join message.
    pub fn join_room(&mut self, room: &str) {
        self.queue(&ClientMessage::Join {
            room: room.to_string(),
        });
    }

    /// Leave the current room after sending anything pending.
    pub fn leave_room(&mut self) {
        if self.current_room.is_none() {
            return;
        }
        self.flush();
        self.queue(&ClientMessage::Leave);
        self.current_room = None;
        self.connection_id = None;
        self.presence.clear_others();
        self.needs_render = true;
    }

    /// Take pending outgoing messages (drains the queue).
    pub fn take_outgoing(&mut self) -> Vec<String> {
        self.flush();
        std::mem::take(&mut self.outgoing)
    }

    fn queue(&mut self, msg: &ClientMessage) {
        match serde_json::to_string(msg) {
            Ok(json) => self.outgoing.push(json),
            Err(e) => log::warn!("Failed to encode message: {}", e),
        }
    }

    fn flush(&mut self) {
        if !self.is_in_room() {
            return;
        }
        self.flush_store();
        if let Some((seq, presence)) = self.presence.take_pending() {
            self.queue(&ClientMessage::Presence { seq, presence });
        }
        for msg in std::mem::take(&mut self.threads.outbox) {
            self.queue(&msg);
        }
    }

    /// Queue store changes made since the last send.
    fn flush_store(&mut self) {
        let version = self.store.version();
        if version == self.last_synced {
            return;
        }
        let updates = self.store.export_updates(&self.last_synced);
        self.last_synced = version;
        if !updates.is_empty() {
            self.queue(&ClientMessage::sync(&updates));
        }
    }

    fn import_remote(&mut self, data: &str) -> bool {
        let bytes = match decode_bytes(data) {
            Ok(bytes) => bytes,
            Err(e) => {
                log::warn!("Dropping undecodable store update: {}", e);
                return false;
            }
        };
        // Send local changes first so the version marker only skips what
        // came from the relay.
        let in_room = self.is_in_room();
        if in_room {
            self.flush_store();
        }
        if let Err(e) = self.store.import(&bytes) {
            log::warn!("Failed to import store update: {}", e);
            return false;
        }
        if in_room {
            self.last_synced = self.store.version();
        }
        let effects = self.edit(|machine, ctx| machine.after_external_change(ctx));
        self.note(&effects);
        self.needs_render = true;
        true
    }

    // --- Incoming Message Handling ---

    /// Handle an incoming server message received at `now`.
    /// Returns a SyncEvent describing what happened.
    pub fn handle_message(&mut self, json: &str, now: Instant) -> Option<SyncEvent> {
        let msg: ServerMessage = match serde_json::from_str(json) {
            Ok(msg) => msg,
            Err(e) => {
                log::debug!("Ignoring malformed server message: {}", e);
                return None;
            }
        };

        match msg {
            ServerMessage::Joined {
                room,
                connection_id,
                peer_count,
                initial_sync,
                threads,
            } => {
                self.current_room = Some(room.clone());
                self.connection_id = Some(connection_id);
                // The room may be new, or may have forgotten what we sent
                // before, so the next flush sends everything it lacks.
                self.last_synced = VersionVector::default();
                if let Some(data) = initial_sync {
                    self.import_remote(&data);
                }
                self.threads.cache.replace_all(threads);
                self.presence.clear_others();
                self.presence.mark_dirty();
                self.needs_render = true;
                Some(SyncEvent::JoinedRoom {
                    room,
                    connection_id,
                    peer_count,
                })
            }
            ServerMessage::PeerJoined { connection_id } => {
                // Let the newcomer see our cursor without waiting for a move.
                self.presence.mark_dirty();
                Some(SyncEvent::PeerJoined { connection_id })
            }
            ServerMessage::PeerLeft { connection_id } => {
                if self.presence.remove_peer(connection_id) {
                    self.needs_render = true;
                }
                Some(SyncEvent::PeerLeft { connection_id })
            }
            ServerMessage::Sync { from, data } => self
                .import_remote(&data)
                .then_some(SyncEvent::StoreUpdated { from }),
            ServerMessage::Presence {
                from,
                seq,
                presence,
            } => {
                if Some(from) == self.connection_id || !self.presence.apply_remote(from, seq, presence) {
                    return None;
                }
                self.needs_render = true;
                Some(SyncEvent::PresenceChanged { from })
            }
            ServerMessage::Reaction { from, event } => {
                if Some(from) == self.connection_id {
                    return None;
                }
                self.reactions.receive(event, now);
                self.needs_render = true;
                Some(SyncEvent::ReactionReceived { from })
            }
            ServerMessage::Threads { threads } => {
                self.threads.cache.replace_all(threads);
                self.needs_render = true;
                Some(SyncEvent::ThreadsChanged)
            }
            ServerMessage::Error { message } => {
                log::warn!("Relay error: {}", message);
                Some(SyncEvent::Error { message })
            }
        }
    }
}

/// Scoped input routing for a [`Session`].
///
/// While the binding lives, input events are dispatched to the session.
/// Dropping it releases input: a gesture in progress is completed at the
/// last pointer position and reaction emission stops.
pub struct InputBinding<'a> {
    session: &'a mut Session,
}

impl InputBinding<'_> {
    pub fn dispatch(&mut self, event: &InputEvent, now: Instant) -> Vec<Effect> {
        self.session.handle_input(event, now)
    }
}

impl Deref for InputBinding<'_> {
    type Target = Session;

    fn deref(&self) -> &Session {
        &*self.session
    }
}

impl DerefMut for InputBinding<'_> {
    fn deref_mut(&mut self) -> &mut Session {
        &mut *self.session
    }
}

impl Drop for InputBinding<'_> {
    fn drop(&mut self) {
        self.session.release_input();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comments::PlacementState;
    use crate::shapes::{Shape, ShapeId};
    use kurbo::Rect;
    use std::collections::BTreeMap;
    use std::time::Duration;

    #[derive(Default)]
    struct Surface {
        shapes: BTreeMap<ShapeId, Shape>,
    }

    impl RenderSurface for Surface {
        fn upsert(&mut self, shape: &Shape) {
            self.shapes.insert(shape.id(), shape.clone());
        }

        fn remove(&mut self, id: ShapeId) {
            self.shapes.remove(&id);
        }

        fn clear(&mut self) {
            self.shapes.clear();
        }
    }

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    fn joined(connection_id: ConnectionId, now: Instant) -> Session {
        let mut session = Session::new(SessionConfig::default(), now);
        session.join_room("room");
        let joined = ServerMessage::Joined {
            room: "room".to_string(),
            connection_id,
            peer_count: 1,
            initial_sync: None,
            threads: Vec::new(),
        };
        let json = serde_json::to_string(&joined).expect("serialize");
        session.handle_message(&json, now).expect("joined");
        session
    }

    fn sent(session: &mut Session) -> Vec<ClientMessage> {
        session
            .take_outgoing()
            .iter()
            .map(|json| serde_json::from_str(json).expect("client message"))
            .collect()
    }

    fn drag(session: &mut Session, from: (f64, f64), to: (f64, f64), now: Instant) {
        let mut input = session.bind_input();
        input.dispatch(&InputEvent::down(from.0, from.1), now);
        input.dispatch(&InputEvent::moved(to.0, to.1), now);
        input.dispatch(&InputEvent::up(to.0, to.1), now);
    }

    #[test]
    fn test_rectangle_drag_in_client_coordinates() {
        let t0 = Instant::now();
        let mut session = Session::new(SessionConfig::default(), t0);
        session.set_frame(Point::new(10.0, 20.0), Size::new(800.0, 600.0));
        session.nav(NavAction::Tool(ToolKind::Rectangle));

        drag(&mut session, (60.0, 70.0), (160.0, 140.0), t0);

        let shapes = session.store().entries();
        assert_eq!(shapes.len(), 1);
        let bounds = shapes[0].bounds();
        assert!((bounds.x0 - 50.0).abs() < f64::EPSILON);
        assert!((bounds.y0 - 50.0).abs() < f64::EPSILON);
        assert!((bounds.width() - 100.0).abs() < f64::EPSILON);
        assert!((bounds.height() - 70.0).abs() < f64::EPSILON);
        assert_eq!(session.canvas().active_tool(), ToolKind::Select);
        assert!(!session.is_input_bound());
    }

    #[test]
    fn test_dropping_binding_completes_gesture() {
        let t0 = Instant::now();
        let mut session = Session::new(SessionConfig::default(), t0);
        session.nav(NavAction::Tool(ToolKind::Rectangle));
        {
            let mut input = session.bind_input();
            assert!(input.is_input_bound());
            input.dispatch(&InputEvent::down(0.0, 0.0), t0);
            input.dispatch(&InputEvent::moved(40.0, 30.0), t0);
        }

        assert!(!session.is_input_bound());
        assert!(!session.canvas().is_drawing());
        assert!(!session.history().is_grouping());
        assert_eq!(session.history().undo_count(), 1);
        let bounds = session.store().entries()[0].bounds();
        assert_eq!(bounds, Rect::new(0.0, 0.0, 40.0, 30.0));
    }

    #[test]
    fn test_pointer_leave_completes_gesture() {
        let t0 = Instant::now();
        let mut session = Session::new(SessionConfig::default(), t0);
        session.nav(NavAction::Tool(ToolKind::Rectangle));
        {
            let mut input = session.bind_input();
            input.dispatch(&InputEvent::down(0.0, 0.0), t0);
            input.dispatch(&InputEvent::moved(40.0, 30.0), t0);
            input.dispatch(&InputEvent::Pointer(PointerEvent::Leave), t0);
            assert!(!input.canvas().is_drawing());
        }

        assert!(!session.history().is_grouping());
        assert_eq!(session.history().undo_count(), 1);
        assert_eq!(session.canvas().active_tool(), ToolKind::Select);

        // A later click does not resume the finished rectangle.
        let mut input = session.bind_input();
        input.dispatch(&InputEvent::down(500.0, 500.0), t0);
        input.dispatch(&InputEvent::up(500.0, 500.0), t0);
        let shapes = input.store().entries();
        assert_eq!(shapes.len(), 1);
        assert_eq!(shapes[0].bounds(), Rect::new(0.0, 0.0, 40.0, 30.0));
    }

    #[test]
    fn test_click_selects_newest_overlapping_shape() {
        let t0 = Instant::now();
        for _ in 0..20 {
            let mut session = Session::new(SessionConfig::default(), t0);
            session.nav(NavAction::Tool(ToolKind::Rectangle));
            drag(&mut session, (0.0, 0.0), (200.0, 200.0), t0);
            session.nav(NavAction::Tool(ToolKind::Rectangle));
            drag(&mut session, (50.0, 50.0), (100.0, 100.0), t0);
            let inner = session
                .store()
                .entries()
                .iter()
                .find(|shape| shape.bounds() == Rect::new(50.0, 50.0, 100.0, 100.0))
                .map(Shape::id)
                .expect("inner rectangle");

            let mut input = session.bind_input();
            input.dispatch(&InputEvent::down(75.0, 75.0), t0);
            input.dispatch(&InputEvent::up(75.0, 75.0), t0);
            assert_eq!(input.canvas().selection, vec![inner]);
        }
    }

    #[test]
    fn test_rejoin_resends_store_to_fresh_room() {
        let t0 = Instant::now();
        let mut session = joined(1, t0);
        session.nav(NavAction::Tool(ToolKind::Rectangle));
        drag(&mut session, (0.0, 0.0), (50.0, 50.0), t0);
        sent(&mut session);
        session.leave_room();
        sent(&mut session);

        // The relay dropped the empty room, so it comes back without state.
        session.join_room("room");
        let joined = ServerMessage::Joined {
            room: "room".to_string(),
            connection_id: 3,
            peer_count: 1,
            initial_sync: None,
            threads: Vec::new(),
        };
        session.handle_message(&serde_json::to_string(&joined).expect("serialize"), t0);

        let data = sent(&mut session)
            .into_iter()
            .find_map(|msg| match msg {
                ClientMessage::Sync { data } => Some(data),
                _ => None,
            })
            .expect("store sent to the new room");
        let replica = ReplicatedStore::from_snapshot(&decode_bytes(&data).expect("decode")).expect("import");
        assert_eq!(replica.entries(), session.store().entries());
    }

    #[test]
    fn test_store_changes_reach_other_session() {
        let t0 = Instant::now();
        let mut alice = joined(1, t0);
        let mut bob = joined(2, t0);
        alice.nav(NavAction::Tool(ToolKind::Circle));
        drag(&mut alice, (10.0, 10.0), (60.0, 60.0), t0);

        let data = sent(&mut alice)
            .into_iter()
            .find_map(|msg| match msg {
                ClientMessage::Sync { data } => Some(data),
                _ => None,
            })
            .expect("sync frame");
        let frame = serde_json::to_string(&ServerMessage::Sync { from: 1, data }).expect("serialize");

        assert_eq!(bob.handle_message(&frame, t0), Some(SyncEvent::StoreUpdated { from: 1 }));
        assert_eq!(bob.store().entries(), alice.store().entries());
        // Bob does not echo what he just received.
        assert!(!sent(&mut bob)
            .iter()
            .any(|msg| matches!(msg, ClientMessage::Sync { .. })));
    }

    #[test]
    fn test_remote_change_is_not_undone_locally() {
        let t0 = Instant::now();
        let mut alice = joined(1, t0);
        let mut bob = joined(2, t0);
        alice.nav(NavAction::Tool(ToolKind::Rectangle));
        drag(&mut alice, (0.0, 0.0), (50.0, 50.0), t0);
        for json in alice.take_outgoing() {
            if let Ok(ClientMessage::Sync { data }) = serde_json::from_str(&json) {
                let frame = serde_json::to_string(&ServerMessage::Sync { from: 1, data }).expect("serialize");
                bob.handle_message(&frame, t0);
            }
        }

        bob.context_menu(ContextMenuItem::Undo, t0);
        assert_eq!(bob.store().len(), 1);
    }

    #[test]
    fn test_presence_coalesces_into_one_frame() {
        let t0 = Instant::now();
        let mut session = joined(1, t0);
        {
            let mut input = session.bind_input();
            input.dispatch(&InputEvent::moved(5.0, 5.0), t0);
            input.dispatch(&InputEvent::moved(6.0, 6.0), t0);
        }
        let presence: Vec<ClientMessage> = sent(&mut session)
            .into_iter()
            .filter(|msg| matches!(msg, ClientMessage::Presence { .. }))
            .collect();
        assert_eq!(presence.len(), 1);
        match &presence[0] {
            ClientMessage::Presence { seq, presence } => {
                assert_eq!(*seq, 1);
                assert_eq!(presence.cursor, Some(Point::new(6.0, 6.0)));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_remote_presence_and_departure() {
        let t0 = Instant::now();
        let mut session = joined(1, t0);
        let update = r#"{"type":"presence","from":2,"seq":1,"cursor":{"x":1.0,"y":1.0},"message":"yo"}"#;
        assert_eq!(
            session.handle_message(update, t0),
            Some(SyncEvent::PresenceChanged { from: 2 })
        );
        assert_eq!(session.handle_message(update, t0), None);

        let cursors = session.remote_cursors();
        assert_eq!(cursors.len(), 1);
        assert_eq!(cursors[0].message.as_deref(), Some("yo"));

        session.handle_message(r#"{"type":"peer_left","connection_id":2}"#, t0);
        assert!(session.remote_cursors().is_empty());
    }

    #[test]
    fn test_pointer_leave_clears_cursor_and_message() {
        let t0 = Instant::now();
        let mut session = Session::new(SessionConfig::default(), t0);
        let mut input = session.bind_input();
        input.dispatch(&InputEvent::moved(5.0, 5.0), t0);
        input.dispatch(&InputEvent::key("/"), t0);
        input.dispatch(&InputEvent::key("h"), t0);
        assert_eq!(input.own_presence().message.as_deref(), Some("h"));

        input.dispatch(&InputEvent::Pointer(PointerEvent::Leave), t0);
        assert_eq!(input.own_presence(), &Presence::default());
        assert_eq!(input.cursor_mode(), &CursorMode::Hidden);
    }

    #[test]
    fn test_chat_captures_keys() {
        let t0 = Instant::now();
        let mut session = Session::new(SessionConfig::default(), t0);
        session.nav(NavAction::Tool(ToolKind::Rectangle));
        drag(&mut session, (0.0, 0.0), (50.0, 50.0), t0);
        {
            let mut input = session.bind_input();
            input.dispatch(&InputEvent::down(25.0, 25.0), t0);
            input.dispatch(&InputEvent::up(25.0, 25.0), t0);
        }
        assert_eq!(session.canvas().selection.len(), 1);

        let mut input = session.bind_input();
        input.dispatch(&InputEvent::key("/"), t0);
        input.dispatch(&InputEvent::key("e"), t0);
        input.dispatch(&InputEvent::key("Delete"), t0);
        assert_eq!(input.store().len(), 1);
        assert_eq!(input.own_presence().message.as_deref(), Some("e"));

        input.dispatch(&InputEvent::key("Escape"), t0);
        assert_eq!(input.cursor_mode(), &CursorMode::Hidden);
        assert_eq!(input.own_presence().message, None);

        input.dispatch(&InputEvent::key("Delete"), t0);
        assert!(input.store().is_empty());
    }

    #[test]
    fn test_held_reaction_emits_and_expires() {
        let t0 = Instant::now();
        let mut session = joined(1, t0);
        session.select_reaction("🔥", t0);
        {
            let mut input = session.bind_input();
            input.dispatch(&InputEvent::down(10.0, 10.0), t0);
            assert!(input.is_emitting());
            input.tick(t0);
            input.tick(t0 + ms(100));
            input.dispatch(&InputEvent::up(10.0, 10.0), t0 + ms(150));
            assert!(!input.is_emitting());
            input.tick(t0 + ms(200));
        }
        assert_eq!(session.reactions().len(), 2);
        assert!(session.store().is_empty());

        let reactions = sent(&mut session)
            .into_iter()
            .filter(|msg| matches!(msg, ClientMessage::Reaction { .. }))
            .count();
        assert_eq!(reactions, 2);

        session.tick(t0 + ms(3900));
        assert_eq!(session.reactions().len(), 2);
        session.tick(t0 + ms(4050));
        assert_eq!(session.reactions().len(), 1);
        session.tick(t0 + ms(5000));
        assert!(session.reactions().is_empty());
    }

    #[test]
    fn test_received_reaction_expires() {
        let t0 = Instant::now();
        let mut session = joined(1, t0);
        let frame = r#"{"type":"reaction","from":2,"x":1.0,"y":1.0,"value":"👍"}"#;
        assert_eq!(
            session.handle_message(frame, t0),
            Some(SyncEvent::ReactionReceived { from: 2 })
        );
        session.tick(t0 + ms(3900));
        assert_eq!(session.reactions().len(), 1);
        session.tick(t0 + ms(4100));
        assert!(session.reactions().is_empty());
    }

    #[test]
    fn test_leave_stops_emission() {
        let t0 = Instant::now();
        let mut session = Session::new(SessionConfig::default(), t0);
        session.select_reaction("🎉", t0);
        let mut input = session.bind_input();
        input.dispatch(&InputEvent::down(1.0, 1.0), t0);
        input.dispatch(&InputEvent::Pointer(PointerEvent::Leave), t0);
        assert!(!input.is_emitting());
        input.tick(t0 + ms(100));
        assert!(input.reactions().is_empty());
    }

    #[test]
    fn test_comment_placement_through_canvas_clicks() {
        let t0 = Instant::now();
        let mut session = joined(1, t0);
        session.set_frame(Point::new(100.0, 50.0), Size::new(800.0, 600.0));
        session.nav(NavAction::Comments);
        {
            let mut input = session.bind_input();
            input.dispatch(&InputEvent::down(300.0, 250.0), t0);
            input.dispatch(&InputEvent::up(300.0, 250.0), t0);
        }
        assert_eq!(
            session.comment_placement().state(),
            PlacementState::Placed {
                anchor: Point::new(300.0, 250.0)
            }
        );
        assert!(session.store().is_empty());

        let id = session.submit_comment("Nice").expect("submit").expect("created");
        let thread = &session.threads()[0];
        assert_eq!(thread.id, id);
        assert_eq!(thread.metadata.anchor(), Point::new(200.0, 200.0));
        assert_eq!(thread.metadata.z_index, 1);
        assert!(!session.comment_placement().is_active());
        assert!(sent(&mut session)
            .iter()
            .any(|msg| matches!(msg, ClientMessage::CreateThread { thread } if thread.id == id)));
    }

    #[test]
    fn test_right_click_cancels_placing() {
        let t0 = Instant::now();
        let mut session = Session::new(SessionConfig::default(), t0);
        session.nav(NavAction::Comments);
        let mut input = session.bind_input();
        input.dispatch(&InputEvent::right_down(10.0, 10.0), t0);
        assert!(!input.comment_placement().is_active());
    }

    #[test]
    fn test_focus_thread_sends_new_z_index() {
        let t0 = Instant::now();
        let mut session = joined(1, t0);
        let threads: Vec<Thread> = [1, 3, 2]
            .into_iter()
            .map(|z_index| {
                Thread::new(
                    "hi",
                    ThreadMetadata {
                        x: 0.0,
                        y: 0.0,
                        resolved: false,
                        z_index,
                    },
                )
                .expect("thread")
            })
            .collect();
        let focused = threads[2].id;
        let frame = serde_json::to_string(&ServerMessage::Threads { threads }).expect("serialize");
        assert_eq!(session.handle_message(&frame, t0), Some(SyncEvent::ThreadsChanged));
        sent(&mut session);

        assert_eq!(session.focus_thread(focused).expect("focus"), Some(4));
        let z: Vec<i64> = session.threads().iter().map(|t| t.metadata.z_index).collect();
        assert_eq!(z, vec![1, 3, 4]);
        assert_eq!(
            sent(&mut session),
            vec![ClientMessage::EditThread {
                thread_id: focused,
                metadata: MetadataPatch::z_index(4),
            }]
        );
        assert_eq!(session.visible_threads().last().map(|t| t.id), Some(focused));
    }

    #[test]
    fn test_delete_without_selection_keeps_store() {
        let t0 = Instant::now();
        let mut session = Session::new(SessionConfig::default(), t0);
        session.nav(NavAction::Tool(ToolKind::Rectangle));
        drag(&mut session, (0.0, 0.0), (50.0, 50.0), t0);
        let before = session.store().entries();

        session.nav(NavAction::Delete);
        assert_eq!(session.store().entries(), before);
    }

    #[test]
    fn test_reset_clears_store_and_surface() {
        let t0 = Instant::now();
        let mut session = Session::new(SessionConfig::default(), t0);
        let mut surface = Surface::default();
        session.nav(NavAction::Tool(ToolKind::Rectangle));
        drag(&mut session, (0.0, 0.0), (50.0, 50.0), t0);
        session.render(&mut surface);
        assert_eq!(surface.shapes.len(), 1);
        assert!(!session.needs_render());

        session.nav(NavAction::Reset);
        assert!(session.needs_render());
        let changes = session.render(&mut surface);
        assert_eq!(changes, vec![SceneChange::Cleared]);
        assert!(surface.shapes.is_empty());
        assert!(session.store().is_empty());
    }

    #[test]
    fn test_context_menu_undo_redo() {
        let t0 = Instant::now();
        let mut session = Session::new(SessionConfig::default(), t0);
        session.nav(NavAction::Tool(ToolKind::Rectangle));
        drag(&mut session, (0.0, 0.0), (50.0, 50.0), t0);
        let created = session.store().entries();

        session.context_menu(ContextMenuItem::Undo, t0);
        assert!(session.store().is_empty());
        session.context_menu(ContextMenuItem::Redo, t0);
        assert_eq!(session.store().entries(), created);
    }

    #[test]
    fn test_image_inserted_at_frame_center() {
        let t0 = Instant::now();
        let mut session = Session::new(SessionConfig::default(), t0);
        session.nav(NavAction::Image);
        assert!(session.is_awaiting_image());

        session.insert_image("data:image/png;base64,AAAA", Size::new(800.0, 400.0));
        assert!(!session.is_awaiting_image());
        let shapes = session.store().entries();
        assert_eq!(shapes[0].bounds(), Rect::new(540.0, 310.0, 740.0, 410.0));
        assert!(session.attributes().is_some());
    }

    #[test]
    fn test_nothing_sent_outside_a_room() {
        let t0 = Instant::now();
        let mut session = Session::new(SessionConfig::default(), t0);
        session.nav(NavAction::Tool(ToolKind::Rectangle));
        drag(&mut session, (0.0, 0.0), (50.0, 50.0), t0);
        assert!(session.take_outgoing().is_empty());

        session.join_room("late");
        assert_eq!(
            sent(&mut session),
            vec![ClientMessage::Join {
                room: "late".to_string()
            }]
        );
    }

    #[test]
    fn test_initial_sync_on_join() {
        let t0 = Instant::now();
        let mut seeded = ReplicatedStore::new();
        let shape = Shape::rectangle(Rect::new(0.0, 0.0, 20.0, 20.0));
        seeded.put(shape.id(), &shape).expect("put");
        let snapshot = crate::sync::encode_bytes(&seeded.export_snapshot());

        let mut session = Session::new(SessionConfig::default(), t0);
        session.join_room("room");
        let joined = ServerMessage::Joined {
            room: "room".to_string(),
            connection_id: 9,
            peer_count: 2,
            initial_sync: Some(snapshot),
            threads: Vec::new(),
        };
        let event = session.handle_message(&serde_json::to_string(&joined).expect("serialize"), t0);
        assert_eq!(
            event,
            Some(SyncEvent::JoinedRoom {
                room: "room".to_string(),
                connection_id: 9,
                peer_count: 2,
            })
        );
        assert_eq!(session.store().get(&shape.id()), Some(shape));
        assert!(session.handle_message("not json", t0).is_none());
    }
}
