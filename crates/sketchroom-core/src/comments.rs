//! Comment threads pinned to canvas coordinates.
//!
//! Thread content lives with a [`ThreadStore`]; this module only decides
//! where a thread is anchored and in which order threads are drawn.

use crate::viewport::CanvasFrame;
use kurbo::Point;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub type ThreadId = Uuid;

/// Errors from thread operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommentError {
    #[error("unknown thread {0}")]
    UnknownThread(ThreadId),
    #[error("comment body is empty")]
    EmptyBody,
}

/// Metadata attached to every thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadMetadata {
    /// Anchor relative to the canvas top-left.
    pub x: f64,
    pub y: f64,
    pub resolved: bool,
    pub z_index: i64,
}

impl ThreadMetadata {
    pub fn anchor(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

/// Partial metadata change; absent fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z_index: Option<i64>,
}

impl MetadataPatch {
    pub fn z_index(z_index: i64) -> Self {
        Self {
            z_index: Some(z_index),
            ..Self::default()
        }
    }

    pub fn resolved(resolved: bool) -> Self {
        Self {
            resolved: Some(resolved),
            ..Self::default()
        }
    }

    pub fn apply_to(&self, metadata: &mut ThreadMetadata) {
        if let Some(x) = self.x {
            metadata.x = x;
        }
        if let Some(y) = self.y {
            metadata.y = y;
        }
        if let Some(resolved) = self.resolved {
            metadata.resolved = resolved;
        }
        if let Some(z_index) = self.z_index {
            metadata.z_index = z_index;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: Uuid,
    pub body: String,
}

impl Comment {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            body: body.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    pub id: ThreadId,
    pub metadata: ThreadMetadata,
    pub comments: Vec<Comment>,
}

impl Thread {
    /// New thread with a fresh id and `body` as its first comment.
    pub fn new(body: &str, metadata: ThreadMetadata) -> Result<Self, CommentError> {
        let body = body.trim();
        if body.is_empty() {
            return Err(CommentError::EmptyBody);
        }
        Ok(Self {
            id: Uuid::new_v4(),
            metadata,
            comments: vec![Comment::new(body)],
        })
    }
}

/// Persisted thread collaborator.
pub trait ThreadStore {
    fn create(&mut self, body: &str, metadata: ThreadMetadata) -> Result<ThreadId, CommentError>;

    fn edit_metadata(&mut self, id: ThreadId, patch: &MetadataPatch) -> Result<(), CommentError>;

    /// All threads in creation order.
    fn list(&self) -> Vec<Thread>;
}

/// In-memory thread store.
#[derive(Debug, Clone, Default)]
pub struct MemoryThreadStore {
    threads: Vec<Thread>,
}

impl MemoryThreadStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a thread created elsewhere, replacing one with the same id.
    pub fn insert(&mut self, thread: Thread) {
        match self.threads.iter_mut().find(|t| t.id == thread.id) {
            Some(existing) => *existing = thread,
            None => self.threads.push(thread),
        }
    }

    /// Replace every thread.
    pub fn replace_all(&mut self, threads: Vec<Thread>) {
        self.threads = threads;
    }

    pub fn get(&self, id: ThreadId) -> Option<&Thread> {
        self.threads.iter().find(|t| t.id == id)
    }

    pub fn threads(&self) -> &[Thread] {
        &self.threads
    }

    pub fn len(&self) -> usize {
        self.threads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }
}

impl ThreadStore for MemoryThreadStore {
    fn create(&mut self, body: &str, metadata: ThreadMetadata) -> Result<ThreadId, CommentError> {
        let thread = Thread::new(body, metadata)?;
        let id = thread.id;
        self.threads.push(thread);
        Ok(id)
    }

    fn edit_metadata(&mut self, id: ThreadId, patch: &MetadataPatch) -> Result<(), CommentError> {
        let thread = self
            .threads
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(CommentError::UnknownThread(id))?;
        patch.apply_to(&mut thread.metadata);
        Ok(())
    }

    fn list(&self) -> Vec<Thread> {
        self.threads.clone()
    }
}

/// Highest z-index among unresolved threads, 0 if there are none.
pub fn max_z_index(threads: &[Thread]) -> i64 {
    threads
        .iter()
        .filter(|t| !t.metadata.resolved)
        .map(|t| t.metadata.z_index)
        .max()
        .unwrap_or(0)
}

pub fn next_z_index(threads: &[Thread]) -> i64 {
    max_z_index(threads) + 1
}

/// Unresolved threads, bottom to top.
pub fn draw_order(threads: &[Thread]) -> Vec<&Thread> {
    let mut visible: Vec<&Thread> = threads.iter().filter(|t| !t.metadata.resolved).collect();
    visible.sort_by_key(|t| t.metadata.z_index);
    visible
}

/// Raise a thread above the others when it gains focus.
///
/// Returns the new z-index, or `None` if the thread is unknown or already on
/// top.
pub fn focus_thread(
    store: &mut dyn ThreadStore,
    id: ThreadId,
) -> Result<Option<i64>, CommentError> {
    let threads = store.list();
    let Some(thread) = threads.iter().find(|t| t.id == id) else {
        log::debug!("Focus on unknown thread {}", id);
        return Ok(None);
    };
    let max = max_z_index(&threads);
    if thread.metadata.z_index == max {
        return Ok(None);
    }
    let z_index = max + 1;
    store.edit_metadata(id, &MetadataPatch::z_index(z_index))?;
    Ok(Some(z_index))
}

/// Where the new-thread flow is.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum PlacementState {
    #[default]
    Complete,
    /// Waiting for the click that pins the composer.
    Placing,
    /// Composer open at `anchor` (client coordinates).
    Placed { anchor: Point },
}

/// Two-click placement of a new thread.
#[derive(Debug, Clone, Default)]
pub struct CommentPlacement {
    state: PlacementState,
    allow_use_composer: bool,
}

impl CommentPlacement {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> PlacementState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state != PlacementState::Complete
    }

    /// Whether the composer accepts input.
    pub fn allow_use_composer(&self) -> bool {
        self.allow_use_composer
    }

    /// Client position of the open composer.
    pub fn composer_position(&self) -> Option<Point> {
        match self.state {
            PlacementState::Placed { anchor } => Some(anchor),
            _ => None,
        }
    }

    /// The comments button: arms placement, or cancels it if running.
    pub fn toggle(&mut self) {
        if self.is_active() {
            self.cancel();
        } else {
            self.state = PlacementState::Placing;
        }
    }

    pub fn cancel(&mut self) {
        self.state = PlacementState::Complete;
        self.allow_use_composer = false;
    }

    pub fn pointer_down(&mut self) {
        if self.state == PlacementState::Placing {
            self.allow_use_composer = true;
        }
    }

    /// A click anywhere in the document. Returns true if it was consumed.
    pub fn click(&mut self, client: Point, on_composer: bool) -> bool {
        match self.state {
            PlacementState::Complete => false,
            PlacementState::Placing => {
                self.state = PlacementState::Placed { anchor: client };
                true
            }
            PlacementState::Placed { .. } => {
                if !on_composer {
                    self.cancel();
                }
                true
            }
        }
    }

    /// Right-click. Aborts placement that has not been pinned yet.
    pub fn context_menu(&mut self) -> bool {
        if self.state == PlacementState::Placing {
            self.cancel();
            return true;
        }
        false
    }

    /// Create the thread at the pinned anchor, converted to canvas
    /// coordinates. Returns `None` if nothing has been pinned.
    pub fn submit(
        &mut self,
        store: &mut dyn ThreadStore,
        frame: &CanvasFrame,
        body: &str,
    ) -> Result<Option<ThreadId>, CommentError> {
        let PlacementState::Placed { anchor } = self.state else {
            return Ok(None);
        };
        let anchor = frame.client_to_canvas(anchor);
        let metadata = ThreadMetadata {
            x: anchor.x,
            y: anchor.y,
            resolved: false,
            z_index: next_z_index(&store.list()),
        };
        let id = store.create(body, metadata)?;
        self.cancel();
        Ok(Some(id))
    }
}
