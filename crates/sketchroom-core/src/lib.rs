//! SketchRoom Core Library
//!
//! Shared shape store, interaction state machine, presence, reactions and
//! comment threads for the SketchRoom collaborative canvas.

pub mod comments;
pub mod config;
pub mod cursor;
pub mod history;
pub mod input;
pub mod interaction;
pub mod presence;
pub mod reactions;
pub mod render;
pub mod selection;
pub mod session;
pub mod shapes;
pub mod store;
pub mod sync;
pub mod timer;
pub mod tools;
pub mod viewport;

pub use comments::{CommentError, CommentPlacement, MemoryThreadStore, Thread, ThreadId, ThreadStore};
pub use config::{ConfigError, SessionConfig};
pub use cursor::{ContextMenuItem, CursorMode, CursorState};
pub use history::History;
pub use input::{InputEvent, InputState};
pub use interaction::{CanvasState, EditContext, Effect, InteractionMachine, Mode};
pub use presence::{ConnectionId, Presence, PresenceChannel, RemoteCursor};
pub use reactions::{Reaction, ReactionBuffer, ReactionEvent};
pub use render::{RenderSurface, SceneChange, SceneMirror};
pub use session::{InputBinding, NavAction, Session};
pub use shapes::{Shape, ShapeId, ShapeKind};
pub use store::{ConflictPolicy, ReplicatedStore, ShapeStore, StoreError};
pub use sync::{ClientMessage, ServerMessage, SyncEvent};
pub use tools::ToolKind;
pub use viewport::CanvasFrame;
