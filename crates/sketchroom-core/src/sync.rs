//! Wire protocol between a session and the relay server.
//!
//! Frames are JSON text. Store updates carry base64-encoded Loro bytes.

use crate::comments::{MetadataPatch, Thread, ThreadId};
use crate::presence::{ConnectionId, Presence};
use crate::reactions::ReactionEvent;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

/// Messages sent to the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Join a room
    Join { room: String },
    /// Leave current room
    Leave,
    /// Store update (base64 encoded Loro bytes)
    Sync { data: String },
    /// Own presence record
    Presence {
        seq: u64,
        #[serde(flatten)]
        presence: Presence,
    },
    /// Fire-and-forget reaction
    Reaction {
        #[serde(flatten)]
        event: ReactionEvent,
    },
    CreateThread { thread: Thread },
    EditThread {
        thread_id: ThreadId,
        metadata: MetadataPatch,
    },
}

/// Messages received from the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Confirm room join with current state
    Joined {
        room: String,
        connection_id: ConnectionId,
        peer_count: usize,
        /// Room replica snapshot (if the room has shapes)
        #[serde(skip_serializing_if = "Option::is_none")]
        initial_sync: Option<String>,
        #[serde(default)]
        threads: Vec<Thread>,
    },
    PeerJoined { connection_id: ConnectionId },
    PeerLeft { connection_id: ConnectionId },
    /// Store update from another peer
    Sync { from: ConnectionId, data: String },
    Presence {
        from: ConnectionId,
        seq: u64,
        #[serde(flatten)]
        presence: Presence,
    },
    Reaction {
        from: ConnectionId,
        #[serde(flatten)]
        event: ReactionEvent,
    },
    /// Every thread in the room after a change
    Threads { threads: Vec<Thread> },
    Error { message: String },
}

impl ClientMessage {
    pub fn sync(bytes: &[u8]) -> Self {
        ClientMessage::Sync {
            data: encode_bytes(bytes),
        }
    }
}

/// What a handled server message changed in the session
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    JoinedRoom {
        room: String,
        connection_id: ConnectionId,
        peer_count: usize,
    },
    PeerJoined { connection_id: ConnectionId },
    PeerLeft { connection_id: ConnectionId },
    /// Remote shape changes were merged into the store
    StoreUpdated { from: ConnectionId },
    PresenceChanged { from: ConnectionId },
    ReactionReceived { from: ConnectionId },
    ThreadsChanged,
    Error { message: String },
}

/// Encode binary store data for a JSON frame.
pub fn encode_bytes(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Decode binary store data from a JSON frame.
pub fn decode_bytes(input: &str) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD.decode(input)
}
