//! SketchRoom WebSocket Relay Server
//!
//! Relays store updates, presence, reactions and comment threads between
//! clients in the same room. Each room keeps a replica of the shape store so
//! late joiners start from the current state.
//!
//! ## Protocol
//!
//! Messages are JSON with the following format:
//! ```json
//! { "type": "join", "room": "room-id" }
//! { "type": "sync", "data": "<base64-encoded-loro-bytes>" }
//! { "type": "presence", "seq": 3, "cursor": { "x": 100, "y": 200 }, "message": null }
//! { "type": "reaction", "x": 100, "y": 200, "value": "🔥" }
//! ```

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use dashmap::DashMap;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use sketchroom_core::comments::{CommentError, MemoryThreadStore, MetadataPatch, Thread, ThreadId, ThreadStore};
use sketchroom_core::presence::ConnectionId;
use sketchroom_core::store::ReplicatedStore;
use sketchroom_core::sync::{decode_bytes, encode_bytes, ClientMessage, ServerMessage};
use std::{
    collections::HashSet,
    net::SocketAddr,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};
use tokio::sync::broadcast;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

const ADDR_VAR: &str = "SKETCHROOM_ADDR";
const CHANNEL_CAPACITY_VAR: &str = "SKETCHROOM_CHANNEL_CAPACITY";

/// Server configuration
#[derive(Debug, Clone, PartialEq)]
struct ServerConfig {
    addr: SocketAddr,
    /// Broadcast buffer per room
    channel_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 3030)),
            channel_capacity: 256,
        }
    }
}

impl ServerConfig {
    fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from a variable lookup. Unparseable values keep the default.
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(addr) = lookup(ADDR_VAR) {
            match addr.parse() {
                Ok(addr) => config.addr = addr,
                Err(e) => warn!("Ignoring {}={}: {}", ADDR_VAR, addr, e),
            }
        }
        if let Some(capacity) = lookup(CHANNEL_CAPACITY_VAR) {
            match capacity.parse::<usize>() {
                Ok(capacity) if capacity > 0 => config.channel_capacity = capacity,
                Ok(_) => warn!("Ignoring {}=0", CHANNEL_CAPACITY_VAR),
                Err(e) => warn!("Ignoring {}={}: {}", CHANNEL_CAPACITY_VAR, capacity, e),
            }
        }
        config
    }
}

/// A message on a room's broadcast channel, tagged with its sender
type RoomMessage = (ConnectionId, ServerMessage);

/// Sender id for state the relay sends on its own behalf
const RELAY_ID: ConnectionId = 0;

/// Room state
struct Room {
    /// Broadcast channel for this room
    tx: broadcast::Sender<RoomMessage>,
    /// Connected peers
    peers: HashSet<ConnectionId>,
    /// Room copy of the shape store (for new joiners)
    replica: ReplicatedStore,
    /// Whether any update has been merged into the replica
    has_history: bool,
    threads: MemoryThreadStore,
}

impl Room {
    fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            peers: HashSet::new(),
            replica: ReplicatedStore::new(),
            has_history: false,
            threads: MemoryThreadStore::new(),
        }
    }
}

/// What a joining peer receives
struct JoinInfo {
    rx: broadcast::Receiver<RoomMessage>,
    initial_sync: Option<String>,
    peer_count: usize,
    threads: Vec<Thread>,
}

/// Shared application state
struct AppState {
    /// Active rooms
    rooms: DashMap<String, Room>,
    next_connection: AtomicU64,
    channel_capacity: usize,
}

impl AppState {
    fn new(channel_capacity: usize) -> Self {
        Self {
            rooms: DashMap::new(),
            next_connection: AtomicU64::new(1),
            channel_capacity,
        }
    }

    fn next_connection_id(&self) -> ConnectionId {
        self.next_connection.fetch_add(1, Ordering::Relaxed)
    }

    /// Add peer to room
    fn join_room(&self, room_id: &str, peer: ConnectionId) -> JoinInfo {
        let mut room = self
            .rooms
            .entry(room_id.to_string())
            .or_insert_with(|| Room::new(self.channel_capacity));
        room.peers.insert(peer);
        JoinInfo {
            rx: room.tx.subscribe(),
            initial_sync: room
                .has_history
                .then(|| encode_bytes(&room.replica.export_snapshot())),
            peer_count: room.peers.len(),
            threads: room.threads.list(),
        }
    }

    /// Remove peer from room
    fn leave_room(&self, room_id: &str, peer: ConnectionId) {
        if let Some(mut room) = self.rooms.get_mut(room_id) {
            room.peers.remove(&peer);
            // Clean up empty rooms
            if room.peers.is_empty() {
                drop(room);
                self.rooms.remove(room_id);
                info!("Room {} closed", room_id);
            }
        }
    }

    /// Merge a client's store update into the room replica.
    fn apply_sync(&self, room_id: &str, data: &str) -> Result<(), String> {
        let bytes = decode_bytes(data).map_err(|e| format!("Invalid sync data: {}", e))?;
        let mut room = self
            .rooms
            .get_mut(room_id)
            .ok_or_else(|| format!("Unknown room {}", room_id))?;
        room.replica
            .import(&bytes)
            .map_err(|e| format!("Rejected sync data: {}", e))?;
        room.has_history = true;
        Ok(())
    }

    fn create_thread(&self, room_id: &str, thread: Thread) -> Option<Vec<Thread>> {
        let mut room = self.rooms.get_mut(room_id)?;
        room.threads.insert(thread);
        Some(room.threads.list())
    }

    fn edit_thread(
        &self,
        room_id: &str,
        thread_id: ThreadId,
        patch: &MetadataPatch,
    ) -> Result<Vec<Thread>, CommentError> {
        let mut room = self
            .rooms
            .get_mut(room_id)
            .ok_or(CommentError::UnknownThread(thread_id))?;
        room.threads.edit_metadata(thread_id, patch)?;
        Ok(room.threads.list())
    }

    /// Full room state for a peer that missed broadcasts.
    fn catch_up(&self, room_id: &str) -> Vec<ServerMessage> {
        let Some(room) = self.rooms.get(room_id) else {
            return Vec::new();
        };
        let mut messages = Vec::new();
        if room.has_history {
            messages.push(ServerMessage::Sync {
                from: RELAY_ID,
                data: encode_bytes(&room.replica.export_snapshot()),
            });
        }
        messages.push(ServerMessage::Threads {
            threads: room.threads.list(),
        });
        messages
    }

    /// What to forward to `peer` for one receive on its room channel.
    fn deliver(
        &self,
        room_id: &str,
        peer: ConnectionId,
        received: Result<RoomMessage, broadcast::error::RecvError>,
    ) -> Vec<ServerMessage> {
        match received {
            // Don't echo back to sender
            Ok((from, msg)) if from != peer => vec![msg],
            Ok(_) => Vec::new(),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Peer {} lagged, {} messages skipped, resending room state", peer, skipped);
                self.catch_up(room_id)
            }
            Err(broadcast::error::RecvError::Closed) => Vec::new(),
        }
    }

    /// Broadcast message to room
    fn broadcast(&self, room_id: &str, from: ConnectionId, msg: ServerMessage) {
        if let Some(room) = self.rooms.get(room_id) {
            let _ = room.tx.send((from, msg));
        }
    }
}

fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sketchroom_server=info,tower_http=info".into()),
        )
        .init();

    let config = ServerConfig::from_env();
    let state = Arc::new(AppState::new(config.channel_capacity));

    info!("SketchRoom relay server listening on {}", config.addr);
    info!("WebSocket endpoint: ws://{}/ws", config.addr);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app(state)).await
}

/// Index page
async fn index() -> &'static str {
    "SketchRoom Relay Server - Connect via WebSocket at /ws"
}

/// Health check
async fn health() -> &'static str {
    "ok"
}

/// WebSocket upgrade handler
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Serialize and send one message. Returns false if the socket is gone.
async fn send_message(sender: &mut SplitSink<WebSocket, Message>, msg: &ServerMessage) -> bool {
    match serde_json::to_string(msg) {
        Ok(json) => sender.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            warn!("Failed to encode message: {}", e);
            true
        }
    }
}

/// Relay a store update from `peer` to the room after merging it.
async fn relay_sync(
    state: &AppState,
    sender: &mut SplitSink<WebSocket, Message>,
    room: &str,
    peer: ConnectionId,
    data: String,
) -> bool {
    match state.apply_sync(room, &data) {
        Ok(()) => {
            state.broadcast(room, peer, ServerMessage::Sync { from: peer, data });
            true
        }
        Err(message) => {
            warn!("Sync from {} rejected: {}", peer, message);
            send_message(sender, &ServerMessage::Error { message }).await
        }
    }
}

/// Handle a WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let peer = state.next_connection_id();
    info!("New connection: {}", peer);

    let (mut sender, mut receiver) = socket.split();
    let mut current_room: Option<String> = None;
    let mut room_rx: Option<broadcast::Receiver<RoomMessage>> = None;

    loop {
        tokio::select! {
            // Handle incoming messages from client
            msg = receiver.next() => {
                let client_msg = match msg {
                    Some(Ok(Message::Text(text))) => match serde_json::from_str::<ClientMessage>(&text) {
                        Ok(client_msg) => client_msg,
                        Err(e) => {
                            warn!("Invalid message from {}: {}", peer, e);
                            let err = ServerMessage::Error {
                                message: format!("Invalid message: {}", e),
                            };
                            if !send_message(&mut sender, &err).await {
                                break;
                            }
                            continue;
                        }
                    },
                    // Binary messages are treated as raw sync data
                    Some(Ok(Message::Binary(data))) => ClientMessage::Sync {
                        data: STANDARD.encode(&data),
                    },
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue, // Ignore ping/pong
                    Some(Err(e)) => {
                        warn!("WebSocket error for {}: {}", peer, e);
                        break;
                    }
                };

                match client_msg {
                    ClientMessage::Join { room } => {
                        // Leave current room if any
                        if let Some(old_room) = current_room.take() {
                            state.leave_room(&old_room, peer);
                            state.broadcast(&old_room, peer, ServerMessage::PeerLeft { connection_id: peer });
                        }

                        let join = state.join_room(&room, peer);
                        room_rx = Some(join.rx);
                        current_room = Some(room.clone());

                        let joined = ServerMessage::Joined {
                            room: room.clone(),
                            connection_id: peer,
                            peer_count: join.peer_count,
                            initial_sync: join.initial_sync,
                            threads: join.threads,
                        };
                        if !send_message(&mut sender, &joined).await {
                            break;
                        }

                        // Notify others
                        state.broadcast(&room, peer, ServerMessage::PeerJoined { connection_id: peer });
                        info!("Peer {} joined room {}", peer, room);
                    }
                    ClientMessage::Leave => {
                        if let Some(room) = current_room.take() {
                            state.leave_room(&room, peer);
                            state.broadcast(&room, peer, ServerMessage::PeerLeft { connection_id: peer });
                            info!("Peer {} left room {}", peer, room);
                        }
                        room_rx = None;
                    }
                    ClientMessage::Sync { data } => {
                        if let Some(room) = &current_room {
                            if !relay_sync(&state, &mut sender, room, peer, data).await {
                                break;
                            }
                        }
                    }
                    ClientMessage::Presence { seq, presence } => {
                        if let Some(room) = &current_room {
                            state.broadcast(room, peer, ServerMessage::Presence { from: peer, seq, presence });
                        }
                    }
                    ClientMessage::Reaction { event } => {
                        if let Some(room) = &current_room {
                            state.broadcast(room, peer, ServerMessage::Reaction { from: peer, event });
                        }
                    }
                    ClientMessage::CreateThread { thread } => {
                        if let Some(room) = &current_room {
                            if let Some(threads) = state.create_thread(room, thread) {
                                state.broadcast(room, peer, ServerMessage::Threads { threads });
                            }
                        }
                    }
                    ClientMessage::EditThread { thread_id, metadata } => {
                        if let Some(room) = &current_room {
                            match state.edit_thread(room, thread_id, &metadata) {
                                Ok(threads) => state.broadcast(room, peer, ServerMessage::Threads { threads }),
                                Err(e) => warn!("Thread edit from {} ignored: {}", peer, e),
                            }
                        }
                    }
                }
            }

            // Handle broadcast messages from room
            msg = async {
                match &mut room_rx {
                    Some(rx) => rx.recv().await,
                    None => {
                        // No room joined, just wait forever
                        std::future::pending().await
                    }
                }
            } => {
                if matches!(msg, Err(broadcast::error::RecvError::Closed)) {
                    room_rx = None;
                    continue;
                }
                let Some(room) = current_room.as_deref() else {
                    continue;
                };
                let mut open = true;
                for server_msg in state.deliver(room, peer, msg) {
                    if !send_message(&mut sender, &server_msg).await {
                        open = false;
                        break;
                    }
                }
                if !open {
                    break;
                }
            }
        }
    }

    // Cleanup on disconnect
    if let Some(room) = current_room {
        state.leave_room(&room, peer);
        state.broadcast(&room, peer, ServerMessage::PeerLeft { connection_id: peer });
    }
    info!("Connection closed: {}", peer);
}
