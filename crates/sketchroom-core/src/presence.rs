//! Presence channel: each participant's live cursor and chat message.
//!
//! Presence is ephemeral and never persisted. Each record is replaced as a
//! whole; a per-sender sequence number discards records that arrive out of
//! order.

use crate::shapes::SerializableColor;
use kurbo::Point;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Relay-assigned identifier of one connection.
pub type ConnectionId = u64;

/// Colors for remote cursors, indexed by connection id.
pub const CURSOR_COLORS: [SerializableColor; 8] = [
    SerializableColor { r: 0xdc, g: 0x26, b: 0x26, a: 0xff },
    SerializableColor { r: 0xd9, g: 0x77, b: 0x06, a: 0xff },
    SerializableColor { r: 0x05, g: 0x96, b: 0x69, a: 0xff },
    SerializableColor { r: 0x7c, g: 0x3a, b: 0xed, a: 0xff },
    SerializableColor { r: 0xdb, g: 0x27, b: 0x77, a: 0xff },
    SerializableColor { r: 0x25, g: 0x63, b: 0xeb, a: 0xff },
    SerializableColor { r: 0x08, g: 0x91, b: 0xb2, a: 0xff },
    SerializableColor { r: 0x65, g: 0xa3, b: 0x0d, a: 0xff },
];

/// Color for a participant's cursor.
pub fn cursor_color(connection_id: ConnectionId) -> SerializableColor {
    CURSOR_COLORS[(connection_id % CURSOR_COLORS.len() as u64) as usize]
}

/// One participant's presence record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Presence {
    /// Cursor position relative to the canvas container; absent when the
    /// pointer is outside it.
    #[serde(default)]
    pub cursor: Option<Point>,
    /// Live chat text.
    #[serde(default)]
    pub message: Option<String>,
}

/// Partial presence change. `None` fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PresenceUpdate {
    pub cursor: Option<Option<Point>>,
    pub message: Option<Option<String>>,
}

impl PresenceUpdate {
    pub fn cursor(cursor: Option<Point>) -> Self {
        Self {
            cursor: Some(cursor),
            ..Self::default()
        }
    }

    pub fn message(message: Option<String>) -> Self {
        Self {
            message: Some(message),
            ..Self::default()
        }
    }

    pub fn with_message(mut self, message: Option<String>) -> Self {
        self.message = Some(message);
        self
    }

    fn apply_to(self, presence: &mut Presence) {
        if let Some(cursor) = self.cursor {
            presence.cursor = cursor;
        }
        if let Some(message) = self.message {
            presence.message = message;
        }
    }
}

/// Latest known presence of another participant.
#[derive(Debug, Clone, PartialEq)]
pub struct PeerPresence {
    pub seq: u64,
    pub presence: Presence,
}

/// A remote cursor ready to draw.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteCursor {
    pub connection_id: ConnectionId,
    pub position: Point,
    pub message: Option<String>,
    pub color: SerializableColor,
}

/// Own presence plus the latest presence of every other participant.
#[derive(Debug, Clone, Default)]
pub struct PresenceChannel {
    own: Presence,
    seq: u64,
    /// Whether `own` changed since the last [`take_pending`](Self::take_pending).
    dirty: bool,
    others: BTreeMap<ConnectionId, PeerPresence>,
}

impl PresenceChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Own presence record.
    pub fn own(&self) -> &Presence {
        &self.own
    }

    /// Merge a partial change into the own record.
    /// Returns true if the record changed.
    pub fn update(&mut self, update: PresenceUpdate) -> bool {
        let before = self.own.clone();
        update.apply_to(&mut self.own);
        let changed = self.own != before;
        self.dirty |= changed;
        changed
    }

    /// Take the own record for sending, if it changed. Several updates
    /// between sends coalesce into one record.
    pub fn take_pending(&mut self) -> Option<(u64, Presence)> {
        if !self.dirty {
            return None;
        }
        self.dirty = false;
        self.seq += 1;
        Some((self.seq, self.own.clone()))
    }

    /// Force the own record to be sent again (e.g. after joining a room).
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Record a participant's presence. Records with a sequence number not
    /// newer than the last one seen are dropped. Returns true if accepted.
    pub fn apply_remote(&mut self, from: ConnectionId, seq: u64, presence: Presence) -> bool {
        if let Some(existing) = self.others.get(&from) {
            if seq <= existing.seq {
                log::debug!("Dropping stale presence {} from {} (have {})", seq, from, existing.seq);
                return false;
            }
        }
        self.others.insert(from, PeerPresence { seq, presence });
        true
    }

    /// Forget a participant that left.
    pub fn remove_peer(&mut self, id: ConnectionId) -> bool {
        self.others.remove(&id).is_some()
    }

    /// Forget every other participant.
    pub fn clear_others(&mut self) {
        self.others.clear();
    }

    /// Latest presence of every other participant.
    pub fn others(&self) -> impl Iterator<Item = (ConnectionId, &Presence)> {
        self.others.iter().map(|(id, peer)| (*id, &peer.presence))
    }

    /// Cursors of other participants that are over the canvas.
    pub fn remote_cursors(&self) -> Vec<RemoteCursor> {
        self.others()
            .filter_map(|(id, presence)| {
                presence.cursor.map(|position| RemoteCursor {
                    connection_id: id,
                    position,
                    message: presence.message.clone().filter(|m| !m.is_empty()),
                    color: cursor_color(id),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_update_merges() {
        let mut channel = PresenceChannel::new();
        assert!(channel.update(PresenceUpdate::cursor(Some(Point::new(1.0, 2.0)))));
        assert!(channel.update(PresenceUpdate::message(Some("hi".to_string()))));
        assert_eq!(channel.own().cursor, Some(Point::new(1.0, 2.0)));
        assert_eq!(channel.own().message.as_deref(), Some("hi"));

        assert!(!channel.update(PresenceUpdate::message(Some("hi".to_string()))));
    }

    #[test]
    fn test_pending_coalesces() {
        let mut channel = PresenceChannel::new();
        assert!(channel.take_pending().is_none());

        channel.update(PresenceUpdate::cursor(Some(Point::new(1.0, 1.0))));
        channel.update(PresenceUpdate::cursor(Some(Point::new(2.0, 2.0))));
        let (seq, presence) = channel.take_pending().expect("pending");
        assert_eq!(seq, 1);
        assert_eq!(presence.cursor, Some(Point::new(2.0, 2.0)));
        assert!(channel.take_pending().is_none());
    }

    #[test]
    fn test_stale_remote_dropped() {
        let mut channel = PresenceChannel::new();
        let newer = Presence {
            cursor: Some(Point::new(9.0, 9.0)),
            message: None,
        };
        let older = Presence {
            cursor: Some(Point::new(1.0, 1.0)),
            message: None,
        };
        assert!(channel.apply_remote(3, 5, newer.clone()));
        assert!(!channel.apply_remote(3, 4, older));
        assert_eq!(channel.others().next(), Some((3, &newer)));
    }

    #[test]
    fn test_remote_cursors_skip_absent() {
        let mut channel = PresenceChannel::new();
        channel.apply_remote(
            1,
            1,
            Presence {
                cursor: Some(Point::new(5.0, 5.0)),
                message: Some(String::new()),
            },
        );
        channel.apply_remote(2, 1, Presence::default());

        let cursors = channel.remote_cursors();
        assert_eq!(cursors.len(), 1);
        assert_eq!(cursors[0].connection_id, 1);
        assert_eq!(cursors[0].message, None);
        assert_eq!(cursors[0].color, cursor_color(1));

        assert!(channel.remove_peer(1));
        assert!(channel.remote_cursors().is_empty());
    }

    #[test]
    fn test_cursor_color_wraps() {
        assert_eq!(cursor_color(0), cursor_color(CURSOR_COLORS.len() as u64));
        assert_ne!(cursor_color(0), cursor_color(1));
    }

    #[test]
    fn test_presence_json_shape() {
        let presence = Presence {
            cursor: Some(Point::new(3.0, 4.0)),
            message: None,
        };
        let value = serde_json::to_value(&presence).expect("serialize");
        assert_eq!(value["cursor"]["x"], 3.0);
        assert!(value["message"].is_null());
    }
}
