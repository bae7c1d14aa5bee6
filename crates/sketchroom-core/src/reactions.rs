//! Ephemeral reactions sent over the broadcast channel.

use kurbo::Point;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Reaction as sent over the wire. Fire-and-forget: duplicates or drops only
/// affect what is briefly shown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactionEvent {
    pub x: f64,
    pub y: f64,
    pub value: String,
}

impl ReactionEvent {
    pub fn new(point: Point, value: impl Into<String>) -> Self {
        Self {
            x: point.x,
            y: point.y,
            value: value.into(),
        }
    }

    pub fn point(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

/// A reaction being shown, stamped with local time.
#[derive(Debug, Clone, PartialEq)]
pub struct Reaction {
    pub point: Point,
    pub value: String,
    pub timestamp: Instant,
}

/// Reactions currently on screen.
#[derive(Debug, Clone)]
pub struct ReactionBuffer {
    reactions: Vec<Reaction>,
    lifetime: Duration,
}

impl ReactionBuffer {
    pub fn new(lifetime: Duration) -> Self {
        Self {
            reactions: Vec::new(),
            lifetime,
        }
    }

    /// Record a reaction emitted locally.
    pub fn record(&mut self, point: Point, value: &str, now: Instant) {
        self.reactions.push(Reaction {
            point,
            value: value.to_string(),
            timestamp: now,
        });
    }

    /// Record a reaction received from a peer, stamped with local time.
    pub fn receive(&mut self, event: ReactionEvent, now: Instant) {
        self.reactions.push(Reaction {
            point: event.point(),
            value: event.value,
            timestamp: now,
        });
    }

    /// Drop reactions older than the lifetime. Returns the number removed.
    pub fn prune(&mut self, now: Instant) -> usize {
        let before = self.reactions.len();
        let lifetime = self.lifetime;
        self.reactions
            .retain(|reaction| now.saturating_duration_since(reaction.timestamp) < lifetime);
        before - self.reactions.len()
    }

    pub fn reactions(&self) -> &[Reaction] {
        &self.reactions
    }

    pub fn len(&self) -> usize {
        self.reactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reactions.is_empty()
    }
}
