//! Local cursor mode: hidden, chat bubble, reaction picker or reacting.

use crate::presence::PresenceUpdate;
use kurbo::Point;
use serde::{Deserialize, Serialize};

/// What the local cursor is doing.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CursorMode {
    #[default]
    Hidden,
    /// Chat bubble open. `message` is being typed; `previous_message` was
    /// the last one sent.
    Chat {
        message: String,
        previous_message: Option<String>,
    },
    ReactionSelector,
    Reaction {
        reaction: String,
        is_pressed: bool,
    },
}

/// Entries of the canvas context menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextMenuItem {
    Chat,
    Reactions,
    Undo,
    Redo,
}

/// Side effects of a cursor transition.
#[derive(Debug, Clone, PartialEq)]
pub enum CursorEffect {
    Presence(PresenceUpdate),
    /// Start emitting the held reaction at the cursor.
    StartEmitting,
    StopEmitting,
}

/// Cursor mode machine.
#[derive(Debug, Clone, Default)]
pub struct CursorState {
    mode: CursorMode,
}

impl CursorState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> &CursorMode {
        &self.mode
    }

    pub fn is_chatting(&self) -> bool {
        matches!(self.mode, CursorMode::Chat { .. })
    }

    /// Reaction to emit right now, if one is held down.
    pub fn held_reaction(&self) -> Option<&str> {
        match &self.mode {
            CursorMode::Reaction {
                reaction,
                is_pressed: true,
            } => Some(reaction.as_str()),
            _ => None,
        }
    }

    fn set_mode(&mut self, mode: CursorMode) -> Vec<CursorEffect> {
        let was_emitting = self.held_reaction().is_some();
        self.mode = mode;
        if was_emitting && self.held_reaction().is_none() {
            vec![CursorEffect::StopEmitting]
        } else {
            Vec::new()
        }
    }

    /// Handle a key press. Returns `None` if the key is not a cursor key and
    /// should be passed on.
    pub fn key_pressed(&mut self, key: &str) -> Option<Vec<CursorEffect>> {
        if key == "Escape" {
            return Some(self.hide());
        }
        if let CursorMode::Chat {
            message,
            previous_message,
        } = &mut self.mode
        {
            return Some(match key {
                "Enter" => {
                    *previous_message = Some(std::mem::take(message));
                    Vec::new()
                }
                "Backspace" => {
                    message.pop();
                    vec![CursorEffect::Presence(PresenceUpdate::message(Some(message.clone())))]
                }
                _ if key.chars().count() == 1 => {
                    message.push_str(key);
                    vec![CursorEffect::Presence(PresenceUpdate::message(Some(message.clone())))]
                }
                _ => Vec::new(),
            });
        }

        match key {
            "/" => Some(self.open_chat()),
            "e" => Some(self.set_mode(CursorMode::ReactionSelector)),
            _ => None,
        }
    }

    /// Open the chat bubble with an empty message.
    pub fn open_chat(&mut self) -> Vec<CursorEffect> {
        self.set_mode(CursorMode::Chat {
            message: String::new(),
            previous_message: None,
        })
    }

    /// Hide the cursor bubble and clear the shared message.
    pub fn hide(&mut self) -> Vec<CursorEffect> {
        let mut effects = self.set_mode(CursorMode::Hidden);
        effects.push(CursorEffect::Presence(PresenceUpdate::message(None)));
        effects
    }

    /// Pick a reaction from the selector.
    pub fn select_reaction(&mut self, reaction: &str) -> Vec<CursorEffect> {
        self.set_mode(CursorMode::Reaction {
            reaction: reaction.to_string(),
            is_pressed: false,
        })
    }

    pub fn context_menu(&mut self, item: ContextMenuItem) -> Vec<CursorEffect> {
        match item {
            ContextMenuItem::Chat => self.open_chat(),
            ContextMenuItem::Reactions => self.set_mode(CursorMode::ReactionSelector),
            ContextMenuItem::Undo | ContextMenuItem::Redo => Vec::new(),
        }
    }

    /// Pointer moved to `cursor` (canvas coordinates). The cursor stays put
    /// while the reaction selector is open.
    pub fn pointer_move(&mut self, cursor: Point) -> Vec<CursorEffect> {
        if self.mode == CursorMode::ReactionSelector {
            return Vec::new();
        }
        vec![CursorEffect::Presence(PresenceUpdate::cursor(Some(cursor)))]
    }

    pub fn pointer_down(&mut self, cursor: Point) -> Vec<CursorEffect> {
        let mut effects = vec![CursorEffect::Presence(PresenceUpdate::cursor(Some(cursor)))];
        if let CursorMode::Reaction { is_pressed, .. } = &mut self.mode {
            *is_pressed = true;
            effects.push(CursorEffect::StartEmitting);
        }
        effects
    }

    pub fn pointer_up(&mut self) -> Vec<CursorEffect> {
        if let CursorMode::Reaction { is_pressed, .. } = &mut self.mode {
            if *is_pressed {
                *is_pressed = false;
                return vec![CursorEffect::StopEmitting];
            }
        }
        Vec::new()
    }

    /// Pointer left the canvas: hide, drop the cursor and the message.
    pub fn pointer_leave(&mut self) -> Vec<CursorEffect> {
        let mut effects = self.set_mode(CursorMode::Hidden);
        effects.push(CursorEffect::Presence(
            PresenceUpdate::cursor(None).with_message(None),
        ));
        effects
    }
}
