//! Input events and pointer/keyboard state.

use kurbo::Point;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Instant;

/// Mouse button identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

/// Modifier keys state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modifiers {
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
    pub meta: bool,
}

impl Modifiers {
    /// Platform command modifier (Ctrl, or Cmd on macOS).
    pub fn command(&self) -> bool {
        self.ctrl || self.meta
    }

    pub fn ctrl() -> Self {
        Self {
            ctrl: true,
            ..Self::default()
        }
    }

    pub fn ctrl_shift() -> Self {
        Self {
            ctrl: true,
            shift: true,
            ..Self::default()
        }
    }
}

/// Pointer event in client (window) coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PointerEvent {
    Down { position: Point, button: MouseButton },
    Up { position: Point, button: MouseButton },
    Move { position: Point },
    /// Pointer left the canvas container.
    Leave,
}

/// Keyboard event type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyEvent {
    Pressed(String),
    Released(String),
}

/// Any input the session reacts to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InputEvent {
    Pointer(PointerEvent),
    Key { event: KeyEvent, modifiers: Modifiers },
    /// Keyboard focus left the canvas.
    Blur,
}

impl InputEvent {
    pub fn down(x: f64, y: f64) -> Self {
        InputEvent::Pointer(PointerEvent::Down {
            position: Point::new(x, y),
            button: MouseButton::Left,
        })
    }

    pub fn right_down(x: f64, y: f64) -> Self {
        InputEvent::Pointer(PointerEvent::Down {
            position: Point::new(x, y),
            button: MouseButton::Right,
        })
    }

    pub fn up(x: f64, y: f64) -> Self {
        InputEvent::Pointer(PointerEvent::Up {
            position: Point::new(x, y),
            button: MouseButton::Left,
        })
    }

    pub fn moved(x: f64, y: f64) -> Self {
        InputEvent::Pointer(PointerEvent::Move {
            position: Point::new(x, y),
        })
    }

    pub fn key(key: &str) -> Self {
        InputEvent::Key {
            event: KeyEvent::Pressed(key.to_string()),
            modifiers: Modifiers::default(),
        }
    }

    pub fn chord(key: &str, modifiers: Modifiers) -> Self {
        InputEvent::Key {
            event: KeyEvent::Pressed(key.to_string()),
            modifiers,
        }
    }
}

/// Double-click detection constants.
const DOUBLE_CLICK_TIME_MS: u128 = 500;
const DOUBLE_CLICK_DISTANCE: f64 = 5.0;

/// Tracks pointer and keyboard state between events.
#[derive(Debug, Clone, Default)]
pub struct InputState {
    /// Last known pointer position.
    pub pointer_position: Point,
    pressed_buttons: HashSet<MouseButton>,
    pub modifiers: Modifiers,
    last_click_time: Option<Instant>,
    last_click_position: Option<Point>,
    /// Whether the most recent primary press completed a double-click.
    double_click_detected: bool,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process a pointer event observed at `now`.
    pub fn handle_pointer_event(&mut self, event: &PointerEvent, now: Instant) {
        match *event {
            PointerEvent::Down { position, button } => {
                self.pointer_position = position;
                self.pressed_buttons.insert(button);
                self.double_click_detected = false;

                if button == MouseButton::Left {
                    let is_double = match (self.last_click_time, self.last_click_position) {
                        (Some(last_time), Some(last_pos)) => {
                            let elapsed = now.saturating_duration_since(last_time).as_millis();
                            elapsed < DOUBLE_CLICK_TIME_MS
                                && position.distance(last_pos) < DOUBLE_CLICK_DISTANCE
                        }
                        _ => false,
                    };
                    if is_double {
                        self.double_click_detected = true;
                        // Reset so a third click starts a new sequence.
                        self.last_click_time = None;
                        self.last_click_position = None;
                    } else {
                        self.last_click_time = Some(now);
                        self.last_click_position = Some(position);
                    }
                }
            }
            PointerEvent::Up { position, button } => {
                self.pointer_position = position;
                self.pressed_buttons.remove(&button);
            }
            PointerEvent::Move { position } => {
                self.pointer_position = position;
            }
            PointerEvent::Leave => {
                self.pressed_buttons.clear();
            }
        }
    }

    /// Record the modifiers that accompany a key event.
    pub fn handle_key_event(&mut self, modifiers: Modifiers) {
        self.modifiers = modifiers;
    }

    pub fn is_button_pressed(&self, button: MouseButton) -> bool {
        self.pressed_buttons.contains(&button)
    }

    /// Whether the most recent primary press was a double-click.
    pub fn is_double_click(&self) -> bool {
        self.double_click_detected
    }
}
