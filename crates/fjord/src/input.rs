//! Keyboard and mouse state handed to a [`Scene`](crate::app::Scene).
//!
//! The runner feeds window events in as they arrive and calls
//! [`InputState::end_frame`] after the scene's update, so the "just" sets,
//! the cursor motion and the wheel delta always describe one frame.

use std::collections::HashSet;
use std::hash::Hash;

use glam::Vec2;

pub use winit::event::MouseButton;
pub use winit::keyboard::KeyCode;

/// Held, just-pressed and just-released state for one kind of button.
#[derive(Debug, Clone)]
pub struct Buttons<T: Eq + Hash + Copy> {
    pressed: HashSet<T>,
    just_pressed: HashSet<T>,
    just_released: HashSet<T>,
}

impl<T: Eq + Hash + Copy> Buttons<T> {
    pub fn new() -> Self {
        Self {
            pressed: HashSet::new(),
            just_pressed: HashSet::new(),
            just_released: HashSet::new(),
        }
    }

    pub fn pressed(&self, button: T) -> bool {
        self.pressed.contains(&button)
    }

    pub fn just_pressed(&self, button: T) -> bool {
        self.just_pressed.contains(&button)
    }

    pub fn just_released(&self, button: T) -> bool {
        self.just_released.contains(&button)
    }

    pub(crate) fn press(&mut self, button: T) {
        if self.pressed.insert(button) {
            self.just_pressed.insert(button);
        }
    }

    pub(crate) fn release(&mut self, button: T) {
        if self.pressed.remove(&button) {
            self.just_released.insert(button);
        }
    }

    fn clear_just(&mut self) {
        self.just_pressed.clear();
        self.just_released.clear();
    }
}

impl<T: Eq + Hash + Copy> Default for Buttons<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Default)]
pub struct InputState {
    pub keys: Buttons<KeyCode>,
    pub mouse: Buttons<MouseButton>,
    cursor: Option<Vec2>,
    cursor_delta: Vec2,
    wheel: f32,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cursor position in physical window pixels, once the cursor has entered
    /// the window.
    pub fn cursor(&self) -> Option<Vec2> {
        self.cursor
    }

    /// Cursor motion this frame.
    pub fn cursor_delta(&self) -> Vec2 {
        self.cursor_delta
    }

    /// Wheel movement this frame, in lines. Positive scrolls away from the user.
    pub fn wheel(&self) -> f32 {
        self.wheel
    }

    pub(crate) fn move_cursor(&mut self, position: Vec2) {
        if let Some(previous) = self.cursor {
            self.cursor_delta += position - previous;
        }
        self.cursor = Some(position);
    }

    pub(crate) fn scroll(&mut self, lines: f32) {
        self.wheel += lines;
    }

    /// Reset the per-frame state.
    pub(crate) fn end_frame(&mut self) {
        self.keys.clear_just();
        self.mouse.clear_just();
        self.cursor_delta = Vec2::ZERO;
        self.wheel = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn press_is_reported_once() {
        let mut input = InputState::new();
        input.keys.press(KeyCode::KeyW);
        input.keys.press(KeyCode::KeyW);
        assert!(input.keys.pressed(KeyCode::KeyW));
        assert!(input.keys.just_pressed(KeyCode::KeyW));
        input.end_frame();
        assert!(input.keys.pressed(KeyCode::KeyW));
        assert!(!input.keys.just_pressed(KeyCode::KeyW));
        input.keys.release(KeyCode::KeyW);
        assert!(input.keys.just_released(KeyCode::KeyW));
        assert!(!input.keys.pressed(KeyCode::KeyW));
    }

    #[test]
    fn cursor_motion_accumulates_per_frame() {
        let mut input = InputState::new();
        input.move_cursor(Vec2::new(10.0, 10.0));
        assert_eq!(input.cursor_delta(), Vec2::ZERO);
        input.move_cursor(Vec2::new(13.0, 8.0));
        input.move_cursor(Vec2::new(15.0, 8.0));
        input.scroll(1.0);
        input.scroll(0.5);
        assert_eq!(input.cursor_delta(), Vec2::new(5.0, -2.0));
        assert_eq!(input.wheel(), 1.5);

        input.end_frame();
        assert_eq!(input.cursor_delta(), Vec2::ZERO);
        assert_eq!(input.wheel(), 0.0);
        assert_eq!(input.cursor(), Some(Vec2::new(15.0, 8.0)));
    }
}
