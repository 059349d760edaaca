use crate::console::SceneCommand;
use modelview_common::{Action, Movement, PostEffect, SceneParams};
use std::collections::HashSet;
use tracing::{debug, info};

/// Keys the viewer reacts to, independent of the windowing library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    W,
    A,
    S,
    D,
    /// A number key on the main row.
    Digit(u8),
    Escape,
}

impl Key {
    pub fn movement(self) -> Option<Movement> {
        match self {
            Key::W => Some(Movement::Forward),
            Key::S => Some(Movement::Backward),
            Key::A => Some(Movement::StrafeLeft),
            Key::D => Some(Movement::StrafeRight),
            _ => None,
        }
    }

    /// Effect selected by this key, for digits 0 through 4.
    pub fn effect(self) -> Option<PostEffect> {
        match self {
            Key::Digit(n) => PostEffect::from_selector(n as i32),
            _ => None,
        }
    }
}

/// What one frame hands to the viewer.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameInput {
    /// Cursor looks in arrival order, then one movement per held key.
    pub actions: Vec<Action>,
    pub params: SceneParams,
}

/// Accumulates input events between frames.
#[derive(Debug, Clone, Default)]
pub struct InputState {
    held: HashSet<Key>,
    looks: Vec<Action>,
    params: SceneParams,
    quit: bool,
}

impl InputState {
    pub fn new(params: SceneParams) -> Self {
        Self {
            params,
            ..Self::default()
        }
    }

    pub fn key_down(&mut self, key: Key) {
        if let Some(effect) = key.effect() {
            if effect != self.params.effect {
                info!(%effect, "post effect selected");
            }
            self.params.effect = effect;
        }
        if key == Key::Escape {
            self.quit = true;
        }
        self.held.insert(key);
    }

    pub fn key_up(&mut self, key: Key) {
        self.held.remove(&key);
    }

    pub fn is_held(&self, key: Key) -> bool {
        self.held.contains(&key)
    }

    /// The cursor moved to `(x, y)` in window coordinates.
    pub fn cursor_moved(&mut self, x: f64, y: f64) {
        self.looks.push(Action::Look {
            x: x as f32,
            y: y as f32,
        });
    }

    /// Releases every held key, e.g. when the window loses focus.
    pub fn release_all(&mut self) {
        self.held.clear();
    }

    pub fn apply_command(&mut self, command: &SceneCommand) {
        command.apply(&mut self.params);
        debug!(?command, "scene command applied");
    }

    pub fn params(&self) -> &SceneParams {
        &self.params
    }

    pub fn quit_requested(&self) -> bool {
        self.quit
    }

    /// Drains queued looks and samples held movement keys.
    pub fn end_frame(&mut self) -> FrameInput {
        let mut actions = std::mem::take(&mut self.looks);
        actions.extend(
            [Key::W, Key::S, Key::A, Key::D]
                .into_iter()
                .filter(|k| self.held.contains(k))
                .filter_map(Key::movement)
                .map(Action::Move),
        );
        FrameInput {
            actions,
            params: self.params,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn held_keys_move_every_frame() {
        let mut input = InputState::default();
        input.key_down(Key::W);
        input.key_down(Key::D);
        let expected = vec![
            Action::Move(Movement::Forward),
            Action::Move(Movement::StrafeRight),
        ];
        assert_eq!(input.end_frame().actions, expected);
        assert_eq!(input.end_frame().actions, expected);

        input.key_up(Key::W);
        assert_eq!(
            input.end_frame().actions,
            vec![Action::Move(Movement::StrafeRight)]
        );
    }

    #[test]
    fn looks_are_drained_in_order_before_moves() {
        let mut input = InputState::default();
        input.cursor_moved(10.0, 20.0);
        input.cursor_moved(12.5, 19.0);
        input.key_down(Key::S);

        let frame = input.end_frame();
        assert_eq!(
            frame.actions,
            vec![
                Action::Look { x: 10.0, y: 20.0 },
                Action::Look { x: 12.5, y: 19.0 },
                Action::Move(Movement::Backward),
            ]
        );
        assert_eq!(input.end_frame().actions.len(), 1);
    }

    #[test]
    fn digits_select_effects_and_stick() {
        let mut input = InputState::default();
        input.key_down(Key::Digit(3));
        input.key_up(Key::Digit(3));
        assert_eq!(input.end_frame().params.effect, PostEffect::Blur);

        input.key_down(Key::Digit(9));
        assert_eq!(input.params().effect, PostEffect::Blur);
        input.key_down(Key::Digit(0));
        assert_eq!(input.params().effect, PostEffect::Passthrough);
    }

    #[test]
    fn escape_requests_quit() {
        let mut input = InputState::default();
        assert!(!input.quit_requested());
        input.key_down(Key::Escape);
        assert!(input.quit_requested());
    }

    #[test]
    fn commands_edit_the_frame_params() {
        let mut input = InputState::default();
        input.apply_command(&SceneCommand::MoveLight(Vec3::new(1.0, 2.0, 3.0)));
        assert_eq!(
            input.end_frame().params.light_position,
            Vec3::new(1.0, 2.0, 3.0)
        );
    }

    #[test]
    fn release_all_stops_movement() {
        let mut input = InputState::default();
        input.key_down(Key::A);
        input.release_all();
        assert!(!input.is_held(Key::A));
        assert!(input.end_frame().actions.is_empty());
    }
}
